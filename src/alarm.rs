use std::{fmt, path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub type AlarmId = u32;

/// represents an alarm as handed to us by the application.
/// never changes after `arm` accepts it, re-arming replaces it wholesale
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AlarmSpec {
    pub id: AlarmId,
    pub fire_at: DateTime<Utc>,
    /// path of the sound to play
    pub asset: PathBuf,
    #[serde(default = "always_true")]
    pub loop_audio: bool,
    #[serde(default = "always_true")]
    pub vibrate: bool,
    /// system volume to force while ringing, in `0.0..=1.0`
    #[serde(default)]
    pub volume: Option<f32>,
    #[serde(default)]
    pub fade_in: Duration,
    #[serde(default = "always_true")]
    pub full_screen: bool,
    pub notification: NotificationContent,
    #[serde(default)]
    pub warn_on_kill: bool,
    /// overrides the configured kill warning text for this alarm
    #[serde(default)]
    pub kill_warning: Option<KillWarning>,
}

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}

impl AlarmSpec {
    /// a looping, vibrating alarm with no volume override and no fade
    #[must_use]
    pub fn new(
        id: AlarmId,
        fire_at: DateTime<Utc>,
        asset: impl Into<PathBuf>,
        notification: NotificationContent,
    ) -> Self {
        Self {
            id,
            fire_at,
            asset: asset.into(),
            loop_audio: true,
            vibrate: true,
            volume: None,
            fade_in: Duration::ZERO,
            full_screen: true,
            notification,
            warn_on_kill: false,
            kill_warning: None,
        }
    }

    /// rejects the spec if `arm` can't do anything sensible with it
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a zero id, an empty asset path or a volume
    /// outside `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id == 0 {
            return Err(Error::InvalidArgument("alarm id must not be 0".into()));
        }
        if self.asset.as_os_str().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "alarm {} has no audio asset",
                self.id
            )));
        }
        if let Some(volume) = self.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(Error::InvalidArgument(format!(
                    "alarm {} volume {volume} is outside 0..=1",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub buttons: ButtonSet,
}

impl NotificationContent {
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            buttons: ButtonSet::default(),
        }
    }
}

/// labels for the buttons shown on the ringing notification, a missing label
/// means no button
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct ButtonSet {
    pub stop: Option<String>,
    pub snooze: Option<String>,
    pub confirm: Option<String>,
}

impl ButtonSet {
    /// the buttons that are present, in display order
    #[must_use]
    pub fn actions(&self) -> Vec<(ActionKind, String)> {
        [
            (ActionKind::Stop, &self.stop),
            (ActionKind::Confirm, &self.confirm),
            (ActionKind::Snooze, &self.snooze),
        ]
        .into_iter()
        .filter_map(|(kind, label)| label.clone().map(|label| (kind, label)))
        .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct KillWarning {
    pub title: String,
    pub body: String,
}

impl Default for KillWarning {
    fn default() -> Self {
        Self {
            title: "Your alarms may not ring".to_string(),
            body: "You killed the app. Please reopen so your alarms can be rescheduled."
                .to_string(),
        }
    }
}

/// what happened to an alarm, as reported to the application
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Stop,
    Snooze,
    Confirm,
    /// fired while another alarm was ringing
    Ignore,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Stop => "stop",
                Self::Snooze => "snooze",
                Self::Confirm => "confirm",
                Self::Ignore => "ignore",
            }
        )
    }
}

/// an action taken while nobody was listening, kept until the application
/// attaches again
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub alarm_id: AlarmId,
    pub action: ActionKind,
    pub timestamp: DateTime<Utc>,
}

impl ActionRecord {
    #[must_use]
    pub const fn new(alarm_id: AlarmId, action: ActionKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            alarm_id,
            action,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Armed,
    Ringing,
    Stopping,
    Removed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Armed => stringify!(Armed),
                Self::Ringing => stringify!(Ringing),
                Self::Stopping => stringify!(Stopping),
                Self::Removed => stringify!(Removed),
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: AlarmId) -> AlarmSpec {
        AlarmSpec::new(
            id,
            Utc::now(),
            "sounds/beep_beep.mp3",
            NotificationContent::new("Alarm", "Wake up"),
        )
    }

    #[test]
    fn accepts_a_plain_alarm() {
        assert!(spec(1).validate().is_ok());
    }

    #[test]
    fn rejects_zero_id() {
        let err = spec(0).validate().unwrap_err();
        assert_eq!(err.as_label(), "invalid_argument");
    }

    #[test]
    fn rejects_missing_asset() {
        let mut alarm = spec(4);
        alarm.asset = PathBuf::new();
        assert!(matches!(alarm.validate(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rejects_volume_out_of_range() {
        let mut alarm = spec(2);
        alarm.volume = Some(1.5);
        assert!(alarm.validate().is_err());
        alarm.volume = Some(1.0);
        assert!(alarm.validate().is_ok());
    }

    #[test]
    fn only_labelled_buttons_are_shown() {
        let buttons = ButtonSet {
            stop: Some("Stop".into()),
            snooze: None,
            confirm: Some("I'm up".into()),
        };
        assert_eq!(
            buttons.actions(),
            vec![
                (ActionKind::Stop, "Stop".to_string()),
                (ActionKind::Confirm, "I'm up".to_string())
            ]
        );
        assert!(ButtonSet::default().actions().is_empty());
    }
}
