//! Warns the user when the process dies with alarms still pending.
//!
//! Nothing can keep an alarm alive once the OS kills its process, so the best
//! we can do is leave a notification behind telling the user to reopen the app.

use std::sync::Arc;

use log::{info, warn};

use crate::{
    alarm::{KillWarning, Phase},
    platform::{Notification, NotificationTag, Notifier},
    registry::{AlarmState, Registry},
};

pub struct Watchdog {
    notifier: Arc<dyn Notifier>,
    fallback: KillWarning,
    /// set through `set_warn_on_kill`, wins over the fallback
    custom: Option<KillWarning>,
    disabled: bool,
    active: bool,
}

impl Watchdog {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, fallback: KillWarning) -> Self {
        Self {
            notifier,
            fallback,
            custom: None,
            disabled: false,
            active: false,
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_text(&mut self, warning: KillWarning) {
        self.custom = Some(warning);
        self.disabled = false;
    }

    pub fn disable(&mut self) {
        self.disabled = true;
        if self.active {
            info!("kill warning disabled");
        }
        self.active = false;
    }

    /// re-evaluates whether any alarm still wants a warning
    pub fn update(&mut self, registry: &Registry) {
        let wanted = !self.disabled && registry.states().any(Self::watched);
        if wanted != self.active {
            info!(
                "kill warning {}",
                if wanted { "armed" } else { "stood down" }
            );
        }
        self.active = wanted;
    }

    fn watched(state: &AlarmState) -> bool {
        state.spec.warn_on_kill && matches!(state.phase, Phase::Armed | Phase::Ringing)
    }

    /// posts the warning if it is active, returns whether it did
    pub fn on_teardown(&self, registry: &Registry) -> bool {
        if !self.active {
            return false;
        }
        let text = self.text(registry);
        let posted = self.notifier.post(&Notification {
            tag: NotificationTag::KillWarning,
            title: text.title,
            body: text.body,
            buttons: Vec::new(),
            full_screen: false,
        });
        match posted {
            Ok(()) => {
                info!("posted kill warning");
                true
            }
            Err(e) => {
                warn!("couldn't post kill warning: {e}");
                false
            }
        }
    }

    /// the earliest watched alarm's own text, else the configured one
    fn text(&self, registry: &Registry) -> KillWarning {
        registry
            .states()
            .filter(|state| Self::watched(state))
            .filter_map(|state| state.spec.kill_warning.as_ref().map(|w| (state.trigger_at, w)))
            .min_by_key(|(at, _)| *at)
            .map(|(_, warning)| warning.clone())
            .or_else(|| self.custom.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        alarm::{AlarmId, AlarmSpec, NotificationContent},
        platform::memory::MemoryNotifier,
    };

    fn watched(id: AlarmId, warn_on_kill: bool) -> AlarmState {
        let mut spec = AlarmSpec::new(id, Utc::now(), "beep.mp3", NotificationContent::default());
        spec.warn_on_kill = warn_on_kill;
        AlarmState::new(spec, 1)
    }

    fn watchdog() -> (Watchdog, Arc<MemoryNotifier>) {
        let notifier = Arc::new(MemoryNotifier::default());
        (
            Watchdog::new(notifier.clone(), KillWarning::default()),
            notifier,
        )
    }

    #[test]
    fn posts_when_a_watched_alarm_is_armed() {
        let (mut watchdog, notifier) = watchdog();
        let mut registry = Registry::new();
        registry.insert(watched(3, true));
        watchdog.update(&registry);

        assert!(watchdog.on_teardown(&registry));

        let posted = notifier.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].tag, NotificationTag::KillWarning);
        assert_eq!(posted[0].title, "Your alarms may not ring");
    }

    #[test]
    fn stays_quiet_without_watched_alarms() {
        let (mut watchdog, notifier) = watchdog();
        let mut registry = Registry::new();
        registry.insert(watched(1, false));
        watchdog.update(&registry);

        assert!(!watchdog.is_active());
        assert!(!watchdog.on_teardown(&registry));
        assert!(notifier.posted().is_empty());
    }

    #[test]
    fn stands_down_when_registry_empties() {
        let (mut watchdog, _notifier) = watchdog();
        let mut registry = Registry::new();
        registry.insert(watched(1, true));
        watchdog.update(&registry);
        assert!(watchdog.is_active());

        registry.remove(1);
        watchdog.update(&registry);

        assert!(!watchdog.is_active());
    }

    #[test]
    fn disable_wins_until_text_is_set_again() {
        let (mut watchdog, notifier) = watchdog();
        let mut registry = Registry::new();
        registry.insert(watched(1, true));
        watchdog.disable();
        watchdog.update(&registry);
        assert!(!watchdog.on_teardown(&registry));

        watchdog.set_text(KillWarning {
            title: "Reopen me".into(),
            body: "Alarms are paused".into(),
        });
        watchdog.update(&registry);

        assert!(watchdog.on_teardown(&registry));
        assert_eq!(notifier.posted()[0].title, "Reopen me");
    }

    #[test]
    fn alarm_specific_text_wins() {
        let (mut watchdog, notifier) = watchdog();
        let mut registry = Registry::new();
        let mut state = watched(2, true);
        state.spec.kill_warning = Some(KillWarning {
            title: "Alarm 2 at risk".into(),
            body: "Open the app".into(),
        });
        registry.insert(state);
        watchdog.set_text(KillWarning {
            title: "Generic".into(),
            body: "Generic".into(),
        });
        watchdog.update(&registry);

        watchdog.on_teardown(&registry);

        assert_eq!(notifier.posted()[0].title, "Alarm 2 at risk");
    }
}
