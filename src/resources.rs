//! Acquires and releases everything an alarm holds while it rings.
//!
//! An [`Episode`] is the record of one ringing period. It is only created by
//! [`ResourceCoordinator::acquire`] and only consumed by
//! [`ResourceCoordinator::release`], so every handle in it is given back
//! exactly once.

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};

use crate::{
    alarm::{AlarmId, AlarmSpec},
    communication::PlaybackTarget,
    config::Config,
    error::Error,
    platform::{
        AudioOutput, MixPolicy, Notification, NotificationTag, Notifier, Platform,
        PlaybackRequest, SystemVolume, Vibrator, WakeLock, WakeLockToken,
    },
};

/// handles held by one ringing alarm
#[derive(Debug)]
#[must_use = "an episode has to be released"]
pub struct Episode {
    pub id: AlarmId,
    pub number: u64,
    wake_lock: Option<WakeLockToken>,
    presented: bool,
    ducked: bool,
    playing: bool,
    /// the system volume from before the override, taken on restore
    volume_restore: Option<f32>,
    vibrating: bool,
}

impl Episode {
    const fn new(id: AlarmId, number: u64) -> Self {
        Self {
            id,
            number,
            wake_lock: None,
            presented: false,
            ducked: false,
            playing: false,
            volume_restore: None,
            vibrating: false,
        }
    }

    #[must_use]
    pub const fn volume_restore(&self) -> Option<f32> {
        self.volume_restore
    }
}

pub struct ResourceCoordinator {
    audio: Arc<dyn AudioOutput>,
    vibrator: Arc<dyn Vibrator>,
    volume: Arc<dyn SystemVolume>,
    wake_lock: Arc<dyn WakeLock>,
    notifier: Arc<dyn Notifier>,
    wake_lock_timeout: Duration,
    vibration_pattern: Vec<Duration>,
}

impl ResourceCoordinator {
    #[must_use]
    pub fn new(platform: &Platform, config: &Config) -> Self {
        Self {
            audio: platform.audio.clone(),
            vibrator: platform.vibrator.clone(),
            volume: platform.volume.clone(),
            wake_lock: platform.wake_lock.clone(),
            notifier: platform.notifier.clone(),
            wake_lock_timeout: config.wake_lock_timeout(),
            vibration_pattern: config.vibration_pattern(),
        }
    }

    /// starts ringing `spec`. on failure whatever was already acquired is
    /// released again before the error is returned
    ///
    /// # Errors
    /// the first capability that refused, usually
    /// [`Error::ResourceUnavailable`]
    pub fn acquire(
        &self,
        spec: &AlarmSpec,
        number: u64,
        start_at: Duration,
        on_end: PlaybackTarget,
    ) -> Result<Episode, Error> {
        let mut episode = Episode::new(spec.id, number);
        match self.engage(spec, start_at, on_end, &mut episode) {
            Ok(()) => {
                info!("alarm {} resources acquired (episode {number})", spec.id);
                Ok(episode)
            }
            Err(e) => {
                warn!("alarm {} couldn't acquire resources: {e}", spec.id);
                self.release(episode);
                Err(e)
            }
        }
    }

    fn engage(
        &self,
        spec: &AlarmSpec,
        start_at: Duration,
        on_end: PlaybackTarget,
        episode: &mut Episode,
    ) -> Result<(), Error> {
        episode.wake_lock = Some(self.wake_lock.acquire(self.wake_lock_timeout)?);

        self.notifier.post(&Notification {
            tag: NotificationTag::Alarm(spec.id),
            title: spec.notification.title.clone(),
            body: spec.notification.body.clone(),
            buttons: spec.notification.buttons.actions(),
            full_screen: spec.full_screen,
        })?;
        episode.presented = true;

        // ducking is cosmetic, ring anyway
        match self.audio.set_mix_policy(MixPolicy::DuckOthers) {
            Ok(()) => episode.ducked = true,
            Err(e) => warn!("alarm {} couldn't duck other audio: {e}", spec.id),
        }

        self.audio.play(
            spec.id,
            PlaybackRequest {
                asset: spec.asset.clone(),
                looping: spec.loop_audio,
                fade_in: spec.fade_in,
                start_at,
            },
            on_end,
        )?;
        episode.playing = true;

        if let Some(volume) = spec.volume {
            let previous = self.volume.get()?;
            self.volume.set(volume)?;
            episode.volume_restore = Some(previous);
            debug!("alarm {} forced volume {previous} -> {volume}", spec.id);
        }

        if spec.vibrate {
            self.vibrator.start(&self.vibration_pattern)?;
            episode.vibrating = true;
        }
        Ok(())
    }

    /// gives back everything in `episode`. every step runs even if an earlier
    /// one failed
    pub fn release(&self, mut episode: Episode) {
        let id = episode.id;
        if episode.vibrating {
            if let Err(e) = self.vibrator.stop() {
                warn!("alarm {id}: stopping vibration failed: {e}");
            }
        }
        if let Some(previous) = episode.volume_restore.take() {
            if let Err(e) = self.volume.set(previous) {
                warn!("alarm {id}: restoring volume {previous} failed: {e}");
            }
        }
        if episode.playing {
            if let Err(e) = self.audio.stop(id) {
                warn!("alarm {id}: stopping audio failed: {e}");
            }
        }
        if let Some(token) = episode.wake_lock.take() {
            self.wake_lock.release(token);
        }
        if episode.ducked {
            if let Err(e) = self.audio.set_mix_policy(MixPolicy::MixWithOthers) {
                warn!("alarm {id}: reverting mix policy failed: {e}");
            }
        }
        if episode.presented {
            self.notifier.dismiss(NotificationTag::Alarm(id));
        }
        info!("alarm {id} resources released (episode {})", episode.number);
    }

    #[must_use]
    pub fn position(&self, id: AlarmId) -> Option<Duration> {
        self.audio.position(id)
    }
}
