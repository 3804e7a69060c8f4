//! The small set of OS capabilities the coordinator needs.
//!
//! Each capability is a trait so the ring logic is written once and every
//! target (the in-memory one used by tests and headless hosts, the desktop one
//! used by the CLI) only provides the glue. All methods take `&self`; the
//! implementations keep their own interior state.

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::{
    alarm::{ActionKind, AlarmId},
    communication::{PlaybackTarget, RefreshTarget, TimerTarget},
    error::Error,
};

pub mod desktop;
pub mod memory;

/// exact, wake-capable one-shot timers plus the periodic background refresh
pub trait WakeTimer: Send + Sync {
    /// registers a timer for `target.id`, replacing any earlier one for the
    /// same id
    ///
    /// # Errors
    /// [`Error::ResourceUnavailable`] when the OS refuses the timer.
    fn schedule(&self, fire_at: DateTime<Utc>, target: TimerTarget) -> Result<(), Error>;

    /// unknown or already fired ids are ignored
    fn cancel(&self, id: AlarmId);

    /// # Errors
    /// [`Error::ResourceUnavailable`] when background work is not permitted.
    fn schedule_refresh(&self, every: Duration, target: RefreshTarget) -> Result<(), Error>;

    fn cancel_refresh(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixPolicy {
    /// play alongside other audio untouched
    #[default]
    MixWithOthers,
    /// lower other audio while we play
    DuckOthers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub asset: PathBuf,
    pub looping: bool,
    /// linear ramp from silence to full volume, zero means start at full
    pub fade_in: Duration,
    /// where to start in the sound, non-zero when resuming a late alarm
    pub start_at: Duration,
}

pub trait AudioOutput: Send + Sync {
    /// starts playback and returns without waiting for it, `on_end` is called
    /// when the sound finishes or is stopped
    ///
    /// # Errors
    /// [`Error::ResourceUnavailable`] if the asset can't be opened or the
    /// device is busy.
    fn play(&self, id: AlarmId, request: PlaybackRequest, on_end: PlaybackTarget)
        -> Result<(), Error>;

    /// # Errors
    /// whatever the backend reports while stopping
    fn stop(&self, id: AlarmId) -> Result<(), Error>;

    fn position(&self, id: AlarmId) -> Option<Duration>;

    /// # Errors
    /// if the audio session rejects the policy
    fn set_mix_policy(&self, policy: MixPolicy) -> Result<(), Error>;
}

pub trait Vibrator: Send + Sync {
    /// repeats `pattern` (alternating wait/vibrate durations) until stopped
    ///
    /// # Errors
    /// if there is no vibration hardware or it refuses
    fn start(&self, pattern: &[Duration]) -> Result<(), Error>;

    /// # Errors
    /// if the hardware reports a failure while stopping
    fn stop(&self) -> Result<(), Error>;
}

pub trait SystemVolume: Send + Sync {
    /// # Errors
    /// if the volume can't be read
    fn get(&self) -> Result<f32, Error>;

    /// # Errors
    /// if the volume can't be changed
    fn set(&self, volume: f32) -> Result<(), Error>;
}

/// proof that a wake lock is held, giving it back consumes it
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct WakeLockToken(pub u64);

pub trait WakeLock: Send + Sync {
    /// the lock expires on its own after `timeout`
    ///
    /// # Errors
    /// [`Error::ResourceUnavailable`] if the OS refuses
    fn acquire(&self, timeout: Duration) -> Result<WakeLockToken, Error>;

    /// releasing an expired lock is a no-op
    fn release(&self, token: WakeLockToken);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationTag {
    Alarm(AlarmId),
    KillWarning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub tag: NotificationTag,
    pub title: String,
    pub body: String,
    pub buttons: Vec<(ActionKind, String)>,
    pub full_screen: bool,
}

pub trait Notifier: Send + Sync {
    /// # Errors
    /// [`Error::ResourceUnavailable`] if notifications aren't permitted
    fn post(&self, notification: &Notification) -> Result<(), Error>;

    fn dismiss(&self, tag: NotificationTag);
}

/// durable string key/value storage
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// [`Error::Storage`] if the backing store can't be read
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// # Errors
    /// [`Error::Storage`] if the write isn't durable
    fn put(&self, key: &str, value: String) -> Result<(), Error>;

    /// # Errors
    /// [`Error::Storage`] if the removal isn't durable
    fn remove(&self, key: &str) -> Result<(), Error>;

    /// # Errors
    /// [`Error::Storage`] if the backing store can't be read
    fn keys(&self) -> Result<Vec<String>, Error>;
}

/// everything the coordinator consumes from the host OS
#[derive(Clone)]
pub struct Platform {
    pub timer: Arc<dyn WakeTimer>,
    pub audio: Arc<dyn AudioOutput>,
    pub vibrator: Arc<dyn Vibrator>,
    pub volume: Arc<dyn SystemVolume>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn KeyValueStore>,
}
