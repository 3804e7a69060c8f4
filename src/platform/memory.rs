//! In-process implementations of every capability.
//!
//! Nothing here touches the OS: timers are only recorded until someone calls
//! [`MemoryTimer::fire`], audio only remembers what it was asked to play. The
//! state stays inspectable through the concrete handles, which is what the
//! tests and headless hosts rely on.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;

use super::{
    AudioOutput, KeyValueStore, MixPolicy, Notification, NotificationTag, Notifier, Platform,
    PlaybackRequest, SystemVolume, Vibrator, WakeLock, WakeLockToken, WakeTimer,
};
use crate::{
    alarm::AlarmId,
    communication::{PlaybackTarget, RefreshTarget, TimerTarget},
    error::Error,
};

/// one of each memory capability, cloneable so a test can keep a copy while
/// the coordinator owns the [`Platform`]
#[derive(Clone, Default)]
pub struct MemoryPlatform {
    pub timer: Arc<MemoryTimer>,
    pub audio: Arc<MemoryAudio>,
    pub vibrator: Arc<MemoryVibrator>,
    pub volume: Arc<MemoryVolume>,
    pub wake_lock: Arc<MemoryWakeLock>,
    pub notifier: Arc<MemoryNotifier>,
    pub store: Arc<MemoryStore>,
}

impl MemoryPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        Platform {
            timer: self.timer.clone(),
            audio: self.audio.clone(),
            vibrator: self.vibrator.clone(),
            volume: self.volume.clone(),
            wake_lock: self.wake_lock.clone(),
            notifier: self.notifier.clone(),
            store: self.store.clone(),
        }
    }
}

#[derive(Default)]
pub struct MemoryTimer {
    pending: Mutex<HashMap<AlarmId, (DateTime<Utc>, TimerTarget)>>,
    refresh: Mutex<Option<(Duration, RefreshTarget)>>,
}

impl MemoryTimer {
    /// fires the registration for `id` as the OS would, false if none is
    /// pending
    pub fn fire(&self, id: AlarmId) -> bool {
        let target = self.pending.lock().remove(&id);
        target.is_some_and(|(_, target)| target.fire())
    }

    #[must_use]
    pub fn pending(&self, id: AlarmId) -> Option<DateTime<Utc>> {
        self.pending.lock().get(&id).map(|(at, _)| *at)
    }

    /// drops a registration without firing it, like an OS evicting timers
    pub fn evict(&self, id: AlarmId) {
        self.pending.lock().remove(&id);
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh.lock().as_ref().map(|(every, _)| *every)
    }

    /// delivers a background refresh tick, false if none is registered
    pub fn refresh(&self) -> bool {
        self.refresh
            .lock()
            .as_ref()
            .is_some_and(|(_, target)| target.refresh())
    }
}

impl WakeTimer for MemoryTimer {
    fn schedule(&self, fire_at: DateTime<Utc>, target: TimerTarget) -> Result<(), Error> {
        self.pending.lock().insert(target.id, (fire_at, target));
        Ok(())
    }

    fn cancel(&self, id: AlarmId) {
        self.pending.lock().remove(&id);
    }

    fn schedule_refresh(&self, every: Duration, target: RefreshTarget) -> Result<(), Error> {
        *self.refresh.lock() = Some((every, target));
        Ok(())
    }

    fn cancel_refresh(&self) {
        *self.refresh.lock() = None;
    }
}

#[derive(Debug, Clone)]
pub struct Playback {
    pub request: PlaybackRequest,
    end: PlaybackTarget,
}

#[derive(Default)]
pub struct MemoryAudio {
    playing: Mutex<HashMap<AlarmId, Playback>>,
    policy: Mutex<MixPolicy>,
    busy: AtomicBool,
    plays: AtomicU64,
}

impl MemoryAudio {
    /// while set, `play` fails as if the device were taken
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_playing(&self, id: AlarmId) -> bool {
        self.playing.lock().contains_key(&id)
    }

    #[must_use]
    pub fn playing(&self, id: AlarmId) -> Option<PlaybackRequest> {
        self.playing.lock().get(&id).map(|p| p.request.clone())
    }

    #[must_use]
    pub fn mix_policy(&self) -> MixPolicy {
        *self.policy.lock()
    }

    /// how many times playback was started
    #[must_use]
    pub fn plays(&self) -> u64 {
        self.plays.load(Ordering::SeqCst)
    }

    /// lets the sound for `id` run out as a non-looping sound would
    pub fn finish(&self, id: AlarmId) -> bool {
        let playback = self.playing.lock().remove(&id);
        playback.is_some_and(|p| p.end.ended())
    }
}

impl AudioOutput for MemoryAudio {
    fn play(
        &self,
        id: AlarmId,
        request: PlaybackRequest,
        on_end: PlaybackTarget,
    ) -> Result<(), Error> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(Error::ResourceUnavailable("audio device busy".into()));
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.playing.lock().insert(
            id,
            Playback {
                request,
                end: on_end,
            },
        );
        Ok(())
    }

    fn stop(&self, id: AlarmId) -> Result<(), Error> {
        self.playing.lock().remove(&id);
        Ok(())
    }

    fn position(&self, id: AlarmId) -> Option<Duration> {
        self.playing.lock().get(&id).map(|p| p.request.start_at)
    }

    fn set_mix_policy(&self, policy: MixPolicy) -> Result<(), Error> {
        *self.policy.lock() = policy;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryVibrator {
    pattern: Mutex<Option<Vec<Duration>>>,
    fail_stop: AtomicBool,
}

impl MemoryVibrator {
    #[must_use]
    pub fn is_vibrating(&self) -> bool {
        self.pattern.lock().is_some()
    }

    /// makes `stop` report an error (after stopping)
    pub fn fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }
}

impl Vibrator for MemoryVibrator {
    fn start(&self, pattern: &[Duration]) -> Result<(), Error> {
        *self.pattern.lock() = Some(pattern.to_vec());
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        *self.pattern.lock() = None;
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Error::ResourceUnavailable("vibrator did not respond".into()));
        }
        Ok(())
    }
}

pub struct MemoryVolume {
    level: Mutex<f32>,
    writes: Mutex<Vec<f32>>,
}

impl Default for MemoryVolume {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl MemoryVolume {
    #[must_use]
    pub fn new(level: f32) -> Self {
        Self {
            level: Mutex::new(level),
            writes: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn level(&self) -> f32 {
        *self.level.lock()
    }

    /// changes the level without recording a write, like the user moving a
    /// slider
    pub fn set_level(&self, level: f32) {
        *self.level.lock() = level;
    }

    /// every value written through [`SystemVolume::set`], oldest first
    #[must_use]
    pub fn writes(&self) -> Vec<f32> {
        self.writes.lock().clone()
    }
}

impl SystemVolume for MemoryVolume {
    fn get(&self) -> Result<f32, Error> {
        Ok(self.level())
    }

    fn set(&self, volume: f32) -> Result<(), Error> {
        *self.level.lock() = volume;
        self.writes.lock().push(volume);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWakeLock {
    held: Mutex<HashSet<u64>>,
    next: AtomicU64,
}

impl MemoryWakeLock {
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.lock().len()
    }
}

impl WakeLock for MemoryWakeLock {
    fn acquire(&self, timeout: Duration) -> Result<WakeLockToken, Error> {
        let token = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("wake lock {token} acquired for {timeout:?}");
        self.held.lock().insert(token);
        Ok(WakeLockToken(token))
    }

    fn release(&self, token: WakeLockToken) {
        self.held.lock().remove(&token.0);
    }
}

pub struct MemoryNotifier {
    shown: Mutex<HashMap<NotificationTag, Notification>>,
    posted: Mutex<Vec<Notification>>,
    permitted: AtomicBool,
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self {
            shown: Mutex::new(HashMap::new()),
            posted: Mutex::new(Vec::new()),
            permitted: AtomicBool::new(true),
        }
    }
}

impl MemoryNotifier {
    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
    }

    /// notifications currently on screen
    #[must_use]
    pub fn is_shown(&self, tag: NotificationTag) -> bool {
        self.shown.lock().contains_key(&tag)
    }

    /// everything ever posted, oldest first
    #[must_use]
    pub fn posted(&self) -> Vec<Notification> {
        self.posted.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn post(&self, notification: &Notification) -> Result<(), Error> {
        if !self.permitted.load(Ordering::SeqCst) {
            return Err(Error::ResourceUnavailable(
                "notification permission not granted".into(),
            ));
        }
        self.shown
            .lock()
            .insert(notification.tag, notification.clone());
        self.posted.lock().push(notification.clone());
        Ok(())
    }

    fn dismiss(&self, tag: NotificationTag) {
        self.shown.lock().remove(&tag);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), Error> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}
