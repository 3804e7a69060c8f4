//! Capabilities for a plain desktop process.
//!
//! Sound goes through rodio, timers are threads, and history lives in a TOML
//! file. Desktops have no vibrator and no wake locks, so those are only logged.
//! There is no shared system volume we can reach without a mixer daemon either,
//! so the volume knob drives the gain of our own sinks instead. Timers die with
//! the process, which is what the kill warning is for.

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use chrono::{DateTime, Utc};
use crossbeam_channel::{after, bounded, select, tick, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rodio::{mixer::Mixer, Decoder, OutputStreamBuilder, Sink, Source};

use super::{
    AudioOutput, KeyValueStore, MixPolicy, Notification, NotificationTag, Notifier, Platform,
    PlaybackRequest, SystemVolume, Vibrator, WakeLock, WakeLockToken, WakeTimer,
};
use crate::{
    alarm::AlarmId,
    communication::{PlaybackTarget, RefreshTarget, TimerTarget},
    config::Config,
    error::Error,
};

/// the desktop capabilities wired up for `config`
///
/// # Errors
/// if there is no audio device or no place to keep the history
pub fn platform(config: &Config) -> Result<Platform, Error> {
    let audio = RodioAudio::open()?;
    Ok(Platform {
        timer: Arc::new(ThreadTimer::default()),
        volume: Arc::new(audio.volume()),
        audio: Arc::new(audio),
        vibrator: Arc::new(LogVibrator),
        wake_lock: Arc::new(ProcessWakeLock::default()),
        notifier: Arc::new(LogNotifier),
        store: Arc::new(TomlFileStore::new(config.history_path()?)),
    })
}

/// one sleeper thread per pending alarm
#[derive(Default)]
pub struct ThreadTimer {
    pending: Mutex<HashMap<AlarmId, Sender<()>>>,
    refresh: Mutex<Option<Sender<()>>>,
}

impl WakeTimer for ThreadTimer {
    fn schedule(&self, fire_at: DateTime<Utc>, target: TimerTarget) -> Result<(), Error> {
        let id = target.id;
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let (cancel, cancelled) = bounded::<()>(0);
        thread::Builder::new()
            .name(format!("timer-{id}"))
            .spawn(move || {
                select! {
                    recv(cancelled) -> _ => {},
                    recv(after(delay)) -> _ => {
                        target.fire();
                    },
                }
            })
            .map_err(|e| Error::ResourceUnavailable(format!("timer thread: {e}")))?;
        // replacing the sender wakes the previous sleeper
        self.pending.lock().insert(id, cancel);
        debug!("timer for alarm {id} fires in {delay:?}");
        Ok(())
    }

    fn cancel(&self, id: AlarmId) {
        self.pending.lock().remove(&id);
    }

    fn schedule_refresh(&self, every: Duration, target: RefreshTarget) -> Result<(), Error> {
        let (cancel, cancelled) = bounded::<()>(0);
        thread::Builder::new()
            .name("background-refresh".into())
            .spawn(move || {
                let ticker = tick(every);
                loop {
                    select! {
                        recv(cancelled) -> _ => break,
                        recv(ticker) -> _ => {
                            if !target.refresh() {
                                break;
                            }
                        },
                    }
                }
            })
            .map_err(|e| Error::ResourceUnavailable(format!("refresh thread: {e}")))?;
        *self.refresh.lock() = Some(cancel);
        Ok(())
    }

    fn cancel_refresh(&self) {
        self.refresh.lock().take();
    }
}

type Sinks = Arc<Mutex<HashMap<AlarmId, Arc<Sink>>>>;

/// plays through the default output device
pub struct RodioAudio {
    mixer: Mixer,
    sinks: Sinks,
    volume: SoftwareVolume,
    policy: Mutex<MixPolicy>,
    /// the media thread keeps the output stream open until this is dropped
    _stream: Sender<()>,
}

impl RodioAudio {
    /// opens the default output device on its own thread, the stream can't
    /// leave the thread that opened it
    ///
    /// # Errors
    /// [`Error::ResourceUnavailable`] if there is no usable output device
    pub fn open() -> Result<Self, Error> {
        let (stream, keep_open) = bounded::<()>(0);
        let (mixer_tx, mixer_rx) = bounded(1);
        thread::Builder::new()
            .name("media".into())
            .spawn(move || {
                let output = match OutputStreamBuilder::open_default_stream() {
                    Ok(output) => output,
                    Err(e) => {
                        let _ = mixer_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = mixer_tx.send(Ok(output.mixer().clone()));
                // blocks until the sender goes away
                let _ = keep_open.recv();
                debug!("closing output stream");
            })
            .map_err(|e| Error::ResourceUnavailable(format!("media thread: {e}")))?;
        let mixer = mixer_rx
            .recv()
            .map_err(|_| Error::ResourceUnavailable("media thread died".into()))?
            .map_err(|e| Error::ResourceUnavailable(format!("no audio output: {e}")))?;
        let sinks = Sinks::default();
        Ok(Self {
            mixer,
            volume: SoftwareVolume::new(sinks.clone()),
            sinks,
            policy: Mutex::new(MixPolicy::default()),
            _stream: stream,
        })
    }

    /// the volume knob for everything this output plays
    #[must_use]
    pub fn volume(&self) -> SoftwareVolume {
        self.volume.clone()
    }

    fn source(request: &PlaybackRequest) -> Result<Box<dyn Source + Send>, Error> {
        let file = File::open(&request.asset).map_err(|e| {
            Error::ResourceUnavailable(format!("{}: {e}", request.asset.display()))
        })?;
        let decoder = Decoder::new(BufReader::new(file)).map_err(|e| {
            Error::ResourceUnavailable(format!("{}: {e}", request.asset.display()))
        })?;
        let mut source: Box<dyn Source + Send> = if request.looping {
            Box::new(decoder.repeat_infinite())
        } else {
            Box::new(decoder)
        };
        if !request.start_at.is_zero() {
            source = Box::new(source.skip_duration(request.start_at));
        }
        if !request.fade_in.is_zero() {
            source = Box::new(source.fade_in(request.fade_in));
        }
        Ok(source)
    }
}

impl AudioOutput for RodioAudio {
    fn play(
        &self,
        id: AlarmId,
        request: PlaybackRequest,
        on_end: PlaybackTarget,
    ) -> Result<(), Error> {
        let source = Self::source(&request)?;
        let sink = Arc::new(Sink::connect_new(&self.mixer));
        let previous = {
            let mut sinks = self.sinks.lock();
            self.volume.apply(&sink);
            sink.append(source);
            sink.play();
            sinks.insert(id, sink.clone())
        };
        if let Some(previous) = previous {
            previous.stop();
        }
        info!("playing {} for alarm {id}", request.asset.display());

        let sinks = self.sinks.clone();
        thread::Builder::new()
            .name(format!("playback-{id}"))
            .spawn(move || {
                sink.sleep_until_end();
                let mut sinks = sinks.lock();
                if sinks.get(&id).is_some_and(|current| Arc::ptr_eq(current, &sink)) {
                    sinks.remove(&id);
                }
                drop(sinks);
                on_end.ended();
            })
            .map_err(|e| Error::ResourceUnavailable(format!("playback thread: {e}")))?;
        Ok(())
    }

    fn stop(&self, id: AlarmId) -> Result<(), Error> {
        if let Some(sink) = self.sinks.lock().remove(&id) {
            sink.stop();
            debug!("stopped playback for alarm {id}");
        }
        Ok(())
    }

    fn position(&self, id: AlarmId) -> Option<Duration> {
        self.sinks.lock().get(&id).map(|sink| sink.get_pos())
    }

    fn set_mix_policy(&self, policy: MixPolicy) -> Result<(), Error> {
        // nothing to duck on a desktop mixer, remember it for the logs
        let mut current = self.policy.lock();
        if *current != policy {
            debug!("mix policy {current:?} -> {policy:?}");
            *current = policy;
        }
        Ok(())
    }
}

pub struct LogVibrator;

impl Vibrator for LogVibrator {
    fn start(&self, pattern: &[Duration]) -> Result<(), Error> {
        debug!("vibrating with pattern {pattern:?}");
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        debug!("vibration stopped");
        Ok(())
    }
}

/// the gain of every sink the output is playing. new sinks start at the
/// current level
#[derive(Clone)]
pub struct SoftwareVolume {
    level: Arc<Mutex<f32>>,
    sinks: Sinks,
}

impl SoftwareVolume {
    fn new(sinks: Sinks) -> Self {
        Self {
            level: Arc::new(Mutex::new(1.0)),
            sinks,
        }
    }

    fn apply(&self, sink: &Sink) {
        sink.set_volume(*self.level.lock());
    }
}

impl SystemVolume for SoftwareVolume {
    fn get(&self) -> Result<f32, Error> {
        Ok(*self.level.lock())
    }

    fn set(&self, volume: f32) -> Result<(), Error> {
        // sinks before level, same as `RodioAudio::play`
        let sinks = self.sinks.lock();
        *self.level.lock() = volume;
        for sink in sinks.values() {
            sink.set_volume(volume);
        }
        debug!("volume set to {volume} on {} sinks", sinks.len());
        Ok(())
    }
}

#[derive(Default)]
pub struct ProcessWakeLock {
    next: AtomicU64,
}

impl WakeLock for ProcessWakeLock {
    fn acquire(&self, timeout: Duration) -> Result<WakeLockToken, Error> {
        let token = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("wake lock {token} held for at most {timeout:?}");
        Ok(WakeLockToken(token))
    }

    fn release(&self, token: WakeLockToken) {
        debug!("wake lock {} released", token.0);
    }
}

/// shows notifications in the log, which is all a terminal host has
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn post(&self, notification: &Notification) -> Result<(), Error> {
        match notification.tag {
            NotificationTag::Alarm(id) => info!(
                "alarm {id}: {} - {} {:?}",
                notification.title, notification.body, notification.buttons
            ),
            NotificationTag::KillWarning => {
                warn!("{} - {}", notification.title, notification.body);
            }
        }
        Ok(())
    }

    fn dismiss(&self, tag: NotificationTag) {
        debug!("dismissed {tag:?}");
    }
}

/// string pairs in a single TOML table, rewritten whole on every change
pub struct TomlFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TomlFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>, Error> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))?;
        toml::from_str(&contents).map_err(|e| {
            error!("{} is corrupt: {e}", self.path.display());
            Error::Storage(format!("{}: {e}", self.path.display()))
        })
    }

    /// writes next to the file and renames over it, so a crash leaves either
    /// the old or the new table
    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        let storage = |e: std::io::Error| Error::Storage(format!("{}: {e}", self.path.display()));
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(storage)?;
        }
        let contents = toml::to_string(entries)?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents).map_err(storage)?;
        std::fs::rename(&tmp, &self.path).map_err(storage)
    }
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock();
        Ok(self.read()?.remove(key))
    }

    fn put(&self, key: &str, value: String) -> Result<(), Error> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        entries.insert(key.to_string(), value);
        self.write(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        let _guard = self.lock.lock();
        Ok(self.read()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::communication::Trigger;

    #[test]
    fn store_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.toml");
        let store = TomlFileStore::new(&path);
        store.put("action_1", "action = \"stop\"".into()).unwrap();
        store.put("action_2", "action = \"ignore\"".into()).unwrap();
        store.remove("action_1").unwrap();

        let reopened = TomlFileStore::new(&path);

        assert_eq!(reopened.keys().unwrap(), vec!["action_2".to_string()]);
        assert_eq!(
            reopened.get("action_2").unwrap().as_deref(),
            Some("action = \"ignore\"")
        );
        assert!(reopened.get("action_1").unwrap().is_none());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join("history.toml"));
        assert!(store.keys().unwrap().is_empty());
        store.remove("action_3").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.toml");
        std::fs::write(&path, "this is [not toml").unwrap();

        let err = TomlFileStore::new(&path).keys().unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn volume_follows_into_live_sinks() {
        let sinks = Sinks::default();
        let (sink, _output) = Sink::new();
        let sink = Arc::new(sink);
        sinks.lock().insert(1, sink.clone());
        let volume = SoftwareVolume::new(sinks);
        assert!((volume.get().unwrap() - 1.0).abs() < f32::EPSILON);

        volume.set(0.8).unwrap();
        assert!((sink.volume() - 0.8).abs() < f32::EPSILON);

        volume.set(0.3).unwrap();
        assert!((sink.volume() - 0.3).abs() < f32::EPSILON);
        assert!((volume.get().unwrap() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn new_sink_starts_at_current_level() {
        let volume = SoftwareVolume::new(Sinks::default());
        volume.set(0.6).unwrap();
        let (sink, _output) = Sink::new();

        volume.apply(&sink);

        assert!((sink.volume() - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn thread_timer_fires_once_and_cancels() {
        let timer = ThreadTimer::default();
        let (tx, rx) = unbounded();
        timer
            .schedule(Utc::now(), TimerTarget::new(1, 7, tx.clone()))
            .unwrap();
        timer
            .schedule(
                Utc::now() + chrono::Duration::milliseconds(50),
                TimerTarget::new(2, 8, tx),
            )
            .unwrap();
        timer.cancel(2);

        let fired = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            fired,
            Trigger::TimerFired {
                id: 1,
                generation: 7
            }
        ));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
