#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! Arms one-shot alarms, rings them, and cleans up after them.
//!
//! [`Coordinator`] is the handle applications hold. Everything it does is
//! forwarded to a single controller thread, so timer fires, button presses and
//! teardown never race each other inside the state machine.

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{error, warn};

pub mod alarm;
pub mod communication;
pub mod config;
pub mod controller;
pub mod emitter;
pub mod error;
pub mod history;
pub mod platform;
pub mod registry;
pub mod resources;
pub mod scheduler;
pub mod watchdog;

pub use alarm::{
    ActionKind, ActionRecord, AlarmId, AlarmSpec, ButtonSet, KillWarning, NotificationContent,
};
pub use communication::{ActionSource, Event};
pub use config::Config;
pub use controller::RingController;
pub use error::Error;
pub use platform::Platform;

use communication::{Reply, Trigger};

/// the application's handle on the ring controller thread. dropping it stops
/// the thread and releases anything still ringing
pub struct Coordinator {
    tx: Sender<Trigger>,
    teardown_budget: Duration,
    worker: Option<JoinHandle<()>>,
}

impl Coordinator {
    /// spawns the controller thread on top of `platform`
    ///
    /// # Errors
    /// if the thread can't be spawned
    pub fn start(config: &Config, platform: &Platform) -> Result<Self, Error> {
        let (tx, rx) = unbounded();
        let controller = RingController::new(config, platform, tx.clone());
        let worker = thread::Builder::new()
            .name("ring-controller".into())
            .spawn(move || controller.run(&rx))?;
        Ok(Self {
            tx,
            teardown_budget: config.teardown_budget(),
            worker: Some(worker),
        })
    }

    fn send(&self, trigger: Trigger) -> Result<(), Error> {
        self.tx.send(trigger).map_err(|_| Error::Disconnected)
    }

    fn request<T>(&self, trigger: impl FnOnce(Reply<T>) -> Trigger) -> Result<T, Error> {
        let (reply, answer) = bounded(1);
        self.send(trigger(reply))?;
        answer.recv().map_err(|_| Error::Disconnected)?
    }

    /// arms `spec`, replacing any alarm with the same id
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a malformed spec,
    /// [`Error::ResourceUnavailable`] if no timer could be registered
    pub fn arm(&self, spec: AlarmSpec) -> Result<(), Error> {
        self.request(|reply| Trigger::Arm { spec, reply })
    }

    /// drops the alarm without recording anything, true if it existed
    ///
    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn cancel(&self, id: AlarmId) -> Result<bool, Error> {
        self.request(|reply| Trigger::Cancel { id, reply })
    }

    fn act(&self, id: AlarmId, action: ActionKind) -> Result<bool, Error> {
        self.request(|reply| Trigger::Action {
            id,
            action,
            source: ActionSource::Application,
            reply: Some(reply),
        })
    }

    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn stop(&self, id: AlarmId) -> Result<bool, Error> {
        self.act(id, ActionKind::Stop)
    }

    /// same as [`Coordinator::stop`], reported as a snooze
    ///
    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn snooze(&self, id: AlarmId) -> Result<bool, Error> {
        self.act(id, ActionKind::Snooze)
    }

    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn confirm(&self, id: AlarmId) -> Result<bool, Error> {
        self.act(id, ActionKind::Confirm)
    }

    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn is_ringing(&self, id: AlarmId) -> Result<bool, Error> {
        self.request(|reply| Trigger::IsRinging { id, reply })
    }

    /// how far into its sound a ringing alarm is
    ///
    /// # Errors
    /// [`Error::NotFound`] unless `id` is ringing
    pub fn playback_position(&self, id: AlarmId) -> Result<Duration, Error> {
        self.request(|reply| Trigger::Position { id, reply })
    }

    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn set_warn_on_kill(
        &self,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), Error> {
        self.send(Trigger::SetWarnOnKill {
            title: title.into(),
            body: body.into(),
        })
    }

    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn disable_warn_on_kill(&self) -> Result<(), Error> {
        self.send(Trigger::DisableWarnOnKill)
    }

    /// becomes the listener, replacing any earlier one. actions recorded
    /// while nobody listened arrive first as [`Event::Replayed`]
    ///
    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn attach(&self) -> Result<Receiver<Event>, Error> {
        let (listener, events) = unbounded();
        self.send(Trigger::Attach { listener })?;
        Ok(events)
    }

    /// takes the recorded actions without going through a listener
    ///
    /// # Errors
    /// [`Error::Storage`] if the history can't be read or emptied
    pub fn drain_history(&self) -> Result<Vec<ActionRecord>, Error> {
        self.request(|reply| Trigger::DrainHistory { reply })
    }

    /// a notification button was pressed. the alarm may be long gone, in
    /// which case the action is still reported
    ///
    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn notification_action(&self, id: AlarmId, action: ActionKind) -> Result<(), Error> {
        self.send(Trigger::Action {
            id,
            action,
            source: ActionSource::Notification,
            reply: None,
        })
    }

    /// what the OS background-refresh callback should call
    ///
    /// # Errors
    /// [`Error::Disconnected`] once the controller has stopped
    pub fn background_refresh(&self) -> Result<(), Error> {
        self.send(Trigger::BackgroundRefresh)
    }

    /// the process is about to die. returns whether a kill warning was
    /// posted, giving up after the configured budget
    #[must_use]
    pub fn teardown(&self) -> bool {
        let (reply, answer) = bounded(1);
        if self.send(Trigger::Teardown { reply }).is_err() {
            warn!("teardown after the controller stopped");
            return false;
        }
        match answer.recv_timeout(self.teardown_budget) {
            Ok(Ok(posted)) => posted,
            Ok(Err(e)) => {
                error!("teardown failed: {e}");
                false
            }
            Err(e) => {
                warn!("teardown didn't finish within {:?}: {e}", self.teardown_budget);
                false
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let _ = self.tx.send(Trigger::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("ring controller panicked");
            }
        }
    }
}
