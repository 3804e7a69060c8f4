//! Keeps exactly one pending trigger per armed alarm.
//!
//! Alarms due within the immediate threshold get an in-process sleeper thread,
//! everything else goes to the platform's wake timer. Each registration carries
//! the arm generation, so a fire that races with a re-arm is recognisably stale.

use std::{collections::HashMap, sync::Arc, thread, time::Duration};

use chrono::{DateTime, Utc};
use crossbeam_channel::{after, bounded, select, Sender};
use log::{debug, info, warn};

use crate::{
    alarm::AlarmId,
    communication::{RefreshTarget, TimerTarget, Trigger},
    config::Config,
    error::Error,
    platform::WakeTimer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// sleeper thread in this process
    Deferred,
    /// the platform's wake timer
    Os,
}

#[derive(Debug)]
enum Pending {
    /// dropping the sender wakes the sleeper without firing
    Deferred(Sender<()>),
    Os,
}

/// an armed alarm as the scheduler needs to see it during reconcile
#[derive(Debug, Clone, Copy)]
pub struct Armed {
    pub id: AlarmId,
    pub generation: u64,
    pub fire_at: DateTime<Utc>,
}

pub struct Scheduler {
    timer: Arc<dyn WakeTimer>,
    sender: Sender<Trigger>,
    pending: HashMap<AlarmId, Pending>,
    immediate_threshold: Duration,
    refresh_interval: Duration,
    refreshing: bool,
}

/// how long until `fire_at`, zero if it has passed
fn until(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire_at - now).to_std().unwrap_or(Duration::ZERO)
}

impl Scheduler {
    #[must_use]
    pub fn new(timer: Arc<dyn WakeTimer>, sender: Sender<Trigger>, config: &Config) -> Self {
        Self {
            timer,
            sender,
            pending: HashMap::new(),
            immediate_threshold: config.immediate_threshold(),
            refresh_interval: config.refresh_interval(),
            refreshing: false,
        }
    }

    /// registers the one-shot trigger for `id`, replacing any earlier one
    ///
    /// # Errors
    /// [`Error::ResourceUnavailable`] if the platform timer refuses or the
    /// sleeper thread can't be started
    pub fn arm(
        &mut self,
        id: AlarmId,
        generation: u64,
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Registration, Error> {
        self.cancel(id);
        let target = TimerTarget::new(id, generation, self.sender.clone());
        let delay = until(fire_at, now);
        if delay <= self.immediate_threshold {
            let (cancel, cancelled) = bounded::<()>(0);
            thread::Builder::new()
                .name(format!("alarm-{id}"))
                .spawn(move || {
                    select! {
                        recv(cancelled) -> _ => {},
                        recv(after(delay)) -> _ => {
                            target.fire();
                        },
                    }
                })
                .map_err(|e| Error::ResourceUnavailable(format!("deferred trigger: {e}")))?;
            self.pending.insert(id, Pending::Deferred(cancel));
            debug!("alarm {id} deferred in-process for {delay:?}");
            Ok(Registration::Deferred)
        } else {
            self.timer.schedule(fire_at, target)?;
            self.pending.insert(id, Pending::Os);
            debug!("alarm {id} registered with the wake timer for {fire_at}");
            Ok(Registration::Os)
        }
    }

    /// drops whatever is pending for `id`, unknown ids are fine
    pub fn cancel(&mut self, id: AlarmId) {
        match self.pending.remove(&id) {
            Some(Pending::Os) => self.timer.cancel(id),
            Some(Pending::Deferred(cancel)) => drop(cancel),
            None => {}
        }
    }

    /// forgets the registration of a timer that has fired and lets the
    /// platform drop its side of it too
    pub fn fired(&mut self, id: AlarmId) {
        if let Some(Pending::Os) = self.pending.remove(&id) {
            self.timer.cancel(id);
        }
    }

    #[must_use]
    pub fn registration(&self, id: AlarmId) -> Option<Registration> {
        self.pending.get(&id).map(|pending| match pending {
            Pending::Deferred(_) => Registration::Deferred,
            Pending::Os => Registration::Os,
        })
    }

    /// re-asserts the wake timer of every armed alarm still in the future and
    /// returns the ones that are already overdue together with how late they
    /// are, the one that came due first leading (ties by id)
    pub fn reconcile(
        &mut self,
        armed: impl IntoIterator<Item = Armed>,
        now: DateTime<Utc>,
    ) -> Vec<(AlarmId, Duration)> {
        let mut overdue = Vec::new();
        for alarm in armed {
            if alarm.fire_at <= now {
                self.cancel(alarm.id);
                overdue.push((alarm.fire_at, alarm.id));
                continue;
            }
            if self.registration(alarm.id) == Some(Registration::Deferred) {
                continue;
            }
            let target = TimerTarget::new(alarm.id, alarm.generation, self.sender.clone());
            match self.timer.schedule(alarm.fire_at, target) {
                Ok(()) => {
                    self.pending.insert(alarm.id, Pending::Os);
                }
                Err(e) => warn!("alarm {}: re-asserting wake timer failed: {e}", alarm.id),
            }
        }
        overdue.sort_unstable();
        overdue
            .into_iter()
            .map(|(fire_at, id)| (id, until(now, fire_at)))
            .collect()
    }

    /// keeps the background refresh registered while anything is armed
    pub fn keep_refreshing(&mut self, wanted: bool) {
        if wanted == self.refreshing {
            return;
        }
        if wanted {
            match self
                .timer
                .schedule_refresh(self.refresh_interval, RefreshTarget::new(self.sender.clone()))
            {
                Ok(()) => {
                    self.refreshing = true;
                    info!("background refresh every {:?}", self.refresh_interval);
                }
                Err(e) => warn!("couldn't register background refresh: {e}"),
            }
        } else {
            self.timer.cancel_refresh();
            self.refreshing = false;
            info!("background refresh cancelled");
        }
    }
}
