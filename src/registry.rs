use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    alarm::{AlarmId, AlarmSpec, Phase},
    error::Error,
    resources::Episode,
    scheduler::Armed,
};

/// everything we know about one alarm between `arm` and removal
#[derive(Debug)]
pub struct AlarmState {
    pub spec: AlarmSpec,
    pub phase: Phase,
    /// bumped on every arm so stale timer fires can be told apart
    pub generation: u64,
    pub trigger_at: DateTime<Utc>,
    /// present exactly while ringing
    pub episode: Option<Episode>,
}

impl AlarmState {
    #[must_use]
    pub fn new(spec: AlarmSpec, generation: u64) -> Self {
        Self {
            trigger_at: spec.fire_at,
            spec,
            phase: Phase::Armed,
            generation,
            episode: None,
        }
    }
}

/// the alarms we own plus the single ringing slot
#[derive(Debug, Default)]
pub struct Registry {
    alarms: HashMap<AlarmId, AlarmState>,
    ringing: Option<AlarmId>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// replaces any state under the same id, returning it
    pub fn insert(&mut self, state: AlarmState) -> Option<AlarmState> {
        let id = state.spec.id;
        self.alarms.insert(id, state)
    }

    #[must_use]
    pub fn get(&self, id: AlarmId) -> Option<&AlarmState> {
        self.alarms.get(&id)
    }

    pub fn get_mut(&mut self, id: AlarmId) -> Option<&mut AlarmState> {
        self.alarms.get_mut(&id)
    }

    /// takes the state out. the ringing slot is freed if it held `id`
    pub fn remove(&mut self, id: AlarmId) -> Option<AlarmState> {
        if self.ringing == Some(id) {
            self.ringing = None;
        }
        self.alarms.remove(&id)
    }

    /// claims the ringing slot for `id`
    ///
    /// # Errors
    /// [`Error::AlreadyRinging`] naming the current holder when the slot is
    /// taken by another alarm
    pub fn claim_ringing(&mut self, id: AlarmId) -> Result<(), Error> {
        match self.ringing {
            Some(holder) if holder != id => Err(Error::AlreadyRinging(holder)),
            _ => {
                self.ringing = Some(id);
                Ok(())
            }
        }
    }

    pub fn release_ringing(&mut self, id: AlarmId) {
        if self.ringing == Some(id) {
            self.ringing = None;
        }
    }

    #[must_use]
    pub const fn ringing(&self) -> Option<AlarmId> {
        self.ringing
    }

    #[must_use]
    pub fn ringing_count(&self) -> usize {
        self.alarms
            .values()
            .filter(|state| state.phase == Phase::Ringing)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    /// alarms still waiting for their trigger
    pub fn armed(&self) -> impl Iterator<Item = Armed> + '_ {
        self.alarms
            .values()
            .filter(|state| state.phase == Phase::Armed)
            .map(|state| Armed {
                id: state.spec.id,
                generation: state.generation,
                fire_at: state.trigger_at,
            })
    }

    pub fn states(&self) -> impl Iterator<Item = &AlarmState> + '_ {
        self.alarms.values()
    }
}
