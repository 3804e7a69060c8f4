//! Durable log of actions taken while no listener was attached.
//!
//! One entry per alarm under `action_<id>`, holding the action and when it
//! happened as a small TOML document. Entries go away as soon as they have been
//! delivered.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    alarm::{ActionKind, ActionRecord, AlarmId},
    error::Error,
    platform::KeyValueStore,
};

const KEY_PREFIX: &str = "action_";

#[derive(Debug, Serialize, Deserialize)]
struct StoredAction {
    action: ActionKind,
    timestamp: DateTime<Utc>,
}

pub struct History {
    store: Arc<dyn KeyValueStore>,
}

fn key(id: AlarmId) -> String {
    format!("{KEY_PREFIX}{id}")
}

impl History {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// records `record`, replacing whatever was pending for the same alarm
    ///
    /// # Errors
    /// if the record can't be serialized or the store write fails
    pub fn append(&self, record: &ActionRecord) -> Result<(), Error> {
        let stored = StoredAction {
            action: record.action,
            timestamp: record.timestamp,
        };
        self.store
            .put(&key(record.alarm_id), toml::to_string(&stored)?)?;
        debug!(
            "recorded {} for alarm {} while detached",
            record.action, record.alarm_id
        );
        Ok(())
    }

    /// pending records, oldest first. keys that don't parse are skipped
    ///
    /// # Errors
    /// if the store can't be read
    pub fn pending(&self) -> Result<Vec<ActionRecord>, Error> {
        Ok(self.scan()?.0)
    }

    /// readable records sorted oldest first, plus the keys of our entries
    /// whose contents can't be read
    fn scan(&self) -> Result<(Vec<ActionRecord>, Vec<String>), Error> {
        let mut records = Vec::new();
        let mut unreadable = Vec::new();
        for key in self.store.keys()? {
            let Some(id) = key
                .strip_prefix(KEY_PREFIX)
                .and_then(|id| id.parse::<AlarmId>().ok())
            else {
                continue;
            };
            let Some(raw) = self.store.get(&key)? else {
                continue;
            };
            match toml::from_str::<StoredAction>(&raw) {
                Ok(stored) => records.push(ActionRecord::new(id, stored.action, stored.timestamp)),
                Err(e) => {
                    warn!("skipping unreadable history entry {key}: {e}");
                    unreadable.push(key);
                }
            }
        }
        records.sort_by_key(|record| (record.timestamp, record.alarm_id));
        Ok((records, unreadable))
    }

    /// hands every pending record to `deliver` and deletes the ones it
    /// accepted. stops at the first refusal so nothing is lost. entries that
    /// can't be read are deleted up front, they would never be delivered
    ///
    /// # Errors
    /// if the store can't be read or a delivered entry can't be removed
    pub fn drain(
        &self,
        mut deliver: impl FnMut(&ActionRecord) -> bool,
    ) -> Result<Vec<ActionRecord>, Error> {
        let (records, unreadable) = self.scan()?;
        for key in unreadable {
            info!("discarding unreadable history entry {key}");
            self.store.remove(&key)?;
        }
        let mut drained = Vec::new();
        for record in records {
            if !deliver(&record) {
                debug!("history delivery refused at alarm {}", record.alarm_id);
                break;
            }
            self.store.remove(&key(record.alarm_id))?;
            drained.push(record);
        }
        Ok(drained)
    }
}
