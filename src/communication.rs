//! Messages flowing into and out of the ring controller.
//!
//! Every way the outside world can poke an alarm (application call, OS timer,
//! notification button, background refresh, teardown) arrives as a [`Trigger`]
//! on one queue, so the controller handles them one at a time.

use std::time::Duration;

use crossbeam_channel::Sender;

use crate::{
    alarm::{ActionKind, ActionRecord, AlarmId, AlarmSpec},
    error::Error,
};

pub type Reply<T> = Sender<Result<T, Error>>;

/// where a stop/snooze/confirm came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSource {
    /// the application asked
    Application,
    /// a button on the ringing notification, possibly after a relaunch
    Notification,
}

#[derive(Debug)]
pub enum Trigger {
    Arm {
        spec: AlarmSpec,
        reply: Reply<()>,
    },
    Cancel {
        id: AlarmId,
        reply: Reply<bool>,
    },
    Action {
        id: AlarmId,
        action: ActionKind,
        source: ActionSource,
        reply: Option<Reply<bool>>,
    },
    IsRinging {
        id: AlarmId,
        reply: Reply<bool>,
    },
    Position {
        id: AlarmId,
        reply: Reply<Duration>,
    },
    SetWarnOnKill {
        title: String,
        body: String,
    },
    DisableWarnOnKill,
    Attach {
        listener: Sender<Event>,
    },
    DrainHistory {
        reply: Reply<Vec<ActionRecord>>,
    },
    /// an OS timer or deferred trigger went off
    TimerFired {
        id: AlarmId,
        generation: u64,
    },
    /// non-looping audio reached its end on the media thread
    PlaybackEnded {
        id: AlarmId,
        episode: u64,
    },
    BackgroundRefresh,
    Teardown {
        reply: Reply<bool>,
    },
    Shutdown,
}

/// what the application hears about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RingStarted { id: AlarmId },
    Stopped { id: AlarmId, action: ActionKind },
    /// an action recorded while no listener was attached
    Replayed(ActionRecord),
    /// the alarm fired but couldn't ring
    RingFailed { id: AlarmId, reason: &'static str },
}

/// handed to a timer so it can report back which registration fired
#[derive(Debug, Clone)]
pub struct TimerTarget {
    pub id: AlarmId,
    pub generation: u64,
    sender: Sender<Trigger>,
}

impl TimerTarget {
    #[must_use]
    pub const fn new(id: AlarmId, generation: u64, sender: Sender<Trigger>) -> Self {
        Self {
            id,
            generation,
            sender,
        }
    }

    /// returns false once the controller is gone
    pub fn fire(&self) -> bool {
        self.sender
            .send(Trigger::TimerFired {
                id: self.id,
                generation: self.generation,
            })
            .is_ok()
    }
}

/// handed to the audio output so natural end of playback gets back to the
/// controller
#[derive(Debug, Clone)]
pub struct PlaybackTarget {
    pub id: AlarmId,
    pub episode: u64,
    sender: Sender<Trigger>,
}

impl PlaybackTarget {
    #[must_use]
    pub const fn new(id: AlarmId, episode: u64, sender: Sender<Trigger>) -> Self {
        Self {
            id,
            episode,
            sender,
        }
    }

    pub fn ended(&self) -> bool {
        self.sender
            .send(Trigger::PlaybackEnded {
                id: self.id,
                episode: self.episode,
            })
            .is_ok()
    }
}

/// sends background refresh ticks to the controller
#[derive(Debug, Clone)]
pub struct RefreshTarget {
    sender: Sender<Trigger>,
}

impl RefreshTarget {
    #[must_use]
    pub const fn new(sender: Sender<Trigger>) -> Self {
        Self { sender }
    }

    pub fn refresh(&self) -> bool {
        self.sender.send(Trigger::BackgroundRefresh).is_ok()
    }
}
