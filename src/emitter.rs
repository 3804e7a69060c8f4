use crossbeam_channel::Sender;
use log::debug;

use crate::communication::Event;

/// the single channel back to the application. a new listener replaces the
/// old one, and a listener whose receiver is gone is dropped on first use
#[derive(Debug, Default)]
pub struct Emitter {
    listener: Option<Sender<Event>>,
}

impl Emitter {
    #[must_use]
    pub const fn new() -> Self {
        Self { listener: None }
    }

    pub fn attach(&mut self, listener: Sender<Event>) {
        if self.listener.replace(listener).is_some() {
            debug!("listener replaced");
        } else {
            debug!("listener attached");
        }
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// true if a listener took the event
    pub fn emit(&mut self, event: Event) -> bool {
        let Some(listener) = &self.listener else {
            debug!("no listener for {event:?}");
            return false;
        };
        if listener.send(event).is_ok() {
            true
        } else {
            debug!("listener went away");
            self.listener = None;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn without_listener_events_are_dropped() {
        let mut emitter = Emitter::new();
        assert!(!emitter.emit(Event::RingStarted { id: 1 }));
    }

    #[test]
    fn new_listener_replaces_old_one() {
        let mut emitter = Emitter::new();
        let (first, first_rx) = unbounded();
        let (second, second_rx) = unbounded();
        emitter.attach(first);
        emitter.attach(second);

        assert!(emitter.emit(Event::RingStarted { id: 4 }));

        assert!(first_rx.try_recv().is_err());
        assert_eq!(second_rx.try_recv().unwrap(), Event::RingStarted { id: 4 });
    }

    #[test]
    fn dropped_receiver_detaches() {
        let mut emitter = Emitter::new();
        let (tx, rx) = unbounded();
        emitter.attach(tx);
        drop(rx);

        assert!(!emitter.emit(Event::RingStarted { id: 1 }));
        assert!(!emitter.is_attached());
    }
}
