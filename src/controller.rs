//! The state machine behind every alarm.
//!
//! The controller owns the registry and is the only thing that touches the
//! resource coordinator and the history log. It is driven one [`Trigger`] at a
//! time, either directly (tests, embedders with their own loop) or through
//! [`RingController::run`] on the coordinator thread.
//!
//! ```text
//! Armed --fire--> Ringing --stop/confirm/snooze/end--> Stopping --> Removed
//!   |                 ^
//!   |  slot taken     | (only one alarm at a time)
//!   +--cancel/ignore--+--> Removed
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use crate::{
    alarm::{ActionKind, ActionRecord, AlarmId, AlarmSpec, KillWarning, Phase},
    communication::{ActionSource, Event, PlaybackTarget, Trigger},
    config::Config,
    emitter::Emitter,
    error::Error,
    history::History,
    platform::Platform,
    registry::{AlarmState, Registry},
    resources::ResourceCoordinator,
    scheduler::Scheduler,
    watchdog::Watchdog,
};

pub struct RingController {
    registry: Registry,
    scheduler: Scheduler,
    resources: ResourceCoordinator,
    history: History,
    emitter: Emitter,
    watchdog: Watchdog,
    sender: Sender<Trigger>,
    next_generation: u64,
    next_episode: u64,
}

impl RingController {
    /// `sender` must feed the queue this controller is driven from, timers
    /// and playback report back through it
    #[must_use]
    pub fn new(config: &Config, platform: &Platform, sender: Sender<Trigger>) -> Self {
        Self {
            registry: Registry::new(),
            scheduler: Scheduler::new(platform.timer.clone(), sender.clone(), config),
            resources: ResourceCoordinator::new(platform, config),
            history: History::new(platform.store.clone()),
            emitter: Emitter::new(),
            watchdog: Watchdog::new(platform.notifier.clone(), config.kill_warning.clone()),
            sender,
            next_generation: 0,
            next_episode: 0,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn phase(&self, id: AlarmId) -> Phase {
        self.registry
            .get(id)
            .map_or(Phase::Removed, |state| state.phase)
    }

    /// drains `triggers` until a [`Trigger::Shutdown`] arrives or every sender
    /// is gone, then releases whatever is still ringing
    pub fn run(mut self, triggers: &Receiver<Trigger>) {
        info!("ring controller running");
        for trigger in triggers {
            if matches!(trigger, Trigger::Shutdown) {
                break;
            }
            self.handle(trigger, Utc::now());
        }
        self.shutdown();
        info!("ring controller stopped");
    }

    /// applies one trigger, answering on its reply channel if it has one
    pub fn handle(&mut self, trigger: Trigger, now: DateTime<Utc>) {
        match trigger {
            Trigger::Arm { spec, reply } => {
                let _ = reply.send(self.arm(spec, now));
            }
            Trigger::Cancel { id, reply } => {
                let _ = reply.send(Ok(self.cancel(id)));
            }
            Trigger::Action {
                id,
                action,
                source,
                reply,
            } => {
                let result = self.act(id, action, source, now);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                } else if let Err(e) = result {
                    warn!("alarm {id}: {action} from {source:?} failed: {e}");
                }
            }
            Trigger::IsRinging { id, reply } => {
                let _ = reply.send(Ok(self.is_ringing(id)));
            }
            Trigger::Position { id, reply } => {
                let _ = reply.send(self.playback_position(id));
            }
            Trigger::SetWarnOnKill { title, body } => self.set_warn_on_kill(title, body),
            Trigger::DisableWarnOnKill => self.disable_warn_on_kill(),
            Trigger::Attach { listener } => self.attach(listener),
            Trigger::DrainHistory { reply } => {
                let _ = reply.send(self.drain_history());
            }
            Trigger::TimerFired { id, generation } => self.timer_fired(id, generation, now),
            Trigger::PlaybackEnded { id, episode } => self.playback_ended(id, episode),
            Trigger::BackgroundRefresh => self.background_refresh(now),
            Trigger::Teardown { reply } => {
                let _ = reply.send(Ok(self.teardown()));
            }
            Trigger::Shutdown => self.shutdown(),
        }
    }

    /// registers `spec`, replacing an alarm with the same id
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a malformed spec, or whatever the
    /// scheduler reports when the timer can't be registered
    pub fn arm(&mut self, spec: AlarmSpec, now: DateTime<Utc>) -> Result<(), Error> {
        spec.validate()?;
        let id = spec.id;
        if let Some(previous) = self.registry.remove(id) {
            debug!("alarm {id} re-armed while {}", previous.phase);
            self.scheduler.cancel(id);
            self.finish(previous);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let registration = self.scheduler.arm(id, generation, spec.fire_at, now);
        let result = match registration {
            Ok(registration) => {
                info!("alarm {id} armed for {} ({registration:?})", spec.fire_at);
                self.registry.insert(AlarmState::new(spec, generation));
                Ok(())
            }
            Err(e) => {
                error!("alarm {id} couldn't be armed: {e}");
                Err(e)
            }
        };
        self.refresh_watchers();
        result
    }

    /// drops `id` whatever its phase, true if there was something to drop
    pub fn cancel(&mut self, id: AlarmId) -> bool {
        self.scheduler.cancel(id);
        let Some(state) = self.registry.remove(id) else {
            return false;
        };
        info!("alarm {id} cancelled while {}", state.phase);
        self.finish(state);
        self.refresh_watchers();
        true
    }

    /// stop, snooze or confirm `id`. unknown ids are a no-op, except that a
    /// notification button for an alarm we lost track of is still reported
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for [`ActionKind::Ignore`], which only the
    /// controller itself decides
    pub fn act(
        &mut self,
        id: AlarmId,
        action: ActionKind,
        source: ActionSource,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        if action == ActionKind::Ignore {
            return Err(Error::InvalidArgument(
                "ignore can't be requested, only observed".into(),
            ));
        }
        self.scheduler.cancel(id);
        let Some(mut state) = self.registry.remove(id) else {
            if source == ActionSource::Notification {
                debug!("alarm {id}: {action} for an alarm we don't know, passing it on");
                self.report(id, action, now);
            }
            return Ok(false);
        };
        info!("alarm {id}: {action} while {}", state.phase);
        state.phase = Phase::Stopping;
        self.finish(state);
        self.report(id, action, now);
        self.refresh_watchers();
        Ok(true)
    }

    #[must_use]
    pub fn is_ringing(&self, id: AlarmId) -> bool {
        self.phase(id) == Phase::Ringing
    }

    /// # Errors
    /// [`Error::NotFound`] unless `id` is ringing
    pub fn playback_position(&self, id: AlarmId) -> Result<Duration, Error> {
        if !self.is_ringing(id) {
            return Err(Error::NotFound(id));
        }
        self.resources.position(id).ok_or(Error::NotFound(id))
    }

    pub fn set_warn_on_kill(&mut self, title: String, body: String) {
        self.watchdog.set_text(KillWarning { title, body });
        self.watchdog.update(&self.registry);
    }

    pub fn disable_warn_on_kill(&mut self) {
        self.watchdog.disable();
    }

    /// attaches a new listener and replays everything recorded while nobody
    /// was listening
    pub fn attach(&mut self, listener: Sender<Event>) {
        self.emitter.attach(listener);
        let emitter = &mut self.emitter;
        match self
            .history
            .drain(|record| emitter.emit(Event::Replayed(record.clone())))
        {
            Ok(replayed) if !replayed.is_empty() => {
                info!("replayed {} recorded actions", replayed.len());
            }
            Ok(_) => {}
            Err(e) => error!("couldn't replay history: {e}"),
        }
    }

    /// hands the recorded actions to the caller instead of the listener
    ///
    /// # Errors
    /// if the store can't be read or emptied
    pub fn drain_history(&mut self) -> Result<Vec<ActionRecord>, Error> {
        self.history.drain(|_| true)
    }

    pub fn timer_fired(&mut self, id: AlarmId, generation: u64, now: DateTime<Utc>) {
        let current = self
            .registry
            .get(id)
            .filter(|state| state.phase == Phase::Armed && state.generation == generation);
        if current.is_none() {
            debug!("alarm {id}: stale fire (generation {generation}) ignored");
            return;
        }
        self.scheduler.fired(id);
        self.ring(id, Duration::ZERO, now);
    }

    /// Armed -> Ringing, or straight to Removed when another alarm already
    /// holds the slot
    fn ring(&mut self, id: AlarmId, start_at: Duration, now: DateTime<Utc>) {
        if let Err(e) = self.registry.claim_ringing(id) {
            warn!("alarm {id} ignored: {e}");
            if let Some(state) = self.registry.remove(id) {
                self.finish(state);
            }
            self.report(id, ActionKind::Ignore, now);
            self.refresh_watchers();
            return;
        }

        let Some(state) = self.registry.get(id) else {
            self.registry.release_ringing(id);
            return;
        };
        self.next_episode += 1;
        let number = self.next_episode;
        let on_end = PlaybackTarget::new(id, number, self.sender.clone());
        match self.resources.acquire(&state.spec, number, start_at, on_end) {
            Ok(episode) => {
                if let Some(state) = self.registry.get_mut(id) {
                    state.phase = Phase::Ringing;
                    state.episode = Some(episode);
                }
                info!("alarm {id} ringing");
                self.emitter.emit(Event::RingStarted { id });
            }
            Err(e) => {
                error!("alarm {id} couldn't ring: {e}");
                self.registry.remove(id);
                self.emitter.emit(Event::RingFailed {
                    id,
                    reason: e.as_label(),
                });
            }
        }
        self.refresh_watchers();
    }

    /// natural end of a non-looping sound
    pub fn playback_ended(&mut self, id: AlarmId, episode: u64) {
        let current = self.registry.get(id).filter(|state| {
            state.phase == Phase::Ringing
                && !state.spec.loop_audio
                && state.episode.as_ref().map(|e| e.number) == Some(episode)
        });
        if current.is_none() {
            debug!("alarm {id}: end of episode {episode} is stale");
            return;
        }
        if let Some(mut state) = self.registry.remove(id) {
            info!("alarm {id} finished playing");
            state.phase = Phase::Stopping;
            self.finish(state);
            // not a user action, so nothing to record
            self.emitter.emit(Event::Stopped {
                id,
                action: ActionKind::Stop,
            });
        }
        self.refresh_watchers();
    }

    /// re-asserts timers and rings anything that came due while we were
    /// suspended, picking the sound up where it would be by now
    pub fn background_refresh(&mut self, now: DateTime<Utc>) {
        let armed: Vec<_> = self.registry.armed().collect();
        debug!("background refresh over {} armed alarms", armed.len());
        for (id, late_by) in self.scheduler.reconcile(armed, now) {
            info!("alarm {id} is {late_by:?} late, ringing now");
            self.ring(id, late_by, now);
        }
    }

    /// the process is going away, leave a warning behind if anyone asked for
    /// one
    pub fn teardown(&mut self) -> bool {
        self.watchdog.on_teardown(&self.registry)
    }

    fn shutdown(&mut self) {
        if let Some(id) = self.registry.ringing() {
            if let Some(state) = self.registry.remove(id) {
                self.finish(state);
            }
        }
    }

    /// Stopping -> Removed: releases what `state` holds and frees the slot
    fn finish(&mut self, mut state: AlarmState) {
        let id = state.spec.id;
        if let Some(episode) = state.episode.take() {
            self.resources.release(episode);
        }
        self.registry.release_ringing(id);
        state.phase = Phase::Removed;
        debug!("alarm {id} removed");
    }

    /// tells the listener, or writes it down when nobody is listening
    fn report(&mut self, id: AlarmId, action: ActionKind, now: DateTime<Utc>) {
        if self.emitter.emit(Event::Stopped { id, action }) {
            return;
        }
        if let Err(e) = self.history.append(&ActionRecord::new(id, action, now)) {
            error!("alarm {id}: couldn't record {action}: {e}");
        }
    }

    fn refresh_watchers(&mut self) {
        self.watchdog.update(&self.registry);
        self.scheduler
            .keep_refreshing(self.registry.armed().next().is_some());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use crossbeam_channel::{unbounded, Receiver};

    use super::*;
    use crate::{
        alarm::NotificationContent,
        platform::{memory::MemoryPlatform, NotificationTag},
    };

    struct Harness {
        ctl: RingController,
        rx: Receiver<Trigger>,
        platform: MemoryPlatform,
        now: DateTime<Utc>,
    }

    impl Harness {
        fn new() -> Self {
            let platform = MemoryPlatform::new();
            let (tx, rx) = unbounded();
            let ctl = RingController::new(&Config::default(), &platform.platform(), tx);
            Self {
                ctl,
                rx,
                platform,
                now: Utc::now(),
            }
        }

        /// an alarm an hour out, so it goes through the wake timer
        fn spec(&self, id: AlarmId) -> AlarmSpec {
            AlarmSpec::new(
                id,
                self.now + ChronoDuration::hours(1),
                "beep.mp3",
                NotificationContent::new("Wake up", "It's time"),
            )
        }

        /// feeds whatever the platform sent back into the controller
        fn pump(&mut self) {
            while let Ok(trigger) = self.rx.try_recv() {
                self.ctl.handle(trigger, self.now);
            }
        }

        fn fire(&mut self, id: AlarmId) {
            assert!(self.platform.timer.fire(id));
            self.pump();
        }

        fn stop(&mut self, id: AlarmId) -> bool {
            self.ctl
                .act(id, ActionKind::Stop, ActionSource::Application, self.now)
                .unwrap()
        }

        fn listen(&mut self) -> Receiver<Event> {
            let (tx, rx) = unbounded();
            self.ctl.attach(tx);
            rx
        }

        fn recorded(&self) -> Vec<ActionRecord> {
            History::new(self.platform.store.clone()).pending().unwrap()
        }
    }

    #[test]
    fn fire_rings_and_stop_cleans_up() {
        let mut h = Harness::new();
        let events = h.listen();
        h.ctl.arm(h.spec(1), h.now).unwrap();
        assert_eq!(h.ctl.phase(1), Phase::Armed);

        h.fire(1);

        assert!(h.ctl.is_ringing(1));
        assert!(h.platform.audio.is_playing(1));
        assert!(h.platform.vibrator.is_vibrating());
        assert_eq!(h.platform.wake_lock.held(), 1);
        assert!(h.platform.notifier.is_shown(NotificationTag::Alarm(1)));
        assert_eq!(events.try_recv().unwrap(), Event::RingStarted { id: 1 });

        assert!(h.stop(1));

        assert_eq!(h.ctl.phase(1), Phase::Removed);
        assert!(!h.platform.audio.is_playing(1));
        assert!(!h.platform.vibrator.is_vibrating());
        assert_eq!(h.platform.wake_lock.held(), 0);
        assert!(!h.platform.notifier.is_shown(NotificationTag::Alarm(1)));
        assert_eq!(
            events.try_recv().unwrap(),
            Event::Stopped {
                id: 1,
                action: ActionKind::Stop
            }
        );
    }

    #[test]
    fn rearm_makes_the_old_fire_stale() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(1), h.now).unwrap();
        let mut later = h.spec(1);
        later.fire_at = h.now + ChronoDuration::hours(2);
        h.ctl.arm(later, h.now).unwrap();

        // the first registration's fire arriving late
        h.ctl.timer_fired(1, 1, h.now);
        assert_eq!(h.ctl.phase(1), Phase::Armed);
        assert_eq!(h.platform.audio.plays(), 0);

        assert_eq!(h.platform.timer.pending(1), Some(h.now + ChronoDuration::hours(2)));
        h.fire(1);

        assert!(h.ctl.is_ringing(1));
        assert_eq!(h.platform.audio.plays(), 1);
    }

    #[test]
    fn second_alarm_is_ignored_while_first_rings() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(1), h.now).unwrap();
        h.ctl.arm(h.spec(2), h.now).unwrap();

        h.fire(1);
        h.fire(2);

        assert!(h.ctl.is_ringing(1));
        assert_eq!(h.ctl.phase(2), Phase::Removed);
        assert_eq!(h.ctl.registry().ringing_count(), 1);
        assert!(!h.platform.audio.is_playing(2));
        assert_eq!(h.platform.audio.plays(), 1);

        let recorded = h.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].alarm_id, 2);
        assert_eq!(recorded[0].action, ActionKind::Ignore);
    }

    #[test]
    fn volume_is_restored_exactly_once() {
        let mut h = Harness::new();
        h.platform.volume.set_level(0.3);
        let mut spec = h.spec(1);
        spec.volume = Some(0.8);
        h.ctl.arm(spec, h.now).unwrap();

        h.fire(1);
        assert!((h.platform.volume.level() - 0.8).abs() < f32::EPSILON);

        assert!(h.stop(1));
        assert!(!h.stop(1));

        assert!((h.platform.volume.level() - 0.3).abs() < f32::EPSILON);
        assert_eq!(h.platform.volume.writes(), vec![0.8, 0.3]);
    }

    #[test]
    fn actions_on_unknown_alarms_are_noops() {
        let mut h = Harness::new();
        assert!(!h.stop(42));
        assert!(!h.ctl.cancel(42));
        assert!(h.recorded().is_empty());
    }

    #[test]
    fn ignore_cannot_be_requested() {
        let mut h = Harness::new();
        let err = h
            .ctl
            .act(1, ActionKind::Ignore, ActionSource::Application, h.now)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn notification_button_for_lost_alarm_is_recorded() {
        let mut h = Harness::new();
        let acted = h
            .ctl
            .act(9, ActionKind::Confirm, ActionSource::Notification, h.now)
            .unwrap();

        assert!(!acted);
        let recorded = h.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].alarm_id, 9);
        assert_eq!(recorded[0].action, ActionKind::Confirm);
    }

    #[test]
    fn stop_without_listener_is_recorded_and_replayed() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(5), h.now).unwrap();
        h.fire(5);
        h.ctl
            .act(5, ActionKind::Snooze, ActionSource::Notification, h.now)
            .unwrap();
        assert_eq!(h.recorded().len(), 1);

        let events = h.listen();

        match events.try_recv().unwrap() {
            Event::Replayed(record) => {
                assert_eq!(record.alarm_id, 5);
                assert_eq!(record.action, ActionKind::Snooze);
            }
            other => panic!("expected a replay, got {other:?}"),
        }
        assert!(h.platform.store.is_empty());
    }

    #[test]
    fn drain_history_hands_records_over() {
        let mut h = Harness::new();
        h.ctl
            .act(3, ActionKind::Stop, ActionSource::Notification, h.now)
            .unwrap();

        let drained = h.ctl.drain_history().unwrap();

        assert_eq!(drained.len(), 1);
        assert!(h.ctl.drain_history().unwrap().is_empty());
    }

    #[test]
    fn cancel_armed_alarm_never_rings() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(1), h.now).unwrap();

        assert!(h.ctl.cancel(1));

        assert!(h.platform.timer.pending(1).is_none());
        assert_eq!(h.ctl.phase(1), Phase::Removed);
        assert!(h.platform.timer.refresh_interval().is_none());
    }

    #[test]
    fn natural_end_of_one_shot_sound() {
        let mut h = Harness::new();
        let events = h.listen();
        let mut spec = h.spec(1);
        spec.loop_audio = false;
        h.ctl.arm(spec, h.now).unwrap();
        h.fire(1);
        assert_eq!(events.try_recv().unwrap(), Event::RingStarted { id: 1 });

        assert!(h.platform.audio.finish(1));
        h.pump();

        assert_eq!(h.ctl.phase(1), Phase::Removed);
        assert_eq!(h.platform.wake_lock.held(), 0);
        assert_eq!(
            events.try_recv().unwrap(),
            Event::Stopped {
                id: 1,
                action: ActionKind::Stop
            }
        );
    }

    #[test]
    fn end_of_an_earlier_episode_is_stale() {
        let mut h = Harness::new();
        let mut spec = h.spec(1);
        spec.loop_audio = false;
        h.ctl.arm(spec, h.now).unwrap();
        h.fire(1);

        h.ctl.playback_ended(1, 0);

        assert!(h.ctl.is_ringing(1));
    }

    #[test]
    fn late_alarm_resumes_at_its_offset() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(3), h.now).unwrap();
        assert!(h.platform.timer.refresh_interval().is_some());

        let later = h.now + ChronoDuration::hours(1) + ChronoDuration::seconds(10);
        h.ctl.background_refresh(later);

        assert!(h.ctl.is_ringing(3));
        let playing = h.platform.audio.playing(3).unwrap();
        assert_eq!(playing.start_at, Duration::from_secs(10));
        assert_eq!(h.ctl.playback_position(3).unwrap(), Duration::from_secs(10));
        assert!(h.platform.timer.refresh_interval().is_none());
    }

    #[test]
    fn earliest_overdue_alarm_wins_after_suspend() {
        let mut h = Harness::new();
        for id in (1..=8).rev() {
            let mut spec = h.spec(id);
            spec.fire_at = h.now + ChronoDuration::minutes(10 + i64::from(id));
            h.ctl.arm(spec, h.now).unwrap();
        }

        h.ctl.background_refresh(h.now + ChronoDuration::hours(2));

        assert!(h.ctl.is_ringing(1));
        assert_eq!(h.ctl.registry().ringing_count(), 1);
        let ignored: Vec<_> = h.recorded().iter().map(|r| r.alarm_id).collect();
        assert_eq!(ignored.len(), 7);
        assert!(!ignored.contains(&1));
        assert!((2..=8).all(|id| h.ctl.phase(id) == Phase::Removed));
    }

    #[test]
    fn never_more_than_one_alarm_ringing() {
        let mut rang = 0;
        for round in 0u32..40 {
            let mut h = Harness::new();
            for step in 0u32..24 {
                let id = (round + step * 7) % 4 + 1;
                match (round * 3 + step * 5) % 6 {
                    0 | 1 => {
                        let _ = h.ctl.arm(h.spec(id), h.now);
                    }
                    2 => {
                        h.platform.timer.fire(id);
                        h.pump();
                    }
                    3 => {
                        h.ctl.cancel(id);
                    }
                    4 => {
                        h.stop(id);
                    }
                    _ => h.ctl.background_refresh(h.now + ChronoDuration::hours(2)),
                }
                let registry = h.ctl.registry();
                assert!(
                    registry.ringing_count() <= 1,
                    "round {round} step {step}: {} ringing",
                    registry.ringing_count()
                );
                assert_eq!(registry.ringing_count() == 1, registry.ringing().is_some());
                assert_eq!(h.platform.wake_lock.held(), registry.ringing_count());
            }
            rang += h.platform.audio.plays();
        }
        assert!(rang > 0);
    }

    #[test]
    fn refresh_restores_evicted_timer() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(4), h.now).unwrap();
        h.platform.timer.evict(4);

        assert!(h.platform.timer.refresh());
        h.pump();

        assert_eq!(h.platform.timer.pending(4), Some(h.now + ChronoDuration::hours(1)));
        assert_eq!(h.ctl.phase(4), Phase::Armed);
    }

    #[test]
    fn busy_audio_fails_the_ring() {
        let mut h = Harness::new();
        let events = h.listen();
        h.platform.audio.set_busy(true);
        h.ctl.arm(h.spec(1), h.now).unwrap();

        h.fire(1);

        assert_eq!(
            events.try_recv().unwrap(),
            Event::RingFailed {
                id: 1,
                reason: "resource_unavailable"
            }
        );
        assert_eq!(h.ctl.phase(1), Phase::Removed);
        assert_eq!(h.platform.wake_lock.held(), 0);
        assert!(h.ctl.registry().ringing().is_none());
    }

    #[test]
    fn position_of_silent_alarm_is_not_found() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(1), h.now).unwrap();
        assert!(matches!(
            h.ctl.playback_position(1),
            Err(Error::NotFound(1))
        ));
    }

    #[test]
    fn teardown_warns_only_when_asked() {
        let mut h = Harness::new();
        h.ctl.arm(h.spec(1), h.now).unwrap();
        assert!(!h.ctl.teardown());

        let mut watched = h.spec(2);
        watched.warn_on_kill = true;
        h.ctl.arm(watched, h.now).unwrap();
        h.ctl.set_warn_on_kill("Closed".into(), "Reopen to keep alarms".into());

        assert!(h.ctl.teardown());
        assert!(h.platform.notifier.is_shown(NotificationTag::KillWarning));

        h.ctl.disable_warn_on_kill();
        assert!(!h.ctl.teardown());
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let mut h = Harness::new();
        let err = h.ctl.arm(h.spec(0), h.now).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(h.ctl.registry().is_empty());
    }
}
