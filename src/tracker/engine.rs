use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{
    sync::{
        mpsc::{self, UnboundedSender},
        oneshot,
    },
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::{
    storage::UsageStorage,
    utils::clock::{sleep_until_armed, Clock},
};

use super::{
    events::{IdleEvent, UiEvent, UserCommand},
    lifecycle::SessionLifecycleManager,
    sampler::{ActivitySampler, Sample},
    state::{PauseCause, TrackingSession, TrackingState, Transition},
};

/// Messages accepted by the engine.
#[derive(Debug)]
pub enum TrackerMessage {
    Command(UserCommand),
    Snapshot(oneshot::Sender<TrackingSnapshot>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSnapshot {
    pub state: TrackingState,
    pub session_start: Option<DateTime<Utc>>,
    pub active_accumulated: Duration,
    pub active_duration: Duration,
}

/// Single owner of the [TrackingSession]. Every transition and every sample hand-off happens
/// inside [TrackingEngine::run], so a pause can never interleave with a tick.
pub struct TrackingEngine<S> {
    session: TrackingSession,
    sampler: ActivitySampler,
    messages: mpsc::Receiver<TrackerMessage>,
    idle_events: mpsc::Receiver<IdleEvent>,
    samples: UnboundedSender<Sample>,
    ui: UnboundedSender<UiEvent>,
    lifecycle: Arc<SessionLifecycleManager<S>>,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
    next_tick: Option<Instant>,
    /// Time left until the next tick when the session was paused.
    tick_remainder: Option<Duration>,
}

impl<S: UsageStorage> TrackingEngine<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sampler: ActivitySampler,
        messages: mpsc::Receiver<TrackerMessage>,
        idle_events: mpsc::Receiver<IdleEvent>,
        samples: UnboundedSender<Sample>,
        ui: UnboundedSender<UiEvent>,
        lifecycle: Arc<SessionLifecycleManager<S>>,
        clock: Arc<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session: TrackingSession::new(),
            sampler,
            messages,
            idle_events,
            samples,
            ui,
            lifecycle,
            clock,
            shutdown,
            next_tick: None,
            tick_remainder: None,
        }
    }

    /// Runs until shutdown or until every [TrackerMessage] sender is dropped. A session that is
    /// still open at that point is dropped without being finalized.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    break;
                }
                Some(event) = self.idle_events.recv() => {
                    self.on_idle_event(event);
                }
                message = self.messages.recv() => match message {
                    Some(message) => self.on_message(message),
                    None => {
                        debug!("All tracker handles dropped");
                        break;
                    }
                },
                _ = sleep_until_armed(self.clock.as_ref(), self.next_tick) => {
                    self.on_tick();
                }
            }
        }

        if self.session.state() != TrackingState::Idle {
            info!("Shutting down with an open session, it won't be saved");
        }
        Ok(())
    }

    fn on_message(&mut self, message: TrackerMessage) {
        match message {
            TrackerMessage::Command(command) => self.on_command(command),
            TrackerMessage::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn on_command(&mut self, command: UserCommand) {
        let now = self.clock.instant();
        let transition = match &command {
            UserCommand::StartTracking => {
                let transition = self.session.start(now, self.clock.time());
                if transition == Transition::Applied {
                    self.next_tick = Some(now);
                }
                transition
            }
            UserCommand::PauseTracking => self.pause(now, PauseCause::User),
            UserCommand::ResumeTracking => self.resume(now),
            UserCommand::StopTracking { user_id } => self.stop(now, user_id.clone()),
        };

        match transition {
            Transition::Applied => {
                info!("Tracking is now {:?}", self.session.state());
                self.emit(UiEvent::StateChanged(self.session.state()));
            }
            Transition::Ignored => {
                debug!("Ignoring {command:?} while {:?}", self.session.state());
            }
        }
    }

    fn on_idle_event(&mut self, event: IdleEvent) {
        let now = self.clock.instant();
        match event {
            IdleEvent::ThresholdExceeded { idle_time } => {
                if self.pause(now, PauseCause::Idle) == Transition::Applied {
                    self.emit(UiEvent::AutoPaused(PauseCause::Idle));
                    self.emit(UiEvent::Notify(format!(
                        "Tracking paused after {}s without input",
                        idle_time.as_secs()
                    )));
                    self.emit(UiEvent::StateChanged(self.session.state()));
                }
            }
            IdleEvent::Locked => {
                if self.pause(now, PauseCause::Lock) == Transition::Applied {
                    self.emit(UiEvent::AutoPaused(PauseCause::Lock));
                    self.emit(UiEvent::Notify("Tracking paused, screen locked".into()));
                    self.emit(UiEvent::StateChanged(self.session.state()));
                }
            }
            IdleEvent::Active => {
                let automatic = self
                    .session
                    .pause_cause()
                    .is_some_and(PauseCause::is_automatic);
                if automatic && self.resume(now) == Transition::Applied {
                    self.emit(UiEvent::AutoResumed);
                    self.emit(UiEvent::StateChanged(self.session.state()));
                }
            }
        }
    }

    fn pause(&mut self, now: Instant, cause: PauseCause) -> Transition {
        let transition = self.session.pause(now, cause);
        if transition == Transition::Applied {
            info!("Paused ({cause:?})");
            self.tick_remainder = self
                .next_tick
                .take()
                .map(|next| next.saturating_duration_since(now));
        }
        transition
    }

    fn resume(&mut self, now: Instant) -> Transition {
        let transition = self.session.resume(now);
        if transition == Transition::Applied {
            // The tick before the pause already counted the rest of its interval.
            let remainder = self.tick_remainder.take().unwrap_or_default();
            self.next_tick = Some(now + remainder);
        }
        transition
    }

    fn stop(&mut self, now: Instant, user_id: Option<String>) -> Transition {
        let Some(stopped) = self.session.stop(now) else {
            return Transition::Ignored;
        };
        self.next_tick = None;
        self.tick_remainder = None;

        let lifecycle = self.lifecycle.clone();
        let ui = self.ui.clone();
        tokio::spawn(async move {
            let event = match lifecycle.finalize(stopped, user_id, &ui).await {
                Ok(outcome) => UiEvent::SessionFinalized(outcome),
                Err(e) => {
                    error!("Failed to save session {e:?}");
                    UiEvent::Notify(format!("Failed to save session: {e}"))
                }
            };
            let _ = ui.send(event);
        });
        Transition::Applied
    }

    fn on_tick(&mut self) {
        let Some(scheduled) = self.next_tick else {
            return;
        };
        let now = self.clock.instant();
        let interval = self.sampler.interval();
        // Missed ticks are skipped, not replayed.
        let next = scheduled + interval;
        self.next_tick = Some(if next <= now { now + interval } else { next });

        if self.session.state() != TrackingState::Recording {
            self.next_tick = None;
            return;
        }

        let Some(sample) = self.sampler.sample() else {
            return;
        };
        trace!("Forwarding sample of {}", sample.app);
        self.emit(UiEvent::WindowTracked(sample.clone()));
        if self.samples.send(sample).is_err() {
            error!("Aggregation is not running, sample lost");
        }
    }

    fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            state: self.session.state(),
            session_start: self.session.session_start(),
            active_accumulated: self.session.active_accumulated(),
            active_duration: self.session.active_duration(self.clock.instant()),
        }
    }

    fn emit(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            trace!("No one is listening for ui events");
        }
    }
}
