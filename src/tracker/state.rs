use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    #[default]
    Idle,
    Recording,
    Paused,
}

/// What caused a pause. Resuming behaves the same for every cause, the cause only decides
/// whether returning input may resume automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseCause {
    User,
    Idle,
    Lock,
}

impl PauseCause {
    pub fn is_automatic(self) -> bool {
        !matches!(self, PauseCause::User)
    }
}

/// Result of feeding an event into [TrackingSession]. Events that have no meaning in the
/// current state are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored,
}

/// Snapshot of a session taken when tracking stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedSession {
    pub session_start: DateTime<Utc>,
    pub active_duration: Duration,
}

/// The one tracking session of the process.
#[derive(Debug, Default)]
pub struct TrackingSession {
    state: TrackingState,
    session_start: Option<DateTime<Utc>>,
    active_accumulated: Duration,
    last_active: Option<Instant>,
    pause_cause: Option<PauseCause>,
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
    }

    /// Active time banked by pauses. Doesn't include the interval currently being recorded.
    pub fn active_accumulated(&self) -> Duration {
        self.active_accumulated
    }

    pub fn pause_cause(&self) -> Option<PauseCause> {
        self.pause_cause
    }

    /// Total active time including the interval in progress.
    pub fn active_duration(&self, now: Instant) -> Duration {
        match (self.state, self.last_active) {
            (TrackingState::Recording, Some(last_active)) => {
                self.active_accumulated + now.saturating_duration_since(last_active)
            }
            _ => self.active_accumulated,
        }
    }

    pub fn start(&mut self, now: Instant, wall_time: DateTime<Utc>) -> Transition {
        if self.state != TrackingState::Idle {
            return Transition::Ignored;
        }
        *self = Self {
            state: TrackingState::Recording,
            session_start: Some(wall_time),
            active_accumulated: Duration::ZERO,
            last_active: Some(now),
            pause_cause: None,
        };
        Transition::Applied
    }

    pub fn pause(&mut self, now: Instant, cause: PauseCause) -> Transition {
        if self.state != TrackingState::Recording {
            return Transition::Ignored;
        }
        self.active_accumulated = self.active_duration(now);
        self.last_active = None;
        self.state = TrackingState::Paused;
        self.pause_cause = Some(cause);
        Transition::Applied
    }

    pub fn resume(&mut self, now: Instant) -> Transition {
        if self.state != TrackingState::Paused {
            return Transition::Ignored;
        }
        self.state = TrackingState::Recording;
        self.last_active = Some(now);
        self.pause_cause = None;
        Transition::Applied
    }

    /// Ends the session and resets to `Idle`. Returns `None` when nothing was being tracked.
    pub fn stop(&mut self, now: Instant) -> Option<StoppedSession> {
        if self.state == TrackingState::Idle {
            return None;
        }
        let stopped = self.session_start.map(|session_start| StoppedSession {
            session_start,
            active_duration: self.active_duration(now),
        });
        *self = Self::default();
        stopped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use tokio::time::Instant;

    use super::{PauseCause, TrackingSession, TrackingState, Transition};

    fn started() -> (TrackingSession, Instant) {
        let mut session = TrackingSession::new();
        let start = Instant::now();
        assert_eq!(session.start(start, Utc::now()), Transition::Applied);
        (session, start)
    }

    #[test]
    fn test_start_sets_recording() {
        let (session, _) = started();
        assert_eq!(session.state(), TrackingState::Recording);
        assert!(session.session_start().is_some());
        assert_eq!(session.active_accumulated(), Duration::ZERO);
    }

    #[test]
    fn test_start_while_recording_is_ignored() {
        let (mut session, start) = started();
        let first_start = session.session_start();
        let later = start + Duration::from_secs(30);
        assert_eq!(session.start(later, Utc::now()), Transition::Ignored);
        assert_eq!(session.session_start(), first_start);
        assert_eq!(session.active_duration(later), Duration::from_secs(30));
    }

    #[test]
    fn test_pause_twice_equals_pause_once() {
        let (mut session, start) = started();

        assert_eq!(
            session.pause(start + Duration::from_secs(25), PauseCause::User),
            Transition::Applied
        );
        assert_eq!(
            session.pause(start + Duration::from_secs(40), PauseCause::Idle),
            Transition::Ignored
        );

        assert_eq!(session.state(), TrackingState::Paused);
        assert_eq!(session.active_accumulated(), Duration::from_secs(25));
        assert_eq!(session.pause_cause(), Some(PauseCause::User));
    }

    #[test]
    fn test_paused_time_is_excluded() {
        let (mut session, start) = started();
        session.pause(start + Duration::from_secs(20), PauseCause::Lock);
        assert_eq!(session.resume(start + Duration::from_secs(80)), Transition::Applied);

        let stopped = session.stop(start + Duration::from_secs(95)).unwrap();

        assert_eq!(stopped.active_duration, Duration::from_secs(35));
        assert_eq!(session.state(), TrackingState::Idle);
        assert_eq!(session.session_start(), None);
    }

    #[test]
    fn test_stop_while_paused_uses_accumulated_time() {
        let (mut session, start) = started();
        session.pause(start + Duration::from_secs(45), PauseCause::User);

        let stopped = session.stop(start + Duration::from_secs(500)).unwrap();

        assert_eq!(stopped.active_duration, Duration::from_secs(45));
    }

    #[test]
    fn test_uninterrupted_session_duration() {
        let interval = Duration::from_secs(10);
        let ticks = 7;
        let (mut session, start) = started();

        let stopped = session.stop(start + interval * ticks).unwrap();

        assert_eq!(stopped.active_duration, interval * ticks);
    }

    #[test]
    fn test_invalid_transitions_from_idle() {
        let mut session = TrackingSession::new();
        let now = Instant::now();
        assert_eq!(session.pause(now, PauseCause::User), Transition::Ignored);
        assert_eq!(session.resume(now), Transition::Ignored);
        assert_eq!(session.stop(now), None);
        assert_eq!(session.state(), TrackingState::Idle);
    }

    #[test]
    fn test_resume_while_recording_is_ignored() {
        let (mut session, start) = started();
        assert_eq!(session.resume(start + Duration::from_secs(5)), Transition::Ignored);
        assert_eq!(
            session.active_duration(start + Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }
}
