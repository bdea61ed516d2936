use std::{collections::BTreeSet, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::debug;

use super::{
    lifecycle::SessionOutcome,
    sampler::Sample,
    state::{PauseCause, TrackingState},
};

/// Commands issued by the user. Commands that make no sense in the current state are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    StartTracking,
    PauseTracking,
    ResumeTracking,
    StopTracking { user_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// Raised once when idle time first reaches the threshold.
    ThresholdExceeded { idle_time: Duration },
    Locked,
    /// Input returned after an idle or lock excursion.
    Active,
}

/// What the user entered when asked about a finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub title: String,
    pub description: Option<String>,
    pub tags: BTreeSet<String>,
}

/// Request for a session title. Dropping the request without responding counts as a cancelled
/// prompt.
#[derive(Debug)]
pub struct SessionInfoRequest {
    pub session_start: DateTime<Utc>,
    pub active_duration: Duration,
    reply: oneshot::Sender<SessionInfo>,
}

impl SessionInfoRequest {
    pub fn new(
        session_start: DateTime<Utc>,
        active_duration: Duration,
    ) -> (Self, oneshot::Receiver<SessionInfo>) {
        let (reply, receiver) = oneshot::channel();
        (
            Self {
                session_start,
                active_duration,
                reply,
            },
            receiver,
        )
    }

    pub fn respond(self, info: SessionInfo) {
        if self.reply.send(info).is_err() {
            debug!("Session prompt was answered after it was abandoned");
        }
    }

    pub fn discard(self) {}
}

/// Everything the tracker reports to whoever is presenting it.
#[derive(Debug)]
pub enum UiEvent {
    WindowTracked(Sample),
    StateChanged(TrackingState),
    AutoPaused(PauseCause),
    AutoResumed,
    Notify(String),
    GetSessionInfo(SessionInfoRequest),
    SessionFinalized(SessionOutcome),
}
