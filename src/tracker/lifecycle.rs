use std::{collections::BTreeSet, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::Local;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::storage::{
    entities::{FinalizedSession, NewSession, SessionEdit},
    UsageStorage,
};

use super::{
    events::{SessionInfo, SessionInfoRequest, UiEvent},
    state::StoppedSession,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Active time was below the minimum session length.
    TooShort,
    /// The prompt was dismissed without an answer.
    Cancelled,
    TimedOut,
    EmptyTitle,
}

/// Result of stopping a session. Discarding is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Created(FinalizedSession),
    Discarded(DiscardReason),
}

/// Turns stopped tracking sessions into finalized sessions and manages them afterwards.
pub struct SessionLifecycleManager<S> {
    storage: Arc<S>,
    min_session: Duration,
    prompt_timeout: Option<Duration>,
}

impl<S: UsageStorage> SessionLifecycleManager<S> {
    pub fn new(storage: Arc<S>, min_session: Duration, prompt_timeout: Option<Duration>) -> Self {
        Self {
            storage,
            min_session,
            prompt_timeout,
        }
    }

    /// Asks for a title through `prompt` and stores the session. Sessions below the minimum
    /// length are discarded without asking.
    #[instrument(skip(self, prompt))]
    pub async fn finalize(
        &self,
        stopped: StoppedSession,
        user_id: Option<String>,
        prompt: &UnboundedSender<UiEvent>,
    ) -> Result<SessionOutcome> {
        if stopped.active_duration < self.min_session {
            info!(
                "Discarding session with {}s of activity",
                stopped.active_duration.as_secs()
            );
            return Ok(SessionOutcome::Discarded(DiscardReason::TooShort));
        }

        let info = match self.request_info(&stopped, prompt).await {
            Ok(info) => info,
            Err(reason) => return Ok(SessionOutcome::Discarded(reason)),
        };

        let title = info.title.trim();
        if title.is_empty() {
            info!("Session title left empty, discarding");
            return Ok(SessionOutcome::Discarded(DiscardReason::EmptyTitle));
        }

        let session = NewSession {
            date: stopped.session_start.with_timezone(&Local).date_naive(),
            start_time: stopped.session_start,
            duration_seconds: stopped.active_duration.as_secs(),
            title: title.to_string(),
            description: info.description.filter(|v| !v.trim().is_empty()),
            user_id,
        };
        let mut created = self.storage.insert_finalized_session(session).await?;
        info!("Created session {} '{}'", created.id, created.title);

        // The session is stored at this point, a failed tag step only loses the tags.
        let tags = clean_tags(info.tags);
        if !tags.is_empty() {
            match self.storage.set_session_tags(created.id, tags.clone()).await {
                Ok(true) => created.tags = tags,
                Ok(false) => warn!("Session {} vanished before tagging", created.id),
                Err(e) => {
                    warn!("Failed to tag session {} {e:?}", created.id);
                    let _ = prompt.send(UiEvent::Notify(format!(
                        "Session '{}' was saved without tags: {e}",
                        created.title
                    )));
                }
            }
        }
        Ok(SessionOutcome::Created(created))
    }

    async fn request_info(
        &self,
        stopped: &StoppedSession,
        prompt: &UnboundedSender<UiEvent>,
    ) -> Result<SessionInfo, DiscardReason> {
        let (request, response) =
            SessionInfoRequest::new(stopped.session_start, stopped.active_duration);
        if prompt.send(UiEvent::GetSessionInfo(request)).is_err() {
            warn!("Nobody is listening for the session prompt");
            return Err(DiscardReason::Cancelled);
        }

        let answer = match self.prompt_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, response).await {
                Ok(answer) => answer,
                Err(_) => {
                    info!("Session prompt timed out after {}s", timeout.as_secs());
                    return Err(DiscardReason::TimedOut);
                }
            },
            None => response.await,
        };
        answer.map_err(|_| {
            info!("Session prompt was cancelled");
            DiscardReason::Cancelled
        })
    }

    /// Replaces the tags of a session. Safe to call repeatedly, an empty set clears all tags.
    pub async fn set_tags(&self, session_id: Uuid, tags: BTreeSet<String>) -> Result<()> {
        if !self
            .storage
            .set_session_tags(session_id, clean_tags(tags))
            .await?
        {
            return Err(anyhow!("Session {session_id} doesn't exist"));
        }
        Ok(())
    }

    pub async fn edit(&self, session_id: Uuid, edit: SessionEdit) -> Result<FinalizedSession> {
        if edit.title.as_ref().is_some_and(|v| v.trim().is_empty()) {
            return Err(anyhow!("Session title can't be empty"));
        }
        self.storage
            .update_session(session_id, edit)
            .await?
            .ok_or_else(|| anyhow!("Session {session_id} doesn't exist"))
    }

    pub async fn delete(&self, session_id: Uuid) -> Result<()> {
        if !self.storage.delete_session(session_id).await? {
            return Err(anyhow!("Session {session_id} doesn't exist"));
        }
        Ok(())
    }
}

fn clean_tags(tags: BTreeSet<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}
