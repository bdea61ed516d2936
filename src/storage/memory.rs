use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    entities::{
        upsert_bucket, ActivityRecordEntity, BucketUpsert, DailyUsageBucket, FinalizedSession,
        NewSession, SessionEdit,
    },
    query::{BucketQuery, SessionQuery},
    UsageStorage,
};

#[derive(Default)]
struct MemoryState {
    buckets: BTreeMap<NaiveDate, Vec<DailyUsageBucket>>,
    activity: BTreeMap<NaiveDate, Vec<ActivityRecordEntity>>,
    sessions: Vec<FinalizedSession>,
}

/// [UsageStorage] that keeps everything in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn activity_for(&self, date: NaiveDate) -> Vec<ActivityRecordEntity> {
        let state = self.state.lock().await;
        state.activity.get(&date).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl UsageStorage for MemoryStorage {
    async fn upsert_daily_bucket(&self, upsert: BucketUpsert) -> Result<()> {
        let mut state = self.state.lock().await;
        let day = state.buckets.entry(upsert.key.date).or_default();
        upsert_bucket(day, upsert);
        Ok(())
    }

    async fn append_activity(&self, record: ActivityRecordEntity) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .activity
            .entry(record.observed_at.date_naive())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn latest_activity(&self, date: NaiveDate) -> Result<Option<ActivityRecordEntity>> {
        let state = self.state.lock().await;
        Ok(state.activity.get(&date).and_then(|v| v.last().cloned()))
    }

    async fn query_buckets(&self, query: &BucketQuery) -> Result<Vec<DailyUsageBucket>> {
        let state = self.state.lock().await;
        Ok(state
            .buckets
            .range(query.range.start()..=query.range.end())
            .flat_map(|(_, buckets)| buckets.iter())
            .filter(|bucket| query.matches(bucket))
            .cloned()
            .collect())
    }

    async fn insert_finalized_session(&self, session: NewSession) -> Result<FinalizedSession> {
        let session = FinalizedSession::from_new(Uuid::new_v4(), session);
        self.state.lock().await.sessions.push(session.clone());
        Ok(session)
    }

    async fn set_session_tags(&self, session_id: Uuid, tags: BTreeSet<String>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.sessions.iter_mut().find(|v| v.id == session_id) {
            Some(session) => {
                session.tags = tags;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_session(
        &self,
        session_id: Uuid,
        edit: SessionEdit,
    ) -> Result<Option<FinalizedSession>> {
        let mut state = self.state.lock().await;
        Ok(state
            .sessions
            .iter_mut()
            .find(|v| v.id == session_id)
            .map(|session| {
                session.apply(edit);
                session.clone()
            }))
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|v| v.id != session_id);
        Ok(state.sessions.len() != before)
    }

    async fn query_sessions(&self, query: &SessionQuery) -> Result<Vec<FinalizedSession>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .iter()
            .filter(|v| query.matches(v))
            .cloned()
            .collect())
    }
}
