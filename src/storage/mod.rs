//! Storage is organized through [UsageStorage]. [file_storage::FileStorage] is the durable
//! implementation, [memory::MemoryStorage] keeps everything in memory.
//!
//! The basic idea is:
//!  - Buckets are stored per local calendar day and only ever change through
//!    [UsageStorage::upsert_daily_bucket], which merges under the store's write lock.
//!  - Every accepted sample is also appended to a raw activity log for the day.
//!  - Finalized sessions are stored with their tags and can be edited or deleted.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use entities::{
    ActivityRecordEntity, BucketUpsert, DailyUsageBucket, FinalizedSession, NewSession,
    SessionEdit,
};
use query::{BucketQuery, SessionQuery};

pub mod entities;
pub mod file_storage;
pub mod memory;
pub mod query;

/// Durable home of buckets, the raw activity log and finalized sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageStorage: Send + Sync + 'static {
    /// Adds time to a bucket, creating it if needed. Must not lose updates when called
    /// concurrently for the same key.
    async fn upsert_daily_bucket(&self, upsert: BucketUpsert) -> Result<()>;

    async fn append_activity(&self, record: ActivityRecordEntity) -> Result<()>;

    /// Most recent raw activity recorded on `date`.
    async fn latest_activity(&self, date: NaiveDate) -> Result<Option<ActivityRecordEntity>>;

    async fn query_buckets(&self, query: &BucketQuery) -> Result<Vec<DailyUsageBucket>>;

    async fn insert_finalized_session(&self, session: NewSession) -> Result<FinalizedSession>;

    /// Replaces all tags of a session. An empty set clears them. Returns false for an unknown
    /// session.
    async fn set_session_tags(&self, session_id: Uuid, tags: BTreeSet<String>) -> Result<bool>;

    async fn update_session(
        &self,
        session_id: Uuid,
        edit: SessionEdit,
    ) -> Result<Option<FinalizedSession>>;

    async fn delete_session(&self, session_id: Uuid) -> Result<bool>;

    async fn query_sessions(&self, query: &SessionQuery) -> Result<Vec<FinalizedSession>>;
}
