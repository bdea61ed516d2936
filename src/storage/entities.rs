use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a bucket. A `None` language comes from data recorded without a language label.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize, Clone)]
pub struct BucketKey {
    pub date: NaiveDate,
    pub app: Arc<str>,
    pub language: Option<Arc<str>>,
}

/// A request to add time to a bucket. Creates the bucket when it doesn't exist yet.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct BucketUpsert {
    pub key: BucketKey,
    pub icon: Vec<u8>,
    pub delta_seconds: u64,
}

/// Accumulated time for an application and language on a local calendar day.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct DailyUsageBucket {
    #[serde(flatten)]
    pub key: BucketKey,
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub icon: Option<Vec<u8>>,
}

impl DailyUsageBucket {
    pub fn new(upsert: BucketUpsert) -> Self {
        Self {
            key: upsert.key,
            time_spent_seconds: upsert.delta_seconds,
            icon: Some(upsert.icon).filter(|icon| !icon.is_empty()),
        }
    }

    /// Additive merge of the duration. The icon is only taken when none was stored yet.
    pub fn absorb(&mut self, upsert: &BucketUpsert) {
        debug_assert_eq!(self.key, upsert.key);
        self.time_spent_seconds = self.time_spent_seconds.saturating_add(upsert.delta_seconds);
        let has_icon = self.icon.as_ref().is_some_and(|icon| !icon.is_empty());
        if !has_icon && !upsert.icon.is_empty() {
            self.icon = Some(upsert.icon.clone());
        }
    }
}

/// Applies an upsert to a set of buckets for one day. This is the single conditional update
/// every storage backend performs while holding its write lock.
pub fn upsert_bucket(buckets: &mut Vec<DailyUsageBucket>, upsert: BucketUpsert) {
    match buckets.iter_mut().find(|bucket| bucket.key == upsert.key) {
        Some(bucket) => bucket.absorb(&upsert),
        None => buckets.push(DailyUsageBucket::new(upsert)),
    }
}

/// Entry of the append-only raw activity log, one per accepted sample.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct ActivityRecordEntity {
    pub app: Arc<str>,
    pub title: Arc<str>,
    pub language: Option<Arc<str>>,
    pub observed_at: DateTime<Local>,
    pub duration_seconds: u64,
}

/// Data for a session about to be persisted. Storage assigns the id.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NewSession {
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: u64,
    pub title: String,
    pub description: Option<String>,
    pub user_id: Option<String>,
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct FinalizedSession {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl FinalizedSession {
    pub fn from_new(id: Uuid, session: NewSession) -> Self {
        Self {
            id,
            date: session.date,
            start_time: session.start_time,
            duration_seconds: session.duration_seconds,
            title: session.title,
            description: session.description,
            tags: BTreeSet::new(),
            user_id: session.user_id,
        }
    }

    pub fn apply(&mut self, edit: SessionEdit) {
        if let Some(title) = edit.title {
            self.title = title;
        }
        if let Some(description) = edit.description {
            self.description = Some(description).filter(|v| !v.is_empty());
        }
    }
}

/// Changes to a stored session. `None` leaves a field untouched, an empty description clears it.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct SessionEdit {
    pub title: Option<String>,
    pub description: Option<String>,
}
