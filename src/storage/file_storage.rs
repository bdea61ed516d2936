use std::{
    collections::BTreeSet,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use futures::{stream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::RwLock,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{fs::operations::read_last_line, utils::time::date_to_record_name};

use super::{
    entities::{
        upsert_bucket, ActivityRecordEntity, BucketUpsert, DailyUsageBucket, FinalizedSession,
        NewSession, SessionEdit,
    },
    query::{BucketQuery, SessionQuery},
    UsageStorage,
};

const BUCKETS_DIR: &str = "buckets";
const ACTIVITY_DIR: &str = "activity";
const SESSIONS_FILE: &str = "sessions";

/// Number of day files read concurrently for range queries.
const READ_CONCURRENCY: usize = 4;

/// The main realization of [UsageStorage]. Every file holds one JSON entity per line.
///
/// Files are locked with `fs4` so that other processes reading or writing the same directory
/// never observe a half written file. Inside the process access is additionally serialized
/// through `access`, because file locks block the executor thread.
pub struct FileStorage {
    root: PathBuf,
    access: RwLock<()>,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(root.join(BUCKETS_DIR))?;
        std::fs::create_dir_all(root.join(ACTIVITY_DIR))?;

        Ok(Self {
            root,
            access: RwLock::new(()),
        })
    }

    fn bucket_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(BUCKETS_DIR).join(date_to_record_name(date))
    }

    fn activity_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(ACTIVITY_DIR).join(date_to_record_name(date))
    }

    fn sessions_path(&self) -> PathBuf {
        self.root.join(SESSIONS_FILE)
    }
}

fn parse_lines<T: DeserializeOwned>(path: &Path, content: &str) -> Vec<T> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(v) => Some(v),
            Err(e) => {
                // ignore illegal values. Might happen after shutdowns
                warn!("During parsing in path {path:?} found illegal json string {line}: {e}");
                None
            }
        })
        .collect()
}

async fn read_entities<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    async fn extract(path: &Path) -> std::result::Result<String, std::io::Error> {
        debug!("Extracting {path:?}");
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        read?;
        Ok(content)
    }

    match extract(path).await {
        Ok(content) => Ok(parse_lines(path, &content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e)?,
    }
}

/// Reads all entities of a file, lets `modify` change them and writes the result back, all
/// while holding an exclusive lock on the file.
async fn modify_entities<T, R, F>(path: &Path, modify: F) -> Result<R>
where
    T: Serialize + DeserializeOwned + Send,
    R: Send,
    F: FnOnce(&mut Vec<T>) -> R + Send,
{
    let mut file = File::options()
        .write(true)
        .create(true)
        .read(true)
        .truncate(false)
        .open(path)
        .await?;

    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = rewrite_with_file(path, &mut file, modify).await;
    file.unlock_async().await?;
    result
}

async fn rewrite_with_file<T, R, F>(path: &Path, file: &mut File, modify: F) -> Result<R>
where
    T: Serialize + DeserializeOwned + Send,
    R: Send,
    F: FnOnce(&mut Vec<T>) -> R + Send,
{
    file.rewind().await?;
    let mut content = String::new();
    file.read_to_string(&mut content).await?;

    let mut entities = parse_lines::<T>(path, &content);
    let result = modify(&mut entities);

    let mut buffer = Vec::<u8>::new();
    for entity in &entities {
        serde_json::to_writer(&mut buffer, entity)?;
        buffer.push(b'\n');
    }

    // Overwrite first and cut the tail afterwards, so an interrupted write keeps old lines.
    file.rewind().await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    file.set_len(buffer.len() as u64).await?;
    Ok(result)
}

#[async_trait]
impl UsageStorage for FileStorage {
    async fn upsert_daily_bucket(&self, upsert: BucketUpsert) -> Result<()> {
        let _guard = self.access.write().await;
        let path = self.bucket_path(upsert.key.date);
        modify_entities(&path, move |buckets: &mut Vec<DailyUsageBucket>| {
            upsert_bucket(buckets, upsert)
        })
        .await
        .with_context(|| format!("Failed to merge bucket in {path:?}"))
    }

    async fn append_activity(&self, record: ActivityRecordEntity) -> Result<()> {
        let _guard = self.access.write().await;
        let path = self.activity_path(record.observed_at.date_naive());

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = File::options()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        file.lock_exclusive()?;
        let written = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        written.with_context(|| format!("Failed to append activity to {path:?}"))
    }

    async fn latest_activity(&self, date: NaiveDate) -> Result<Option<ActivityRecordEntity>> {
        let _guard = self.access.read().await;
        let path = self.activity_path(date);

        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => Err(e)?,
        };
        file.lock_shared()?;
        let last_line = read_last_line(&mut file).await;
        file.unlock_async().await?;

        match last_line? {
            Some(line) => match serde_json::from_str(&line) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    // Might happen due to shutdown cutting of the write into a file.
                    warn!("Last activity record was corrupted {e}");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn query_buckets(&self, query: &BucketQuery) -> Result<Vec<DailyUsageBucket>> {
        let _guard = self.access.read().await;

        let days = stream::iter(query.range.days())
            .map(|day| {
                let path = self.bucket_path(day);
                async move { (day, read_entities::<DailyUsageBucket>(&path).await) }
            })
            .buffered(READ_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        let mut buckets = vec![];
        for (day, data) in days {
            let data = data.with_context(|| format!("Failed to read buckets for {day}"))?;
            buckets.extend(data.into_iter().filter(|bucket| query.matches(bucket)));
        }
        Ok(buckets)
    }

    async fn insert_finalized_session(&self, session: NewSession) -> Result<FinalizedSession> {
        let _guard = self.access.write().await;
        let session = FinalizedSession::from_new(Uuid::new_v4(), session);
        let stored = session.clone();
        modify_entities(&self.sessions_path(), move |sessions: &mut Vec<FinalizedSession>| {
            sessions.push(stored)
        })
        .await?;
        Ok(session)
    }

    async fn set_session_tags(&self, session_id: Uuid, tags: BTreeSet<String>) -> Result<bool> {
        let _guard = self.access.write().await;
        modify_entities(&self.sessions_path(), move |sessions: &mut Vec<FinalizedSession>| {
            match sessions.iter_mut().find(|v| v.id == session_id) {
                Some(session) => {
                    session.tags = tags;
                    true
                }
                None => false,
            }
        })
        .await
    }

    async fn update_session(
        &self,
        session_id: Uuid,
        edit: SessionEdit,
    ) -> Result<Option<FinalizedSession>> {
        let _guard = self.access.write().await;
        modify_entities(&self.sessions_path(), move |sessions: &mut Vec<FinalizedSession>| {
            sessions
                .iter_mut()
                .find(|v| v.id == session_id)
                .map(|session| {
                    session.apply(edit);
                    session.clone()
                })
        })
        .await
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<bool> {
        let _guard = self.access.write().await;
        modify_entities(&self.sessions_path(), move |sessions: &mut Vec<FinalizedSession>| {
            let before = sessions.len();
            sessions.retain(|v| v.id != session_id);
            sessions.len() != before
        })
        .await
    }

    async fn query_sessions(&self, query: &SessionQuery) -> Result<Vec<FinalizedSession>> {
        let _guard = self.access.read().await;
        let sessions = read_entities::<FinalizedSession>(&self.sessions_path()).await?;
        Ok(sessions.into_iter().filter(|v| query.matches(v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, io::Write, sync::Arc};

    use anyhow::Result;
    use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use futures::future::join_all;
    use tempfile::tempdir;

    use crate::storage::{
        entities::{ActivityRecordEntity, BucketKey, BucketUpsert, NewSession, SessionEdit},
        query::{BucketQuery, DateRange, LanguageFilter, SessionQuery},
        UsageStorage,
    };

    use super::FileStorage;

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, 4).unwrap()
    }

    fn upsert(date: NaiveDate, app: &str, language: Option<&str>, delta: u64) -> BucketUpsert {
        BucketUpsert {
            key: BucketKey {
                date,
                app: app.into(),
                language: language.map(Into::into),
            },
            icon: vec![],
            delta_seconds: delta,
        }
    }

    fn new_session(title: &str) -> NewSession {
        NewSession {
            date: test_date(),
            start_time: Utc.from_utc_datetime(&NaiveDateTime::new(test_date(), NaiveTime::MIN)),
            duration_seconds: 600,
            title: title.into(),
            description: None,
            user_id: Some("tester".into()),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_and_merges() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileStorage::new(dir.path().to_owned())?;

        storage
            .upsert_daily_bucket(upsert(test_date(), "Editor", Some("Go"), 10))
            .await?;
        let mut with_icon = upsert(test_date(), "Editor", Some("Go"), 5);
        with_icon.icon = vec![7, 7];
        storage.upsert_daily_bucket(with_icon).await?;
        let mut other_icon = upsert(test_date(), "Editor", Some("Go"), 7);
        other_icon.icon = vec![1];
        storage.upsert_daily_bucket(other_icon).await?;

        let buckets = storage
            .query_buckets(&BucketQuery::for_range(DateRange::day(test_date())))
            .await?;

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].time_spent_seconds, 22);
        assert_eq!(buckets[0].icon, Some(vec![7, 7]));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_upserts_do_not_lose_time() -> Result<()> {
        let dir = tempdir()?;
        let storage = Arc::new(FileStorage::new(dir.path().to_owned())?);

        let upserts = (0..20).map(|_| {
            let storage = storage.clone();
            async move {
                storage
                    .upsert_daily_bucket(upsert(test_date(), "Editor", Some("Rust"), 10))
                    .await
            }
        });
        for result in join_all(upserts).await {
            result?;
        }

        let buckets = storage
            .query_buckets(&BucketQuery::for_range(DateRange::day(test_date())))
            .await?;
        assert_eq!(buckets[0].time_spent_seconds, 200);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_range_and_filters() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileStorage::new(dir.path().to_owned())?;
        let next_day = test_date().succ_opt().unwrap();

        storage
            .upsert_daily_bucket(upsert(test_date(), "Editor", Some("Go"), 10))
            .await?;
        storage
            .upsert_daily_bucket(upsert(next_day, "Editor", None, 20))
            .await?;
        storage
            .upsert_daily_bucket(upsert(next_day, "Terminal", Some("Go"), 30))
            .await?;

        let range = DateRange::new(test_date(), next_day)?;
        let all = storage.query_buckets(&BucketQuery::for_range(range)).await?;
        assert_eq!(all.len(), 3);

        let unlabelled = storage
            .query_buckets(&BucketQuery {
                range,
                app: Some("Editor".into()),
                language: Some(LanguageFilter::Unlabelled),
            })
            .await?;
        assert_eq!(unlabelled.len(), 1);
        assert_eq!(unlabelled[0].time_spent_seconds, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_bucket_line_is_skipped() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileStorage::new(dir.path().to_owned())?;
        storage
            .upsert_daily_bucket(upsert(test_date(), "Editor", Some("Go"), 10))
            .await?;

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(storage.bucket_path(test_date()))?;
        file.write_all(b"{\"date\":\"2018-07-04\",\"app\n")?;

        storage
            .upsert_daily_bucket(upsert(test_date(), "Editor", Some("Go"), 10))
            .await?;
        let buckets = storage
            .query_buckets(&BucketQuery::for_range(DateRange::day(test_date())))
            .await?;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].time_spent_seconds, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_activity_log_latest_entry() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileStorage::new(dir.path().to_owned())?;
        let moment = Local
            .from_local_datetime(&NaiveDateTime::new(
                test_date(),
                NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            ))
            .unwrap();

        assert_eq!(storage.latest_activity(test_date()).await?, None);

        for app in ["Editor", "Terminal"] {
            storage
                .append_activity(ActivityRecordEntity {
                    app: app.into(),
                    title: "main.rs".into(),
                    language: Some("Rust".into()),
                    observed_at: moment,
                    duration_seconds: 10,
                })
                .await?;
        }

        let latest = storage.latest_activity(test_date()).await?.unwrap();
        assert_eq!(&*latest.app, "Terminal");
        Ok(())
    }

    #[tokio::test]
    async fn test_session_lifecycle() -> Result<()> {
        let dir = tempdir()?;
        let storage = FileStorage::new(dir.path().to_owned())?;

        let first = storage.insert_finalized_session(new_session("Review")).await?;
        let second = storage.insert_finalized_session(new_session("Docs")).await?;

        let tags = BTreeSet::from(["work".to_string(), "review".to_string()]);
        assert!(storage.set_session_tags(first.id, tags.clone()).await?);
        assert!(storage.set_session_tags(first.id, tags).await?);

        let query = SessionQuery {
            range: DateRange::day(test_date()),
            tag: Some("review".into()),
        };
        let tagged = storage.query_sessions(&query).await?;
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, first.id);
        assert_eq!(tagged[0].tags.len(), 2);

        assert!(storage.set_session_tags(first.id, BTreeSet::new()).await?);
        assert!(storage.query_sessions(&query).await?.is_empty());

        let edited = storage
            .update_session(
                second.id,
                SessionEdit {
                    title: Some("Documentation".into()),
                    description: Some("user guide".into()),
                },
            )
            .await?
            .unwrap();
        assert_eq!(edited.title, "Documentation");
        assert_eq!(edited.description.as_deref(), Some("user guide"));

        assert!(storage.delete_session(first.id).await?);
        assert!(!storage.delete_session(first.id).await?);

        let remaining = storage
            .query_sessions(&SessionQuery {
                range: DateRange::day(test_date()),
                tag: None,
            })
            .await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "Documentation");
        Ok(())
    }
}
