use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;

use crate::storage::entities::DailyUsageBucket;

/// Label used for buckets stored without a language.
pub const UNLABELLED: &str = "Unlabelled";

/// Totals computed from a set of buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageRollup {
    pub total_seconds: u64,
    pub by_app: BTreeMap<Arc<str>, u64>,
    pub by_language: BTreeMap<Option<Arc<str>>, u64>,
    /// Editor totals, time per application split by language.
    pub by_app_language: BTreeMap<(Arc<str>, Option<Arc<str>>), u64>,
    pub by_day: BTreeMap<NaiveDate, u64>,
}

impl UsageRollup {
    pub fn from_buckets<'a>(buckets: impl IntoIterator<Item = &'a DailyUsageBucket>) -> Self {
        let mut rollup = Self::default();
        for bucket in buckets {
            rollup.add(bucket);
        }
        rollup
    }

    fn add(&mut self, bucket: &DailyUsageBucket) {
        let key = &bucket.key;
        let seconds = bucket.time_spent_seconds;
        self.total_seconds += seconds;
        *self.by_app.entry(key.app.clone()).or_default() += seconds;
        *self.by_language.entry(key.language.clone()).or_default() += seconds;
        *self
            .by_app_language
            .entry((key.app.clone(), key.language.clone()))
            .or_default() += seconds;
        *self.by_day.entry(key.date).or_default() += seconds;
    }
}

pub fn language_label(language: Option<&Arc<str>>) -> Arc<str> {
    language.cloned().unwrap_or_else(|| UNLABELLED.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use crate::storage::entities::{BucketKey, DailyUsageBucket};

    use super::{language_label, UsageRollup, UNLABELLED};

    fn bucket(day: u32, app: &str, language: Option<&str>, seconds: u64) -> DailyUsageBucket {
        DailyUsageBucket {
            key: BucketKey {
                date: NaiveDate::from_ymd_opt(2018, 7, day).unwrap(),
                app: app.into(),
                language: language.map(Into::into),
            },
            time_spent_seconds: seconds,
            icon: None,
        }
    }

    fn buckets() -> Vec<DailyUsageBucket> {
        vec![
            bucket(4, "Editor", Some("Go"), 30),
            bucket(4, "Editor", Some("Rust"), 20),
            bucket(5, "Editor", Some("Go"), 10),
            bucket(5, "Terminal", None, 40),
        ]
    }

    #[test]
    fn test_totals() {
        let rollup = UsageRollup::from_buckets(&buckets());

        assert_eq!(rollup.total_seconds, 100);
        assert_eq!(rollup.by_app["Editor"], 60);
        assert_eq!(rollup.by_language[&Some(Arc::<str>::from("Go"))], 40);
        assert_eq!(rollup.by_language[&None::<Arc<str>>], 40);
        assert_eq!(
            rollup.by_app_language[&(Arc::<str>::from("Editor"), Some(Arc::<str>::from("Go")))],
            40
        );
        assert_eq!(
            rollup.by_day[&NaiveDate::from_ymd_opt(2018, 7, 5).unwrap()],
            50
        );
    }

    #[test]
    fn test_empty_rollup() {
        let rollup = UsageRollup::from_buckets(&[]);
        assert_eq!(rollup.total_seconds, 0);
        assert!(rollup.by_app.is_empty());
        assert_eq!(&*language_label(None), UNLABELLED);
    }
}
