use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::utils::time::dates_between;

use super::entities::{DailyUsageBucket, FinalizedSession};

/// Range of local calendar dates, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(anyhow!("Range start {start} is after its end {end}"));
        }
        Ok(Self { start, end })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        dates_between(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageFilter {
    Named(String),
    /// Buckets stored without a language label.
    Unlabelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketQuery {
    pub range: DateRange,
    pub app: Option<String>,
    pub language: Option<LanguageFilter>,
}

impl BucketQuery {
    pub fn for_range(range: DateRange) -> Self {
        Self {
            range,
            app: None,
            language: None,
        }
    }

    pub fn matches(&self, bucket: &DailyUsageBucket) -> bool {
        let key = &bucket.key;
        let app_matches = self.app.as_deref().map_or(true, |app| *key.app == *app);
        let language_matches = match &self.language {
            None => true,
            Some(LanguageFilter::Named(language)) => {
                key.language.as_deref().is_some_and(|v| v == language.as_str())
            }
            Some(LanguageFilter::Unlabelled) => key.language.is_none(),
        };
        self.range.contains(key.date) && app_matches && language_matches
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuery {
    pub range: DateRange,
    pub tag: Option<String>,
}

impl SessionQuery {
    pub fn matches(&self, session: &FinalizedSession) -> bool {
        self.range.contains(session.date)
            && self.tag.as_ref().map_or(true, |tag| session.tags.contains(tag))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::storage::entities::{BucketKey, DailyUsageBucket};

    use super::{BucketQuery, DateRange, LanguageFilter};

    fn bucket(day: u32, language: Option<&str>) -> DailyUsageBucket {
        DailyUsageBucket {
            key: BucketKey {
                date: NaiveDate::from_ymd_opt(2018, 7, day).unwrap(),
                app: "Editor".into(),
                language: language.map(Into::into),
            },
            time_spent_seconds: 10,
            icon: None,
        }
    }

    #[test]
    fn test_range_rejects_reversed_dates() {
        let start = NaiveDate::from_ymd_opt(2018, 7, 5).unwrap();
        let end = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();
        assert!(DateRange::new(start, end).is_err());
    }

    #[test]
    fn test_bucket_query_filters() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(),
            NaiveDate::from_ymd_opt(2018, 7, 5).unwrap(),
        )
        .unwrap();
        let mut query = BucketQuery::for_range(range);
        assert!(query.matches(&bucket(4, Some("Go"))));
        assert!(!query.matches(&bucket(6, Some("Go"))));

        query.language = Some(LanguageFilter::Unlabelled);
        assert!(query.matches(&bucket(5, None)));
        assert!(!query.matches(&bucket(5, Some("Go"))));

        query.language = Some(LanguageFilter::Named("Go".into()));
        query.app = Some("Terminal".into());
        assert!(!query.matches(&bucket(5, Some("Go"))));
    }
}
