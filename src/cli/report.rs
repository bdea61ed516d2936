use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::{
    aggregation::rollup::{language_label, UsageRollup},
    storage::{
        query::{BucketQuery, LanguageFilter},
        UsageStorage,
    },
    utils::{
        percentage::{seconds_share, Percentage},
        time::format_seconds,
    },
};

use super::dates::DateArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    App,
    Language,
    /// Applications split by language.
    Editor,
    Day,
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[command(flatten)]
    dates: DateArgs,
    #[arg(long, value_enum, default_value_t = GroupBy::App, help = "How to group the totals")]
    by: GroupBy,
    #[arg(long, help = "Only count this application")]
    app: Option<String>,
    #[arg(
        long,
        conflicts_with = "unlabelled",
        help = "Only count this language"
    )]
    language: Option<String>,
    #[arg(long, help = "Only count time recorded without a language")]
    unlabelled: bool,
    #[arg(short = 'p', long = "percentage", help = "Hide entries below this share of the total", default_value_t = Percentage::default())]
    min_percentage: Percentage,
}

/// A printed report line.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub name: String,
    pub seconds: u64,
    pub share: Percentage,
}

/// Processes `report`. Prints totals of the stored buckets in the requested grouping.
pub async fn process_report_command<S: UsageStorage>(
    storage: &S,
    command: ReportCommand,
) -> Result<()> {
    let language = match (command.language, command.unlabelled) {
        (_, true) => Some(LanguageFilter::Unlabelled),
        (Some(language), false) => Some(LanguageFilter::Named(language)),
        (None, false) => None,
    };
    let query = BucketQuery {
        range: command.dates.range()?,
        app: command.app,
        language,
    };

    let buckets = storage.query_buckets(&query).await?;
    let rollup = UsageRollup::from_buckets(&buckets);
    if rollup.total_seconds == 0 {
        println!(
            "Nothing tracked between {} and {}",
            query.range.start(),
            query.range.end()
        );
        return Ok(());
    }

    for row in report_rows(&rollup, command.by, command.min_percentage) {
        println!(
            "{}%\t{}\t{}",
            *row.share as i32,
            format_seconds(row.seconds),
            row.name
        );
    }
    println!("Total\t{}", format_seconds(rollup.total_seconds));
    Ok(())
}

pub fn report_rows(rollup: &UsageRollup, by: GroupBy, min_percentage: Percentage) -> Vec<ReportRow> {
    let entries: Vec<(String, u64)> = match by {
        GroupBy::App => rollup
            .by_app
            .iter()
            .map(|(app, seconds)| (app.to_string(), *seconds))
            .collect(),
        GroupBy::Language => rollup
            .by_language
            .iter()
            .map(|(language, seconds)| (language_label(language.as_ref()).to_string(), *seconds))
            .collect(),
        GroupBy::Editor => rollup
            .by_app_language
            .iter()
            .map(|((app, language), seconds)| {
                (
                    format!("{app}\t{}", language_label(language.as_ref())),
                    *seconds,
                )
            })
            .collect(),
        GroupBy::Day => rollup
            .by_day
            .iter()
            .map(|(day, seconds)| (day.to_string(), *seconds))
            .collect(),
    };

    let mut rows: Vec<ReportRow> = entries
        .into_iter()
        .map(|(name, seconds)| ReportRow {
            share: seconds_share(seconds, rollup.total_seconds),
            name,
            seconds,
        })
        .filter(|row| row.share >= min_percentage)
        .collect();
    // Days read best in calendar order, everything else by time spent.
    if by != GroupBy::Day {
        rows.sort_by(|a, b| b.seconds.cmp(&a.seconds).then_with(|| a.name.cmp(&b.name)));
    }
    rows
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::{
        aggregation::rollup::UsageRollup,
        storage::entities::{BucketKey, DailyUsageBucket},
        utils::percentage::Percentage,
    };

    use super::{report_rows, GroupBy};

    fn bucket(day: u32, app: &str, language: Option<&str>, seconds: u64) -> DailyUsageBucket {
        DailyUsageBucket {
            key: BucketKey {
                date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                app: app.into(),
                language: language.map(Into::into),
            },
            time_spent_seconds: seconds,
            icon: None,
        }
    }

    fn rollup() -> UsageRollup {
        UsageRollup::from_buckets(&[
            bucket(11, "Editor", Some("Go"), 60),
            bucket(10, "Editor", Some("Rust"), 30),
            bucket(10, "Terminal", None, 10),
        ])
    }

    fn no_minimum() -> Percentage {
        Percentage::new_opt(0.).unwrap()
    }

    #[test]
    fn test_rows_by_app_sorted_by_time() {
        let rows = report_rows(&rollup(), GroupBy::App, no_minimum());

        assert_eq!(rows[0].name, "Editor");
        assert_eq!(*rows[0].share, 90.);
        assert_eq!(rows[1].name, "Terminal");
    }

    #[test]
    fn test_rows_by_day_in_calendar_order() {
        let rows = report_rows(&rollup(), GroupBy::Day, no_minimum());

        assert_eq!(rows[0].name, "2025-03-10");
        assert_eq!(rows[0].seconds, 40);
        assert_eq!(rows[1].name, "2025-03-11");
    }

    #[test]
    fn test_editor_rows_label_missing_language() {
        let rows = report_rows(&rollup(), GroupBy::Editor, no_minimum());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].name, "Terminal\tUnlabelled");
    }

    #[test]
    fn test_minimum_share_filters_rows() {
        let rows = report_rows(
            &rollup(),
            GroupBy::Language,
            Percentage::new_opt(20.).unwrap(),
        );

        let names: Vec<_> = rows.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Go", "Rust"]);
    }
}
