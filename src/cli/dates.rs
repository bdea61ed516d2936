use std::fmt::Display;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::ValueEnum;
use now::DateTimeNow;

use crate::storage::query::DateRange;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Range of whole days shared by every command reading stored data.
#[derive(Debug, Clone, clap::Args)]
pub struct DateArgs {
    #[arg(
        long = "start",
        short,
        help = "First day of the range. Examples are \"today\", \"yesterday\", \"3 days ago\", \"15/03/2025\". Defaults to today"
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Last day of the range, inclusive. Same formats as --start. Defaults to today"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl DateArgs {
    pub fn range(&self) -> Result<DateRange> {
        self.range_at(Local::now())
    }

    fn range_at(&self, now: DateTime<Local>) -> Result<DateRange> {
        let today = now.beginning_of_day().date_naive();
        let start = match &self.start_date {
            Some(value) => parse_day(value, now, self.date_style)?,
            None => today,
        };
        let end = match &self.end_date {
            Some(value) => parse_day(value, now, self.date_style)?,
            None => today.max(start),
        };
        DateRange::new(start, end)
    }
}

fn parse_day(value: &str, now: DateTime<Local>, style: DateStyle) -> Result<NaiveDate> {
    parse_date_string(value, now, style.into())
        .map(|v| v.with_timezone(&Local).date_naive())
        .map_err(|e| anyhow!("Failed to parse date '{value}': {e}"))
}
