use std::time::Duration;

use chrono::NaiveDate;

/// This is the standard way of converting a date to a file name in worktally.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns dates between start (inclusive) and end (inclusive).
pub fn dates_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

pub fn format_seconds(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds / 60 % 60;
    let seconds = seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn format_duration(duration: Duration) -> String {
    format_seconds(duration.as_secs())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{dates_between, format_seconds};

    #[test]
    fn test_dates_between_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let dates = dates_between(start, end).collect::<Vec<_>>();
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn test_dates_between_reversed_is_empty() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(dates_between(start, end).count(), 0);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(5), "5s");
        assert_eq!(format_seconds(65), "1m5s");
        assert_eq!(format_seconds(3725), "1h2m5s");
    }
}
