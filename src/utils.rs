use crate::error::{ReconcileError, Result};
use crate::schema::Granularity;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

/// Midnight UTC of the given calendar day.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// UTC calendar day of an instant.
pub fn utc_day(instant: DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// Formats the bucket an instant falls into.
///
/// # Examples
/// - Day: `2023-06-01`
/// - Week: `2023-W22` (ISO week-numbering year)
/// - Month: `2023-06`
pub fn bucket_key(instant: DateTime<Utc>, granularity: Granularity) -> String {
    let date = utc_day(instant);
    match granularity {
        Granularity::Day => date.format("%Y-%m-%d").to_string(),
        Granularity::Week => {
            let week = date.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
        Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
    }
}

/// `numerator / denominator`, or zero when the denominator is zero.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Percent change from `base` to `current`; zero when there is no positive base.
pub fn percent_change(base: f64, current: f64) -> f64 {
    if base > 0.0 {
        (current - base) / base * 100.0
    } else {
        0.0
    }
}

pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ReconcileError::DateError(format!(
            "Invalid date format: {}. Expected YYYY-MM-DD",
            value
        ))
    })
}

/// Parses an English or Italian month name, or a month number.
pub fn parse_month_name(name: &str) -> Option<u32> {
    let lower = name.trim().to_lowercase();
    if let Ok(n) = lower.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }

    let month = match lower.as_str() {
        "january" | "gennaio" => 1,
        "february" | "febbraio" => 2,
        "march" | "marzo" => 3,
        "april" | "aprile" => 4,
        "may" | "maggio" => 5,
        "june" | "giugno" => 6,
        "july" | "luglio" => 7,
        "august" | "agosto" => 8,
        "september" | "settembre" => 9,
        "october" | "ottobre" => 10,
        "november" | "novembre" => 11,
        "december" | "dicembre" => 12,
        _ => return None,
    };
    Some(month)
}
