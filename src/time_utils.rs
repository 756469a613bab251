use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DateRangeError {
    #[error("Invalid date range: end {end} precedes start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Unsupported time units: {0}")]
    UnsupportedUnits(String),
}

/// How dates are drawn from a requested range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSampling {
    /// Every calendar day of the range
    #[default]
    Daily,
    /// The first `n` days of every month that starts inside the range
    LeadingDaysOfMonth(u32),
}

/// All calendar dates between `start` and `end`, inclusive
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DateRangeError> {
    check_range(start, end)?;
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}

/// Dates of `[start, end]` selected by `sampling`, in increasing order
pub fn sample_dates(
    start: NaiveDate,
    end: NaiveDate,
    sampling: DateSampling,
) -> Result<Vec<NaiveDate>, DateRangeError> {
    match sampling {
        DateSampling::Daily => date_range(start, end),
        DateSampling::LeadingDaysOfMonth(days) => {
            check_range(start, end)?;
            let mut dates = Vec::new();
            let mut month_start = first_month_start_on_or_after(start);
            while month_start <= end {
                dates.extend(
                    month_start
                        .iter_days()
                        .take(days as usize)
                        .take_while(|d| *d <= end),
                );
                month_start = next_month_start(month_start);
            }
            Ok(dates)
        }
    }
}

/// Partition an ordered date sequence by calendar year, preserving order
pub fn group_by_year(dates: &[NaiveDate]) -> Vec<(i32, Vec<NaiveDate>)> {
    let mut groups: Vec<(i32, Vec<NaiveDate>)> = Vec::new();
    for &date in dates {
        match groups.last_mut() {
            Some((year, group)) if *year == date.year() => group.push(date),
            _ => groups.push((date.year(), vec![date])),
        }
    }
    groups
}

/// Lazy per-year view of a sampled date range.
///
/// Each call to `next` materialises only one year of dates. Years whose
/// selection is empty are skipped.
#[derive(Debug, Clone)]
pub struct YearGroups {
    start: NaiveDate,
    end: NaiveDate,
    sampling: DateSampling,
    next_year: i32,
}

/// Build the lazy year grouping for `[start, end]`.
///
/// Fails before anything else happens when `end < start`.
pub fn year_groups(
    start: NaiveDate,
    end: NaiveDate,
    sampling: DateSampling,
) -> Result<YearGroups, DateRangeError> {
    check_range(start, end)?;
    Ok(YearGroups {
        start,
        end,
        sampling,
        next_year: start.year(),
    })
}

impl Iterator for YearGroups {
    type Item = (i32, Vec<NaiveDate>);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_year <= self.end.year() {
            let year = self.next_year;
            self.next_year += 1;

            let window_start = self.start.max(NaiveDate::from_ymd_opt(year, 1, 1)?);
            let window_end = self.end.min(NaiveDate::from_ymd_opt(year, 12, 31)?);
            let dates = sample_dates(window_start, window_end, self.sampling).ok()?;
            if !dates.is_empty() {
                return Some((year, dates));
            }
        }
        None
    }
}

/// Parse a date given as `YYYY-MM-DD` or `YYYYMMDD`
pub fn parse_date(date_str: &str) -> Result<NaiveDate, DateRangeError> {
    let trimmed = date_str.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .map_err(|_| {
            DateRangeError::InvalidDate(format!(
                "{}. Expected: YYYY-MM-DD or YYYYMMDD",
                date_str
            ))
        })
}

/// CF time units written to yearly archives
pub const ARCHIVE_TIME_UNITS: &str = "days since 1970-01-01 00:00:00";

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Encode a date as days since 1970-01-01
pub fn days_since_epoch(date: NaiveDate) -> f64 {
    (date - epoch()).num_days() as f64
}

/// Decode CF-style time values (`<unit> since <reference>`) into timestamps
pub fn decode_time_values(
    values: &[f64],
    units: &str,
) -> Result<Vec<NaiveDateTime>, DateRangeError> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| DateRangeError::UnsupportedUnits(units.to_string()))?;

    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "days" | "day" => 86_400.0,
        "hours" | "hour" => 3_600.0,
        "minutes" | "minute" | "mins" => 60.0,
        "seconds" | "second" | "secs" => 1.0,
        _ => return Err(DateRangeError::UnsupportedUnits(units.to_string())),
    };
    let reference = parse_reference_time(reference.trim())
        .ok_or_else(|| DateRangeError::UnsupportedUnits(units.to_string()))?;

    Ok(values
        .iter()
        .map(|v| reference + Duration::milliseconds((v * seconds_per_unit * 1000.0).round() as i64))
        .collect())
}

fn parse_reference_time(reference: &str) -> Option<NaiveDateTime> {
    let reference = reference.trim_end_matches('Z').trim_end_matches(" UTC");
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(reference, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(reference, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), DateRangeError> {
    if end < start {
        return Err(DateRangeError::InvalidRange { start, end });
    }
    Ok(())
}

fn first_month_start_on_or_after(date: NaiveDate) -> NaiveDate {
    if date.day() == 1 {
        date
    } else {
        next_month_start(date)
    }
}

fn next_month_start(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_inclusive() {
        let dates = date_range(ymd(2010, 1, 1), ymd(2010, 1, 3)).unwrap();
        assert_eq!(dates, vec![ymd(2010, 1, 1), ymd(2010, 1, 2), ymd(2010, 1, 3)]);
    }

    #[test]
    fn test_date_range_single_day() {
        let dates = date_range(ymd(2020, 9, 1), ymd(2020, 9, 1)).unwrap();
        assert_eq!(dates, vec![ymd(2020, 9, 1)]);
    }

    #[test]
    fn test_leading_days_clip_to_end() {
        let dates = sample_dates(
            ymd(2010, 1, 1),
            ymd(2010, 1, 10),
            DateSampling::LeadingDaysOfMonth(28),
        )
        .unwrap();
        assert_eq!(dates.len(), 10);
    }

    #[test]
    fn test_leading_days_skip_partial_first_month() {
        let dates = sample_dates(
            ymd(2010, 1, 15),
            ymd(2010, 3, 31),
            DateSampling::LeadingDaysOfMonth(28),
        )
        .unwrap();
        assert_eq!(dates.first(), Some(&ymd(2010, 2, 1)));
        assert_eq!(dates.last(), Some(&ymd(2010, 3, 28)));
        assert_eq!(dates.len(), 56);
    }

    #[test]
    fn test_decode_minutes_since() {
        let times = decode_time_values(&[0.0, 60.0], "minutes since 2010-01-01 00:30:00").unwrap();
        assert_eq!(times[0], ymd(2010, 1, 1).and_hms_opt(0, 30, 0).unwrap());
        assert_eq!(times[1], ymd(2010, 1, 1).and_hms_opt(1, 30, 0).unwrap());
    }
}
