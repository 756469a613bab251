use chrono::{Datelike, NaiveDate};
use merra2_rust::time_utils::{
    date_range, days_since_epoch, decode_time_values,
    group_by_year, parse_date, sample_dates, year_groups, DateRangeError, DateSampling,
};

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_range_length_matches_day_difference() {
    for (start, end) in [
        (ymd(2010, 1, 1), ymd(2010, 1, 3)),
        (ymd(2011, 12, 30), ymd(2012, 1, 2)),
        (ymd(2012, 2, 1), ymd(2012, 3, 1)),
        (ymd(2010, 1, 1), ymd(2020, 12, 31)),
    ] {
        let dates = date_range(start, end).unwrap();
        assert_eq!(dates.len() as i64, (end - start).num_days() + 1);
        assert_eq!(dates.first(), Some(&start));
        assert_eq!(dates.last(), Some(&end));
        assert!(dates.windows(2).all(|w| (w[1] - w[0]).num_days() == 1));
    }
}

#[test]
fn test_reversed_range_is_rejected() {
    let err = date_range(ymd(2011, 1, 1), ymd(2010, 12, 31)).unwrap_err();
    assert!(matches!(err, DateRangeError::InvalidRange { .. }));
    assert!(year_groups(ymd(2011, 1, 1), ymd(2010, 12, 31), DateSampling::Daily).is_err());
}

#[test]
fn test_year_groups_cover_range_in_order() {
    let groups: Vec<_> = year_groups(ymd(2015, 12, 30), ymd(2017, 1, 2), DateSampling::Daily)
        .unwrap()
        .collect();
    let years: Vec<i32> = groups.iter().map(|(y, _)| *y).collect();
    assert_eq!(years, vec![2015, 2016, 2017]);
    assert_eq!(groups[0].1.len(), 2);
    assert_eq!(groups[1].1.len(), 366);
    assert_eq!(groups[2].1.len(), 2);
    for (year, dates) in &groups {
        assert!(dates.iter().all(|d| d.year() == *year));
    }
}

#[test]
fn test_group_by_year_preserves_order() {
    let dates = date_range(ymd(2019, 12, 31), ymd(2020, 1, 1)).unwrap();
    let groups = group_by_year(&dates);
    assert_eq!(groups, vec![(2019, vec![ymd(2019, 12, 31)]), (2020, vec![ymd(2020, 1, 1)])]);
}

#[test]
fn test_leading_days_of_month_sampling() {
    let dates = sample_dates(
        ymd(2020, 1, 1),
        ymd(2020, 3, 31),
        DateSampling::LeadingDaysOfMonth(28),
    )
    .unwrap();
    assert_eq!(dates.len(), 3 * 28);
    assert!(dates.iter().all(|d| d.day() <= 28));
    assert_eq!(dates.last(), Some(&ymd(2020, 3, 28)));
}

#[test]
fn test_leading_days_year_groups_skip_empty_years() {
    // Starts after the 1st, so no month of 2014 begins inside the range
    let groups: Vec<_> = year_groups(
        ymd(2014, 12, 15),
        ymd(2015, 1, 3),
        DateSampling::LeadingDaysOfMonth(28),
    )
    .unwrap()
    .collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].0, 2015);
    assert_eq!(groups[0].1, date_range(ymd(2015, 1, 1), ymd(2015, 1, 3)).unwrap());
}

#[test]
fn test_parse_date_formats() {
    assert_eq!(parse_date("2020-09-01").unwrap(), ymd(2020, 9, 1));
    assert_eq!(parse_date("20200901").unwrap(), ymd(2020, 9, 1));
    assert!(matches!(parse_date("2020-13-01"), Err(DateRangeError::InvalidDate(_))));
}

#[test]
fn test_time_decoding_round_trips_archive_units() {
    let dates = [ymd(1970, 1, 1), ymd(2010, 1, 1), ymd(2020, 12, 31)];
    let values: Vec<f64> = dates.iter().map(|d| days_since_epoch(*d)).collect();
    assert_eq!(values[0], 0.0);
    let decoded = decode_time_values(&values, "days since 1970-01-01 00:00:00").unwrap();
    let decoded: Vec<NaiveDate> = decoded.into_iter().map(|dt| dt.date()).collect();
    assert_eq!(decoded, dates);
}

#[test]
fn test_hours_since_units() {
    let decoded = decode_time_values(&[0.0, 36.0], "hours since 2010-01-01").unwrap();
    assert_eq!(decoded[1].date(), ymd(2010, 1, 2));
    assert!(decode_time_values(&[1.0], "fortnights since 2010-01-01").is_err());
}
