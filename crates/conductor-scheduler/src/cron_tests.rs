use super::*;
use chrono::Weekday;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

#[test]
fn test_every_fifteen_minutes() {
    let cron = CronExpression::parse("*/15 * * * *").unwrap();
    assert_eq!(cron.minutes(), vec![0, 15, 30, 45]);

    for minute in 0..60 {
        let expected = minute % 15 == 0;
        assert_eq!(cron.matches(&at(2024, 5, 1, 10, minute)), expected, "minute {}", minute);
    }
}

#[test]
fn test_monday_nine_am_only() {
    let cron = CronExpression::parse("0 9 * * 1").unwrap();

    // 2024-01-08 is a Monday.
    assert!(cron.matches(&at(2024, 1, 8, 9, 0)));
    assert!(!cron.matches(&at(2024, 1, 9, 9, 0)));
    assert!(!cron.matches(&at(2024, 1, 8, 9, 1)));
    assert!(!cron.matches(&at(2024, 1, 8, 10, 0)));

    let next = cron.next_execution(at(2024, 1, 3, 12, 0)).unwrap();
    assert_eq!(next, at(2024, 1, 8, 9, 0));
    assert_eq!(next.weekday(), Weekday::Mon);
}

#[test]
fn test_day_of_month_and_weekday_must_both_match() {
    let cron = CronExpression::parse("0 0 1 * 1").unwrap();

    // Monday 1 January 2024.
    assert!(cron.matches(&at(2024, 1, 1, 0, 0)));
    // Monday 8 January 2024.
    assert!(!cron.matches(&at(2024, 1, 8, 0, 0)));
    // Thursday 1 February 2024.
    assert!(!cron.matches(&at(2024, 2, 1, 0, 0)));

    let next = cron.next_execution(at(2024, 1, 2, 0, 0)).unwrap();
    assert_eq!(next, at(2024, 4, 1, 0, 0));
    assert_eq!(next.weekday(), Weekday::Mon);

    let friday_13th = CronExpression::parse("0 0 13 * 5").unwrap();
    // Sunday 13 October 2024.
    assert!(!friday_13th.matches(&at(2024, 10, 13, 0, 0)));
    assert_eq!(
        friday_13th.next_execution(at(2024, 9, 14, 0, 0)),
        Some(at(2024, 12, 13, 0, 0))
    );
}

#[test]
fn test_lists_ranges_and_steps() {
    let cron = CronExpression::parse("5,10-12,50/5 * * * *").unwrap();
    assert_eq!(cron.minutes(), vec![5, 10, 11, 12, 50, 55]);

    let cron = CronExpression::parse("0-30/10 * * * *").unwrap();
    assert_eq!(cron.minutes(), vec![0, 10, 20, 30]);
}

#[test]
fn test_next_starts_at_following_minute() {
    let cron = CronExpression::parse("*/15 * * * *").unwrap();
    let from = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 42).unwrap();
    assert_eq!(cron.next_execution(from), Some(at(2024, 5, 1, 10, 30)));

    let every_minute = CronExpression::parse("* * * * *").unwrap();
    assert_eq!(every_minute.next_execution(from), Some(at(2024, 5, 1, 10, 16)));
}

#[test]
fn test_previous_execution() {
    let cron = CronExpression::parse("0 9 * * 1").unwrap();
    let prev = cron.previous_execution(at(2024, 1, 8, 9, 0)).unwrap();
    assert_eq!(prev, at(2024, 1, 1, 9, 0));
}

#[test]
fn test_impossible_date_has_no_next() {
    let cron = CronExpression::parse("0 0 31 2 *").unwrap();
    assert_eq!(cron.next_execution(at(2024, 1, 1, 0, 0)), None);
}

#[test]
fn test_timezone_evaluation() {
    let next = get_next_execution_time("0 9 * * *", at(2024, 1, 10, 0, 0), "America/New_York")
        .unwrap()
        .unwrap();
    assert_eq!(next, at(2024, 1, 10, 14, 0));

    let summer = get_next_execution_time("0 9 * * *", at(2024, 7, 10, 0, 0), "America/New_York")
        .unwrap()
        .unwrap();
    assert_eq!(summer, at(2024, 7, 10, 13, 0));
}

#[test]
fn test_invalid_timezone() {
    let err = get_next_execution_time("* * * * *", Utc::now(), "Mars/Olympus").unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTimezone(_)));
}

#[test]
fn test_upcoming() {
    let cron = CronExpression::parse("0 */6 * * *").unwrap();
    let times = cron.upcoming(at(2024, 3, 1, 0, 0), &Tz::UTC, 3);
    assert_eq!(
        times,
        vec![at(2024, 3, 1, 6, 0), at(2024, 3, 1, 12, 0), at(2024, 3, 1, 18, 0)]
    );
}

#[test]
fn test_parse_errors() {
    assert_eq!(
        CronExpression::parse("* * * *").unwrap_err(),
        CronError::FieldCount { found: 4 }
    );
    assert_eq!(
        CronExpression::parse("60 * * * *").unwrap_err(),
        CronError::OutOfRange {
            field: "minute",
            value: 60,
            min: 0,
            max: 59
        }
    );
    assert!(matches!(
        CronExpression::parse("* * 0 * *").unwrap_err(),
        CronError::OutOfRange { field: "day-of-month", .. }
    ));
    assert!(matches!(
        CronExpression::parse("* * * * 7").unwrap_err(),
        CronError::OutOfRange { field: "weekday", .. }
    ));
    assert!(matches!(
        CronExpression::parse("abc * * * *").unwrap_err(),
        CronError::InvalidNumber { .. }
    ));
    assert!(matches!(
        CronExpression::parse("*/0 * * * *").unwrap_err(),
        CronError::InvalidStep { .. }
    ));
    assert!(matches!(
        CronExpression::parse("* 10-2 * * *").unwrap_err(),
        CronError::InvalidRange { field: "hour", .. }
    ));
    assert!(matches!(
        CronExpression::parse("1,,2 * * * *").unwrap_err(),
        CronError::InvalidNumber { .. }
    ));
}

#[test]
fn test_validate_and_display() {
    assert!(validate_cron_expression("0 12 * * 1-5").is_ok());
    assert!(validate_cron_expression("0 12 * *").is_err());

    let cron: CronExpression = "  0   12 * * 1-5 ".parse().unwrap();
    assert_eq!(cron.to_string(), "0 12 * * 1-5");
}
