#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]

use chrono::{DateTime, TimeZone, Utc};
use claims::{assert_none, assert_some};
use cronwork::Cron;

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .unwrap()
}

#[test]
fn parsing_is_idempotent() {
    for expr in [
        "* * * * * *",
        "0 30 9-17 ? * mon-fri",
        "*/5 10,20,30 0 1 jan sun",
        "10-50/3 30 */2 * * *",
    ] {
        assert_eq!(Cron::parse(expr).unwrap(), Cron::parse(expr).unwrap());
    }
}

#[test]
fn fields_may_be_separated_by_tabs() {
    assert_eq!(
        Cron::parse("0\t0 0\t? *\twed").unwrap(),
        Cron::parse("0 0 0 ? * wed").unwrap()
    );
}

#[test]
fn next_is_strictly_increasing() {
    let cron = Cron::parse("*/7 * * * * *").unwrap();
    let mut t = at(2024, 2, 28, 23, 59, 0);
    for _ in 0..100 {
        let next = assert_some!(cron.next_after(t));
        assert!(next > t);
        t = next;
    }
}

#[test]
fn wednesday_at_midnight() {
    let cron = Cron::parse("0 0 0 ? * wed").unwrap();

    // 2024-01-01 was a Monday.
    let next = assert_some!(cron.next_after(at(2024, 1, 1, 0, 0, 0)));
    assert_eq!(next, at(2024, 1, 3, 0, 0, 0));

    // Strictly after: a matching reference time yields the week after.
    assert_eq!(assert_some!(cron.next_after(next)), at(2024, 1, 10, 0, 0, 0));
}

#[test]
fn ranges_with_steps() {
    let cron = Cron::parse("10-50/3 30 */2 * * *").unwrap();

    let next = assert_some!(cron.next_after(at(2024, 1, 1, 0, 0, 0)));
    assert_eq!(next, at(2024, 1, 1, 0, 30, 10));

    assert_eq!(assert_some!(cron.next_after(next)), at(2024, 1, 1, 0, 30, 13));
}

#[test]
fn concrete_day_fields_combine_with_or() {
    // Both day fields concrete: noon on the 15th or on any Monday.
    let cron = Cron::parse("0 0 12 15 * mon").unwrap();

    // June 2024 starts on a Saturday; Mondays are the 3rd, 10th, 17th.
    let mut t = at(2024, 6, 1, 0, 0, 0);
    for want in [
        at(2024, 6, 3, 12, 0, 0),
        at(2024, 6, 10, 12, 0, 0),
        at(2024, 6, 15, 12, 0, 0),
        at(2024, 6, 17, 12, 0, 0),
    ] {
        t = assert_some!(cron.next_after(t));
        assert_eq!(t, want);
    }
}

#[test]
fn wildcard_day_of_month_combines_with_and() {
    // DOM is a wildcard: noon on Mondays only, the 15th does not qualify.
    let cron = Cron::parse("0 0 12 * * mon").unwrap();
    let next = assert_some!(cron.next_after(at(2024, 6, 14, 0, 0, 0)));
    assert_eq!(next, at(2024, 6, 17, 12, 0, 0));
}

#[test]
fn search_is_capped_at_five_years() {
    // February 31st never exists.
    let feb31 = Cron::parse("0 0 0 31 2 *").unwrap();
    assert_none!(feb31.next_after(at(2024, 1, 1, 0, 0, 0)));
    assert_none!(feb31.next_after(at(1999, 12, 31, 23, 59, 59)));

    let leap_day = Cron::parse("0 0 0 29 2 *").unwrap();
    assert_eq!(
        assert_some!(leap_day.next_after(at(2024, 3, 1, 0, 0, 0))),
        at(2028, 2, 29, 0, 0, 0)
    );
    // The leap day after 2096-02-29 is 2104-02-29 (2100 is not a leap
    // year), which lies beyond the horizon.
    assert_none!(leap_day.next_after(at(2096, 3, 1, 0, 0, 0)));

    // A reference instant on Feb 29 itself must not break the horizon: the
    // search still runs and still finds matches.
    let every_second = Cron::parse("* * * * * *").unwrap();
    assert_eq!(
        assert_some!(every_second.next_after(at(2024, 2, 29, 12, 0, 0))),
        at(2024, 2, 29, 12, 0, 1)
    );
    assert_eq!(
        assert_some!(leap_day.next_after(at(2024, 2, 29, 12, 0, 0))),
        at(2028, 2, 29, 0, 0, 0)
    );
}

#[test]
fn month_and_weekday_names() {
    let cron = Cron::parse("0 30 9 ? mar fri").unwrap();
    // 2024-03-01 was a Friday.
    let next = assert_some!(cron.next_after(at(2024, 1, 1, 0, 0, 0)));
    assert_eq!(next, at(2024, 3, 1, 9, 30, 0));
}

#[test]
fn parse_errors_are_descriptive() {
    let err = |expr: &str| Cron::parse(expr).unwrap_err().to_string();

    insta::assert_snapshot!(err(""), @"empty cron expression");
    insta::assert_snapshot!(err("* * * * *"), @r#"expected 6 fields, got 5 in "* * * * *""#);
    insta::assert_snapshot!(err("sixty * * * * *"), @r#""sixty" is not a non-negative integer or a known name"#);
    insta::assert_snapshot!(err("-5 * * * * *"), @r#""" is not a non-negative integer or a known name"#);
    insta::assert_snapshot!(err("60 * * * * *"), @r#"end 60 is above the field maximum 59 in "60""#);
    insta::assert_snapshot!(err("* * * 0 * *"), @r#"start 0 is below the field minimum 1 in "0""#);
    insta::assert_snapshot!(err("1-2-3 * * * * *"), @r#"at most one '-' is allowed in "1-2-3""#);
    insta::assert_snapshot!(err("1/2/3 * * * * *"), @r#"at most one '/' is allowed in "1/2/3""#);
    insta::assert_snapshot!(err("5-2 * * * * *"), @r#"start 5 is greater than end 2 in "5-2""#);
    insta::assert_snapshot!(err("*/0 * * * * *"), @r#"step must be a positive integer in "*/0""#);
}
