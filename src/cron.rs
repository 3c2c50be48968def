//! Six-field cron expressions, compiled to bitfields.
//!
//! Field order is `second minute hour day-of-month month day-of-week`:
//!
//! ```text
//! *    *    *    *    *    *
//! -    -    -    -    -    -
//! |    |    |    |    |    + day of week (0-6, Sunday = 0, or sun-sat)
//! |    |    |    |    +----- month (1-12, or jan-dec)
//! |    |    |    +---------- day of month (1-31)
//! |    |    +--------------- hour (0-23)
//! |    +-------------------- minute (0-59)
//! +------------------------- second (0-59)
//! ```
//!
//! Each field is a comma-separated list of `range[/step]` terms, where
//! `range` is `*`, `?`, `N` or `N-M`. `?` is accepted as a synonym for `*`
//! in every field, not only the day fields.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use crate::errors::CronError;

/// Highest bit of a field word, set when the source field was a wildcard
/// (`*` or `?`). Wildcards change day matching, see [`Cron::next_after`].
const STAR_BIT: u64 = 1 << 63;

const FIELD_COUNT: usize = 6;

/// How far past the reference time the search may roam. Expressed in days
/// rather than calendar years so the horizon is well-defined for every
/// reference date, Feb 29 included.
const SEARCH_HORIZON_DAYS: i64 = 5 * 365 + 2;

/// Value domain of a single field.
struct Bounds {
    min: u32,
    max: u32,
    names: &'static [(&'static str, u32)],
}

const SECONDS: Bounds = Bounds {
    min: 0,
    max: 59,
    names: &[],
};

const MINUTES: Bounds = Bounds {
    min: 0,
    max: 59,
    names: &[],
};

const HOURS: Bounds = Bounds {
    min: 0,
    max: 23,
    names: &[],
};

const DAYS_OF_MONTH: Bounds = Bounds {
    min: 1,
    max: 31,
    names: &[],
};

const MONTHS: Bounds = Bounds {
    min: 1,
    max: 12,
    names: &[
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
    ],
};

const DAYS_OF_WEEK: Bounds = Bounds {
    min: 0,
    max: 6,
    names: &[
        ("sun", 0),
        ("mon", 1),
        ("tue", 2),
        ("wed", 3),
        ("thu", 4),
        ("fri", 5),
        ("sat", 6),
    ],
};

/// A compiled six-field cron schedule.
///
/// Each field is a 64-bit word whose bit *i* is set when value *i* matches.
/// Parsing the same expression always yields an equal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cron {
    second: u64,
    minute: u64,
    hour: u64,
    dom: u64,
    month: u64,
    dow: u64,
}

impl Cron {
    /// Compile an expression, validating every field against its domain.
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        if expr.trim().is_empty() {
            return Err(CronError::Empty);
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(CronError::FieldCount {
                expr: expr.to_string(),
                found: fields.len(),
            });
        }

        Ok(Self {
            second: parse_field(fields[0], &SECONDS)?,
            minute: parse_field(fields[1], &MINUTES)?,
            hour: parse_field(fields[2], &HOURS)?,
            dom: parse_field(fields[3], &DAYS_OF_MONTH)?,
            month: parse_field(fields[4], &MONTHS)?,
            dow: parse_field(fields[5], &DAYS_OF_WEEK)?,
        })
    }

    /// The smallest instant strictly after `after`, truncated to whole
    /// seconds, whose components all match this schedule.
    ///
    /// Returns `None` when no matching instant exists within five years of
    /// `after` (for example `0 0 0 31 2 *`, which never matches at all).
    ///
    /// Day-of-month and day-of-week combine per cron convention: when either
    /// field was written as a wildcard both must match, otherwise a day
    /// matching one of the two suffices.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let deadline = after.checked_add_signed(Duration::days(SEARCH_HORIZON_DAYS))?;
        let mut t = at_second(after.timestamp() + 1)?;

        // Climb from the most to the least significant field: advance the
        // mismatching field by one unit and zero everything below it. A
        // wrapping field carries into a higher one, which may then mismatch,
        // so the climb restarts from the top.
        'restart: loop {
            if t > deadline {
                return None;
            }

            while !bit_set(self.month, t.month()) {
                t = start_of_next_month(&t)?;
                if t.month() == 1 {
                    continue 'restart;
                }
            }

            while !self.day_matches(&t) {
                t = start_of_next_day(&t)?;
                if t.day() == 1 {
                    continue 'restart;
                }
            }

            while !bit_set(self.hour, t.hour()) {
                t = at_second((t.timestamp() / 3600 + 1) * 3600)?;
                if t.hour() == 0 {
                    continue 'restart;
                }
            }

            while !bit_set(self.minute, t.minute()) {
                t = at_second((t.timestamp() / 60 + 1) * 60)?;
                if t.minute() == 0 {
                    continue 'restart;
                }
            }

            while !bit_set(self.second, t.second()) {
                t = at_second(t.timestamp() + 1)?;
                if t.second() == 0 {
                    continue 'restart;
                }
            }

            if t > deadline {
                return None;
            }
            return Some(t);
        }
    }

    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom_match = bit_set(self.dom, t.day());
        let dow_match = bit_set(self.dow, t.weekday().num_days_from_sunday());
        if self.dom & STAR_BIT != 0 || self.dow & STAR_BIT != 0 {
            dom_match && dow_match
        } else {
            dom_match || dow_match
        }
    }
}

impl FromStr for Cron {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn bit_set(bits: u64, value: u32) -> bool {
    debug_assert!(value < 64);
    bits & (1 << value) != 0
}

/// The instant `ts` seconds after the Unix epoch.
fn at_second(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

fn start_of_next_month(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

fn start_of_next_day(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(t.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc())
}

/// A field is a comma-separated list of terms; the field word is the union
/// of the term contributions.
fn parse_field(field: &str, bounds: &Bounds) -> Result<u64, CronError> {
    let mut bits = 0;
    for term in field.split(',') {
        bits |= parse_term(term, bounds)?;
    }
    Ok(bits)
}

/// Grammar: `range[/step]` where `range` is `*`, `?`, `N` or `N-M`.
fn parse_term(term: &str, bounds: &Bounds) -> Result<u64, CronError> {
    let (range, step) = match term.split_once('/') {
        None => (term, None),
        Some((range, step)) => {
            if step.contains('/') {
                return Err(CronError::ExtraSlash {
                    term: term.to_string(),
                });
            }
            (range, Some(step))
        }
    };

    let mut sentinel = 0;
    let (start, mut end) = if range == "*" || range == "?" {
        sentinel = STAR_BIT;
        (bounds.min, bounds.max)
    } else {
        match range.split_once('-') {
            None => {
                let value = parse_value(range, bounds)?;
                (value, value)
            }
            Some((low, high)) => {
                if high.contains('-') {
                    return Err(CronError::ExtraDash {
                        term: term.to_string(),
                    });
                }
                (parse_value(low, bounds)?, parse_value(high, bounds)?)
            }
        }
    };

    let step = match step {
        None => 1,
        Some(raw) => {
            // `N/s` with no explicit end runs to the top of the domain.
            if sentinel == 0 && !range.contains('-') {
                end = bounds.max;
            }
            parse_number(raw)?
        }
    };

    if start < bounds.min {
        return Err(CronError::BelowRange {
            term: term.to_string(),
            value: start,
            min: bounds.min,
        });
    }
    if end > bounds.max {
        return Err(CronError::AboveRange {
            term: term.to_string(),
            value: end,
            max: bounds.max,
        });
    }
    if start > end {
        return Err(CronError::Inverted {
            term: term.to_string(),
            start,
            end,
        });
    }
    if step == 0 {
        return Err(CronError::ZeroStep {
            term: term.to_string(),
        });
    }

    Ok(range_bits(start, end, step) | sentinel)
}

/// Resolve a named value (months, weekdays) case-insensitively, falling back
/// to plain integer parsing.
fn parse_value(raw: &str, bounds: &Bounds) -> Result<u32, CronError> {
    let lowered = raw.to_ascii_lowercase();
    for (name, value) in bounds.names {
        if *name == lowered {
            return Ok(*value);
        }
    }
    parse_number(raw)
}

fn parse_number(raw: &str) -> Result<u32, CronError> {
    raw.parse::<u32>().map_err(|_| CronError::InvalidNumber {
        value: raw.to_string(),
    })
}

/// Set every bit in `start..=end`, walking in `step` increments.
fn range_bits(start: u32, end: u32, step: u32) -> u64 {
    assert!(end < 64, "cron bitfields cover values 0..=63 only");

    if step == 1 {
        let upper = u64::MAX.checked_shl(end + 1).unwrap_or(0);
        return !upper & (u64::MAX << start);
    }

    let mut bits = 0;
    let mut value = start;
    while value <= end {
        bits |= 1 << value;
        value += step;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(bits: u64) -> Vec<u32> {
        (0..64).filter(|i| bits & (1 << i) != 0).collect()
    }

    #[test]
    fn range_bits_expands_steps() {
        assert_eq!(values(range_bits(10, 20, 3)), vec![10, 13, 16, 19]);
        assert_eq!(values(range_bits(5, 5, 1)), vec![5]);
        assert_eq!(values(range_bits(0, 3, 1)), vec![0, 1, 2, 3]);
        assert_eq!(values(range_bits(58, 59, 1)), vec![58, 59]);
    }

    #[test]
    fn wildcards_set_the_sentinel_bit() {
        let wild = Cron::parse("* * * * * *").unwrap();
        assert_ne!(wild.dom & STAR_BIT, 0);
        assert_ne!(wild.dow & STAR_BIT, 0);

        let concrete = Cron::parse("0 0 0 15 * 1").unwrap();
        assert_eq!(concrete.dom & STAR_BIT, 0);
        assert_eq!(concrete.dow & STAR_BIT, 0);
    }

    #[test]
    fn question_mark_is_a_wildcard_in_every_field() {
        let question = Cron::parse("? ? ? ? ? ?").unwrap();
        let star = Cron::parse("* * * * * *").unwrap();
        assert_eq!(question, star);
    }

    #[test]
    fn open_ended_step_runs_to_the_domain_maximum() {
        let cron = Cron::parse("45/5 * * * * *").unwrap();
        assert_eq!(values(cron.second), vec![45, 50, 55]);
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let named = Cron::parse("0 0 0 ? MAR-Jun Wed").unwrap();
        let numeric = Cron::parse("0 0 0 ? 3-6 3").unwrap();
        assert_eq!(named, numeric);
    }

    #[test]
    fn computed_instants_are_members_of_every_field() {
        let cron = Cron::parse("10-50/3 30 */2 * * *").unwrap();
        let mut t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for _ in 0..50 {
            t = cron.next_after(t).unwrap();
            assert_eq!(t.nanosecond(), 0);
            assert!(bit_set(cron.second, t.second()));
            assert!(bit_set(cron.minute, t.minute()));
            assert!(bit_set(cron.hour, t.hour()));
            assert!(bit_set(cron.month, t.month()));
            assert!(cron.day_matches(&t));
        }
    }
}
