//! Expiration resolution and relative time-shift expressions.
//!
//! Expirations arrive as Unix timestamps, datetimes, or strings. String
//! values are disambiguated in order: all-digit timestamps, a small set
//! of date-time layouts, and finally relative shift expressions such as
//! `"+1day 2hours"`. Calendar units convert through fixed second counts,
//! so a month is always 30 days and a year always 365.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TimeError;

/// Seconds in one minute.
pub const MINUTE_SECS: i64 = 60;
/// Seconds in one hour.
pub const HOUR_SECS: i64 = 3_600;
/// Seconds in one day.
pub const DAY_SECS: i64 = 86_400;
/// Seconds in one week.
pub const WEEK_SECS: i64 = 604_800;
/// Seconds in one month, fixed at 30 days.
pub const MONTH_SECS: i64 = 2_592_000;
/// Seconds in one year, fixed at 365 days.
pub const YEAR_SECS: i64 = 31_536_000;

/// Date-time layouts accepted for absolute string expirations.
///
/// Naive values are interpreted as UTC.
const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d@%H:%M:%S"];

static SHIFT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)[+-]|[0-9]+|[A-Za-z]+|[\s,]+|.").expect("Invalid shift token regex")
});

/// An expiration value as accepted by cache write operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expires {
    /// Absolute Unix timestamp in seconds.
    Timestamp(i64),
    /// Absolute point in time.
    At(DateTime<Utc>),
    /// Textual expiration: an all-digit timestamp, a date-time layout,
    /// or a relative shift expression.
    Text(String),
}

impl Expires {
    /// True when this expiration is a relative offset rather than an
    /// absolute point in time. Text is relative unless it is an
    /// all-digit timestamp or a recognized date layout.
    pub fn is_relative(&self) -> bool {
        match self {
            Expires::Timestamp(_) | Expires::At(_) => false,
            Expires::Text(text) => !is_numeric_text(text) && parse_absolute_text(text).is_none(),
        }
    }
}

impl From<i64> for Expires {
    fn from(timestamp: i64) -> Self {
        Expires::Timestamp(timestamp)
    }
}

impl From<DateTime<Utc>> for Expires {
    fn from(at: DateTime<Utc>) -> Self {
        Expires::At(at)
    }
}

impl From<&str> for Expires {
    fn from(text: &str) -> Self {
        Expires::Text(text.to_string())
    }
}

impl From<String> for Expires {
    fn from(text: String) -> Self {
        Expires::Text(text)
    }
}

/// Signed per-unit quantities parsed from a shift expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftParams {
    pub years: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl ShiftParams {
    /// Total signed offset in seconds, using the fixed unit constants.
    pub fn to_seconds(&self) -> i64 {
        self.years
            .saturating_mul(YEAR_SECS)
            .saturating_add(self.months.saturating_mul(MONTH_SECS))
            .saturating_add(self.weeks.saturating_mul(WEEK_SECS))
            .saturating_add(self.days.saturating_mul(DAY_SECS))
            .saturating_add(self.hours.saturating_mul(HOUR_SECS))
            .saturating_add(self.minutes.saturating_mul(MINUTE_SECS))
            .saturating_add(self.seconds)
    }
}

fn invalid(expression: &str, reason: impl Into<String>) -> TimeError {
    TimeError::InvalidExpression {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

/// Parses a relative shift expression into per-unit quantities.
///
/// An expression is a sequence of `<quantity> <unit>` segments with
/// optional sign tokens between them. The initial polarity is positive
/// and a sign token applies to every following segment until the next
/// sign token. Unit words are matched case-insensitively in singular or
/// plural form; whitespace and commas separate segments freely.
///
/// Repeated units accumulate, so `"+1day 1day"` yields two days.
///
/// # Examples
///
/// ```
/// use satchel_core::time::time_shift_to_params;
///
/// let params = time_shift_to_params("+2day-12years10 Seconds + 2 months").unwrap();
/// assert_eq!(params.years, -12);
/// assert_eq!(params.months, 2);
/// assert_eq!(params.days, 2);
/// assert_eq!(params.seconds, -10);
/// ```
pub fn time_shift_to_params(expression: &str) -> Result<ShiftParams, TimeError> {
    let mut params = ShiftParams::default();
    let mut sign: i64 = 1;
    let mut pending: Option<i64> = None;
    let mut segments = 0usize;

    for token in SHIFT_TOKEN.find_iter(expression) {
        let token = token.as_str();
        let first = token
            .chars()
            .next()
            .ok_or_else(|| invalid(expression, "empty token"))?;

        if token == "+" || token == "-" {
            if pending.is_some() {
                return Err(invalid(
                    expression,
                    format!("sign [{token}] follows a quantity without a unit"),
                ));
            }
            sign = if token == "+" { 1 } else { -1 };
        } else if first.is_ascii_digit() {
            if pending.is_some() {
                return Err(invalid(
                    expression,
                    format!("quantity [{token}] follows a quantity without a unit"),
                ));
            }
            let quantity = token
                .parse::<i64>()
                .map_err(|_| invalid(expression, format!("quantity [{token}] is out of range")))?;
            pending = Some(quantity);
        } else if first.is_ascii_alphabetic() {
            let quantity = pending
                .take()
                .ok_or_else(|| invalid(expression, format!("unit [{token}] has no quantity")))?;
            let field = match token.to_ascii_lowercase().as_str() {
                "year" | "years" => &mut params.years,
                "month" | "months" => &mut params.months,
                "week" | "weeks" => &mut params.weeks,
                "day" | "days" => &mut params.days,
                "hour" | "hours" => &mut params.hours,
                "minute" | "minutes" => &mut params.minutes,
                "second" | "seconds" => &mut params.seconds,
                _ => return Err(invalid(expression, format!("unknown unit [{token}]"))),
            };
            *field = field.saturating_add(sign.saturating_mul(quantity));
            segments += 1;
        } else if first.is_whitespace() || first == ',' {
            continue;
        } else {
            return Err(invalid(
                expression,
                format!("unexpected character [{first}]"),
            ));
        }
    }

    if pending.is_some() {
        return Err(invalid(expression, "trailing quantity without a unit"));
    }
    if segments == 0 {
        return Err(invalid(expression, "no time segments"));
    }
    Ok(params)
}

/// Parses a shift expression and returns its total signed offset in seconds.
pub fn shift_to_seconds(expression: &str) -> Result<i64, TimeError> {
    Ok(time_shift_to_params(expression)?.to_seconds())
}

fn parse_absolute_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    for layout in DATE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    None
}

fn is_numeric_text(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn resolve_text_at(text: &str, now: DateTime<Utc>) -> Result<i64, TimeError> {
    if is_numeric_text(text) {
        return text
            .parse::<i64>()
            .map_err(|_| invalid(text, "timestamp is out of range"));
    }
    if let Some(at) = parse_absolute_text(text) {
        return Ok(at.timestamp());
    }
    Ok(now.timestamp().saturating_add(shift_to_seconds(text)?))
}

/// Resolves an expiration to an absolute Unix timestamp against `now`.
///
/// Shift expressions are applied to `now`; absolute values pass through
/// unchanged, even when they lie in the past.
pub fn expires_to_timestamp_at(expires: &Expires, now: DateTime<Utc>) -> Result<i64, TimeError> {
    match expires {
        Expires::Timestamp(timestamp) => Ok(*timestamp),
        Expires::At(at) => Ok(at.timestamp()),
        Expires::Text(text) => resolve_text_at(text, now),
    }
}

/// Resolves an expiration to an absolute Unix timestamp against the wall clock.
pub fn expires_to_timestamp(expires: &Expires) -> Result<i64, TimeError> {
    expires_to_timestamp_at(expires, Utc::now())
}

/// Converts an expiration to a non-negative TTL in seconds against `now`.
///
/// Shift expressions convert through pure arithmetic without consulting
/// `now`; absolute values become `max(0, timestamp - now)`.
pub fn ttl_from_expiration_at(expires: &Expires, now: DateTime<Utc>) -> Result<i64, TimeError> {
    match expires {
        Expires::Text(text) if expires.is_relative() => Ok(shift_to_seconds(text)?.max(0)),
        other => {
            let timestamp = expires_to_timestamp_at(other, now)?;
            Ok(timestamp.saturating_sub(now.timestamp()).max(0))
        }
    }
}

/// Converts an expiration to a non-negative TTL in seconds against the wall clock.
pub fn ttl_from_expiration(expires: &Expires) -> Result<i64, TimeError> {
    ttl_from_expiration_at(expires, Utc::now())
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    const UNITS: &[(&str, i64)] = &[
        ("year", YEAR_SECS),
        ("month", MONTH_SECS),
        ("week", WEEK_SECS),
        ("day", DAY_SECS),
        ("hour", HOUR_SECS),
        ("minute", MINUTE_SECS),
        ("second", 1),
    ];

    proptest! {
        #[test]
        fn prop_parser_never_panics(expression in "\\PC{0,64}") {
            let _ = time_shift_to_params(&expression);
        }

        #[test]
        fn prop_single_segment_round_trips(
            quantity in 0i64..10_000,
            unit_index in 0usize..7,
            negative in any::<bool>(),
            plural in any::<bool>(),
        ) {
            let (unit, unit_secs) = UNITS[unit_index];
            let sign = if negative { "-" } else { "+" };
            let suffix = if plural { "s" } else { "" };
            let expression = format!("{sign}{quantity} {unit}{suffix}");
            let seconds = shift_to_seconds(&expression).unwrap();
            let expected = if negative { -quantity } else { quantity } * unit_secs;
            prop_assert_eq!(seconds, expected);
        }

        #[test]
        fn prop_ttl_is_never_negative(
            quantity in 0i64..10_000,
            unit_index in 0usize..7,
            negative in any::<bool>(),
        ) {
            let (unit, _) = UNITS[unit_index];
            let sign = if negative { "-" } else { "+" };
            let expression = format!("{sign}{quantity} {unit}");
            let ttl = ttl_from_expiration(&Expires::from(expression)).unwrap();
            prop_assert!(ttl >= 0);
        }
    }
}
