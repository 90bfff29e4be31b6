//! Date built-ins
//!
//! Inputs may be RFC 3339 timestamps, naive `YYYY-MM-DD[THH:MM:SS]` strings
//! (read as UTC) or Unix seconds. Results are RFC 3339 strings, except that
//! a date-only input stays date-only through the month operations.

use chrono::format::{Item, StrftimeItems};
use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    TimeDelta, TimeZone, Utc,
};
use serde_json::Value;

use super::arg_str;
use crate::config::{Config, ISO8601};
use crate::error::TransformError;

#[derive(Debug, Clone, Copy)]
struct Stamp {
    at: DateTime<FixedOffset>,
    date_only: bool,
}

impl Stamp {
    fn render(self) -> Value {
        if self.date_only {
            Value::from(self.at.format("%Y-%m-%d").to_string())
        } else {
            Value::from(self.at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn utc(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    naive.and_utc().fixed_offset()
}

fn parse_any(function: &str, value: &Value) -> Result<Stamp, TransformError> {
    match value {
        Value::Number(n) => {
            let seconds = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64));
            seconds
                .and_then(|s| Utc.timestamp_opt(s, 0).single())
                .map(|at| Stamp {
                    at: at.fixed_offset(),
                    date_only: false,
                })
                .ok_or_else(|| {
                    TransformError::conversion(function, format!("{n} is not a valid timestamp"))
                })
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(at) = DateTime::parse_from_rfc3339(s) {
                return Ok(Stamp {
                    at,
                    date_only: false,
                });
            }
            for format in NAIVE_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Ok(Stamp {
                        at: utc(naive),
                        date_only: false,
                    });
                }
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Ok(Stamp {
                    at: utc(date.and_time(NaiveTime::MIN)),
                    date_only: true,
                });
            }
            Err(TransformError::conversion(
                function,
                format!("cannot read '{s}' as a date"),
            ))
        }
        other => Err(TransformError::conversion(
            function,
            format!("cannot read {other} as a date"),
        )),
    }
}

/// Translate `YYYY-MM-DD HH:mm:ss` style tokens into strftime; formats that
/// already contain `%` are used as-is.
fn translate(format: &str) -> String {
    if format.contains('%') {
        return format.to_string();
    }
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(format.len() + 8);
    let mut rest = format;
    'scan: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

fn items<'f>(function: &str, format: &'f str) -> Result<Vec<Item<'f>>, TransformError> {
    let items: Vec<Item<'f>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(TransformError::invalid_argument(
            function,
            format!("invalid date format '{format}'"),
        ));
    }
    Ok(items)
}

/// Render a timestamp with a configured format; `iso8601` means RFC 3339.
pub fn format_timestamp(
    at: &DateTime<FixedOffset>,
    format: &str,
    precision: SecondsFormat,
) -> Result<String, TransformError> {
    if format.eq_ignore_ascii_case(ISO8601) {
        return Ok(at.to_rfc3339_opts(precision, true));
    }
    let translated = translate(format);
    let items = items("format_date", &translated)?;
    Ok(at.format_with_items(items.iter()).to_string())
}

/// The current time in the configured `date_format`, at second precision
pub fn now(config: &Config) -> Result<Value, TransformError> {
    let at = Utc::now().fixed_offset();
    format_timestamp(&at, &config.date_format, SecondsFormat::Secs).map(Value::String)
}

pub(super) fn parse_date(
    function: &str,
    value: &Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    if args.is_empty() {
        return parse_any(function, value).map(Stamp::render);
    }
    let format = translate(&arg_str(function, args, 0)?);
    items(function, &format)?;
    let text = super::string::text(value);
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_str(text, &format) {
        return Ok(Stamp {
            at,
            date_only: false,
        }
        .render());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, &format) {
        return Ok(Stamp {
            at: utc(naive),
            date_only: false,
        }
        .render());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, &format) {
        return Ok(Stamp {
            at: utc(date.and_time(NaiveTime::MIN)),
            date_only: true,
        }
        .render());
    }
    Err(TransformError::conversion(
        function,
        format!("'{text}' does not match format '{format}'"),
    ))
}

pub(super) fn format_date(
    function: &str,
    value: &Value,
    format: &str,
) -> Result<Value, TransformError> {
    let stamp = parse_any(function, value)?;
    if stamp.date_only && format.eq_ignore_ascii_case(ISO8601) {
        return Ok(stamp.render());
    }
    format_timestamp(&stamp.at, format, SecondsFormat::AutoSi).map(Value::String)
}

pub(super) fn to_iso8601(function: &str, value: &Value) -> Result<Value, TransformError> {
    let stamp = parse_any(function, value)?;
    Ok(Value::from(
        stamp.at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    ))
}

pub(super) fn to_timestamp(function: &str, value: &Value) -> Result<Value, TransformError> {
    Ok(Value::from(parse_any(function, value)?.at.timestamp()))
}

fn out_of_range(function: &str) -> TransformError {
    TransformError::conversion(function, "date out of range")
}

pub(super) fn add_days(function: &str, value: &Value, days: i64) -> Result<Value, TransformError> {
    let stamp = parse_any(function, value)?;
    let delta = TimeDelta::try_days(days).ok_or_else(|| out_of_range(function))?;
    let at = stamp
        .at
        .checked_add_signed(delta)
        .ok_or_else(|| out_of_range(function))?;
    Ok(Stamp { at, ..stamp }.render())
}

pub(super) fn add_months(
    function: &str,
    value: &Value,
    months: i64,
) -> Result<Value, TransformError> {
    let stamp = parse_any(function, value)?;
    let magnitude = u32::try_from(months.unsigned_abs()).map_err(|_| out_of_range(function))?;
    let shifted = if months >= 0 {
        stamp.at.checked_add_months(Months::new(magnitude))
    } else {
        stamp.at.checked_sub_months(Months::new(magnitude))
    };
    let at = shifted.ok_or_else(|| out_of_range(function))?;
    Ok(Stamp { at, ..stamp }.render())
}

/// Calendar boundaries computed in the input's own offset
#[derive(Debug, Clone, Copy)]
pub(super) enum Boundary {
    StartOfDay,
    EndOfDay,
    StartOfMonth,
    EndOfMonth,
}

pub(super) fn boundary(
    function: &str,
    value: &Value,
    boundary: Boundary,
) -> Result<Value, TransformError> {
    let stamp = parse_any(function, value)?;
    let date = stamp.at.date_naive();
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(|| out_of_range(function))?;
    let (naive, date_only) = match boundary {
        Boundary::StartOfDay => (date.and_time(NaiveTime::MIN), false),
        Boundary::EndOfDay => (date.and_time(end_of_day), false),
        Boundary::StartOfMonth => {
            let first = date.with_day(1).ok_or_else(|| out_of_range(function))?;
            (first.and_time(NaiveTime::MIN), stamp.date_only)
        }
        Boundary::EndOfMonth => {
            let last = date
                .with_day(1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .and_then(|next| next.pred_opt())
                .ok_or_else(|| out_of_range(function))?;
            (last.and_time(end_of_day), stamp.date_only)
        }
    };
    let at = stamp
        .at
        .offset()
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| out_of_range(function))?;
    Ok(Stamp { at, date_only }.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("YYYY-MM-DD", "%Y-%m-%d")]
    #[case("DD/MM/YY HH:mm:ss", "%d/%m/%y %H:%M:%S")]
    #[case("%d.%m.%Y", "%d.%m.%Y")]
    fn test_translate(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(translate(input), expected);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            format_date("format_date", &json!("2024-03-05T10:20:30Z"), "DD/MM/YYYY").unwrap(),
            json!("05/03/2024")
        );
        assert_eq!(
            format_date("format_date", &json!("2024-03-05"), "iso8601").unwrap(),
            json!("2024-03-05")
        );
    }

    #[test]
    fn test_invalid_format_is_rejected() {
        let err = format_date("format_date", &json!("2024-03-05"), "%Q").unwrap_err();
        assert_eq!(err.kind, crate::error::TransformErrorKind::InvalidArgument);
    }

    #[test]
    fn test_parse_date_with_format() {
        assert_eq!(
            parse_date("parse_date", &json!("15/01/2024"), &[json!("DD/MM/YYYY")]).unwrap(),
            json!("2024-01-15")
        );
        assert_eq!(
            parse_date("parse_date", &json!("2024-01-15 08:30"), &[]).unwrap(),
            json!("2024-01-15T08:30:00Z")
        );
    }

    #[test]
    fn test_to_iso8601_and_timestamp() {
        assert_eq!(
            to_iso8601("to_iso8601", &json!("2024-01-15")).unwrap(),
            json!("2024-01-15T00:00:00Z")
        );
        assert_eq!(
            to_timestamp("to_timestamp", &json!("1970-01-02T00:00:00Z")).unwrap(),
            json!(86400)
        );
        assert_eq!(
            to_iso8601("to_iso8601", &json!(0)).unwrap(),
            json!("1970-01-01T00:00:00Z")
        );
    }

    #[rstest]
    #[case("2024-01-31", 1, "2024-02-29")]
    #[case("2024-03-15", -3, "2023-12-15")]
    #[case("2024-01-31T12:00:00+02:00", 1, "2024-02-29T12:00:00+02:00")]
    fn test_add_months(#[case] input: &str, #[case] months: i64, #[case] expected: &str) {
        assert_eq!(
            add_months("add_months", &json!(input), months).unwrap(),
            json!(expected)
        );
    }

    #[test]
    fn test_add_days_keeps_date_only() {
        assert_eq!(
            add_days("add_days", &json!("2024-12-31"), 1).unwrap(),
            json!("2025-01-01")
        );
    }

    #[rstest]
    #[case(Boundary::StartOfDay, "2024-02-10T00:00:00Z")]
    #[case(Boundary::EndOfDay, "2024-02-10T23:59:59Z")]
    #[case(Boundary::StartOfMonth, "2024-02-01T00:00:00Z")]
    #[case(Boundary::EndOfMonth, "2024-02-29T23:59:59Z")]
    fn test_boundaries(#[case] which: Boundary, #[case] expected: &str) {
        assert_eq!(
            boundary("boundary", &json!("2024-02-10T13:45:00Z"), which).unwrap(),
            json!(expected)
        );
    }

    #[test]
    fn test_unparseable_date() {
        let err = to_timestamp("to_timestamp", &json!("yesterday")).unwrap_err();
        assert_eq!(err.kind, crate::error::TransformErrorKind::TypeConversion);
    }
}
