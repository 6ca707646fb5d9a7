//! Dynamic column value type.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// A dynamic column value.
///
/// Timestamps and dates are naive (no offset). Stores that keep them as
/// text use `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`; accessors coerce such
/// text back into the typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Date and time of day.
    #[serde(with = "timestamp_text")]
    Timestamp(PrimitiveDateTime),
    /// Calendar date.
    #[serde(with = "date_text")]
    Date(Date),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get this value as a float. Integers widen; numeric text parses.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Real(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a timestamp.
    ///
    /// Dates become midnight; text is parsed.
    pub fn as_timestamp(&self) -> Option<PrimitiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => Some(PrimitiveDateTime::new(*d, Time::MIDNIGHT)),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Get this value as a calendar date.
    pub fn as_date(&self) -> Option<Date> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Timestamp(ts) => Some(ts.date()),
            Value::Text(s) => parse_timestamp(s).map(|ts| ts.date()),
            _ => None,
        }
    }

    /// Compares two values.
    ///
    /// Returns `None` when either side is null or the kinds are not
    /// comparable. Numbers compare numerically, timestamps and dates compare
    /// chronologically (text on either side is parsed first).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(_) | Value::Real(_), Value::Integer(_) | Value::Real(_)) => {
                self.as_real()?.partial_cmp(&other.as_real()?)
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Timestamp(_) | Value::Date(_), _) | (_, Value::Timestamp(_) | Value::Date(_)) => {
                Some(self.as_timestamp()?.cmp(&other.as_timestamp()?))
            }
            _ => None,
        }
    }

    /// Returns the short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => f.write_str(&format_timestamp(*ts)),
            Value::Date(d) => f.write_str(&format_date(*d)),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(ts: PrimitiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Formats a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(ts: PrimitiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}",
        format_date(ts.date()),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Parses `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`.
///
/// Fractional seconds and a trailing `Z` are ignored.
pub fn parse_timestamp(text: &str) -> Option<PrimitiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    if text.len() == 10 {
        return Date::parse(text, DATE_FORMAT)
            .ok()
            .map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT));
    }
    let whole_seconds = text.split('.').next().unwrap_or(text).replacen('T', " ", 1);
    PrimitiveDateTime::parse(&whole_seconds, TIMESTAMP_FORMAT).ok()
}

mod timestamp_text {
    use super::{format_timestamp, parse_timestamp};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;

    pub fn serialize<S: Serializer>(ts: &PrimitiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PrimitiveDateTime, D::Error> {
        let text = String::deserialize(d)?;
        parse_timestamp(&text).ok_or_else(|| D::Error::custom(format!("invalid timestamp {text:?}")))
    }
}

mod date_text {
    use super::{format_date, DATE_FORMAT};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let text = String::deserialize(d)?;
        Date::parse(&text, DATE_FORMAT).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::{date, datetime};

    #[test]
    fn timestamp_text_round_trip() {
        let ts = datetime!(2006-02-15 04:34:33);
        assert_eq!(format_timestamp(ts), "2006-02-15 04:34:33");
        assert_eq!(parse_timestamp("2006-02-15 04:34:33"), Some(ts));
    }

    #[test]
    fn parse_accepts_common_variants() {
        let ts = datetime!(2005-05-24 22:53:30);
        assert_eq!(parse_timestamp("2005-05-24T22:53:30"), Some(ts));
        assert_eq!(parse_timestamp("2005-05-24 22:53:30.000"), Some(ts));
        assert_eq!(parse_timestamp("2005-05-24T22:53:30Z"), Some(ts));
        assert_eq!(
            parse_timestamp("2005-05-24"),
            Some(datetime!(2005-05-24 0:00))
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn text_coerces_to_timestamp_and_date() {
        let v = Value::Text("2005-06-01 10:00:00".into());
        assert_eq!(v.as_timestamp(), Some(datetime!(2005-06-01 10:00)));
        assert_eq!(v.as_date(), Some(date!(2005-06-01)));
    }

    #[test]
    fn numeric_compare_mixes_integer_and_real() {
        assert_eq!(Value::Integer(2).compare(&Value::Real(1.5)), Some(Ordering::Greater));
        assert_eq!(Value::Real(2.0).compare(&Value::Integer(2)), Some(Ordering::Equal));
    }

    #[test]
    fn timestamp_compares_against_text() {
        let ts = Value::Timestamp(datetime!(2006-02-15 04:34:33));
        let text = Value::Text("2006-02-15 05:03:42".into());
        assert_eq!(ts.compare(&text), Some(Ordering::Less));
        assert_eq!(text.compare(&ts), Some(Ordering::Greater));
    }

    #[test]
    fn null_is_incomparable() {
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::Integer(1).compare(&Value::Null), None);
    }

    #[test]
    fn option_converts_to_null() {
        let none: Option<i64> = None;
        assert_eq!(Value::from(none), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Integer(3));
    }

    #[test]
    fn serde_untagged_shapes() {
        let json = serde_json::to_string(&Value::Timestamp(datetime!(2006-02-15 04:34:33))).unwrap();
        assert_eq!(json, "\"2006-02-15 04:34:33\"");

        let v: Value = serde_json::from_str("null").unwrap();
        assert_eq!(v, Value::Null);
        let v: Value = serde_json::from_str("42").unwrap();
        assert_eq!(v, Value::Integer(42));
        let v: Value = serde_json::from_str("4.5").unwrap();
        assert_eq!(v, Value::Real(4.5));
        let v: Value = serde_json::from_str("\"PG-13\"").unwrap();
        assert_eq!(v, Value::Text("PG-13".into()));
    }

    fn arb_timestamp() -> impl Strategy<Value = PrimitiveDateTime> {
        (0i64..4_000_000_000).prop_filter_map("in range", |secs| {
            time::OffsetDateTime::from_unix_timestamp(secs)
                .ok()
                .map(|t| PrimitiveDateTime::new(t.date(), t.time()))
        })
    }

    proptest! {
        // SQLite compares stored timestamps as text
        #[test]
        fn text_order_matches_chronological_order(a in arb_timestamp(), b in arb_timestamp()) {
            prop_assert_eq!(format_timestamp(a).cmp(&format_timestamp(b)), a.cmp(&b));
        }
    }
}
