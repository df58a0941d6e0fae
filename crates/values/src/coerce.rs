//! # Type coercion
//!
//! Driver values are looser than catalog types: SQLite returns `0/1` for
//! booleans and text for timestamps, JSON-decoded batch slots lose typing
//! entirely. `coerce` normalizes a driver value to the canonical JSON shape
//! for its catalog tag; `from_json_typed` goes the other way, turning a
//! filter literal from the query document into a bindable driver value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use thiserror::Error;

use crate::scalar::ScalarType;
use crate::values::Value;

#[derive(Debug, Error)]
pub enum CoerceError {
    #[error("cannot read {found} as {expected}")]
    Mismatch { expected: ScalarType, found: String },
    #[error("malformed JSON in column value: {0}")]
    MalformedJson(String),
}

fn mismatch(expected: ScalarType, value: &Value) -> CoerceError {
    CoerceError::Mismatch {
        expected,
        found: format!("{value:?}"),
    }
}

/// Parses the timestamp representations the two drivers produce.
///
/// RFC 3339 first, then the `T`- and space-separated naive forms PostgreSQL
/// and SQLite emit, then a bare date. Naive values are taken as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Canonical textual form of a timestamp: RFC 3339, UTC, millisecond precision.
pub fn canonical_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalizes one driver value to the canonical JSON shape for `scalar`.
pub fn coerce(value: &Value, scalar: ScalarType) -> Result<serde_json::Value, CoerceError> {
    if value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    match scalar {
        ScalarType::Int | ScalarType::BigInt => match value {
            Value::Int64(i) => Ok(serde_json::json!(i)),
            Value::String(s) | Value::DecimalStr(s) => s
                .parse::<i64>()
                .map(|i| serde_json::json!(i))
                .map_err(|_| mismatch(scalar, value)),
            Value::Float64(f) if f.fract() == 0.0 => Ok(serde_json::json!(*f as i64)),
            _ => Err(mismatch(scalar, value)),
        },
        ScalarType::Float => match value {
            Value::Float64(f) => Ok(serde_json::json!(f)),
            Value::Int64(i) => Ok(serde_json::json!(*i as f64)),
            Value::String(s) | Value::DecimalStr(s) => s
                .parse::<f64>()
                .map(|f| serde_json::json!(f))
                .map_err(|_| mismatch(scalar, value)),
            _ => Err(mismatch(scalar, value)),
        },
        ScalarType::Decimal => match value {
            Value::DecimalStr(s) | Value::String(s) => Ok(serde_json::json!(s)),
            Value::Int64(i) => Ok(serde_json::json!(i.to_string())),
            Value::Float64(f) => Ok(serde_json::json!(f.to_string())),
            _ => Err(mismatch(scalar, value)),
        },
        ScalarType::Bool => match value {
            Value::Bool(b) => Ok(serde_json::json!(b)),
            Value::Int64(0) => Ok(serde_json::json!(false)),
            Value::Int64(1) => Ok(serde_json::json!(true)),
            _ => Err(mismatch(scalar, value)),
        },
        ScalarType::DateTime => match value {
            Value::DateTime(dt) => Ok(serde_json::json!(canonical_datetime(dt))),
            Value::String(s) => parse_datetime(s)
                .map(|dt| serde_json::json!(canonical_datetime(&dt)))
                .ok_or_else(|| mismatch(scalar, value)),
            Value::Int64(millis) => DateTime::from_timestamp_millis(*millis)
                .map(|dt| serde_json::json!(canonical_datetime(&dt)))
                .ok_or_else(|| mismatch(scalar, value)),
            _ => Err(mismatch(scalar, value)),
        },
        ScalarType::String | ScalarType::Enum => match value {
            Value::String(s) | Value::DecimalStr(s) => Ok(serde_json::json!(s)),
            Value::Bytes(b) => Ok(serde_json::json!(hex::encode(b))),
            _ => Err(mismatch(scalar, value)),
        },
        ScalarType::Json => match value {
            Value::Json(v) => Ok(v.clone()),
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| CoerceError::MalformedJson(e.to_string())),
            _ => Err(mismatch(scalar, value)),
        },
    }
}

/// Coerces a list-valued column: the driver value must decode to a JSON array
/// whose elements each coerce to `scalar`.
pub fn coerce_list(value: &Value, scalar: ScalarType) -> Result<serde_json::Value, CoerceError> {
    if value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    let decoded = match value {
        Value::Json(v) => v.clone(),
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| CoerceError::MalformedJson(e.to_string()))?
        }
        _ => return Err(mismatch(scalar, value)),
    };
    let serde_json::Value::Array(items) = decoded else {
        return Err(mismatch(scalar, value));
    };
    let coerced = items
        .iter()
        .map(|item| coerce(&Value::from_json(item), scalar))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_json::Value::Array(coerced))
}

/// Converts a query-document literal into the driver value to bind for a
/// column of type `scalar`. Literal/type mismatches are reported, not guessed
/// around.
pub fn from_json_typed(
    value: &serde_json::Value,
    scalar: ScalarType,
) -> Result<Value, CoerceError> {
    let found = || CoerceError::Mismatch {
        expected: scalar,
        found: value.to_string(),
    };
    if value.is_null() {
        return Ok(Value::Null);
    }
    match scalar {
        ScalarType::Int | ScalarType::BigInt => value.as_i64().map(Value::Int64).ok_or_else(found),
        ScalarType::Float => value.as_f64().map(Value::Float64).ok_or_else(found),
        ScalarType::Decimal => match value {
            serde_json::Value::String(s) => Ok(Value::DecimalStr(s.clone())),
            serde_json::Value::Number(n) => Ok(Value::DecimalStr(n.to_string())),
            _ => Err(found()),
        },
        ScalarType::Bool => value.as_bool().map(Value::Bool).ok_or_else(found),
        ScalarType::DateTime => match value {
            serde_json::Value::String(s) => {
                parse_datetime(s).map(Value::DateTime).ok_or_else(found)
            }
            serde_json::Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(Value::DateTime)
                .ok_or_else(found),
            _ => Err(found()),
        },
        ScalarType::String | ScalarType::Enum => match value {
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            _ => Err(found()),
        },
        ScalarType::Json => Ok(Value::Json(value.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_is_canonicalized_from_driver_text() {
        for text in [
            "2024-03-01T10:30:00Z",
            "2024-03-01T10:30:00+00:00",
            "2024-03-01 10:30:00",
            "2024-03-01T10:30:00",
        ] {
            let out = coerce(&Value::String(text.into()), ScalarType::DateTime).unwrap();
            assert_eq!(out, serde_json::json!("2024-03-01T10:30:00.000Z"), "{text}");
        }
    }

    #[test]
    fn sqlite_integer_booleans() {
        assert_eq!(
            coerce(&Value::Int64(1), ScalarType::Bool).unwrap(),
            serde_json::json!(true)
        );
        assert_eq!(
            coerce(&Value::Int64(0), ScalarType::Bool).unwrap(),
            serde_json::json!(false)
        );
        assert!(coerce(&Value::Int64(2), ScalarType::Bool).is_err());
    }

    #[test]
    fn decimals_stay_strings() {
        let out = coerce(
            &Value::DecimalStr("1234567890.123456789".into()),
            ScalarType::Decimal,
        )
        .unwrap();
        assert_eq!(out, serde_json::json!("1234567890.123456789"));
    }

    #[test]
    fn json_text_columns_are_parsed() {
        let out = coerce(&Value::String(r#"{"a":[1,2]}"#.into()), ScalarType::Json).unwrap();
        assert_eq!(out, serde_json::json!({"a": [1, 2]}));
        assert!(coerce(&Value::String("{oops".into()), ScalarType::Json).is_err());
    }

    #[test]
    fn filter_literals_convert_by_field_type() {
        assert_eq!(
            from_json_typed(&serde_json::json!(7), ScalarType::Int).unwrap(),
            Value::Int64(7)
        );
        assert_eq!(
            from_json_typed(&serde_json::json!("9.99"), ScalarType::Decimal).unwrap(),
            Value::DecimalStr("9.99".into())
        );
        assert!(from_json_typed(&serde_json::json!("seven"), ScalarType::Int).is_err());
        let dt = from_json_typed(&serde_json::json!("2024-03-01T10:30:00Z"), ScalarType::DateTime)
            .unwrap();
        assert!(matches!(dt, Value::DateTime(_)));
    }

    #[test]
    fn null_passes_through_every_type() {
        for scalar in [ScalarType::Int, ScalarType::DateTime, ScalarType::Json] {
            assert_eq!(coerce(&Value::Null, scalar).unwrap(), serde_json::Value::Null);
        }
    }
}
