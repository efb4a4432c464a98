//! Normalization of raw provider payloads into `SourceRecord`s.
//!
//! Providers disagree on shapes: public records report `assessed_value`
//! rather than `price`, some send numbers as formatted strings. Values
//! that cannot be read, and negative values, are dropped with a warning
//! and treated as missing.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::warn;

use crate::error::StoreError;
use crate::models::SourceRecord;

/// Keys tried, in order, for the listing price.
const PRICE_KEYS: &[&str] = &["price", "list_price", "assessed_value"];

/// Normalize one provider payload.
///
/// `backend` labels the record when the payload carries no `source`.
pub fn normalize_record(backend: &str, raw: Value) -> Result<SourceRecord, StoreError> {
    let object = raw.as_object().ok_or_else(|| StoreError::Malformed {
        backend: backend.to_string(),
        reason: "payload is not a JSON object".to_string(),
    })?;

    let source = match object.get("source").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => backend.to_string(),
    };

    let mut record = SourceRecord::new(source.clone());

    record.price = PRICE_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(|v| number(&source, key, v)));
    record.bedrooms = object
        .get("bedrooms")
        .and_then(|v| whole(&source, "bedrooms", v));
    record.bathrooms = object
        .get("bathrooms")
        .and_then(|v| number(&source, "bathrooms", v));
    record.square_feet = object
        .get("square_feet")
        .and_then(|v| number(&source, "square_feet", v));
    record.year_built = object
        .get("year_built")
        .and_then(|v| whole(&source, "year_built", v));
    record.lot_size = object
        .get("lot_size")
        .and_then(|v| number(&source, "lot_size", v));
    record.property_type = text(object.get("property_type"));
    record.description = text(object.get("description"));
    record.last_updated = object
        .get("last_updated")
        .and_then(|v| date(&source, v));
    record.raw_data = raw.clone();

    Ok(record)
}

/// Read a number, accepting strings like `"$1,250,000"`.
fn number(source: &str, key: &str, value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '_' | ' '))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };

    match parsed {
        Some(n) if n.is_finite() && n >= 0.0 => Some(n),
        Some(n) if n.is_finite() => {
            warn!("{}: ignoring negative {} value {}", source, key, n);
            None
        }
        _ => {
            warn!("{}: ignoring malformed {} value {}", source, key, value);
            None
        }
    }
}

/// Read a whole number that fits `T`; fractional values are malformed.
fn whole<T: TryFrom<i64>>(source: &str, key: &str, value: &Value) -> Option<T> {
    let n = number(source, key, value)?;
    if n.fract() != 0.0 {
        warn!("{}: ignoring fractional {} value {}", source, key, n);
        return None;
    }
    match T::try_from(n as i64) {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("{}: ignoring out-of-range {} value {}", source, key, n);
            None
        }
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn date(source: &str, value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?;
    match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            warn!("{}: ignoring malformed last_updated {:?}", source, s);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assessed_value_stands_in_for_price() {
        let record = normalize_record(
            "Public Records",
            json!({
                "source": "Public Records",
                "assessed_value": 1180000,
                "bedrooms": 3,
                "bathrooms": 2.5,
                "square_feet": 1822,
                "year_built": 2005,
                "property_type": "Condominium",
                "last_sale_price": 950000,
                "description": null
            }),
        )
        .unwrap();

        assert_eq!(record.source, "Public Records");
        assert_eq!(record.price, Some(1_180_000.0));
        assert_eq!(record.bedrooms, Some(3));
        assert_eq!(record.bathrooms, Some(2.5));
        assert_eq!(record.year_built, Some(2005));
        assert_eq!(record.lot_size, None);
        assert_eq!(record.description, None);
        assert_eq!(record.last_updated, None);
        assert_eq!(record.raw_data["last_sale_price"], json!(950000));
    }

    #[test]
    fn test_formatted_strings_are_parsed() {
        let record = normalize_record(
            "Zillow",
            json!({
                "price": "$1,250,000",
                "square_feet": "1,800",
                "last_updated": "2024-01-15"
            }),
        )
        .unwrap();

        assert_eq!(record.source, "Zillow");
        assert_eq!(record.price, Some(1_250_000.0));
        assert_eq!(record.square_feet, Some(1800.0));
        assert_eq!(record.last_updated, NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn test_malformed_values_become_missing() {
        let record = normalize_record(
            "Redfin",
            json!({
                "price": "call for price",
                "bedrooms": 2.5,
                "year_built": [1998],
                "property_type": "   ",
                "last_updated": "January 2024"
            }),
        )
        .unwrap();

        assert_eq!(record.price, None);
        assert_eq!(record.bedrooms, None);
        assert_eq!(record.year_built, None);
        assert_eq!(record.property_type, None);
        assert_eq!(record.last_updated, None);
    }

    #[test]
    fn test_negative_values_become_missing() {
        let record = normalize_record(
            "Zillow",
            json!({
                "price": -1250000,
                "list_price": 1240000,
                "bedrooms": -3,
                "bathrooms": -2,
                "square_feet": "-1,800",
                "lot_size": -4000,
                "year_built": 99999999999u64
            }),
        )
        .unwrap();

        // A negative asking price falls through to the next price key.
        assert_eq!(record.price, Some(1_240_000.0));
        assert_eq!(record.bedrooms, None);
        assert_eq!(record.bathrooms, None);
        assert_eq!(record.square_feet, None);
        assert_eq!(record.lot_size, None);
        assert_eq!(record.year_built, None);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let err = normalize_record("Zillow", json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }
}
