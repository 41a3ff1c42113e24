//! Field definitions and type-driven value coercion.
//!
//! A field is one attribute of an endpoint. Its flags decide whether callers
//! may filter, sort, search or see it, and its type decides how raw request
//! values are coerced before they reach the content store.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::AppError;

/// The closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    Date,
    Datetime,
    Number,
}

/// Date format accepted for `date` fields.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

impl FieldType {
    pub const ALL: [FieldType; 6] = [
        FieldType::String,
        FieldType::Integer,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::Datetime,
        FieldType::Number,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Number => "number",
        }
    }

    /// Parse a stored or requested type name. Unknown names are rejected.
    pub fn parse(raw: &str) -> Option<FieldType> {
        FieldType::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    /// Coerce a raw query-string value into the canonical JSON value for this type.
    ///
    /// # Errors
    ///
    /// `Validation` naming `field` when the input does not parse.
    pub fn coerce_str(&self, field: &str, raw: &str) -> Result<Value, AppError> {
        let raw = raw.trim();
        match self {
            FieldType::String => Ok(Value::String(raw.to_string())),
            FieldType::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| AppError::validation(field, "expected an integer")),
            FieldType::Number => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| AppError::validation(field, "expected a number")),
            FieldType::Boolean => parse_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| AppError::validation(field, "expected a boolean")),
            FieldType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
                .map_err(|_| AppError::validation(field, "expected a date formatted YYYY-MM-DD")),
            FieldType::Datetime => {
                let dt = DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| AppError::validation(field, "expected an RFC 3339 datetime"))?
                    .with_timezone(&Utc);
                // Stored at fixed millisecond width so stored values sort as text
                if dt.timestamp_subsec_nanos() % 1_000_000 != 0 {
                    return Err(AppError::validation(
                        field,
                        "fractional seconds are limited to milliseconds",
                    ));
                }
                Ok(Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
            }
        }
    }

    /// Coerce a JSON body value into the canonical JSON value for this type.
    ///
    /// Strings are accepted for every type and parsed like query values, so
    /// `"42"` is a valid integer. Anything that does not fit is rejected.
    pub fn coerce_json(&self, field: &str, value: &Value) -> Result<Value, AppError> {
        match (self, value) {
            (_, Value::String(s)) => self.coerce_str(field, s),
            (FieldType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(Value::from)
                .ok_or_else(|| AppError::validation(field, "expected an integer")),
            (FieldType::Number, Value::Number(n)) => Ok(Value::Number(n.clone())),
            (FieldType::Boolean, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldType::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(AppError::validation(field, "expected a boolean")),
            },
            (FieldType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
            _ => Err(AppError::validation(
                field,
                format!("expected a value of type {}", self.as_str()),
            )),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FieldType::parse(&value).ok_or_else(|| format!("unknown field type '{value}'"))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Represents an endpoint field record from the database.
///
/// Maps to the `endpoint_fields` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Field {
    pub id: i64,

    /// Owning endpoint (cascade-deleted with it)
    pub endpoint_id: i64,

    pub field_name: String,

    #[sqlx(try_from = "String")]
    pub field_type: FieldType,

    pub field_label: Option<String>,

    /// Must be present on create and full update
    pub is_required: bool,

    /// Included in `search=` matching
    pub is_searchable: bool,

    /// May appear in `sort=`
    pub is_sortable: bool,

    /// May be used as a filter key
    pub is_filterable: bool,

    /// Visible in responses; hidden fields are never returned
    pub show_in_response: bool,

    /// Key under which the value lives in the content store, when it differs from `field_name`
    pub meta_key: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Field {
    /// Key of this field inside a content item's data object.
    pub fn storage_key(&self) -> &str {
        self.meta_key.as_deref().unwrap_or(&self.field_name)
    }
}

/// Request body for adding a field to an endpoint.
///
/// # JSON Example
///
/// ```json
/// {
///   "field_name": "title",
///   "field_type": "string",
///   "is_sortable": true,
///   "is_searchable": true
/// }
/// ```
///
/// `field_type` is taken as a plain string so an unknown kind is reported as a
/// validation error naming `field_type` rather than a body parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFieldRequest {
    pub field_name: String,

    pub field_type: String,

    #[serde(default)]
    pub field_label: Option<String>,

    #[serde(default)]
    pub is_required: bool,

    #[serde(default)]
    pub is_searchable: bool,

    #[serde(default)]
    pub is_sortable: bool,

    #[serde(default)]
    pub is_filterable: bool,

    #[serde(default = "default_true")]
    pub show_in_response: bool,

    #[serde(default)]
    pub meta_key: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Validated field ready for insertion.
#[derive(Debug, Clone)]
pub struct NewField {
    pub endpoint_id: i64,
    pub field_name: String,
    pub field_type: FieldType,
    pub field_label: Option<String>,
    pub is_required: bool,
    pub is_searchable: bool,
    pub is_sortable: bool,
    pub is_filterable: bool,
    pub show_in_response: bool,
    pub meta_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_type_names_are_rejected() {
        assert_eq!(FieldType::parse("integer"), Some(FieldType::Integer));
        assert_eq!(FieldType::parse("Integer"), None);
        assert_eq!(FieldType::parse("json"), None);
        assert!(FieldType::try_from("blob".to_string()).is_err());
    }

    #[test]
    fn numeric_coercion_rejects_garbage() {
        assert_eq!(
            FieldType::Integer.coerce_str("views", " 42 ").unwrap(),
            json!(42)
        );

        match FieldType::Integer.coerce_str("views", "forty") {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "views"),
            other => panic!("expected validation error, got {other:?}"),
        }

        assert!(FieldType::Number.coerce_str("price", "NaN").is_err());
        assert_eq!(FieldType::Number.coerce_str("price", "9.5").unwrap(), json!(9.5));
    }

    #[test]
    fn boolean_tokens() {
        for raw in ["true", "1", "YES", "on"] {
            assert_eq!(FieldType::Boolean.coerce_str("f", raw).unwrap(), json!(true));
        }
        for raw in ["false", "0", "No", "off"] {
            assert_eq!(FieldType::Boolean.coerce_str("f", raw).unwrap(), json!(false));
        }
        assert!(FieldType::Boolean.coerce_str("f", "maybe").is_err());
    }

    #[test]
    fn dates_use_fixed_iso_formats() {
        assert_eq!(
            FieldType::Date.coerce_str("d", "2025-03-09").unwrap(),
            json!("2025-03-09")
        );
        assert!(FieldType::Date.coerce_str("d", "09/03/2025").is_err());

        assert_eq!(
            FieldType::Datetime
                .coerce_str("dt", "2025-03-09T10:00:00+02:00")
                .unwrap(),
            json!("2025-03-09T08:00:00.000Z")
        );
        assert!(FieldType::Datetime.coerce_str("dt", "2025-03-09 10:00").is_err());
    }

    #[test]
    fn datetime_fractions_are_kept_not_truncated() {
        assert_eq!(
            FieldType::Datetime
                .coerce_str("dt", "2025-03-09T00:00:00.500Z")
                .unwrap(),
            json!("2025-03-09T00:00:00.500Z")
        );

        let whole = FieldType::Datetime.coerce_str("dt", "2025-03-09T00:00:00Z").unwrap();
        let half = FieldType::Datetime.coerce_str("dt", "2025-03-09T00:00:00.5Z").unwrap();
        assert!(whole.as_str().unwrap() < half.as_str().unwrap());

        let err = FieldType::Datetime
            .coerce_str("dt", "2025-03-09T00:00:00.1234Z")
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "dt"));
    }

    #[test]
    fn json_values_are_coerced_by_type() {
        assert_eq!(
            FieldType::Integer.coerce_json("n", &json!("7")).unwrap(),
            json!(7)
        );
        assert!(FieldType::Integer.coerce_json("n", &json!(7.5)).is_err());
        assert_eq!(
            FieldType::Boolean.coerce_json("b", &json!(1)).unwrap(),
            json!(true)
        );
        assert!(FieldType::Date.coerce_json("d", &json!(true)).is_err());
        assert!(FieldType::String.coerce_json("s", &json!({"a": 1})).is_err());
    }
}
