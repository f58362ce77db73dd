//! MySQL row to JSON mapping.
//!
//! [`JsonRow`] implements `sqlx::FromRow` for arbitrary result sets so callers
//! can fetch rows without declaring a struct.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column type name into a logical category
//! 2. A per-category decoder extracts the value
//!
//! A column that fails to decode becomes `null` and is logged; it never fails
//! the whole row.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, FromRow, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Unsigned,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Date,
    DateTime,
    Timestamp,
    Time,
}

/// Classify a MySQL type name (`BIGINT UNSIGNED`, `VARCHAR`, ...).
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }
    if lower == "boolean" || lower == "bool" {
        return TypeCategory::Boolean;
    }
    if lower.contains("int") {
        if lower.contains("unsigned") {
            return TypeCategory::Unsigned;
        }
        return TypeCategory::Integer;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" {
        return TypeCategory::Json;
    }
    if lower == "datetime" {
        return TypeCategory::DateTime;
    }
    if lower == "timestamp" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bit" {
        return TypeCategory::Binary;
    }
    TypeCategory::Text
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// DECIMAL value kept as its exact textual representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary column as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

// =============================================================================
// JsonRow
// =============================================================================

/// One result row as a JSON object keyed by column label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JsonRow(pub Map<String, JsonValue>);

impl JsonRow {
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.0.get(column)
    }

    /// Column as i64 when it holds an integer.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(JsonValue::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(JsonValue::as_str)
    }

    pub fn into_inner(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl<'r> FromRow<'r, MySqlRow> for JsonRow {
    fn from_row(row: &'r MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(JsonRow(
            row.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let category = categorize_type(col.type_info().name());
                    (col.name().to_string(), decode_column(row, idx, category))
                })
                .collect(),
        ))
    }
}

fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode::<RawDecimal>(row, idx, |v| JsonValue::String(v.0)),
        TypeCategory::Integer => decode::<i64>(row, idx, |v| JsonValue::Number(v.into())),
        TypeCategory::Unsigned => decode::<u64>(row, idx, |v| JsonValue::Number(v.into())),
        TypeCategory::Boolean => decode::<bool>(row, idx, JsonValue::Bool),
        TypeCategory::Float => decode::<f64>(row, idx, |v| {
            serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string()))
        }),
        TypeCategory::Binary => decode::<Vec<u8>>(row, idx, |v| encode_binary(&v)),
        TypeCategory::Json => decode::<JsonValue>(row, idx, |v| v),
        TypeCategory::Date => decode::<chrono::NaiveDate>(row, idx, |v| {
            JsonValue::String(v.format("%Y-%m-%d").to_string())
        }),
        TypeCategory::DateTime => decode::<chrono::NaiveDateTime>(row, idx, |v| {
            JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string())
        }),
        TypeCategory::Timestamp => decode::<chrono::DateTime<chrono::Utc>>(row, idx, |v| {
            JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string())
        }),
        TypeCategory::Time => decode::<chrono::NaiveTime>(row, idx, |v| {
            JsonValue::String(v.format("%H:%M:%S").to_string())
        }),
        TypeCategory::Text => decode_text(row, idx),
    }
}

fn decode<'r, T>(row: &'r MySqlRow, idx: usize, map: impl FnOnce(T) -> JsonValue) -> JsonValue
where
    T: Decode<'r, sqlx::MySql> + Type<sqlx::MySql>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => map(v),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!(column = idx, error = %e, "Failed to decode column");
            JsonValue::Null
        }
    }
}

/// Text, falling back to raw bytes for columns the driver will not hand out as
/// a string (ENUM/SET with a binary collation, GEOMETRY, ...).
fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
        Ok(Some(bytes)) => match String::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s),
            Err(e) => encode_binary(e.as_bytes()),
        },
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!(column = idx, error = %e, "Failed to decode column");
            JsonValue::Null
        }
    }
}
