//! Conversion of PostgreSQL column values into JSON attribute values.

use crate::error::StoreError;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use tokio_postgres::types::Type;
use tokio_postgres::Row;
use tracing::warn;

/// Convert the first `count` columns of a row into an attribute map keyed by
/// column name.
pub fn row_to_attributes(row: &Row, count: usize) -> Result<Map<String, Value>, StoreError> {
    let mut attributes = Map::new();
    for (i, column) in row.columns().iter().enumerate().take(count) {
        attributes.insert(column.name().to_string(), convert_postgres_value(row, i)?);
    }
    Ok(attributes)
}

fn conversion(row: &Row, index: usize, e: impl std::fmt::Display) -> StoreError {
    StoreError::Conversion {
        column: row.columns()[index].name().to_string(),
        message: e.to_string(),
    }
}

fn get<'a, T>(row: &'a Row, index: usize) -> Result<Option<T>, StoreError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(index)
        .map_err(|e| conversion(row, index, e))
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Convert a PostgreSQL value to a JSON value
///
/// Timestamps become ISO-8601 strings, numerics become numbers, JSON columns
/// pass through and byte arrays are base64-encoded.
pub fn convert_postgres_value(row: &Row, index: usize) -> Result<Value, StoreError> {
    let column = &row.columns()[index];
    let pg_type = column.type_();

    let value = match *pg_type {
        Type::BOOL => get::<bool>(row, index)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, index)?.map(|i| Value::from(i as i64)),
        Type::INT4 => get::<i32>(row, index)?.map(|i| Value::from(i as i64)),
        Type::INT8 => get::<i64>(row, index)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, index)?.map(|f| float(f as f64)),
        Type::FLOAT8 => get::<f64>(row, index)?.map(float),
        Type::NUMERIC => get::<Decimal>(row, index)?.map(|decimal| {
            if decimal.scale() == 0 {
                if let Some(i) = decimal.to_i64() {
                    return Value::from(i);
                }
            }
            match decimal.to_f64().and_then(Number::from_f64) {
                Some(n) => Value::Number(n),
                None => {
                    warn!("NUMERIC value {} does not fit a double, sending as text", decimal);
                    Value::String(decimal.to_string())
                }
            }
        }),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get::<String>(row, index)?.map(Value::String)
        }
        Type::TIMESTAMP => get::<NaiveDateTime>(row, index)?
            .map(|ts| Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, index)?.map(|dt| Value::String(dt.to_rfc3339()))
        }
        Type::DATE => get::<NaiveDate>(row, index)?.map(|d| Value::String(d.to_string())),
        Type::TIME => get::<NaiveTime>(row, index)?.map(|t| Value::String(t.to_string())),
        Type::JSON | Type::JSONB => get::<Value>(row, index)?,
        Type::UUID => get::<uuid::Uuid>(row, index)?.map(|u| Value::String(u.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, index)?
            .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => get::<Vec<String>>(row, index)?
            .map(|arr| Value::Array(arr.into_iter().map(Value::String).collect())),
        Type::INT4_ARRAY => get::<Vec<i32>>(row, index)?
            .map(|arr| Value::Array(arr.into_iter().map(|v| Value::from(v as i64)).collect())),
        Type::INT8_ARRAY => get::<Vec<i64>>(row, index)?
            .map(|arr| Value::Array(arr.into_iter().map(Value::from).collect())),
        _ => {
            // For unknown types, try to get as string
            match row.try_get::<_, Option<String>>(index) {
                Ok(v) => v.map(Value::String),
                Err(_) => {
                    return Err(conversion(
                        row,
                        index,
                        format!("unsupported PostgreSQL type: {pg_type:?}"),
                    ))
                }
            }
        }
    };

    Ok(value.unwrap_or(Value::Null))
}
