//! Turning CLI input into bind arguments and Postgres rows into JSON.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};
use tenantpool_core::SqlArg;

/// Parse a `--arg` value: null, true/false, integer, float, UUID,
/// RFC 3339 timestamp, else text.
///
/// Prefix with `text:` to force a string (`text:42`).
pub fn parse_arg(raw: &str) -> Result<SqlArg, String> {
    if let Some(text) = raw.strip_prefix("text:") {
        return Ok(SqlArg::Text(text.to_string()));
    }

    let arg = match raw {
        "null" | "NULL" => SqlArg::Null,
        "true" => SqlArg::Bool(true),
        "false" => SqlArg::Bool(false),
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                SqlArg::Int(n)
            } else if let Ok(f) = raw.parse::<f64>() {
                SqlArg::Float(f)
            } else if let Ok(id) = uuid::Uuid::parse_str(raw) {
                SqlArg::Uuid(id)
            } else if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
                SqlArg::Timestamp(at.with_timezone(&Utc))
            } else {
                SqlArg::Text(raw.to_string())
            }
        }
    };
    Ok(arg)
}

/// Decode every column of a row into a JSON object keyed by column name.
pub fn row_to_json(row: &PgRow) -> Value {
    let mut object = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, i, column.type_info().name());
        object.insert(column.name().to_string(), value);
    }
    Value::Object(object)
}

fn decode_column(row: &PgRow, i: usize, type_name: &str) -> Value {
    fn get<'r, T>(row: &'r PgRow, i: usize) -> Option<Option<T>>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(i).ok()
    }

    let decoded = match type_name {
        "BOOL" => get::<bool>(row, i).map(|v| v.map(Value::from)),
        "INT2" => get::<i16>(row, i).map(|v| v.map(Value::from)),
        "INT4" => get::<i32>(row, i).map(|v| v.map(Value::from)),
        "INT8" => get::<i64>(row, i).map(|v| v.map(Value::from)),
        "FLOAT4" => get::<f32>(row, i).map(|v| v.map(Value::from)),
        "FLOAT8" => get::<f64>(row, i).map(|v| v.map(Value::from)),
        "JSON" | "JSONB" => get::<Value>(row, i),
        "UUID" => get::<uuid::Uuid>(row, i).map(|v| v.map(|u| Value::from(u.to_string()))),
        "TIMESTAMPTZ" => {
            get::<DateTime<Utc>>(row, i).map(|v| v.map(|t| Value::from(t.to_rfc3339())))
        }
        "TIMESTAMP" => get::<NaiveDateTime>(row, i).map(|v| v.map(|t| Value::from(t.to_string()))),
        "DATE" => get::<NaiveDate>(row, i).map(|v| v.map(|d| Value::from(d.to_string()))),
        "BYTEA" => get::<Vec<u8>>(row, i).map(|v| v.map(|b| Value::from(format!("<{} bytes>", b.len())))),
        _ => get::<String>(row, i).map(|v| v.map(Value::from)),
    };

    match decoded {
        Some(Some(value)) => value,
        Some(None) => Value::Null,
        None => Value::from(format!("<unsupported {type_name}>")),
    }
}
