//! Conversions between scoped values and PostgreSQL values.
//!
//! Parameters are typed from the prepared statement so integer, boolean,
//! JSON, UUID and timestamp columns receive the matching wire type.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tokio_postgres::Row;
use tokio_postgres::types::{ToSql, Type};
use uuid::Uuid;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::scope::{ScopedRow, SqlValue};

pub(crate) type BoxedParam = Box<dyn ToSql + Sync + Send>;

fn bind_error(value: &SqlValue, ty: &Type) -> StorageError {
    StorageError::Backend(BackendError::QueryError {
        message: format!("cannot bind {:?} as {}", value, ty),
    })
}

fn typed_null(ty: &Type) -> BoxedParam {
    match *ty {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::JSON | Type::JSONB => Box::new(None::<Value>),
        Type::UUID => Box::new(None::<Uuid>),
        Type::TIMESTAMPTZ => Box::new(None::<DateTime<Utc>>),
        Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
        _ => Box::new(None::<String>),
    }
}

/// Converts one parameter to the type the server expects.
pub(crate) fn to_param(value: &SqlValue, ty: &Type) -> StorageResult<BoxedParam> {
    let param: BoxedParam = match value {
        SqlValue::Null => typed_null(ty),
        SqlValue::Bool(b) => match *ty {
            Type::BOOL => Box::new(*b),
            _ => return Err(bind_error(value, ty)),
        },
        SqlValue::Integer(i) => match *ty {
            Type::INT2 => Box::new(i16::try_from(*i).map_err(|_| bind_error(value, ty))?),
            Type::INT4 => Box::new(i32::try_from(*i).map_err(|_| bind_error(value, ty))?),
            Type::INT8 => Box::new(*i),
            Type::FLOAT8 => Box::new(*i as f64),
            Type::TEXT | Type::VARCHAR => Box::new(i.to_string()),
            _ => return Err(bind_error(value, ty)),
        },
        SqlValue::Real(f) => match *ty {
            Type::FLOAT4 => Box::new(*f as f32),
            Type::FLOAT8 => Box::new(*f),
            _ => return Err(bind_error(value, ty)),
        },
        SqlValue::Text(s) => match *ty {
            Type::UUID => Box::new(Uuid::parse_str(s).map_err(|_| bind_error(value, ty))?),
            Type::TIMESTAMPTZ => Box::new(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|_| bind_error(value, ty))?
                    .with_timezone(&Utc),
            ),
            Type::JSON | Type::JSONB => Box::new(Value::String(s.clone())),
            _ => Box::new(s.clone()),
        },
        SqlValue::Json(v) => match *ty {
            Type::JSON | Type::JSONB => Box::new(v.clone()),
            _ => Box::new(v.to_string()),
        },
    };
    Ok(param)
}

fn column_to_json(row: &Row, index: usize, ty: &Type) -> StorageResult<Value> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(Value::from),
        Type::INT2 => row.try_get::<_, Option<i16>>(index)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(index)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(Value::from),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)?
            .map(|f| Value::from(f64::from(f))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(Value::from),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(index)?,
        Type::UUID => row
            .try_get::<_, Option<Uuid>>(index)?
            .map(|u| Value::String(u.to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(|t| Value::String(t.to_rfc3339())),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(|t| Value::String(t.to_string())),
        _ => row.try_get::<_, Option<String>>(index)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Reads every column of `row` into a [`ScopedRow`].
pub(crate) fn read_row(row: &Row) -> StorageResult<ScopedRow> {
    let mut map = Map::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(
            column.name().to_string(),
            column_to_json(row, index, column.type_())?,
        );
    }
    Ok(ScopedRow::new(map))
}
