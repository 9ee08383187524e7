//! Conversions between scoped values and SQLite values.

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use serde_json::{Map, Value};

use crate::scope::{ScopedRow, SqlValue};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*b))),
            SqlValue::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Json(v) => ToSqlOutput::Owned(SqliteValue::Text(v.to_string())),
        })
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Reads every column of `row` into a [`ScopedRow`].
pub(crate) fn read_row(row: &rusqlite::Row<'_>, columns: &[String]) -> rusqlite::Result<ScopedRow> {
    let mut map = Map::with_capacity(columns.len());
    for (index, name) in columns.iter().enumerate() {
        map.insert(name.clone(), to_json(row.get_ref(index)?));
    }
    Ok(ScopedRow::new(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{Connection, params_from_iter};

    #[test]
    fn test_values_round_trip_through_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        let params = vec![
            SqlValue::Null,
            SqlValue::Bool(true),
            SqlValue::Integer(42),
            SqlValue::from("BI"),
            SqlValue::Json(serde_json::json!({"k": 1})),
        ];
        let mut stmt = conn
            .prepare("SELECT ?1 AS n, ?2 AS b, ?3 AS i, ?4 AS t, ?5 AS j")
            .unwrap();
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let row = stmt
            .query_row(params_from_iter(params.iter()), |r| read_row(r, &columns))
            .unwrap();

        assert_eq!(row.get("n"), Some(&Value::Null));
        assert_eq!(row.get_i64("b"), Some(1));
        assert_eq!(row.get_i64("i"), Some(42));
        assert_eq!(row.get_str("t"), Some("BI"));
        assert_eq!(row.get_str("j"), Some("{\"k\":1}"));
    }
}
