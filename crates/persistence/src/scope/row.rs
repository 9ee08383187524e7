//! Rows returned by scoped queries.

use serde_json::{Map, Value};

/// A single result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedRow {
    columns: Map<String, Value>,
}

impl ScopedRow {
    /// Creates a row from a column map.
    pub fn new(columns: Map<String, Value>) -> Self {
        Self { columns }
    }

    /// Returns a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Returns a column as a string slice, if it is text.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.columns.get(column).and_then(Value::as_str)
    }

    /// Returns a column as an integer, if it is numeric.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.columns.get(column).and_then(Value::as_i64)
    }

    /// Returns the column names.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Converts the row into a JSON object.
    pub fn into_json(self) -> Value {
        Value::Object(self.columns)
    }
}

impl From<Map<String, Value>> for ScopedRow {
    fn from(columns: Map<String, Value>) -> Self {
        Self::new(columns)
    }
}
