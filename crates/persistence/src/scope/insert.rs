//! Inserts into silo-owned tables.

use super::lexer::is_identifier;
use super::statement::{ComposedStatement, Dialect, SILO_COLUMN};
use super::value::SqlValue;
use crate::error::ScopeError;
use crate::silo::Silo;

/// Builder for an `INSERT` whose `silo` column always comes from the context.
///
/// ```
/// use portal_persistence::scope::{Dialect, ScopedInsert};
/// use portal_persistence::silo::Silo;
///
/// let insert = ScopedInsert::into("contacts")
///     .value("id", "c-1")
///     .value("name", "Ada");
/// let composed = insert.compose(Dialect::Sqlite, Silo::BF).unwrap();
/// assert_eq!(
///     composed.sql(),
///     "INSERT INTO contacts (id, name, silo) VALUES (?1, ?2, ?3)",
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedInsert {
    table: String,
    columns: Vec<(String, SqlValue)>,
}

impl ScopedInsert {
    /// Starts an insert into `table`.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Adds a column value.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }

    /// Returns the target table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Builds the statement, appending the silo column.
    ///
    /// Fails if any name is not a plain identifier or if the caller supplied
    /// the silo column.
    pub fn compose(&self, dialect: Dialect, silo: Silo) -> Result<ComposedStatement, ScopeError> {
        if !is_identifier(&self.table) {
            return Err(ScopeError::InvalidIdentifier {
                identifier: self.table.clone(),
            });
        }

        let mut names = Vec::with_capacity(self.columns.len() + 1);
        let mut params = Vec::with_capacity(self.columns.len() + 1);
        for (column, value) in &self.columns {
            if !is_identifier(column) {
                return Err(ScopeError::InvalidIdentifier {
                    identifier: column.clone(),
                });
            }
            if column.eq_ignore_ascii_case(SILO_COLUMN) {
                return Err(ScopeError::ExplicitSiloColumn);
            }
            names.push(column.as_str());
            params.push(value.clone());
        }
        names.push(SILO_COLUMN);
        params.push(SqlValue::from(silo));

        let placeholders = (1..=params.len())
            .map(|i| dialect.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            names.join(", "),
            placeholders
        );

        Ok(ComposedStatement::from_parts(sql, params, silo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silo_always_last() {
        let composed = ScopedInsert::into("loan_applications")
            .value("id", "a-1")
            .value("amount", 125_000i64)
            .compose(Dialect::Postgres, Silo::SLF)
            .unwrap();
        assert_eq!(
            composed.sql(),
            "INSERT INTO loan_applications (id, amount, silo) VALUES ($1, $2, $3)"
        );
        assert_eq!(composed.params()[2], SqlValue::from("SLF"));
    }

    #[test]
    fn test_explicit_silo_rejected() {
        let err = ScopedInsert::into("contacts")
            .value("SILO", "BF")
            .compose(Dialect::Sqlite, Silo::BI)
            .unwrap_err();
        assert_eq!(err, ScopeError::ExplicitSiloColumn);
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        assert!(matches!(
            ScopedInsert::into("contacts; DROP TABLE x").compose(Dialect::Sqlite, Silo::BI),
            Err(ScopeError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            ScopedInsert::into("contacts")
                .value("name) VALUES ('x'); --", "y")
                .compose(Dialect::Sqlite, Silo::BI),
            Err(ScopeError::InvalidIdentifier { .. })
        ));
    }
}
