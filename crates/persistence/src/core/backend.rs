//! Backend identification.

/// Identifies the type of database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// SQLite database (file-based or in-memory).
    Sqlite,
    /// PostgreSQL database.
    Postgres,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

impl BackendKind {
    /// Placeholder dialect spoken by this backend.
    pub fn dialect(&self) -> crate::scope::Dialect {
        match self {
            BackendKind::Sqlite => crate::scope::Dialect::Sqlite,
            BackendKind::Postgres => crate::scope::Dialect::Postgres,
        }
    }
}
