//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the persistence layer,
//! following a hierarchy that separates silo resolution and access errors,
//! session binding errors, statement scoping errors, audit errors and
//! backend errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::silo::{Role, Silo};

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Context resolution and access errors
    #[error(transparent)]
    Silo(#[from] SiloError),

    /// Session binding errors
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Statement scoping errors
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Audit trail errors
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors raised while resolving a request's silo or checking route access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SiloError {
    /// No authenticated principal was attached to the request.
    #[error("unauthenticated: no principal attached to request")]
    Unauthenticated,

    /// The principal's silo assignment is missing or not a known silo.
    #[error("invalid silo assignment for principal {principal_id}")]
    InvalidSiloAssignment { principal_id: String },

    /// The principal's silo does not match the silo the route requires.
    #[error("forbidden: route requires silo {required}")]
    SiloMismatch { required: Silo, actual: Silo },

    /// The principal's role is not in the route's allowed set.
    #[error("forbidden: role {role} not permitted on {required} route")]
    RoleNotPermitted { role: Role, required: Silo },
}

impl SiloError {
    /// Returns `true` for errors that mean "identity missing" rather than "identity refused".
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, SiloError::Unauthenticated)
    }
}

/// Errors related to binding a silo onto a database session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Setting the session/transaction-local silo value failed.
    #[error("failed to bind silo {silo} to session: {message}")]
    BindFailed { silo: Silo, message: String },

    /// The session's active binding does not equal the context's silo.
    #[error("session bound to {found:?}, expected {expected}")]
    BindingMismatch {
        expected: Silo,
        found: Option<String>,
    },

    /// The session was already committed or rolled back.
    #[error("session is no longer active")]
    Inactive,

    /// Commit or rollback failed; the binding was discarded with the transaction.
    #[error("failed to finish session: {message}")]
    FinishFailed { message: String },
}

/// Errors raised while scoping a statement to a silo.
///
/// Every variant except [`ScopeError::RowOutsideScope`] and
/// [`ScopeError::RowMissingScope`] is an ambiguous-scope rejection: the
/// statement never reaches the database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The statement has no top-level WHERE clause.
    #[error("ambiguous scope: statement has no top-level WHERE clause")]
    MissingWhere,

    /// The statement has no `{silo_scope}` marker.
    #[error("ambiguous scope: statement has no silo scope marker")]
    MissingMarker,

    /// The marker appears more than once.
    #[error("ambiguous scope: silo scope marker appears {count} times")]
    DuplicateMarker { count: usize },

    /// The marker is not inside the top-level WHERE clause.
    #[error("ambiguous scope: silo scope marker is outside the WHERE clause")]
    MarkerOutsideWhere,

    /// The marker sits inside parentheses.
    #[error("ambiguous scope: silo scope marker is nested inside parentheses")]
    MarkerNested,

    /// Something other than a closing clause follows the marker.
    #[error("ambiguous scope: silo scope marker must end the WHERE clause")]
    MarkerNotAtEnd,

    /// The predicate before the marker ends with a dangling connective such as `OR`.
    #[error("ambiguous scope: predicate ends with dangling {keyword}")]
    DanglingConnective { keyword: String },

    /// Parentheses do not balance.
    #[error("ambiguous scope: unbalanced parentheses")]
    UnbalancedParentheses,

    /// More than one top-level WHERE clause.
    #[error("ambiguous scope: statement has {count} top-level WHERE clauses")]
    MultipleWhere { count: usize },

    /// A nested SELECT (subquery, CTE or derived table).
    #[error("ambiguous scope: nested SELECT cannot be scoped")]
    Subquery,

    /// The statement is not a SELECT, UPDATE or DELETE.
    #[error("ambiguous scope: {keyword} statements cannot be scoped; inserts go through ScopedInsert")]
    UnsupportedStatement { keyword: String },

    /// The statement names no table to scope.
    #[error("ambiguous scope: statement reads no table")]
    MissingTable,

    /// A FROM item that is not a plain table, such as a table function.
    #[error("ambiguous scope: cannot scope table source '{source_text}'")]
    UnscopableSource { source_text: String },

    /// A table in the statement has no scope marker of its own.
    #[error("ambiguous scope: table '{table}' has no silo scope marker")]
    UncoveredTable { table: String },

    /// A qualified marker names no table in the statement.
    #[error("ambiguous scope: scope qualifier '{qualifier}' names no table in the statement")]
    UnknownQualifier { qualifier: String },

    /// An unqualified marker in a statement reading several tables.
    #[error("ambiguous scope: statement reads {tables} tables, each marker needs a qualifier")]
    UnqualifiedMarker { tables: usize },

    /// UNION, INTERSECT or EXCEPT.
    #[error("ambiguous scope: compound query ({keyword}) cannot be scoped")]
    CompoundQuery { keyword: String },

    /// More than one statement.
    #[error("ambiguous scope: multiple statements")]
    MultipleStatements,

    /// A string literal, quoted identifier or comment is not terminated.
    #[error("ambiguous scope: unterminated {what}")]
    Unterminated { what: &'static str },

    /// An `E'...'` literal whose end depends on whether backslash escapes apply.
    #[error("ambiguous scope: escape string literal has a backslash-escaped quote")]
    EscapedQuote,

    /// The marker's table qualifier is not a plain identifier.
    #[error("ambiguous scope: invalid scope qualifier '{qualifier}'")]
    InvalidQualifier { qualifier: String },

    /// A table or column name is not a plain identifier.
    #[error("ambiguous scope: invalid identifier '{identifier}'")]
    InvalidIdentifier { identifier: String },

    /// A placeholder references a parameter that was not supplied.
    #[error("ambiguous scope: placeholder {found} exceeds {supplied} supplied parameters")]
    PlaceholderOutOfRange { found: usize, supplied: usize },

    /// The statement uses placeholders of the wrong dialect.
    #[error("ambiguous scope: placeholder '{placeholder}' does not match the backend dialect")]
    ForeignPlaceholder { placeholder: String },

    /// The statement assigns the scope column itself.
    #[error("ambiguous scope: statement sets the silo column explicitly")]
    ExplicitSiloColumn,

    /// A row came back carrying a silo other than the bound one.
    #[error("scope violation: row belongs to {found}, session bound to {expected}")]
    RowOutsideScope { expected: Silo, found: String },

    /// A row came back without the silo column, so it cannot be verified.
    #[error("scope violation: row does not expose the silo column")]
    RowMissingScope,
}

impl ScopeError {
    /// Returns `true` if the statement was rejected before execution.
    pub fn is_ambiguous(&self) -> bool {
        !matches!(
            self,
            ScopeError::RowOutsideScope { .. } | ScopeError::RowMissingScope
        )
    }
}

/// Errors related to the audit trail.
#[derive(Error, Debug)]
pub enum AuditError {
    /// The sink failed to persist an entry.
    #[error("audit write failed for {action} on {entity_id}: {message}")]
    WriteFailed {
        action: String,
        entity_id: String,
        message: String,
    },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "postgres".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}
