//! Statement scoping and execution.
//!
//! Every statement against a silo-owned table goes through this module:
//!
//! - [`ScopedStatement`] - Caller SQL with a `{silo_scope}` marker in its `WHERE` clause
//! - [`ScopedInsert`] - Inserts whose `silo` column always comes from the context
//! - [`ComposedStatement`] - The result of scoping: SQL plus bound parameters
//! - [`scoped_query`], [`scoped_execute`], [`scoped_insert`] - Run composed
//!   statements on a silo-bound session
//!
//! Statements the composer cannot scope with certainty (no `WHERE`, compound
//! queries, subqueries with their own `WHERE`, more than one statement, a
//! misplaced marker) are rejected with a [`ScopeError`](crate::error::ScopeError)
//! and never reach the database.

mod executor;
mod insert;
mod lexer;
mod row;
mod statement;
mod value;

pub use executor::{scoped_execute, scoped_insert, scoped_query};
pub use insert::ScopedInsert;
pub use lexer::SCOPE_MARKER;
pub use row::ScopedRow;
pub use statement::{ComposedStatement, Dialect, SILO_COLUMN, ScopedStatement};
pub use value::SqlValue;
