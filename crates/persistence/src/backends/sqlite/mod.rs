//! SQLite backend implementation.
//!
//! Supports both in-memory databases (tests and development) and file-based
//! databases (small deployments).
//!
//! # Silo binding
//!
//! Each session opens a transaction and writes the silo into the
//! per-connection `temp.silo_session` table. The executor reads it back
//! before every statement. Commit deletes the row, rollback discards it, and
//! the pool manager refuses to recycle a connection that still carries one.
//!
//! # Example
//!
//! ```no_run
//! use portal_persistence::backends::sqlite::SqliteBackend;
//! use portal_persistence::core::{SiloSession, SiloStore};
//! use portal_persistence::scope::{scoped_query, ScopedStatement};
//! use portal_persistence::silo::{resolve_context, Principal, Role};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! let ctx = resolve_context(Some(&Principal::new("u-1", Role::staff(), "BF")))?;
//! let mut session = backend.begin_session(&ctx).await?;
//! let rows = scoped_query(
//!     &mut session,
//!     &ctx,
//!     &ScopedStatement::new("SELECT id, name, silo FROM contacts WHERE {silo_scope}"),
//!     vec![],
//! )
//! .await?;
//! Box::new(session).commit().await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE contacts (
//!     silo TEXT NOT NULL CHECK (silo IN ('BF', 'BI', 'SLF')),
//!     id TEXT NOT NULL,
//!     name TEXT NOT NULL,
//!     ...
//!     PRIMARY KEY (silo, id)
//! );
//! -- loan_applications and commissions follow the same shape.
//!
//! CREATE TABLE audit_log (...);  -- UPDATE and DELETE abort via triggers
//! ```

mod audit;
mod backend;
mod schema;
mod session;
mod value;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use schema::SCHEMA_VERSION;
pub use session::{BINDING_KEY, SqliteSession, bind_session};
