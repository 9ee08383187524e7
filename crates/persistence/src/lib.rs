//! Silo-Isolated Persistence Layer
//!
//! This crate keeps the portal's three business lines (`BF`, `BI`, `SLF`)
//! apart at the storage layer. Every read and write against a silo-owned
//! table runs on a session whose silo binding came from the authenticated
//! principal, and every statement is scoped to that silo before it reaches
//! the database.
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! portal-persistence = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! Available backend features:
//! - `sqlite` (default) - SQLite with in-memory and file modes
//! - `postgres` - PostgreSQL with forced row-level security
//!
//! # Architecture
//!
//! - [`silo`] - Silos, principals, request context resolution and route guards
//! - [`core`] - Storage traits: [`SiloStore`] hands out silo-bound [`SiloSession`]s
//! - [`scope`] - Statement scoping and the scoped query executor
//! - [`audit`] - Append-only audit trail with sync and async write paths
//! - [`error`] - Error types for all operations
//! - [`backends`] - SQLite and PostgreSQL implementations
//!
//! # Request Flow
//!
//! 1. Resolve the [`RequestSiloContext`] from the principal ([`silo::resolve_context`])
//! 2. Bind a session to it ([`SiloStore::begin_session`])
//! 3. Check the route's silo and roles ([`silo::require_silo`])
//! 4. Run scoped statements ([`scope::scoped_query`] and friends)
//! 5. Commit or roll back, which always clears the binding
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use portal_persistence::backends::sqlite::SqliteBackend;
//! use portal_persistence::scope::{scoped_query, ScopedStatement, SqlValue};
//! use portal_persistence::silo::{resolve_context, Principal, Role};
//! use portal_persistence::{SiloSession, SiloStore};
//!
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! let principal = Principal::new("staff-7", Role::staff(), "BF");
//! let ctx = resolve_context(Some(&principal))?;
//!
//! let mut session = backend.begin_session(&ctx).await?;
//! let statement = ScopedStatement::new("SELECT id, name, silo FROM contacts WHERE id = ?1 AND {silo_scope}");
//! let rows = scoped_query(&mut session, &ctx, &statement, vec![SqlValue::from("c-1")]).await?;
//! Box::new(session).commit().await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod audit;
pub mod backends;
pub mod core;
pub mod error;
pub mod scope;
pub mod silo;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use silo::{Principal, RequestSiloContext, Role, Silo};

// Re-export core traits
pub use core::{BackendKind, SiloSession, SiloStore};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
