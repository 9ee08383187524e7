//! Database backend implementations.
//!
//! Each backend is gated behind a feature flag and implements
//! [`SiloStore`](crate::core::SiloStore) and
//! [`AuditSink`](crate::audit::AuditSink).
//!
//! | Backend | Feature | Silo binding |
//! |---------|---------|--------------|
//! | SQLite | `sqlite` | Row in the per-connection `temp.silo_session` table |
//! | PostgreSQL | `postgres` | `set_config('app.current_silo', ..., true)` plus row-level security |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use portal_persistence::backends::sqlite::SqliteBackend;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory SQLite backend
//! let backend = SqliteBackend::in_memory()?;
//!
//! // Or use a file-based database
//! let backend = SqliteBackend::open("./data/portal.db")?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
