//! PostgreSQL backend implementation.
//!
//! Connection pooling via deadpool-postgres. Each session binds the silo as
//! the transaction-local setting `app.current_silo`, and every silo table
//! carries a forced row-level security policy that compares against it.
//!
//! # Example
//!
//! ```no_run
//! use portal_persistence::backends::postgres::{PostgresBackend, PostgresConfig};
//!
//! # async fn main_example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = PostgresBackend::new(PostgresConfig::default()).await?;
//! backend.init_schema().await?;
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
//!     ...
//!     PRIMARY KEY (silo, id)
//! );
//! ALTER TABLE contacts ENABLE ROW LEVEL SECURITY;
//! ALTER TABLE contacts FORCE ROW LEVEL SECURITY;
//! CREATE POLICY silo_isolation ON contacts
//!     USING (silo = current_setting('app.current_silo', true))
//!     WITH CHECK (silo = current_setting('app.current_silo', true));
//! ```

mod audit;
mod backend;
pub(crate) mod schema;
mod session;
mod value;

pub use backend::{PostgresBackend, PostgresConfig, PostgresSslMode};
pub use schema::{SCHEMA_VERSION, SILO_TABLES, row_level_security_ddl};
pub use session::{BINDING_SETTING, PostgresSession, bind_session};
