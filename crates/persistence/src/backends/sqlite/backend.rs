//! SQLite backend implementation.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::{ManageConnection, Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::SiloStore;
use crate::error::{BackendError, StorageError, StorageResult};
use crate::silo::RequestSiloContext;

use super::schema::{self, BINDING_TABLE_DDL};
use super::session::{BINDING_KEY, SqliteSession};

/// SQLite backend for silo-scoped storage.
pub struct SqliteBackend {
    pool: Pool<SiloConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
    /// Keeps a shared in-memory database alive while pool connections come and go.
    _anchor: Option<Mutex<Connection>>,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteBackendConfig {
    /// Sets the maximum pool size.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self.min_connections = self.min_connections.min(max);
        self
    }
}

/// Connection manager that refuses to recycle a connection still carrying a
/// transaction or a silo binding.
pub(crate) struct SiloConnectionManager {
    inner: SqliteConnectionManager,
}

impl SiloConnectionManager {
    fn binding_rows(conn: &Connection) -> rusqlite::Result<i64> {
        conn.query_row("SELECT COUNT(*) FROM temp.silo_session", [], |row| {
            row.get(0)
        })
    }
}

impl ManageConnection for SiloConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        self.inner.connect()
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        if !conn.is_autocommit() || Self::binding_rows(conn)? > 0 {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_MISUSE),
                Some("connection returned with an open silo session".to_string()),
            ));
        }
        Ok(())
    }

    fn has_broken(&self, conn: &mut Connection) -> bool {
        let clean = conn.is_autocommit() && matches!(Self::binding_rows(conn), Ok(0));
        if !clean {
            tracing::warn!("Discarding SQLite connection that still carries a silo session");
        }
        !clean
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    ///
    /// Every pooled connection shares one private in-memory database.
    pub fn in_memory() -> StorageResult<Self> {
        Self::in_memory_with_config(SqliteBackendConfig::default())
    }

    /// Creates an in-memory backend with custom configuration.
    pub fn in_memory_with_config(config: SqliteBackendConfig) -> StorageResult<Self> {
        let uri = format!("file:portal-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let anchor = Connection::open_with_flags(&uri, flags)?;
        let mut backend = Self::build(SqliteConnectionManager::file(&uri).with_flags(flags), config, true)?;
        backend._anchor = Some(Mutex::new(anchor));
        Ok(backend)
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a file-based backend with custom configuration.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        Self::build(manager, config, false)
    }

    fn build(
        manager: SqliteConnectionManager,
        config: SqliteBackendConfig,
        is_memory: bool,
    ) -> StorageResult<Self> {
        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let foreign_keys = config.enable_foreign_keys;
        let wal = config.enable_wal && !is_memory;

        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = ON")?;
            }
            if wal {
                conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
            }
            conn.execute_batch(BINDING_TABLE_DDL)
        });

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .test_on_check_out(true)
            .build(SiloConnectionManager { inner: manager })
            .map_err(|e| {
                StorageError::Backend(BackendError::ConnectionFailed {
                    backend_name: "sqlite".to_string(),
                    message: e.to_string(),
                })
            })?;

        tracing::info!(
            max_connections = config.max_connections,
            in_memory = is_memory,
            "SQLite pool ready"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
            _anchor: None,
        })
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SiloConnectionManager>> {
        self.pool.get().map_err(|e| {
            StorageError::Backend(BackendError::ConnectionFailed {
                backend_name: "sqlite".to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Reads the silo binding visible on a freshly checked-out connection.
    ///
    /// Outside a session this is always `None`; anything else means a binding
    /// leaked into the pool.
    pub fn probe_binding(&self) -> StorageResult<Option<String>> {
        let conn = self.get_connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM temp.silo_session WHERE key = ?1",
                [BINDING_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Runs administrative SQL outside any silo session, such as seeding fixtures.
    ///
    /// Not for request handling: nothing here is scoped.
    pub fn execute_admin_batch(&self, sql: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

#[async_trait]
impl SiloStore for SqliteBackend {
    type Session = SqliteSession;

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn begin_session(&self, context: &RequestSiloContext) -> StorageResult<SqliteSession> {
        let conn = self.get_connection()?;
        SqliteSession::begin(conn, context.clone())
    }

    async fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_connection().map_err(|_| {
            StorageError::Backend(BackendError::Unavailable {
                backend_name: "sqlite".to_string(),
                message: "Failed to get connection".to_string(),
            })
        })?;
        conn.query_row("SELECT 1", [], |_| Ok(())).map_err(|e| {
            StorageError::Backend(BackendError::Internal {
                backend_name: "sqlite".to_string(),
                message: format!("Health check failed: {}", e),
                source: None,
            })
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_connections_share_one_database() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();

        let a = backend.get_connection().unwrap();
        let b = backend.get_connection().unwrap();
        a.execute(
            "INSERT INTO contacts (silo, id, name) VALUES ('BF', 'c1', 'Ada')",
            [],
        )
        .unwrap();
        let count: i64 = b
            .query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_separate_in_memory_backends_are_isolated() {
        let first = SqliteBackend::in_memory().unwrap();
        let second = SqliteBackend::in_memory().unwrap();
        first.init_schema().unwrap();
        first
            .execute_admin_batch("INSERT INTO contacts (silo, id, name) VALUES ('BI', 'c1', 'x')")
            .unwrap();

        let conn = second.get_connection().unwrap();
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE name = 'contacts'",
                [],
                |r| r.get(0),
            )
            .optional()
            .unwrap();
        assert!(exists.is_none());
    }

    #[test]
    fn test_probe_binding_is_empty_outside_sessions() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert_eq!(backend.probe_binding().unwrap(), None);
    }

    #[test]
    fn test_config_defaults() {
        let config: SqliteBackendConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.enable_wal);
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.health_check().await.is_ok());
    }
}
