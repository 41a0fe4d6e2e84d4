//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres and the Postgres
//! implementation of the Record Store.
//!
//! Submission transactions own a pooled session for their whole life. If a
//! transaction is dropped before COMMIT or ROLLBACK completes (early return,
//! panic, or a cancelled request future) the session is rolled back on a
//! background task and only then handed back to the pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, SslMode,
    Timeouts,
};
use intake_core::{
    ApplicationData, ApplicationId, ApplicationRecord, RowId, StorageError, StorageResult,
};
use intake_storage::{ApplicationStore, InsertedRow, SubmissionTransaction};
use postgres_native_tls::MakeTlsConnector;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

/// Schema bootstrap, applied at startup.
const SCHEMA_SQL: &str = include_str!("../migrations/001_applications.sql");

const SELECT_ONE_SQL: &str = "SELECT id::bigint, application_id, application_data, created_at \
     FROM applications WHERE application_id = $1";

const SELECT_ALL_SQL: &str = "SELECT id::bigint, application_id, application_data, created_at \
     FROM applications WHERE application_id IS NOT NULL ORDER BY id DESC";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// TLS negotiation for database connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbSslMode {
    Disable,
    Prefer,
    Require,
}

impl DbSslMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "disable" | "off" | "false" => Some(Self::Disable),
            "prefer" => Some(Self::Prefer),
            "require" | "on" | "true" => Some(Self::Require),
            _ => None,
        }
    }
}

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: SecretString,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create/recycle timeout for pooled sessions
    pub timeout: Duration,
    /// Server-side statement timeout
    pub statement_timeout: Option<Duration>,
    /// TLS negotiation
    pub ssl_mode: DbSslMode,
    /// Skip certificate verification. Managed Postgres providers with
    /// self-signed chains need this; it removes protection against
    /// man-in-the-middle attacks on the database link.
    pub accept_invalid_certs: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "intake".to_string(),
            user: "postgres".to_string(),
            password: SecretString::from(""),
            max_size: 16,
            timeout: Duration::from_secs(30),
            statement_timeout: None,
            ssl_mode: DbSslMode::Disable,
            accept_invalid_certs: false,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `INTAKE_DB_HOST`, `INTAKE_DB_PORT`, `INTAKE_DB_NAME`, `INTAKE_DB_USER`,
    ///   `INTAKE_DB_PASSWORD`
    /// - `INTAKE_DB_POOL_SIZE`: Maximum sessions (default: 16)
    /// - `INTAKE_DB_TIMEOUT`: Session wait/connect timeout in seconds (default: 30)
    /// - `INTAKE_DB_STATEMENT_TIMEOUT_MS`: Server-side statement timeout (unset = none)
    /// - `INTAKE_DB_SSL`: "disable", "prefer" or "require" (default: disable)
    /// - `INTAKE_DB_ACCEPT_INVALID_CERTS`: "true" to skip certificate checks
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("INTAKE_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("INTAKE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("INTAKE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("INTAKE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("INTAKE_DB_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.password),
            max_size: std::env::var("INTAKE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("INTAKE_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            statement_timeout: std::env::var("INTAKE_DB_STATEMENT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis),
            ssl_mode: std::env::var("INTAKE_DB_SSL")
                .ok()
                .and_then(|s| DbSslMode::parse(&s))
                .unwrap_or(defaults.ssl_mode),
            accept_invalid_certs: std::env::var("INTAKE_DB_ACCEPT_INVALID_CERTS")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());
        cfg.options = self
            .statement_timeout
            .map(|t| format!("-c statement_timeout={}", t.as_millis()));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_cfg);

        let pool = match self.ssl_mode {
            DbSslMode::Disable => {
                cfg.ssl_mode = Some(SslMode::Disable);
                cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            }
            mode => {
                cfg.ssl_mode = Some(if mode == DbSslMode::Require {
                    SslMode::Require
                } else {
                    SslMode::Prefer
                });
                if self.accept_invalid_certs {
                    tracing::warn!(
                        host = %self.host,
                        "Database TLS certificate verification is disabled"
                    );
                }
                let connector = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(self.accept_invalid_certs)
                    .build()
                    .map_err(|e| {
                        ApiError::internal_error(format!("Failed to build TLS connector: {}", e))
                    })?;
                cfg.create_pool(Some(Runtime::Tokio1), MakeTlsConnector::new(connector))
            }
        }
        .map_err(|e| ApiError::internal_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn storage_error(err: tokio_postgres::Error) -> StorageError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let constraint = err
            .as_db_error()
            .and_then(|db| db.constraint())
            .unwrap_or("unique")
            .to_string();
        return StorageError::Duplicate { constraint };
    }

    tracing::error!("Database error: {:?}", err);
    if err.is_closed() {
        StorageError::Connection {
            reason: err.to_string(),
        }
    } else {
        StorageError::Query {
            reason: err.to_string(),
        }
    }
}

fn pool_error(err: PoolError) -> StorageError {
    tracing::error!("Connection pool error: {:?}", err);
    match err {
        PoolError::Timeout(_) => StorageError::Unavailable {
            reason: "timed out waiting for a database session".to_string(),
        },
        PoolError::Closed => StorageError::Unavailable {
            reason: "database connection pool is closed".to_string(),
        },
        PoolError::Backend(e) => storage_error(e),
        other => StorageError::Connection {
            reason: other.to_string(),
        },
    }
}

fn record_from_row(row: &Row) -> StorageResult<ApplicationRecord> {
    let decode = |e: tokio_postgres::Error| StorageError::Query {
        reason: format!("failed to decode application row: {}", e),
    };

    let id: i64 = row.try_get(0).map_err(decode)?;
    let application_id: Option<String> = row.try_get(1).map_err(decode)?;
    let application_data: JsonValue = row.try_get(2).map_err(decode)?;
    let created_at = row.try_get(3).map_err(decode)?;

    let application_id = application_id.ok_or_else(|| StorageError::Query {
        reason: format!("row {} has no display identifier", id),
    })?;

    Ok(ApplicationRecord {
        id,
        application_id: ApplicationId::from_stored(application_id),
        application_data: ApplicationData::new(application_data),
        created_at,
    })
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Postgres-backed Record Store wrapping a connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Sessions currently idle in the pool.
    pub fn idle_sessions(&self) -> usize {
        self.pool.status().available
    }

    /// Get a connection from the pool.
    pub async fn get_conn(&self) -> StorageResult<Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Create the applications table and its indexes if missing.
    pub async fn migrate(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(storage_error)?;
        tracing::info!("Database schema is up to date");
        Ok(())
    }

    /// Acquire and release one session, logging the outcome.
    ///
    /// Used at startup; a failure is reported but does not stop the server.
    pub async fn probe(&self) -> bool {
        match self.health_check().await {
            Ok(()) => {
                tracing::info!(pool_size = self.pool_size(), "Database connected");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Database connection failed");
                false
            }
        }
    }
}

#[async_trait]
impl ApplicationStore for DbClient {
    async fn begin(&self) -> StorageResult<Box<dyn SubmissionTransaction>> {
        let conn = self.get_conn().await?;
        let tx = PgTransaction { conn: Some(conn) };
        // From here on Drop rolls back, even if BEGIN itself is interrupted.
        tx.session()?.batch_execute("BEGIN").await.map_err(storage_error)?;
        Ok(Box::new(tx))
    }

    async fn get(&self, application_id: &str) -> StorageResult<Option<ApplicationRecord>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(SELECT_ONE_SQL, &[&application_id])
            .await
            .map_err(storage_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list(&self) -> StorageResult<Vec<ApplicationRecord>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(SELECT_ALL_SQL, &[])
            .await
            .map_err(storage_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn replace_data(
        &self,
        application_id: &str,
        data: &ApplicationData,
    ) -> StorageResult<bool> {
        let conn = self.get_conn().await?;
        let payload = data.as_value();
        let updated = conn
            .execute(
                "UPDATE applications SET application_data = $1 WHERE application_id = $2",
                &[payload, &application_id],
            )
            .await
            .map_err(storage_error)?;
        Ok(updated > 0)
    }

    async fn delete(&self, application_id: &str) -> StorageResult<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM applications WHERE application_id = $1",
                &[&application_id],
            )
            .await
            .map_err(storage_error)?;
        Ok(deleted > 0)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(storage_error)?;
        Ok(())
    }
}

// ============================================================================
// SUBMISSION TRANSACTION
// ============================================================================

/// A pooled session inside `BEGIN`.
///
/// `conn` is `None` once COMMIT or ROLLBACK has been issued.
struct PgTransaction {
    conn: Option<Object>,
}

impl PgTransaction {
    fn session(&self) -> StorageResult<&Object> {
        self.conn.as_ref().ok_or_else(|| StorageError::TransactionFailed {
            reason: "transaction already finished".to_string(),
        })
    }

    async fn finish(mut self: Box<Self>, statement: &'static str) -> StorageResult<()> {
        let conn = self.conn.take().ok_or_else(|| StorageError::TransactionFailed {
            reason: "transaction already finished".to_string(),
        })?;
        let result = conn.batch_execute(statement).await.map_err(|e| {
            let err = storage_error(e);
            StorageError::TransactionFailed {
                reason: format!("{} failed: {}", statement, err),
            }
        });
        if result.is_err() && !conn.is_closed() {
            // The session may still be inside the transaction; never recycle it.
            let _ = Object::take(conn);
        }
        result
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = conn.batch_execute("ROLLBACK").await;
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Rollback of abandoned transaction failed");
                        let _ = Object::take(conn);
                    }
                });
            }
            Err(_) => {
                // No runtime to roll back on; detach so the pool never reuses it.
                let _ = Object::take(conn);
            }
        }
    }
}

#[async_trait]
impl SubmissionTransaction for PgTransaction {
    async fn insert(&mut self, data: &ApplicationData) -> StorageResult<InsertedRow> {
        let payload = data.as_value();
        let row = self
            .session()?
            .query_one(
                "INSERT INTO applications (application_data) VALUES ($1) \
                 RETURNING id::bigint, created_at",
                &[payload],
            )
            .await
            .map_err(storage_error)?;

        Ok(InsertedRow {
            id: row.get(0),
            created_at: row.get(1),
        })
    }

    async fn set_application_id(
        &mut self,
        row_id: RowId,
        application_id: &ApplicationId,
    ) -> StorageResult<()> {
        let updated = self
            .session()?
            .execute(
                "UPDATE applications SET application_id = $1 \
                 WHERE id = $2::bigint AND application_id IS NULL",
                &[&application_id.as_str(), &row_id],
            )
            .await
            .map_err(storage_error)?;

        if updated != 1 {
            return Err(StorageError::Query {
                reason: format!("row {} was not available for identifier assignment", row_id),
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.finish("ROLLBACK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parse() {
        assert_eq!(DbSslMode::parse("require"), Some(DbSslMode::Require));
        assert_eq!(DbSslMode::parse(" Prefer "), Some(DbSslMode::Prefer));
        assert_eq!(DbSslMode::parse("disable"), Some(DbSslMode::Disable));
        assert_eq!(DbSslMode::parse("verify-full"), None);
    }

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 16);
        assert_eq!(config.ssl_mode, DbSslMode::Disable);
        assert!(!config.accept_invalid_certs);
        assert!(config.statement_timeout.is_none());
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() -> ApiResult<()> {
        // No server is contacted until a session is requested.
        let client = DbClient::from_config(&DbConfig::default())?;
        assert_eq!(client.pool_size(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_tls_pool_creation() -> ApiResult<()> {
        let config = DbConfig {
            ssl_mode: DbSslMode::Require,
            accept_invalid_certs: true,
            ..Default::default()
        };
        let client = DbClient::from_config(&config)?;
        assert_eq!(client.idle_sessions(), 0);
        Ok(())
    }

    #[test]
    fn test_schema_declares_constraints() {
        assert!(SCHEMA_SQL.contains("CREATE TABLE IF NOT EXISTS applications"));
        assert!(SCHEMA_SQL.contains("application_id   TEXT UNIQUE"));
        assert!(SCHEMA_SQL.contains(intake_storage::memory::PAN_UNIQUE_CONSTRAINT));
    }
}
