//! PostgreSQL backend
//!
//! Executes compiled statements through a deadpool-postgres pool. One
//! service instance manages one database and by default holds a single
//! connection.

use crate::persistence::{CompiledQuery, Persistence, SqlParam, SqlValue, Tuple};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use gridbase_core::config::{env_or, env_parse, resolve_secret};
use gridbase_core::{ConfigError, StorageError};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use uuid::Uuid;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection settings for one managed database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database name; also the suffix of every environment variable.
    pub dbname: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub max_size: usize,
    /// Connect and pool-wait timeout.
    pub timeout: Duration,
}

impl DbConfig {
    /// Resolve the configuration of `db_name` from the environment.
    ///
    /// The password comes from `DB_PASSWORD_{db}` or the file named by
    /// `DB_PASSWORD_FILE_{db}` (default `/run/secrets/db-password`).
    pub fn from_env(db_name: &str) -> Result<Self, ConfigError> {
        let password_file = env_or(
            &format!("DB_PASSWORD_FILE_{}", db_name),
            "/run/secrets/db-password",
        );
        let timeout_ms: u64 = env_parse(&format!("TIMEOUT_THRESHOLD_MILLISECONDS_{}", db_name), 5000)?;

        Ok(Self {
            dbname: db_name.to_string(),
            host: env_or(&format!("DB_HOST_{}", db_name), "db"),
            port: env_parse(&format!("DB_PORT_{}", db_name), 5432)?,
            user: env_or(&format!("DB_USER_NAME_{}", db_name), "gridbase"),
            password: resolve_secret(&format!("DB_PASSWORD_{}", db_name), &password_file)?,
            max_size: env_parse(&format!("DB_POOL_SIZE_{}", db_name), 1)?,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> Result<Pool, StorageError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_config = PoolConfig::new(self.max_size);
        pool_config.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_config);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::ConnectionFailed {
                reason: format!("Failed to create pool: {}", e),
            })
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

fn query_failed(err: tokio_postgres::Error) -> StorageError {
    tracing::error!("Database error: {:?}", err);
    let reason = match err.as_db_error() {
        Some(db_error) => db_error.message().to_string(),
        None => err.to_string(),
    };
    StorageError::QueryFailed { reason }
}

fn pool_failed(err: deadpool_postgres::PoolError) -> StorageError {
    tracing::error!("Connection pool error: {:?}", err);
    match err {
        deadpool_postgres::PoolError::Timeout(_) => StorageError::ConnectionFailed {
            reason: "timed out waiting for a database connection".to_string(),
        },
        deadpool_postgres::PoolError::Closed => StorageError::ConnectionFailed {
            reason: "database connection pool is closed".to_string(),
        },
        other => StorageError::ConnectionFailed {
            reason: other.to_string(),
        },
    }
}

// ============================================================================
// PERSISTENCE IMPLEMENTATION
// ============================================================================

/// [`Persistence`] over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgPersistence {
    pool: Pool,
}

impl PgPersistence {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> Result<Self, StorageError> {
        Ok(Self::new(config.create_pool()?))
    }

    async fn query(&self, query: &CompiledQuery) -> Result<Vec<tokio_postgres::Row>, StorageError> {
        let conn = self.pool.get().await.map_err(pool_failed)?;
        let params: Vec<&(dyn ToSql + Sync)> = query.params.iter().map(as_sql).collect();
        tracing::debug!(kind = %query.kind, subject = %query.subject, "executing statement");
        conn.query(query.sql.as_str(), &params).await.map_err(query_failed)
    }
}

fn as_sql(param: &SqlParam) -> &(dyn ToSql + Sync) {
    match param {
        SqlParam::Uuid(value) => value as &(dyn ToSql + Sync),
        SqlParam::Text(value) => value as &(dyn ToSql + Sync),
        SqlParam::Int(value) => value as &(dyn ToSql + Sync),
        SqlParam::Bool(value) => value as &(dyn ToSql + Sync),
    }
}

fn decode_field(row: &tokio_postgres::Row, field: usize) -> Result<SqlValue, StorageError> {
    let decode_failed = |e: tokio_postgres::Error| StorageError::DecodeFailed {
        field,
        reason: e.to_string(),
    };
    let ty = row.columns()[field].type_().clone();

    let value = match ty {
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
            .try_get::<_, Option<String>>(field)
            .map_err(decode_failed)?
            .map(SqlValue::Text),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(field)
            .map_err(decode_failed)?
            .map(|n| SqlValue::Int(n.into())),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(field)
            .map_err(decode_failed)?
            .map(|n| SqlValue::Int(n.into())),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(field)
            .map_err(decode_failed)?
            .map(SqlValue::Int),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(field)
            .map_err(decode_failed)?
            .map(SqlValue::Bool),
        Type::UUID => row
            .try_get::<_, Option<Uuid>>(field)
            .map_err(decode_failed)?
            .map(SqlValue::Uuid),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => row
            .try_get::<_, Option<Vec<Option<String>>>>(field)
            .map_err(decode_failed)?
            .map(SqlValue::TextArray),
        Type::UUID_ARRAY => row
            .try_get::<_, Option<Vec<Option<Uuid>>>>(field)
            .map_err(decode_failed)?
            .map(SqlValue::UuidArray),
        other => {
            return Err(StorageError::DecodeFailed {
                field,
                reason: format!("unsupported column type {}", other),
            })
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn to_tuple(row: &tokio_postgres::Row) -> Result<Tuple, StorageError> {
    (0..row.len())
        .map(|field| decode_field(row, field))
        .collect::<Result<Vec<_>, _>>()
        .map(Tuple::new)
}

#[async_trait]
impl Persistence for PgPersistence {
    async fn select_one(&self, query: &CompiledQuery) -> Result<Option<Tuple>, StorageError> {
        let rows = self.query(query).await?;
        rows.first().map(to_tuple).transpose()
    }

    async fn select_all(&self, query: &CompiledQuery) -> Result<Vec<Tuple>, StorageError> {
        let rows = self.query(query).await?;
        rows.iter().map(to_tuple).collect()
    }
}
