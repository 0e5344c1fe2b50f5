use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::models::ExportStatus;

/// Errors surfaced by the record stores
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition from {current}")]
    InvalidTransition { current: ExportStatus },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

impl DatabaseError {
    /// Map an insert failure, turning unique-constraint violations into `DuplicateKey`
    pub fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return DatabaseError::DuplicateKey(what.to_string());
            }
        }
        DatabaseError::Sqlx(err)
    }
}

/// Owns the Postgres connection pool
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!(max_connections = config.max_connections, "Created database pool");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError as SqlDatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;

    /// Server error carrying only a SQLSTATE
    #[derive(Debug)]
    struct ServerError(&'static str);

    impl std::fmt::Display for ServerError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "server error {}", self.0)
        }
    }

    impl StdError for ServerError {}

    impl SqlDatabaseError for ServerError {
        fn message(&self) -> &str {
            "server error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                UNIQUE_VIOLATION => ErrorKind::UniqueViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn server_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ServerError(code)))
    }

    #[test]
    fn unique_violation_is_duplicate_key() {
        let err = DatabaseError::from_insert(server_error("23505"), "users.phone");
        assert!(matches!(err, DatabaseError::DuplicateKey(what) if what == "users.phone"));
    }

    #[test]
    fn other_insert_failures_stay_sqlx() {
        let err = DatabaseError::from_insert(server_error("23503"), "attendance");
        assert!(matches!(err, DatabaseError::Sqlx(sqlx::Error::Database(_))));

        let err = DatabaseError::from_insert(sqlx::Error::RowNotFound, "attendance");
        assert!(matches!(err, DatabaseError::Sqlx(sqlx::Error::RowNotFound)));
    }

    #[tokio::test]
    async fn connect_requires_database_url() {
        let config = DatabaseConfig {
            url: None,
            max_connections: 1,
            connection_timeout: 1,
        };
        let result = DatabaseManager::connect(&config).await;
        assert!(matches!(result, Err(DatabaseError::ConfigMissing("DATABASE_URL"))));
    }
}
