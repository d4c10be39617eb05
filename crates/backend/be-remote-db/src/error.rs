//! Error types for the billing database

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("{entity} not found{}", .id.as_ref().map(|id| format!(": {}", id)).unwrap_or_default())]
    NotFound {
        entity: &'static str,
        id: Option<String>,
    },

    #[error("Duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    #[error("Referenced record does not exist: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl DbError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity, id: None }
    }

    pub fn not_found_with_id(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: Some(id.into()),
        }
    }

    pub fn duplicate(field: &'static str, value: impl Into<String>) -> Self {
        Self::Duplicate {
            field,
            value: value.into(),
        }
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "record",
                id: None,
            },
            sqlx::Error::Database(db_err) => {
                // PostgreSQL error codes
                // 23505 = unique_violation
                // 23503 = foreign_key_violation
                // 23514 = check_violation
                match db_err.code().as_deref() {
                    Some("23505") => Self::Duplicate {
                        field: "constraint",
                        value: db_err.constraint().unwrap_or("unknown").to_string(),
                    },
                    Some("23503") => Self::ForeignKeyViolation {
                        constraint: db_err
                            .constraint()
                            .unwrap_or("referenced record")
                            .to_string(),
                    },
                    Some("23514") => Self::InvalidInput(db_err.message().to_string()),
                    _ => Self::Database(sqlx::Error::Database(db_err)),
                }
            }
            sqlx::Error::PoolTimedOut => Self::Pool("Connection pool timed out".to_string()),
            sqlx::Error::PoolClosed => Self::Pool("Connection pool is closed".to_string()),
            sqlx::Error::Io(io_err) => Self::Connection(io_err.to_string()),
            sqlx::Error::Tls(tls_err) => Self::Connection(format!("TLS error: {}", tls_err)),
            other => Self::Database(other),
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = DbError::not_found("plan");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "plan not found");

        let err_with_id = DbError::not_found_with_id("payment", "0190a6f2");
        assert!(err_with_id.is_not_found());
        assert_eq!(err_with_id.to_string(), "payment not found: 0190a6f2");
    }

    #[test]
    fn test_duplicate_error() {
        let err = DbError::duplicate("checkout_request_id", "ws_CO_191220191020363925");
        assert!(err.is_duplicate());
        assert_eq!(
            err.to_string(),
            "Duplicate checkout_request_id: ws_CO_191220191020363925"
        );
    }

    #[test]
    fn test_connection_error() {
        let err = DbError::connection("Failed to connect");
        assert_eq!(
            err.to_string(),
            "Database connection error: Failed to connect"
        );
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let sqlx_err = sqlx::Error::RowNotFound;
        let db_err: DbError = sqlx_err.into();
        assert!(db_err.is_not_found());
    }

    #[test]
    fn test_from_sqlx_pool_timeout() {
        let db_err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(db_err, DbError::Pool(_)));
    }
}
