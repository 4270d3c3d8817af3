//! Database error types.

use thiserror::Error;

/// Custom database error type.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection error
    #[error("Database connection failed: {0}")]
    ConnectionError(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Constraint violation (unique, foreign key, etc.)
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Data (de)serialization error on a JSON column
    #[error("Data error: {0}")]
    DataError(String),

    /// Query execution error
    #[error("Query error: {0}")]
    QueryError(String),
}

impl DatabaseError {
    pub fn not_found(context: impl Into<String>) -> Self {
        DatabaseError::NotFound(context.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DatabaseError::ConstraintViolation(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound("No matching row found in database".to_string())
            }
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DatabaseError::ConstraintViolation(db.to_string())
            }
            sqlx::Error::Io(err) => DatabaseError::ConnectionError(err.to_string()),
            sqlx::Error::PoolTimedOut => {
                DatabaseError::ConnectionError("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionError("connection pool is closed".to_string())
            }
            err => DatabaseError::QueryError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::DataError(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(err.is_not_found());
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::not_found("assistant 123");
        assert!(format!("{}", err).contains("not found"));
    }
}
