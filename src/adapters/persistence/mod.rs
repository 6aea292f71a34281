use sqlx::PgPool;

use crate::app_error::AppError;

pub mod entity;
pub mod payment;
pub mod subscription;
pub mod user;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

pub const MISSING_REFERENCE: &str = "Referenced record not found";

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound(None),
            sqlx::Error::Database(db_err) => {
                let is_unique = db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                    || db_err.message().contains("duplicate key");
                if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
                    tracing::warn!(constraint = ?db_err.constraint(), "Foreign key violation");
                    AppError::not_found(MISSING_REFERENCE)
                } else if is_unique {
                    let message = match db_err.constraint() {
                        Some(c) if c.contains("email") => "Email already exists",
                        _ => "A record with this value already exists",
                    };
                    AppError::Conflict(message.into())
                } else {
                    // Log the actual error for debugging, but don't expose details
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
