use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{}", .0.as_deref().unwrap_or("Not found"))]
    NotFound(Option<String>),

    #[error("{message}")]
    ValidationError {
        message: String,
        details: Option<HashMap<String, Vec<String>>>,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Too many requests, please try again later.")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(Some(msg.into()))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::ValidationError {
            message: msg.into(),
            details: None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        AppError::ValidationError {
            message: "Validation failed".into(),
            details: Some(details),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    ValidationError,
    Conflict,
    InvalidSignature,
    RateLimited,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
