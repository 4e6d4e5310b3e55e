//! Centralized error types for Kinship.
//!
//! Every store and router operation returns [`KinshipResult`]. Variants group into
//! a small set of [`ErrorKind`]s so that both channels (in-world and web) can
//! render the same failure, and the REST layer can turn them into HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Core application error type used across all Kinship crates.
#[derive(Debug, thiserror::Error)]
pub enum KinshipError {
    // === Resource errors ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    // === Permission errors ===
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("You are muted in this group until {until_ms}")]
    Muted { until_ms: i64 },

    #[error("You are banned from this group")]
    Banned,

    // === Capacity ===
    #[error("{resource} is full")]
    Full { resource: String },

    // === State / input errors ===
    #[error("{message}")]
    InvalidState { message: String },

    #[error("Invalid invite code")]
    InvalidCode,

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // === Auth errors ===
    #[error("Not authenticated")]
    Unauthenticated,

    // === Infrastructure errors ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("World loop unavailable")]
    WorldUnavailable,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Coarse failure taxonomy shared by both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Forbidden,
    Full,
    InvalidState,
    InvalidCode,
    Validation,
    Unauthenticated,
    TransportFailure,
}

/// JSON error body sent to web clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl KinshipError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn full(resource: impl Into<String>) -> Self {
        Self::Full {
            resource: resource.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Forbidden { .. } | Self::Muted { .. } | Self::Banned => ErrorKind::Forbidden,
            Self::Full { .. } => ErrorKind::Full,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::InvalidCode => ErrorKind::InvalidCode,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Database(_) | Self::Codec(_) | Self::WorldUnavailable | Self::Internal(_) => {
                ErrorKind::TransportFailure
            }
        }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Full => StatusCode::CONFLICT,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::InvalidCode | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::TransportFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Muted { .. } => "MUTED",
            Self::Banned => "BANNED",
            Self::Full { .. } => "FULL",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::InvalidCode => "INVALID_CODE",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Codec(_) => "CODEC_ERROR",
            Self::WorldUnavailable => "WORLD_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this failure comes from infrastructure rather than the caller.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::TransportFailure
    }

    /// Client-facing body. Infrastructure details stay in the logs.
    pub fn body(&self) -> ErrorBody {
        let message = if self.is_transport() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };
        ErrorBody {
            code: self.error_code().to_string(),
            kind: self.kind(),
            message,
        }
    }
}

impl IntoResponse for KinshipError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "success": false,
            "error": self.body(),
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results using KinshipError.
pub type KinshipResult<T> = Result<T, KinshipError>;
