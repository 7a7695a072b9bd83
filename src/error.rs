//! Unified application error model and mapping helpers.
//! `IdentityError` is the taxonomy raised by the stores, the authentication
//! service, the protocol endpoint and the login/consent flows. `AppError` is
//! what the HTTP frontend renders, with a helper mapping to status codes.

use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("session not found")]
    SessionNotFound,
    /// Bad credentials or unknown account; deliberately indistinguishable.
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("no such user: {name}")]
    NotFound { name: String },
    #[error("this action requires logging in as {required}")]
    WrongIdentity { required: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("user directory error: {0}")]
    UserDirectory(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("random source unavailable: {0}")]
    Entropy(String),
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON format error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Clone)]
pub enum AppError {
    NotFound { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Protocol { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::NotFound { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Protocol { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::NotFound { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Protocol { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> Self { AppError::NotFound { code: code.into(), message: message.into() } }
    pub fn auth(code: &str, message: impl Into<String>) -> Self { AppError::Auth { code: code.into(), message: message.into() } }
    pub fn forbidden(code: &str, message: impl Into<String>) -> Self { AppError::Forbidden { code: code.into(), message: message.into() } }
    pub fn protocol(code: &str, message: impl Into<String>) -> Self { AppError::Protocol { code: code.into(), message: message.into() } }
    pub fn io(code: &str, message: impl Into<String>) -> Self { AppError::Io { code: code.into(), message: message.into() } }
    pub fn internal(code: &str, message: impl Into<String>) -> Self { AppError::Internal { code: code.into(), message: message.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::NotFound { .. } => 404,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            // Protocol errors are reported to the user agent as a normal page
            AppError::Protocol { .. } => 200,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        let message = err.to_string();
        match err {
            IdentityError::SessionNotFound => AppError::auth("session_not_found", "Your session has ended."),
            IdentityError::AuthenticationFailed => AppError::auth("authentication_failed", "The login details were incorrect."),
            IdentityError::NotFound { .. } => AppError::not_found("not_found", message),
            IdentityError::WrongIdentity { .. } => AppError::forbidden("wrong_identity", message),
            IdentityError::Protocol(_) => AppError::protocol("protocol_error", message),
            IdentityError::Io(_) => AppError::io("io", message),
            IdentityError::UserDirectory(_)
            | IdentityError::Config(_)
            | IdentityError::Entropy(_)
            | IdentityError::Json(_) => AppError::internal("internal", message),
        }
    }
}
