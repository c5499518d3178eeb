use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::middleware::recover::server_failure;

/// AppError
///
/// Every fallible operation in a handler or middleware returns this type. Client
/// errors map to their 4xx status directly; everything else becomes a server
/// failure that the panic boundary logs with the request's method and URI.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("render error: {0}")]
    Render(#[from] std::fmt::Error),

    #[error("email address is already in use")]
    DuplicateEmail,

    #[error("not found")]
    NotFound,

    #[error("bad request")]
    BadRequest,

    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AppError::PasswordHash(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => plain(StatusCode::NOT_FOUND),
            AppError::BadRequest => plain(StatusCode::BAD_REQUEST),
            AppError::DuplicateEmail => plain(StatusCode::CONFLICT),
            other => server_failure(other.to_string()),
        }
    }
}

fn plain(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (status, reason).into_response()
}

pub type AppResult<T> = Result<T, AppError>;
