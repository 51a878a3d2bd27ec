use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::StoreError;
use crate::finnhub::QuoteError;

/// Every failure a user action can produce.
///
/// Input and business-rule violations answer 400 with the message the user
/// sees; infrastructure faults are logged and answered with a generic body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("must provide {0}")]
    MissingField(&'static str),

    #[error("invalid {0}")]
    InvalidFormat(&'static str),

    #[error("invalid symbol")]
    InvalidSymbol,

    #[error("insufficient balance")]
    InsufficientFunds,

    #[error("insufficient balance")]
    InsufficientShares,

    #[error("{0} out of range")]
    OutOfRange(&'static str),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("username already exists")]
    DuplicateUsername,

    #[error("invalid username and/or password")]
    InvalidCredentials,

    #[error("login required")]
    Unauthenticated,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("storage error: {0}")]
    Storage(StoreError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of an error response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl AppError {
    /// Stable machine-readable code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MissingField(_) => "missing_field",
            AppError::InvalidFormat(_) => "invalid_format",
            AppError::InvalidSymbol => "invalid_symbol",
            AppError::InsufficientFunds => "insufficient_funds",
            AppError::InsufficientShares => "insufficient_shares",
            AppError::OutOfRange(_) => "out_of_range",
            AppError::PasswordMismatch => "password_mismatch",
            AppError::DuplicateUsername => "duplicate_username",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::Unauthenticated => "unauthenticated",
            AppError::ServiceUnavailable(_) | AppError::Storage(_) => "service_unavailable",
            AppError::Session(_) | AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::SEE_OTHER,
            AppError::ServiceUnavailable(_) | AppError::Storage(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Session(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => AppError::DuplicateUsername,
            // A session pointing at a user that no longer exists is treated as logged out.
            StoreError::UserNotFound(_) => AppError::Unauthenticated,
            other => AppError::Storage(other),
        }
    }
}

impl From<QuoteError> for AppError {
    fn from(err: QuoteError) -> Self {
        match err {
            QuoteError::UnknownSymbol(_) | QuoteError::Malformed(_) => AppError::InvalidSymbol,
            QuoteError::Unavailable(reason) => AppError::ServiceUnavailable(reason),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Unauthenticated => return Redirect::to("/login").into_response(),
            AppError::ServiceUnavailable(_) | AppError::Storage(_) => {
                tracing::error!("{}", self);
                "service unavailable".to_string()
            }
            AppError::Session(_) | AppError::Internal(_) => {
                tracing::error!("{}", self);
                "internal error".to_string()
            }
            _ => self.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                error: self.kind().to_string(),
                message,
            }),
        )
            .into_response()
    }
}
