//! Application error taxonomy and its boundary representation.
//!
//! | AppError | status | body detail |
//! |----------|--------|-------------|
//! | `NotFound` | 404 | - |
//! | `ValidationFailed` | 400 | full field map |
//! | `Unauthorized` | 401 | - |
//! | `Crypto` | 500 | only in development mode |
//! | `Internal` | 500 | only in development mode |
//!
//! `DomainError::InvalidState` arrives here as `ValidationFailed` with the single
//! field [`REQUEST_FIELD`].

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use vehiclelink_core::DomainError;
use vehiclelink_infra::{CryptoError, PersistenceError, UnitOfWorkError};

/// Field name used when an error concerns the request as a whole.
pub const REQUEST_FIELD: &str = "request";

/// Field name -> messages. Ordered so rendered bodies are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        for (field, errs) in errors.field_errors() {
            for e in errs {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                out.add(field.to_string(), message);
            }
        }
        if out.is_empty() {
            out.add(REQUEST_FIELD, "validation failed");
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("validation failed")]
    ValidationFailed(FieldErrors),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ValidationFailed(FieldErrors::single(field, message))
    }

    pub fn status(&self) -> u16 {
        match self {
            AppError::NotFound => 404,
            AppError::ValidationFailed(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Crypto(_) | AppError::Internal(_) => 500,
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ArgumentInvalid { field, message } => AppError::validation(field, message),
            DomainError::InvalidState(message) => AppError::validation(REQUEST_FIELD, message),
            DomainError::InvalidId(message) => AppError::validation("id", message),
            DomainError::NotFound => AppError::NotFound,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::ValidationFailed(errors.into())
    }
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Crypto(e) => AppError::Crypto(e),
            // A concurrent writer won the race for a unique value.
            PersistenceError::UniqueViolation(_) => {
                AppError::validation(REQUEST_FIELD, "conflicts with an existing record")
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<UnitOfWorkError> for AppError {
    fn from(err: UnitOfWorkError) -> Self {
        match err {
            UnitOfWorkError::Persistence(e) => e.into(),
            other => AppError::Internal(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Boundary body
// ─────────────────────────────────────────────────────────────────────────────

/// Error body handed to whatever transport fronts the workflows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    pub correlation_id: Uuid,
}

impl ErrorResponse {
    /// Render an error. Server-side failures are logged with the correlation id and
    /// their detail is withheld unless `dev_mode` is set.
    pub fn from_error(err: &AppError, dev_mode: bool) -> Self {
        let correlation_id = Uuid::new_v4();
        let status = err.status();

        let (title, detail, errors) = match err {
            AppError::NotFound => ("Not Found", None, None),
            AppError::ValidationFailed(fields) => {
                ("Validation Failed", None, Some(fields.clone()))
            }
            AppError::Unauthorized => ("Unauthorized", None, None),
            AppError::Crypto(_) | AppError::Internal(_) => {
                error!(%correlation_id, error = %err, "request failed");
                let detail = dev_mode.then(|| err.to_string());
                ("Internal Server Error", detail, None)
            }
        };

        Self {
            status,
            title,
            detail,
            errors,
            correlation_id,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "status": self.status,
                "title": self.title,
                "correlation_id": self.correlation_id,
            })
        })
    }
}
