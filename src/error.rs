use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::repository::RepositoryError;

/// FieldErrors
///
/// Field name -> list of messages, rendered as `{"errors": {...}}` on a 400.
/// Checks that are not tied to a single input field use `non_field_errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map holding exactly one message.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Ok when nothing was recorded, otherwise a `Validation` error carrying the map.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

/// AppError
///
/// The error taxonomy every handler returns. Authorization denials and
/// validation failures are ordinary outcomes here, not faults: they are turned
/// into structured JSON responses at the handler boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Opaque store failure. The cause is logged, never sent to the client.
    #[error("internal error: {0}")]
    Internal(#[source] RepositoryError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UniqueViolation { field } => Self::Validation(FieldErrors::single(
                &field,
                format!("a record with this {field} already exists"),
            )),
            RepositoryError::InvalidReference { field } => Self::Validation(FieldErrors::single(
                &field,
                "referenced record does not exist",
            )),
            RepositoryError::OutOfRange { field, message } => {
                Self::Validation(FieldErrors::single(&field, message))
            }
            RepositoryError::InUse(what) => Self::Conflict(what),
            other => Self::Internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            Self::Validation(errors) => serde_json::json!({ "errors": errors }),
            Self::Forbidden(reason) => serde_json::json!({ "error": reason }),
            Self::NotFound(what) => serde_json::json!({ "error": format!("{what} not found") }),
            Self::Conflict(reason) => serde_json::json!({ "error": reason }),
            Self::Internal(err) => {
                tracing::error!(error = %err, "persistence failure");
                serde_json::json!({ "error": "Internal server error" })
            }
        };

        (status, Json(body)).into_response()
    }
}
