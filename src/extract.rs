use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::error::{AppError, FieldErrors};

/// ValidJson
///
/// `Json<T>` whose rejection is an `AppError::Validation` (400 with a field
/// map) instead of axum's plain-text 4xx.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(rejection_errors(&rejection.body_text()))),
        }
    }
}

/// ValidQuery
///
/// `Query<T>` with the same rejection mapping as `ValidJson`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(rejection_errors(&rejection.body_text()))),
        }
    }
}

/// rejection_errors
///
/// Turns an extractor rejection text into a field map. axum reports
/// `<context>: <path>: <serde message>`; a `missing field` message names the
/// field itself. Anything that cannot be tied to one field lands under
/// `non_field_errors`.
pub fn rejection_errors(text: &str) -> FieldErrors {
    let detail = match text.split_once(": ") {
        Some((context, rest)) if context.starts_with("Failed to") => rest,
        _ => text,
    };
    let detail = strip_position(detail);

    if let Some(field) = missing_field(detail) {
        return FieldErrors::single(field, "this field is required");
    }

    if let Some((path, message)) = detail.split_once(": ") {
        let field = path.trim_start_matches('.');
        if !field.is_empty() && field.chars().all(is_path_char) {
            return FieldErrors::single(field, message);
        }
    }

    FieldErrors::single("non_field_errors", detail)
}

fn missing_field(detail: &str) -> Option<&str> {
    let (_, rest) = detail.split_once("missing field `")?;
    let (field, _) = rest.split_once('`')?;
    Some(field)
}

/// Drops serde_json's trailing ` at line L column C`.
fn strip_position(detail: &str) -> &str {
    match detail.rfind(" at line ") {
        Some(index) => &detail[..index],
        None => detail,
    }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')
}
