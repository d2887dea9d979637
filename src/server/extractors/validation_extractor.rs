use std::borrow::Cow;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::server::error::Error;

/// json body that has already passed its `validator` rules
pub struct ValidatedJson<T>(pub T);

/// field a serde data error points at: the backticked name of a missing field, the path in
/// front of the message, or `body` when neither is there
fn offending_field(detail: &str) -> String {
    if let Some(rest) = detail.split_once("missing field `").map(|(_, rest)| rest) {
        if let Some((field, _)) = rest.split_once('`') {
            return field.to_string();
        }
    }

    match detail.split_once(": ") {
        Some((path, _)) if !path.is_empty() && !path.contains(' ') => path.to_string(),
        _ => "body".to_string(),
    }
}

/// a body that is valid json but doesn't fit `T` is reported like a failed validator rule
fn data_error(body_text: String) -> Error {
    // "<rejection text>: <path>: <serde message>", the path part is absent at the root
    let detail = body_text
        .split_once(": ")
        .map(|(_, detail)| detail.to_string())
        .unwrap_or(body_text);

    let error = ValidationError::new("invalid").with_message(Cow::Owned(detail.clone()));

    let mut errors = ValidationErrors::new();
    errors.0.insert(
        Cow::Owned(offending_field(&detail)),
        ValidationErrorsKind::Field(vec![error]),
    );

    Error::ValidationError(errors)
}

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| match rejection {
                JsonRejection::JsonDataError(e) => data_error(e.body_text()),
                // malformed json, wrong content type, unreadable body
                other => Error::BadRequest(other.body_text()),
            })?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}
