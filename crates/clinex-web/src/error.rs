//! Mapping of extraction faults onto HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use clinex_ner::{FaultKind, NerError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// JSON body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FaultKind>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ner(#[from] NerError),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Ner(e) => match e.kind() {
                FaultKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                FaultKind::Load | FaultKind::Inference => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> Option<FaultKind> {
        match self {
            ApiError::Ner(e) => Some(e.kind()),
            ApiError::Template(_) => None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Ner(NerError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        let body = ErrorBody {
            detail: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
