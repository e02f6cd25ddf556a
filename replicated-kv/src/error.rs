use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Conditions surfaced to callers of a node.
///
/// Redirects are not errors; see [`crate::node::Reply`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KvError {
    #[error("key '{0}' not found")]
    NotFound(String),

    #[error("key '{0}' already exists")]
    AlreadyExists(String),

    #[error("no leader known, retry later")]
    Locked,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("node is unavailable")]
    Unavailable,
}

impl KvError {
    pub fn status(&self) -> StatusCode {
        match self {
            KvError::NotFound(_) => StatusCode::NOT_FOUND,
            KvError::AlreadyExists(_) => StatusCode::CONFLICT,
            KvError::Locked => StatusCode::LOCKED,
            KvError::Forbidden(_) => StatusCode::FORBIDDEN,
            KvError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for KvError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
