use axum::{
    Json,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors produced by the data API.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path is outside data directory: {0}")]
    PathEscape(String),

    /// Carries the filesystem error text verbatim.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request body could not be read, e.g. it exceeds the size limit.
    #[error("{message}")]
    Body { status: StatusCode, message: String },
}

impl From<BytesRejection> for DataError {
    fn from(rejection: BytesRejection) -> Self {
        DataError::Body {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl DataError {
    pub fn status(&self) -> StatusCode {
        match self {
            DataError::InvalidPath(_) | DataError::PathEscape(_) | DataError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DataError::Forbidden(_) => StatusCode::FORBIDDEN,
            DataError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DataError::Body { status, .. } => *status,
        }
    }
}

/// Body of every non-payload JSON response, success or failure.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(MessageResponse::new(self.to_string()))).into_response()
    }
}

/// Errors raised while bringing the listener up.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load TLS certificate {cert} / key {key}: {source}")]
    Tls {
        cert: String,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
