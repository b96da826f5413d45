use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised while resolving a request path against the served tree.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("invalid URL path")]
    InvalidPath,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

impl IntoResponse for FsError {
    fn into_response(self) -> Response {
        // Plain text bodies, matching what file servers traditionally send.
        match self {
            FsError::NotFound(_) => (StatusCode::NOT_FOUND, "404 page not found\n").into_response(),
            FsError::InvalidPath => (StatusCode::BAD_REQUEST, "400 Bad Request\n").into_response(),
            FsError::Io(err) => {
                tracing::error!("I/O error while serving file: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "500 Internal Server Error\n",
                )
                    .into_response()
            }
        }
    }
}

/// Errors that abort startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid context path: {0}")]
    InvalidContext(String),

    #[error("invalid status path: {0}")]
    InvalidStatusPath(String),
}
