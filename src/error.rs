//! Error types for dtgate.

use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("content type 'application/json' required")]
    UnsupportedMediaType,

    #[error("method '{method}' is not allowed, allowed: {allowed}")]
    NotAllowed { method: String, allowed: String },

    #[error("relationship '{0}' does not exist")]
    UnknownRelation(String),

    #[error("missing {0}")]
    NotFound(String),

    #[error("`{command}` failed with exit code {code}: {output}")]
    Execution {
        command: String,
        code: i32,
        output: String,
    },

    #[error("failed to run `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{operation} is not supported for {resource}")]
    Unsupported {
        operation: &'static str,
        resource: String,
    },

    #[error("{resource}: {source}")]
    Resource {
        resource: String,
        #[source]
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Wrap an error with the identity of the resource it came from.
    pub fn within(self, resource: impl Into<String>) -> Self {
        Self::Resource {
            resource: resource.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping identity wrappers.
    pub fn root(&self) -> &GatewayError {
        match self {
            Self::Resource { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.root() {
            Self::Validation(_) | Self::UnknownRelation(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAllowed { .. } | Self::Unsupported { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Execution { .. }
            | Self::Launch { .. }
            | Self::Parse(_)
            | Self::Resource { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
