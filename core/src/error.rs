//! Error types for the OData client and the commands built on it.
//!
//! # Design
//! Callers branch on the kind of failure rather than on message text.
//! Non-2xx responses keep the raw status and body so a failure entry in the
//! import results shows what the server actually said.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// No bearer token could be obtained.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    RequestFailed { status: u16, body: String },

    /// A 2xx response did not carry the data the caller needs (for example a
    /// creation response without an item id).
    #[error("unrecognized response shape (expected {expected}): {body}")]
    ResponseShapeUnrecognized { expected: &'static str, body: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    pub fn shape(expected: &'static str, body: impl ToString) -> Self {
        ApiError::ResponseShapeUnrecognized {
            expected,
            body: body.to_string(),
        }
    }

    /// HTTP status of the failed request, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
