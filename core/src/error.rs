//! Error types for the Weaviate client.
//!
//! # Design
//! Every operation has exactly one expected status code. Any other status is
//! reported as `UnexpectedStatus` carrying the attempted URL, the request body
//! and the status line, so the caller can log, retry or give up. A 404 is not
//! a separate variant: `is_not_found` answers that question without dropping
//! the URL from the error.

use thiserror::Error;

/// Errors returned by `ApiClient` and `ThingRepository` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with a status other than the one the operation
    /// expects. `reason` is the canonical phrase for `status`, empty for
    /// codes without one.
    #[error("query {url}{} returned the following: {status}: {reason}", body_suffix(.body))]
    UnexpectedStatus {
        url: String,
        body: Option<String>,
        status: u16,
        reason: String,
    },

    /// A pagination argument was supplied but is not a non-negative integer.
    #[error("the {name} argument {value} you entered is not a non-negative integer")]
    InvalidArgument { name: &'static str, value: i64 },

    /// The request never produced an HTTP response.
    #[error("transport failed: {0}")]
    Transport(#[from] ureq::Error),

    /// The response body could not be decoded into the expected shape.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// Connection configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status of an `UnexpectedStatus` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the service reported that the addressed resource does not
    /// exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(body) => format!(" {body}"),
        None => String::new(),
    }
}
