//! Error types for the search-service client.
//!
//! # Design
//! `MeiliError` has exactly one variant per failure class a caller can act on.
//! A well-formed error body from the server becomes `Api` with the decoded
//! [`ApiError`]; a body that cannot be decoded is a `Decode` failure, never a
//! guessed status-code error. Nothing in the client retries, so every variant
//! is surfaced exactly once.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MeiliError>;

/// Error body returned by the server on any non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    pub code: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub link: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {}): {}", self.message, self.code, self.error_type, self.link)
    }
}

impl std::error::Error for ApiError {}

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum MeiliError {
    /// No response was obtained: connection refused, DNS, transport timeout,
    /// or a cancelled in-flight call.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with status >= 400 and a decodable error body.
    #[error("API error: {0}")]
    Api(ApiError),

    /// A response body could not be decoded into the expected shape.
    #[error("decoding failed: {0}")]
    Decode(String),

    /// A request payload could not be encoded, or the request could not be
    /// assembled.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// The awaited task did not reach a terminal status in time.
    #[error("task {task_uid} did not finish within {timeout:?}")]
    Timeout { task_uid: u64, timeout: Duration },

    /// Tenant-token options were rejected before signing.
    #[error("invalid tenant token request: {0}")]
    InvalidTenantToken(String),

    /// The signing library refused the token.
    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl MeiliError {
    /// The structured server error, if this is an `Api` error.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            MeiliError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, MeiliError::Timeout { .. })
    }
}

impl From<ApiError> for MeiliError {
    fn from(err: ApiError) -> Self {
        MeiliError::Api(err)
    }
}
