//! Error types for photoscroll.
//!
//! This module defines a hierarchical error taxonomy using `thiserror` for structured error
//! handling. Errors compose via `?` and `From` conversions.
//!
//! # Error Hierarchy
//!
//! - [`EngineError`] - Top-level error wrapping all domain-specific failures
//!   - [`RequestError`] - Failure of one outbound request, the unit of recovery
//!     - transport failure (user-facing notification, abandoned)
//!     - [`AuthError`] - routed through the token manager's renew transition
//!     - [`SchemaError`] - fatal to that single request only
//!   - [`ServiceError`] - What a remote service call reports, before classification
//!
//! # Error Recovery Strategy
//!
//! Request failures are **local**: one row failing never blocks or corrupts its siblings.
//! The failed row is released from the scheduler's requested set so the next viewport
//! signal can retry it. Renewal failures are reported once and never retried in a loop.
//!
//! Invariant violations (an index that must exist but does not) are programming errors
//! and panic instead of being represented here.

use crate::auth::TokenClass;
use crate::config::ConfigError;
use crate::logging::LoggingError;
use thiserror::Error;

/// Top-level engine error encompassing all failure modes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An outbound request failed.
    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tracing could not be initialized.
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// The background worker hung up.
    ///
    /// **Recovery**: the isolation context is unusable; tear it down and create a new one.
    #[error("Worker transport closed")]
    WorkerClosed,

    /// Caller passed an argument the engine cannot represent.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failure of a single outbound request.
///
/// Cloneable so it can travel inside worker replies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Network or service failure.
    ///
    /// **Recovery**: surface a notification and abandon the operation. No retry beyond
    /// the renewal path.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Credentials were missing, expired, or could not be renewed.
    #[error("Authorization failure: {0}")]
    Auth(#[from] AuthError),

    /// The reply did not match the expected schema.
    ///
    /// **Recovery**: log and drop this request. Cached state for other rows and
    /// items stays untouched.
    #[error("Schema failure: {0}")]
    Schema(#[from] SchemaError),
}

/// What a remote service call reports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// Network failure or non-success status.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The bearer token was rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Reply body could not be decoded.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl From<ServiceError> for RequestError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Transport(reason) => RequestError::Transport(reason),
            ServiceError::Unauthorized => RequestError::Auth(AuthError::Rejected),
            ServiceError::Schema(schema) => RequestError::Schema(schema),
        }
    }
}

/// Token lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No token of this class has been installed yet.
    #[error("No {0} token available")]
    Absent(TokenClass),

    /// The token string could not be decoded.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// The service rejected a token that still looked valid, twice.
    #[error("Token rejected by service")]
    Rejected,

    /// The renew round-trip failed.
    #[error("Failed to renew {class} token: {reason}")]
    RenewFailed {
        /// Class whose renewal failed.
        class: TokenClass,
        /// Reason reported by the service.
        reason: String,
    },

    /// A previous renewal failed; the user must authenticate again.
    #[error("Re-authentication required for {0} token")]
    ReauthRequired(TokenClass),
}

/// Reply bodies that violate the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Body is not valid JSON for the expected shape.
    #[error("Invalid JSON in {context}: {reason}")]
    Json {
        /// What was being decoded.
        context: String,
        /// Decoder message.
        reason: String,
    },

    /// An item reported a zero width or height.
    #[error("Item {item} has a non-positive dimension")]
    NonPositiveDimension {
        /// Offending item index.
        item: usize,
    },

    /// A row carried the wrong number of items.
    #[error("Row {row} has {actual} items, expected {expected}")]
    RowLength {
        /// Row index.
        row: usize,
        /// Items implied by `end - start`.
        expected: usize,
        /// Items actually present.
        actual: usize,
    },

    /// A row does not begin at `index * row_capacity`.
    #[error("Row {row} starts at item {actual}, expected {expected}")]
    RowStart {
        /// Row index.
        row: usize,
        /// First item implied by the row index.
        expected: usize,
        /// `start` in the reply.
        actual: usize,
    },

    /// An item sits at a position that does not match its index.
    #[error("Row {row} holds item {actual} where item {expected} belongs")]
    ItemOutOfPlace {
        /// Row index.
        row: usize,
        /// Index implied by the item's position.
        expected: usize,
        /// Index in the reply.
        actual: usize,
    },

    /// The service answered with a different row than requested.
    #[error("Requested row {expected}, received row {actual}")]
    RowIndexMismatch {
        /// Requested index.
        expected: usize,
        /// Index in the reply.
        actual: usize,
    },

    /// A required string field was empty.
    #[error("Field {0} must not be empty")]
    EmptyField(&'static str),
}

impl SchemaError {
    /// Wrap a serde_json error with context.
    pub fn json(context: impl Into<String>, err: &serde_json::Error) -> Self {
        SchemaError::Json {
            context: context.into(),
            reason: err.to_string(),
        }
    }
}
