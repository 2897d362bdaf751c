//! Error types for the Orrery runtime
//!
//! This module defines the unified error type used across the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Error Model
//!
//! `Error` is the single error type for all Orrery APIs. Variants fall into
//! four families:
//!
//! - **Record errors**: `RecordNotFound`, `RelatedRecordNotFound`,
//!   `RecordAlreadyExists` - a targeted record or link is absent or conflicts.
//! - **Validation errors**: `Schema`, `ModelNotDefined`, `OperationNotAllowed`,
//!   `QueryExpressionParse`, `TransformNotAllowed` - the input shape or the
//!   declared model does not admit the request. These require input changes.
//! - **Transport errors**: `Network`, `Client`, `Server` - a remote source's
//!   transport failed or the backend answered with an error status.
//! - **Infrastructure errors**: `QueueEmpty`, `QueueBusy`, `Bucket`,
//!   `Serialization` - queue misuse or a persistence-boundary failure.
//!
//! Every variant renders a `description` string suitable for display; hosts
//! may map variants to their own presentation.

use crate::record::RecordIdentity;
use thiserror::Error;

/// Result type alias for Orrery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all Orrery operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    // =========================================================================
    // Record Errors
    // =========================================================================
    /// A query or operation targeted a record absent from the store
    #[error("Record not found: {identity}")]
    RecordNotFound {
        /// Identity of the missing record
        identity: RecordIdentity,
    },

    /// A relationship's link pointed to a missing record
    #[error("Related record not found: {relationship} of {identity}")]
    RelatedRecordNotFound {
        /// Identity of the record owning the relationship
        identity: RecordIdentity,
        /// Name of the relationship whose link is dangling
        relationship: String,
    },

    /// `addRecord` was applied for an identity already present
    #[error("Record already exists: {identity}")]
    RecordAlreadyExists {
        /// Identity of the conflicting record
        identity: RecordIdentity,
    },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// The schema does not admit the referenced declaration
    #[error("Schema error: {message}")]
    Schema {
        /// What was referenced and why it is invalid
        message: String,
    },

    /// The schema does not define the referenced model type
    #[error("Model not defined: {kind}")]
    ModelNotDefined {
        /// The undefined model type
        kind: String,
    },

    /// Malformed or unsupported operation
    #[error("Operation not allowed: {message}")]
    OperationNotAllowed {
        /// Why the operation was rejected
        message: String,
    },

    /// A query expression had an invalid shape
    #[error("Query expression could not be parsed: {message}")]
    QueryExpressionParse {
        /// What was wrong with the expression
        message: String,
    },

    /// A transform had an invalid shape
    #[error("Transform not allowed: {message}")]
    TransformNotAllowed {
        /// Why the transform was rejected
        message: String,
    },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The transport failed before a response was obtained
    #[error("Network error: {description}")]
    Network {
        /// Failure reason, e.g. `"No fetch response within 10ms."`
        description: String,
    },

    /// The backend answered with a 4xx status
    #[error("Client error: {description}")]
    Client {
        /// Status line or response excerpt
        description: String,
        /// HTTP status code
        status: u16,
    },

    /// The backend answered with a 5xx status
    #[error("Server error: {description}")]
    Server {
        /// Status line or response excerpt
        description: String,
        /// HTTP status code
        status: u16,
    },

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// An operation required a task but the queue holds none
    #[error("Queue {queue} is empty")]
    QueueEmpty {
        /// Queue name
        queue: String,
    },

    /// The queue cannot accept the request in its current state
    #[error("Queue {queue} is busy: {reason}")]
    QueueBusy {
        /// Queue name
        queue: String,
        /// Why the queue refused the request
        reason: String,
    },

    /// The persistence bucket failed
    #[error("Bucket error: {message}")]
    Bucket {
        /// Failure description
        message: String,
    },

    /// Serialization or deserialization failed at a persistence boundary
    #[error("Serialization error: {message}")]
    Serialization {
        /// Failure description
        message: String,
    },
}

impl Error {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a RecordNotFound error
    pub fn record_not_found(identity: RecordIdentity) -> Self {
        Error::RecordNotFound { identity }
    }

    /// Create a RelatedRecordNotFound error
    pub fn related_record_not_found(
        identity: RecordIdentity,
        relationship: impl Into<String>,
    ) -> Self {
        Error::RelatedRecordNotFound {
            identity,
            relationship: relationship.into(),
        }
    }

    /// Create a RecordAlreadyExists error
    pub fn record_already_exists(identity: RecordIdentity) -> Self {
        Error::RecordAlreadyExists { identity }
    }

    /// Create a Schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema {
            message: message.into(),
        }
    }

    /// Create a ModelNotDefined error
    pub fn model_not_defined(kind: impl Into<String>) -> Self {
        Error::ModelNotDefined { kind: kind.into() }
    }

    /// Create an OperationNotAllowed error
    pub fn operation_not_allowed(message: impl Into<String>) -> Self {
        Error::OperationNotAllowed {
            message: message.into(),
        }
    }

    /// Create a QueryExpressionParse error
    pub fn query_expression_parse(message: impl Into<String>) -> Self {
        Error::QueryExpressionParse {
            message: message.into(),
        }
    }

    /// Create a TransformNotAllowed error
    pub fn transform_not_allowed(message: impl Into<String>) -> Self {
        Error::TransformNotAllowed {
            message: message.into(),
        }
    }

    /// Create a Network error
    pub fn network(description: impl Into<String>) -> Self {
        Error::Network {
            description: description.into(),
        }
    }

    /// Create a Client error
    pub fn client(status: u16, description: impl Into<String>) -> Self {
        Error::Client {
            description: description.into(),
            status,
        }
    }

    /// Create a Server error
    pub fn server(status: u16, description: impl Into<String>) -> Self {
        Error::Server {
            description: description.into(),
            status,
        }
    }

    /// Create a QueueEmpty error
    pub fn queue_empty(queue: impl Into<String>) -> Self {
        Error::QueueEmpty {
            queue: queue.into(),
        }
    }

    /// Create a QueueBusy error
    pub fn queue_busy(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::QueueBusy {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    /// Create a Bucket error
    pub fn bucket(message: impl Into<String>) -> Self {
        Error::Bucket {
            message: message.into(),
        }
    }

    /// Create a Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Check if this is a "not found" type error
    ///
    /// Returns true for: `RecordNotFound`, `RelatedRecordNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RecordNotFound { .. } | Error::RelatedRecordNotFound { .. }
        )
    }

    /// Check if this is a validation error
    ///
    /// Validation errors indicate bad input - don't retry, fix the input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Schema { .. }
                | Error::ModelNotDefined { .. }
                | Error::OperationNotAllowed { .. }
                | Error::QueryExpressionParse { .. }
                | Error::TransformNotAllowed { .. }
        )
    }

    /// Check if this is a transport error
    ///
    /// Returns true for: `Network`, `Client`, `Server`
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Network { .. } | Error::Client { .. } | Error::Server { .. }
        )
    }

    /// Check if this is a queue misuse error
    pub fn is_queue(&self) -> bool {
        matches!(self, Error::QueueEmpty { .. } | Error::QueueBusy { .. })
    }

    /// Get the display description for this error
    ///
    /// Suitable for surfacing to users; equal to the `Display` rendering.
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Get the HTTP status for transport errors that carry one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Client { status, .. } | Error::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
