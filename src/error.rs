//! Error types for the reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of a resource's
//! lifecycle: provider configuration, remote API calls, reconciliation,
//! offboarding and IAM policy writes. Every error can be classified into an
//! [`ErrorKind`] so the Terraform-facing layer can decide how to surface it.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum RadarError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors reported by the remote control plane.
    #[error("Remote API error: {0}")]
    Remote(#[from] RemoteError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Offboard polling errors.
    #[error("Offboarding error: {0}")]
    Offboard(#[from] OffboardError),

    /// IAM policy errors.
    #[error("IAM policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Payload serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of an error, independent of where it was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The remote object does not exist.
    NotFound,
    /// A name collision was detected before create.
    AlreadyExists,
    /// A stale etag or concurrent modification was rejected by the server.
    Conflict,
    /// The operation has no remote equivalent for the resource kind.
    NotSupported,
    /// The caller cancelled the operation.
    Cancelled,
    /// A deadline elapsed before the operation converged.
    Timeout,
    /// The remote system violated an invariant of the local model.
    Unexpected,
    /// The input (configuration, desired state, policy) is invalid.
    Invalid,
    /// Anything else (transport failures, internal errors).
    Other,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// No project was given on the resource and the provider has no default.
    #[error("No project_id set on the {kind} resource and no provider default configured")]
    MissingProjectId {
        /// Resource kind that needed a project.
        kind: String,
    },
}

/// Errors reported by the remote control plane.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote object does not exist.
    #[error("Remote object not found: {resource}")]
    NotFound {
        /// Description of the missing object.
        resource: String,
    },

    /// The server rejected a write because of a concurrent modification.
    #[error("Conflicting update on {resource}: {message}")]
    Conflict {
        /// Description of the object.
        resource: String,
        /// Message returned by the server.
        message: String,
    },

    /// API request failed.
    #[error("API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with the control plane: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// An object with the requested name already exists.
    #[error("A {kind} named '{name}' already exists in this project")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Conflicting name.
        name: String,
    },

    /// The operation is not available for this resource kind.
    #[error("{operation} is not supported for {kind} resources")]
    NotSupported {
        /// Resource kind.
        kind: String,
        /// Operation that was attempted.
        operation: String,
    },

    /// The remote system contradicted the local model.
    #[error("Unexpected state for {kind} '{external_id}': {message}")]
    Unexpected {
        /// Resource kind.
        kind: String,
        /// External identifier.
        external_id: String,
        /// Description of the violation.
        message: String,
    },

    /// A field that requires replacement was changed in place.
    #[error("{field} of {kind} cannot change in place (from '{old}' to '{new}')")]
    ImmutableField {
        /// Resource kind.
        kind: String,
        /// Field name.
        field: String,
        /// Current value.
        old: String,
        /// Requested value.
        new: String,
    },

    /// A required field was null or unknown at apply time.
    #[error("{field} must be known and set for {kind} resources")]
    MissingField {
        /// Resource kind.
        kind: String,
        /// Field name.
        field: String,
    },

    /// The caller cancelled the operation between two remote calls.
    #[error("{operation} of {kind} cancelled")]
    Cancelled {
        /// Resource kind.
        kind: String,
        /// Operation that was interrupted.
        operation: String,
    },

    /// The caller's deadline passed before the next remote call.
    #[error("{operation} of {kind} exceeded its deadline")]
    DeadlineExceeded {
        /// Resource kind.
        kind: String,
        /// Operation that was interrupted.
        operation: String,
    },

    /// A remote call failed during an engine operation.
    #[error("{operation} {kind} '{external_id}' failed: {source}")]
    OperationFailed {
        /// Operation that failed.
        operation: String,
        /// Resource kind.
        kind: String,
        /// External identifier (or name before creation).
        external_id: String,
        /// Underlying error.
        #[source]
        source: Box<RadarError>,
    },
}

/// Offboard polling errors.
#[derive(Debug, Error)]
pub enum OffboardError {
    /// The caller cancelled the wait.
    #[error("Waiting for {kind} '{external_id}' to offboard was cancelled after {polls} polls")]
    Cancelled {
        /// Resource kind.
        kind: String,
        /// External identifier.
        external_id: String,
        /// Number of polls performed.
        polls: u32,
    },

    /// The resource was still pending deletion when the deadline passed.
    #[error("Timed out after {waited_secs}s waiting for {kind} '{external_id}' to offboard ({polls} polls)")]
    Timeout {
        /// Resource kind.
        kind: String,
        /// External identifier.
        external_id: String,
        /// Number of polls performed.
        polls: u32,
        /// Seconds spent waiting.
        waited_secs: u64,
    },
}

/// IAM policy errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// One or more bindings use roles outside the allow-list.
    #[error("Invalid roles for {resource_name}: {} (allowed: {})", .roles.join(", "), .allowed.join(", "))]
    InvalidRoles {
        /// Resource the policy targets.
        resource_name: String,
        /// Every offending role.
        roles: Vec<String>,
        /// Roles that are allowed.
        allowed: Vec<String>,
    },

    /// A binding is malformed.
    #[error("Invalid binding for {resource_name}: {message}")]
    InvalidBinding {
        /// Resource the policy targets.
        resource_name: String,
        /// Description of the problem.
        message: String,
    },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, RadarError>;

impl RadarError {
    /// Classifies this error, looking through operation context wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Policy(_) => ErrorKind::Invalid,
            Self::Remote(err) => match err {
                RemoteError::NotFound { .. } => ErrorKind::NotFound,
                RemoteError::Conflict { .. } => ErrorKind::Conflict,
                _ => ErrorKind::Other,
            },
            Self::Reconcile(err) => match err {
                ReconcileError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
                ReconcileError::NotSupported { .. } => ErrorKind::NotSupported,
                ReconcileError::Unexpected { .. } => ErrorKind::Unexpected,
                ReconcileError::ImmutableField { .. } | ReconcileError::MissingField { .. } => {
                    ErrorKind::Invalid
                }
                ReconcileError::Cancelled { .. } => ErrorKind::Cancelled,
                ReconcileError::DeadlineExceeded { .. } => ErrorKind::Timeout,
                ReconcileError::OperationFailed { source, .. } => source.kind(),
            },
            Self::Offboard(err) => match err {
                OffboardError::Cancelled { .. } => ErrorKind::Cancelled,
                OffboardError::Timeout { .. } => ErrorKind::Timeout,
            },
            Self::Serialization(_) => ErrorKind::Invalid,
            Self::Io(_) => ErrorKind::Other,
        }
    }

    /// Returns true if the remote object is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Wraps this error with the operation, kind and identifier it occurred in.
    ///
    /// Errors raised by the engine itself already carry that context and are
    /// returned unchanged.
    #[must_use]
    pub fn in_operation(
        self,
        operation: &str,
        kind: impl std::fmt::Display,
        external_id: &str,
    ) -> Self {
        match self {
            Self::Remote(_) | Self::Serialization(_) => {
                Self::Reconcile(ReconcileError::OperationFailed {
                    operation: operation.to_string(),
                    kind: kind.to_string(),
                    external_id: external_id.to_string(),
                    source: Box::new(self),
                })
            }
            other => other,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl RemoteError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}
