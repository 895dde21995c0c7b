//! Unified error types for the devbox workspace.
//!
//! Every failure carries an [`ErrorKind`] for programmatic handling and,
//! separately, advisory remediation text ([`DevboxError::detail`] and
//! [`DevboxError::suggestion`]) meant only for humans.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::BIN_NAME;
use crate::types::ContainerState;

/// Which quota tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaScope {
    /// The per-owner cap.
    Owner,
    /// The host-wide cap.
    Global,
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "per-user"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Coarse classification of a [`DevboxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input; fix and resubmit.
    Validation,
    /// The identifier is already registered.
    AlreadyExists,
    /// The identifier is not registered.
    NotFound,
    /// A quota would be exceeded.
    QuotaExceeded,
    /// The caller is not allowed to act on the target.
    PermissionDenied,
    /// The record is not in a state that permits the operation.
    InvalidState,
    /// The vault could not be reached or queried.
    SecretUnavailable,
    /// The vault returned an empty secret.
    SecretEmpty,
    /// The vault returned a secret of the wrong shape.
    SecretMalformed,
    /// The container runtime is not installed or not reachable.
    RuntimeUnavailable,
    /// A container runtime operation failed.
    Runtime,
    /// The registry document is unreadable.
    Corruption,
    /// The registry lock could not be acquired in time.
    LockTimeout,
    /// A configuration value is invalid.
    Config,
    /// An I/O operation failed.
    Io,
    /// Serialization failed.
    Serialization,
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DevboxError {
    /// An input failed validation.
    #[error("invalid {field} '{value}': {message}")]
    Validation {
        /// Which input was rejected (e.g. "container name").
        field: &'static str,
        /// The rejected value.
        value: String,
        /// The rule that was violated.
        message: String,
    },

    /// A container with this name is already registered.
    #[error("container already exists: {name}")]
    AlreadyExists {
        /// Conflicting container name.
        name: String,
    },

    /// No container with this name is registered.
    #[error("container not found: {name}")]
    NotFound {
        /// Missing container name.
        name: String,
    },

    /// Admitting another container would exceed a quota.
    #[error("{scope} container limit reached")]
    QuotaExceeded {
        /// Which quota tripped.
        scope: QuotaScope,
        /// Containers counted against the quota.
        current: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The caller lacks permission for the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// The record's state does not allow the operation.
    #[error("container '{name}' is {state}: {message}")]
    InvalidState {
        /// Container name.
        name: String,
        /// State the record is in.
        state: ContainerState,
        /// What was attempted.
        message: String,
    },

    /// The secret vault could not provide a key.
    #[error("{message}")]
    SecretUnavailable {
        /// Short description.
        message: String,
        /// Diagnostic detail.
        detail: String,
        /// Optional remediation hint.
        hint: Option<String>,
    },

    /// The secret exists but is empty.
    #[error("network auth key is empty")]
    SecretEmpty {
        /// Identity whose key was requested.
        identity: String,
    },

    /// The secret does not look like a network auth key.
    #[error("invalid network auth key format")]
    SecretMalformed {
        /// Prefix the key was expected to carry.
        expected_prefix: &'static str,
    },

    /// The container runtime is missing or unreachable.
    #[error("container runtime unavailable: {message}")]
    RuntimeUnavailable {
        /// Description of the problem.
        message: String,
    },

    /// A container runtime operation failed.
    #[error("failed to {operation}: {name}")]
    Runtime {
        /// Operation that failed (e.g. "start container").
        operation: &'static str,
        /// Target container or volume name.
        name: String,
        /// Captured diagnostic output.
        diagnostic: String,
    },

    /// The registry document cannot be trusted.
    #[error("registry at {path} is corrupt: {message}")]
    Corruption {
        /// Registry path.
        path: PathBuf,
        /// Parse or schema failure.
        message: String,
    },

    /// The registry lock was not acquired within the configured bound.
    #[error("timed out after {waited_ms} ms waiting for registry lock {path}")]
    LockTimeout {
        /// Lock file path.
        path: PathBuf,
        /// How long acquisition was attempted.
        waited_ms: u64,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl DevboxError {
    /// Builds an [`DevboxError::Io`] from a path and source error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::SecretUnavailable { .. } => ErrorKind::SecretUnavailable,
            Self::SecretEmpty { .. } => ErrorKind::SecretEmpty,
            Self::SecretMalformed { .. } => ErrorKind::SecretMalformed,
            Self::RuntimeUnavailable { .. } => ErrorKind::RuntimeUnavailable,
            Self::Runtime { .. } => ErrorKind::Runtime,
            Self::Corruption { .. } => ErrorKind::Corruption,
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Serialization { .. } => ErrorKind::Serialization,
        }
    }

    /// Additional diagnostic context, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::QuotaExceeded {
                scope: QuotaScope::Owner,
                current,
                limit,
            } => Some(format!("You have {current} containers (max: {limit}).")),
            Self::QuotaExceeded {
                scope: QuotaScope::Global,
                current,
                limit,
            } => Some(format!(
                "The orchestrator has {current} containers (max: {limit})."
            )),
            Self::SecretUnavailable { detail, .. } => Some(detail.clone()),
            Self::SecretEmpty { identity } => Some(format!(
                "The auth key for user '{identity}' exists but has no value."
            )),
            Self::SecretMalformed { .. } => Some(
                "The retrieved key does not appear to be a valid network auth key.".to_string(),
            ),
            Self::Runtime { diagnostic, .. } if !diagnostic.trim().is_empty() => {
                Some(diagnostic.trim().to_string())
            }
            _ => None,
        }
    }

    /// Advisory remediation text. Never parsed by callers.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Validation { field, .. } => match *field {
                "container name" => Some(format!("Example: {BIN_NAME} create my-project")),
                "memory limit" => Some("Example: --memory 4G or --memory 512M".to_string()),
                _ => None,
            },
            Self::AlreadyExists { .. } => Some(format!(
                "Run '{BIN_NAME} list' to see containers, or choose a different name."
            )),
            Self::NotFound { .. } => Some(format!("Run '{BIN_NAME} list' to see your containers.")),
            Self::QuotaExceeded {
                scope: QuotaScope::Owner,
                ..
            } => Some(format!(
                "Run '{BIN_NAME} destroy <name>' to remove a container."
            )),
            Self::QuotaExceeded {
                scope: QuotaScope::Global,
                ..
            } => Some("Contact an administrator or wait for cleanup.".to_string()),
            Self::InvalidState { name, state, .. } => match state {
                ContainerState::Stopped => Some(format!("Run '{BIN_NAME} start {name}' first.")),
                ContainerState::Creating => Some(format!(
                    "A previous create was interrupted; run '{BIN_NAME} destroy {name}' to clear it."
                )),
                ContainerState::Running => None,
            },
            Self::SecretUnavailable { hint, .. } => hint.clone(),
            Self::SecretMalformed { expected_prefix } => Some(format!(
                "Network auth keys should start with '{expected_prefix}'."
            )),
            Self::RuntimeUnavailable { .. } => {
                Some("Ensure the orchestrator module is enabled.".to_string())
            }
            Self::Corruption { path, .. } => Some(format!(
                "Inspect or restore {} by hand; it is never repaired automatically.",
                path.display()
            )),
            Self::LockTimeout { .. } => Some(format!(
                "Another {BIN_NAME} invocation holds the registry lock; retry shortly."
            )),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DevboxError>;
