// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for fleet operations.
//!
//! # Error Categories
//!
//! - [`ValidationError`]: Malformed target or cluster input
//! - [`TransportError`]: Failures reported by a transport implementation
//! - [`FleetError`]: Everything a registry, pool or executor call can fail with
//!
//! A command exiting with a non-zero status is not an error. It is a normal
//! [`ExecutionResult`](crate::executor::ExecutionResult) with `success == false`.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Error type for input validation failures.
///
/// # Examples
///
/// ```
/// use fleetsh::shared::error::ValidationError;
///
/// let err = ValidationError::new("port", "must be between 1 and 65535");
/// assert!(err.to_string().contains("port"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field or input that failed validation
    pub field: String,
    /// Description of why validation failed
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an error for an empty field.
    pub fn empty(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} cannot be empty"),
            field,
        }
    }

    /// Create an error for a field that is too long.
    pub fn too_long(field: impl Into<String>, max_length: usize) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} exceeds maximum length of {max_length}"),
            field,
        }
    }

    /// Create an error for invalid characters.
    pub fn invalid_characters(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} contains invalid characters"),
            field,
        }
    }

    /// Create an error for a name that is already registered.
    pub fn duplicate(field: impl Into<String>, value: &str) -> Self {
        Self {
            field: field.into(),
            message: format!("'{value}' is already registered"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation error for '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Errors reported by a [`Transport`](crate::transport::Transport).
///
/// Session faults are connection-level and may be retried on a fresh session.
/// Other variants describe a failed operation on a healthy session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not resolve {0}")]
    AddressInvalid(String),

    #[error("connection to {target} failed: {reason}")]
    ConnectFailed { target: String, reason: String },

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    #[error("host key verification failed for {0}")]
    HostKeyRejected(String),

    #[error("transport is not connected")]
    NotConnected,

    #[error("remote command did not report an exit status")]
    CommandDidNotExit,

    #[error("ssh protocol error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("sftp error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors returned by registry, pool and executor operations.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("cluster '{0}' already exists")]
    DuplicateName(String),

    #[error("cluster '{0}' must have at least one member")]
    EmptyMembers(String),

    #[error("target '{member}' is already a member of cluster '{cluster}'")]
    DuplicateMember { cluster: String, member: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Whether the session behind this error can no longer be trusted.
    pub fn is_session_fault(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectFailed { .. }
                | TransportError::Timeout(_)
                | TransportError::NotConnected
                | TransportError::CommandDidNotExit
                | TransportError::Ssh(_)
        )
    }

    /// Whether the command may not have started, so running it again is safe.
    /// A missing exit status means the command was already sent.
    pub fn is_retryable(&self) -> bool {
        self.is_session_fault() && !matches!(self, TransportError::CommandDidNotExit)
    }
}

impl FleetError {
    pub fn target_not_found(name: impl Into<String>) -> Self {
        FleetError::NotFound {
            kind: "target",
            name: name.into(),
        }
    }

    pub fn cluster_not_found(name: impl Into<String>) -> Self {
        FleetError::NotFound {
            kind: "cluster",
            name: name.into(),
        }
    }

    pub fn member_not_found(cluster: &str, member: &str) -> Self {
        FleetError::NotFound {
            kind: "member",
            name: format!("{member}' in cluster '{cluster}"),
        }
    }

    /// Whether the executor may retry after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            FleetError::Connection(_) => true,
            FleetError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
