//! Errors raised while talking to the cluster control plane.

use thiserror::Error;

/// Errors raised by [`super::ControlPlane`] and [`super::VolumeCatalog`]
/// implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClusterError {
    /// Raised when the named object does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Object kind (for example `Pod`).
        kind: String,
        /// Object name.
        name: String,
    },
    /// Raised when a create races with an existing object of the same name.
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Object kind (for example `Pod`).
        kind: String,
        /// Object name.
        name: String,
    },
    /// Raised when a client command cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the client exits with a non-zero status.
    #[error("{program} {action} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Client program (typically `kubectl`).
        program: String,
        /// Operation being attempted (for example `get pods`).
        action: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when client output cannot be parsed or a manifest cannot be
    /// rendered.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Resource being parsed (for example `pods`).
        resource: String,
        /// Parser error message.
        message: String,
    },
}
