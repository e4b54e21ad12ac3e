//! Volume access resolution and ephemeral provisioning.
//!
//! The [`Resolver`] decides, for one volume, how its data can be reached: by
//! reusing a pod that already mounts it, by provisioning a fresh access pod,
//! or by provisioning a reduced-redundancy stand-in when the volume is busy.
//! The [`Provisioner`] performs the idempotent create-or-reuse of the
//! persistent volume, claim, and pod that make up an access point.

use thiserror::Error;

use crate::cluster::ClusterError;
use crate::naming::EphemeralNames;
use crate::remote::ExecTarget;

mod provisioner;
mod resolver;
mod wait;

pub use provisioner::{Exposure, Provisioner};
pub use resolver::{ClaimUsage, Resolver, find_existing_mount};
pub use wait::{WaitOutcome, WaitPolicy, wait_until};

/// Where a volume's files can be read or written.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessHandle {
    /// Pod container that mounts the volume.
    pub target: ExecTarget,
    /// Mount path inside the container.
    pub mount_path: String,
}

/// How [`Resolver::resolve`] obtained an [`AccessHandle`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VolumeAccess {
    /// A fresh ephemeral set exposes the volume itself.
    DirectProvision {
        /// Access point.
        handle: AccessHandle,
        /// Names of the set backing the access point.
        names: EphemeralNames,
    },
    /// An existing workload pod already mounts the volume.
    ReuseExisting {
        /// Access point.
        handle: AccessHandle,
    },
    /// The volume is busy; a reduced-redundancy stand-in was exposed instead.
    IndirectSnapshot {
        /// Access point.
        handle: AccessHandle,
        /// Names of the set backing the access point.
        names: EphemeralNames,
    },
}

impl VolumeAccess {
    /// Access point for the volume.
    #[must_use]
    pub const fn handle(&self) -> &AccessHandle {
        match self {
            Self::DirectProvision { handle, .. }
            | Self::ReuseExisting { handle }
            | Self::IndirectSnapshot { handle, .. } => handle,
        }
    }

    /// Short label for the access strategy.
    #[must_use]
    pub const fn strategy(&self) -> &'static str {
        match self {
            Self::DirectProvision { .. } => "direct",
            Self::ReuseExisting { .. } => "existing pod",
            Self::IndirectSnapshot { .. } => "indirect",
        }
    }

    /// Ephemeral set created for this access, if the resolver provisioned
    /// one.
    #[must_use]
    pub const fn ephemeral_names(&self) -> Option<&EphemeralNames> {
        match self {
            Self::DirectProvision { names, .. } | Self::IndirectSnapshot { names, .. } => {
                Some(names)
            }
            Self::ReuseExisting { .. } => None,
        }
    }
}

/// Input to [`Resolver::resolve`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessRequest {
    /// Longhorn volume name.
    pub volume: String,
    /// Namespace for claims and pods.
    pub namespace: String,
    /// Storage class recorded on created objects.
    pub storage_class: String,
}

impl AccessRequest {
    /// Builds a request.
    #[must_use]
    pub fn new(
        volume: impl Into<String>,
        namespace: impl Into<String>,
        storage_class: impl Into<String>,
    ) -> Self {
        Self {
            volume: volume.into(),
            namespace: namespace.into(),
            storage_class: storage_class.into(),
        }
    }
}

/// Errors raised while resolving or provisioning access.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Raised when no Longhorn volume has the requested name.
    #[error("volume {volume} not found")]
    NotFound {
        /// Requested volume name.
        volume: String,
    },
    /// Raised when a listing needed for a decision fails.
    #[error("failed to list {what}: {source}")]
    ListFailed {
        /// What was being listed.
        what: String,
        /// Underlying cluster error.
        #[source]
        source: ClusterError,
    },
    /// Raised when reading a single object fails for a reason other than
    /// absence.
    #[error("failed to read {kind} {name}: {source}")]
    GetFailed {
        /// Object kind.
        kind: String,
        /// Object name.
        name: String,
        /// Underlying cluster error.
        #[source]
        source: ClusterError,
    },
    /// Raised when an access point cannot be created or does not become
    /// ready.
    #[error("failed to provision access for {name}: {reason}")]
    ProvisionFailed {
        /// Object or volume name.
        name: String,
        /// Explanation.
        reason: String,
    },
    /// Raised when the volume is busy and no fallback could be provisioned.
    #[error("no access path to volume {volume}: {source}")]
    NoAccessPath {
        /// Requested volume name.
        volume: String,
        /// Failure of the fallback attempt.
        #[source]
        source: Box<AccessError>,
    },
    /// Raised when the operator interrupts a wait.
    #[error("{action} was cancelled")]
    Cancelled {
        /// What was being waited for.
        action: String,
    },
}

#[cfg(test)]
mod tests;
