//! Core library for the `lhc` Longhorn volume access tool.
//!
//! The crate resolves how a Longhorn volume can be reached (an existing pod
//! that mounts it, or a temporary persistent volume, claim, and pod created
//! on demand), runs commands in the resulting container, streams data
//! between two volumes, and sweeps away the temporary objects afterwards.

pub mod access;
pub mod cluster;
pub mod config;
pub mod copy;
pub mod janitor;
pub mod naming;
pub mod ops;
pub mod output;
pub mod remote;
pub mod test_support;

pub use access::{AccessError, AccessHandle, AccessRequest, Resolver, VolumeAccess};
pub use cluster::{ClusterError, ControlPlane, Kubectl, VolumeCatalog};
pub use config::{ClusterCredentials, ConfigError, LhcConfig};
pub use copy::{CopyEngine, CopyError};
pub use janitor::{Janitor, JanitorError, SweepSummary};
pub use ops::{OperationError, VolumeOperations};
pub use remote::{ExecChannel, ExecError, ExecTarget, KubectlExec, RemoteRunner};
