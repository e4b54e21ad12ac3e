//! Typed subsets of the Kubernetes objects `lhc` reads and creates.
//!
//! Only the fields the access workflow needs are modelled; everything else in
//! the API server's JSON is ignored on deserialisation and omitted when a
//! manifest is rendered.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Phase reported by a running pod.
pub const POD_RUNNING: &str = "Running";
/// Phase reported by a pod whose containers completed successfully.
pub const POD_SUCCEEDED: &str = "Succeeded";
/// Phase reported by a pod whose containers failed.
pub const POD_FAILED: &str = "Failed";
/// Phase reported by a bound claim.
pub const CLAIM_BOUND: &str = "Bound";

/// Resource key for storage capacity.
pub const STORAGE: &str = "storage";

/// Object kinds `lhc` manipulates through the control plane.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Kind as it appears in manifests (for example `Pod`).
    const KIND: &'static str;
    /// Plural resource name used on the command line (for example `pods`).
    const PLURAL: &'static str;
    /// Whether objects of this kind live in a namespace.
    const NAMESPACED: bool;
    /// API group/version used in manifests.
    const API_VERSION: &'static str = "v1";

    /// Object metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Phase reported by the object's status, if any.
    fn phase(&self) -> Option<&str>;

    /// Object name.
    fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// Standard object metadata.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Namespace for namespaced kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels attached to the object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Builds metadata with the given name, namespace, and labels.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        namespace: Option<&str>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_owned),
            labels,
        }
    }
}

/// Status block shared by the modelled kinds.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PhaseStatus {
    /// Lifecycle phase reported by the API server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl PhaseStatus {
    /// Builds a status with the given phase.
    #[must_use]
    pub fn with_phase(phase: &str) -> Self {
        Self {
            phase: Some(phase.to_owned()),
        }
    }
}

/// Cluster-scoped persistent volume.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PersistentVolume {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: PersistentVolumeSpec,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseStatus>,
}

/// Persistent volume specification.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeSpec {
    /// Capacity keyed by resource name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capacity: BTreeMap<String, String>,
    /// Access modes (for example `ReadWriteMany`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    /// Reclaim policy (`Retain` or `Delete`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_reclaim_policy: Option<String>,
    /// Storage class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// CSI volume source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi: Option<CsiVolumeSource>,
}

/// CSI-backed volume source.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsiVolumeSource {
    /// CSI driver name.
    pub driver: String,
    /// Driver-specific volume identifier.
    pub volume_handle: String,
    /// Filesystem type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_type: Option<String>,
    /// Driver-specific attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volume_attributes: BTreeMap<String, String>,
}

/// Namespaced persistent volume claim.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PersistentVolumeClaim {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: PersistentVolumeClaimSpec,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseStatus>,
}

impl PersistentVolumeClaim {
    /// Returns `true` when the claim reports the `Bound` phase.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.phase() == Some(CLAIM_BOUND)
    }
}

/// Persistent volume claim specification.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    /// Requested access modes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    /// Requested resources.
    #[serde(default)]
    pub resources: ResourceRequirements,
    /// Storage class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// Persistent volume the claim binds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
}

/// Resource requests for a claim.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResourceRequirements {
    /// Requested quantities keyed by resource name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Namespaced pod.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Pod {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    #[serde(default)]
    pub spec: PodSpec,
    /// Observed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PhaseStatus>,
}

impl Pod {
    /// Returns `true` when the pod reports the `Running` phase.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase() == Some(POD_RUNNING)
    }

    /// Returns `true` when the pod can no longer become ready.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        matches!(self.phase(), Some(POD_SUCCEEDED | POD_FAILED))
    }

    /// Returns `true` when any pod volume references `claim`.
    #[must_use]
    pub fn references_claim(&self, claim: &str) -> bool {
        self.spec
            .volumes
            .iter()
            .any(|volume| volume.claim_name() == Some(claim))
    }
}

/// Pod specification.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Containers in the pod.
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Pod-level volumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<PodVolume>,
    /// Restart policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
}

/// Container definition.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name.
    pub name: String,
    /// Image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Volume mounts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Mount of a pod volume into a container.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Pod volume name.
    pub name: String,
    /// Path inside the container.
    pub mount_path: String,
}

/// Pod-level volume.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodVolume {
    /// Pod volume name.
    pub name: String,
    /// Claim reference, when the volume is backed by a claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimVolumeSource>,
}

impl PodVolume {
    /// Name of the referenced claim, if any.
    #[must_use]
    pub fn claim_name(&self) -> Option<&str> {
        self.persistent_volume_claim
            .as_ref()
            .map(|source| source.claim_name.as_str())
    }
}

/// Reference from a pod volume to a claim.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVolumeSource {
    /// Referenced claim name.
    pub claim_name: String,
}

/// List envelope returned by `kubectl get -o json`.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    pub(crate) items: Vec<T>,
}

fn status_phase(status: Option<&PhaseStatus>) -> Option<&str> {
    status.and_then(|status| status.phase.as_deref())
}

impl Resource for PersistentVolume {
    const KIND: &'static str = "PersistentVolume";
    const PLURAL: &'static str = "persistentvolumes";
    const NAMESPACED: bool = false;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn phase(&self) -> Option<&str> {
        status_phase(self.status.as_ref())
    }
}

impl Resource for PersistentVolumeClaim {
    const KIND: &'static str = "PersistentVolumeClaim";
    const PLURAL: &'static str = "persistentvolumeclaims";
    const NAMESPACED: bool = true;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn phase(&self) -> Option<&str> {
        status_phase(self.status.as_ref())
    }
}

impl Resource for Pod {
    const KIND: &'static str = "Pod";
    const PLURAL: &'static str = "pods";
    const NAMESPACED: bool = true;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn phase(&self) -> Option<&str> {
        status_phase(self.status.as_ref())
    }
}
