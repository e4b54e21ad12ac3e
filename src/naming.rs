//! Deterministic names and labels for ephemeral access resources.
//!
//! Every object `lhc` creates is named from the volume it exposes and tagged
//! with a shared label. Repeated invocations therefore find the objects a
//! previous run left behind, and the janitor can discover all of them with a
//! single label selector without touching operator-owned resources.

use std::collections::BTreeMap;

/// Prefix shared by every ephemeral object name.
pub const EPHEMERAL_PREFIX: &str = "lhc-temp-";

/// Label key applied to every ephemeral object.
pub const EPHEMERAL_LABEL_KEY: &str = "app";

/// Label value applied to every ephemeral object.
pub const EPHEMERAL_LABEL_VALUE: &str = "lhc-temp";

/// Container name used by access pods.
pub const ACCESS_CONTAINER: &str = "temp-container";

/// Path at which access pods mount the exposed volume.
pub const ACCESS_MOUNT_PATH: &str = "/mnt/volume";

/// Name of the pod-level volume that references the claim.
pub const ACCESS_POD_VOLUME: &str = "volume";

/// Names of the {persistent volume, claim, pod} triple exposing one volume.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct EphemeralNames {
    /// Longhorn volume handle the persistent volume points at.
    pub volume_handle: String,
    /// Cluster-scoped persistent volume name.
    pub persistent_volume: String,
    /// Namespaced claim name.
    pub claim: String,
    /// Namespaced access pod name.
    pub pod: String,
}

impl EphemeralNames {
    /// Derives the canonical names for the given Longhorn volume handle.
    #[must_use]
    pub fn for_volume(volume_handle: &str) -> Self {
        Self {
            volume_handle: volume_handle.to_owned(),
            persistent_volume: format!("{EPHEMERAL_PREFIX}pv-{volume_handle}"),
            claim: format!("{EPHEMERAL_PREFIX}pvc-{volume_handle}"),
            pod: format!("{EPHEMERAL_PREFIX}pod-{volume_handle}"),
        }
    }

    /// Derives the names used for the reduced-redundancy exposure of a volume
    /// that is already in use elsewhere.
    #[must_use]
    pub fn indirect_for_volume(volume: &str) -> Self {
        Self::for_volume(&indirect_volume_handle(volume))
    }
}

/// Volume handle used for the reduced-redundancy stand-in of `volume`.
#[must_use]
pub fn indirect_volume_handle(volume: &str) -> String {
    format!("{EPHEMERAL_PREFIX}rwx-{volume}")
}

/// Label set applied to every ephemeral object.
#[must_use]
pub fn ephemeral_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        EPHEMERAL_LABEL_KEY.to_owned(),
        EPHEMERAL_LABEL_VALUE.to_owned(),
    )])
}

/// Label selector matching every ephemeral object.
#[must_use]
pub fn ephemeral_selector() -> String {
    format!("{EPHEMERAL_LABEL_KEY}={EPHEMERAL_LABEL_VALUE}")
}

/// Returns `true` when `name` follows the ephemeral naming convention.
#[must_use]
pub fn is_ephemeral_name(name: &str) -> bool {
    name.starts_with(EPHEMERAL_PREFIX)
}
