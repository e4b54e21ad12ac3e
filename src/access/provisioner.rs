//! Idempotent create-or-reuse of the objects exposing one volume.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{
    ClaimVolumeSource, ClusterError, Container, ControlPlane, CsiVolumeSource, ObjectMeta,
    PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeSpec, Pod,
    PodSpec, PodVolume, Resource, ResourceRequirements, STORAGE, Volume, VolumeMount,
};
use crate::config::LhcConfig;
use crate::naming::{
    ACCESS_CONTAINER, ACCESS_MOUNT_PATH, ACCESS_POD_VOLUME, EphemeralNames, ephemeral_labels,
};
use crate::remote::ExecTarget;

use super::{AccessError, AccessHandle, AccessRequest, WaitOutcome, WaitPolicy, wait_until};

/// CSI driver registered by Longhorn.
pub const LONGHORN_DRIVER: &str = "driver.longhorn.io";

/// Default image for access pods.
pub const DEFAULT_ACCESS_IMAGE: &str = "busybox:latest";

const ACCESS_MODE: &str = "ReadWriteMany";
const FS_TYPE: &str = "ext4";
const STALE_REPLICA_TIMEOUT: &str = "2880";
const KEEPALIVE: [&str; 2] = ["sleep", "3600"];

/// Replication profile of an exposure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Exposure {
    /// Expose the Longhorn volume itself.
    Direct,
    /// Expose a single-replica stand-in under the indirect name.
    ReducedRedundancy,
}

impl Exposure {
    /// Names of the objects backing this exposure of `volume`.
    #[must_use]
    pub fn names(self, volume: &str) -> EphemeralNames {
        match self {
            Self::Direct => EphemeralNames::for_volume(volume),
            Self::ReducedRedundancy => EphemeralNames::indirect_for_volume(volume),
        }
    }

    const fn replicas(self) -> &'static str {
        match self {
            Self::Direct => "3",
            Self::ReducedRedundancy => "1",
        }
    }

    const fn reclaim_policy(self) -> &'static str {
        match self {
            Self::Direct => "Retain",
            Self::ReducedRedundancy => "Delete",
        }
    }
}

/// Creates or reuses the persistent volume, claim, and pod exposing a volume.
#[derive(Clone, Debug)]
pub struct Provisioner<C> {
    cluster: C,
    image: String,
    claim_wait: WaitPolicy,
    pod_wait: WaitPolicy,
    cancel: CancellationToken,
}

impl<C: ControlPlane> Provisioner<C> {
    /// Creates a provisioner with the default image and waits
    /// (claims: 60 polls, pods: 120 polls, one second apart).
    #[must_use]
    pub fn new(cluster: C, cancel: CancellationToken) -> Self {
        let second = Duration::from_secs(1);
        Self {
            cluster,
            image: DEFAULT_ACCESS_IMAGE.to_owned(),
            claim_wait: WaitPolicy::polls(second, 60),
            pod_wait: WaitPolicy::polls(second, 120),
            cancel,
        }
    }

    /// Creates a provisioner using the image and waits from `config`.
    #[must_use]
    pub fn from_config(cluster: C, config: &LhcConfig, cancel: CancellationToken) -> Self {
        Self::new(cluster, cancel)
            .with_image(config.access_image.clone())
            .with_waits(config.claim_wait(), config.pod_wait())
    }

    /// Overrides the access pod image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Overrides the claim and pod waits.
    #[must_use]
    pub const fn with_waits(mut self, claim_wait: WaitPolicy, pod_wait: WaitPolicy) -> Self {
        self.claim_wait = claim_wait;
        self.pod_wait = pod_wait;
        self
    }

    /// Control plane used by this provisioner.
    #[must_use]
    pub const fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Ensures the ephemeral set for `volume` exists and its pod is running.
    ///
    /// Objects that already exist under the canonical names are reused, so
    /// repeated calls converge on one set per volume.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::GetFailed`] when an existence check fails,
    /// [`AccessError::ProvisionFailed`] when an object cannot be created or the
    /// pod never becomes ready, and [`AccessError::Cancelled`] when a wait is
    /// interrupted.
    pub async fn provision(
        &self,
        request: &AccessRequest,
        volume: &Volume,
        exposure: Exposure,
    ) -> Result<AccessHandle, AccessError> {
        let names = exposure.names(&volume.name);
        let size = volume
            .size
            .clone()
            .ok_or_else(|| AccessError::ProvisionFailed {
                name: volume.name.clone(),
                reason: String::from("volume size is unknown"),
            })?;

        let pv = self.persistent_volume(request, &names, &size, exposure);
        self.get_or_create(None, pv).await?;

        let claim = self.claim(request, &names, &size);
        let claim = self.get_or_create(Some(&request.namespace), claim).await?;
        if !claim.is_bound() {
            self.wait_for_claim(&request.namespace, &names.claim).await?;
        }

        let pod = self.pod(request, &names);
        let pod = self.get_or_create(Some(&request.namespace), pod).await?;
        if !pod.is_running() {
            ensure_not_terminated(&pod)?;
            self.wait_for_pod(&request.namespace, &names.pod).await?;
        }

        Ok(AccessHandle {
            target: ExecTarget::new(&request.namespace, &names.pod, ACCESS_CONTAINER),
            mount_path: ACCESS_MOUNT_PATH.to_owned(),
        })
    }

    async fn read<T: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<T>, AccessError> {
        self.cluster
            .get::<T>(namespace, name)
            .await
            .map_err(|source| AccessError::GetFailed {
                kind: T::KIND.to_owned(),
                name: name.to_owned(),
                source,
            })
    }

    async fn get_or_create<T: Resource>(
        &self,
        namespace: Option<&str>,
        desired: T,
    ) -> Result<T, AccessError> {
        let name = desired.name().to_owned();
        if let Some(existing) = self.read::<T>(namespace, &name).await? {
            debug!(kind = T::KIND, %name, "reusing existing object");
            return Ok(existing);
        }

        info!(kind = T::KIND, %name, "creating");
        match self.cluster.create(&desired).await {
            Ok(created) => Ok(created),
            Err(ClusterError::AlreadyExists { .. }) => {
                debug!(kind = T::KIND, %name, "created concurrently, reusing");
                self.read::<T>(namespace, &name)
                    .await?
                    .ok_or_else(|| AccessError::ProvisionFailed {
                        name,
                        reason: format!("{} disappeared after a concurrent create", T::KIND),
                    })
            }
            Err(source) => Err(AccessError::ProvisionFailed {
                name,
                reason: format!("failed to create {}: {source}", T::KIND),
            }),
        }
    }

    async fn wait_for_claim(&self, namespace: &str, claim: &str) -> Result<(), AccessError> {
        info!(%claim, "waiting for claim to bind");
        let outcome = wait_until(self.claim_wait, &self.cancel, move || async move {
            let current = self
                .read::<PersistentVolumeClaim>(Some(namespace), claim)
                .await?;
            Ok::<_, AccessError>(current.filter(PersistentVolumeClaim::is_bound).map(|_| ()))
        })
        .await?;

        match outcome {
            WaitOutcome::Ready(()) => Ok(()),
            WaitOutcome::TimedOut => {
                warn!(%claim, "claim did not bind in time; continuing");
                Ok(())
            }
            WaitOutcome::Cancelled => Err(AccessError::Cancelled {
                action: format!("waiting for claim {claim}"),
            }),
        }
    }

    async fn wait_for_pod(&self, namespace: &str, pod: &str) -> Result<(), AccessError> {
        info!(%pod, "waiting for access pod to start");
        let outcome = wait_until(self.pod_wait, &self.cancel, move || async move {
            match self.read::<Pod>(Some(namespace), pod).await? {
                Some(current) if current.is_running() => Ok(Some(())),
                Some(current) => ensure_not_terminated(&current).map(|()| None),
                None => Ok(None),
            }
        })
        .await?;

        match outcome {
            WaitOutcome::Ready(()) => Ok(()),
            WaitOutcome::TimedOut => Err(AccessError::ProvisionFailed {
                name: pod.to_owned(),
                reason: String::from("endpoint not ready"),
            }),
            WaitOutcome::Cancelled => Err(AccessError::Cancelled {
                action: format!("waiting for pod {pod}"),
            }),
        }
    }

    fn persistent_volume(
        &self,
        request: &AccessRequest,
        names: &EphemeralNames,
        size: &str,
        exposure: Exposure,
    ) -> PersistentVolume {
        let attributes = BTreeMap::from([
            (
                String::from("numberOfReplicas"),
                exposure.replicas().to_owned(),
            ),
            (
                String::from("staleReplicaTimeout"),
                STALE_REPLICA_TIMEOUT.to_owned(),
            ),
        ]);
        PersistentVolume {
            metadata: ObjectMeta::new(&names.persistent_volume, None, ephemeral_labels()),
            spec: PersistentVolumeSpec {
                capacity: BTreeMap::from([(STORAGE.to_owned(), size.to_owned())]),
                access_modes: vec![ACCESS_MODE.to_owned()],
                persistent_volume_reclaim_policy: Some(exposure.reclaim_policy().to_owned()),
                storage_class_name: Some(request.storage_class.clone()),
                csi: Some(CsiVolumeSource {
                    driver: LONGHORN_DRIVER.to_owned(),
                    volume_handle: names.volume_handle.clone(),
                    fs_type: Some(FS_TYPE.to_owned()),
                    volume_attributes: attributes,
                }),
            },
            status: None,
        }
    }

    fn claim(
        &self,
        request: &AccessRequest,
        names: &EphemeralNames,
        size: &str,
    ) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta::new(&names.claim, Some(&request.namespace), ephemeral_labels()),
            spec: PersistentVolumeClaimSpec {
                access_modes: vec![ACCESS_MODE.to_owned()],
                resources: ResourceRequirements {
                    requests: BTreeMap::from([(STORAGE.to_owned(), size.to_owned())]),
                },
                storage_class_name: Some(request.storage_class.clone()),
                volume_name: Some(names.persistent_volume.clone()),
            },
            status: None,
        }
    }

    fn pod(&self, request: &AccessRequest, names: &EphemeralNames) -> Pod {
        Pod {
            metadata: ObjectMeta::new(&names.pod, Some(&request.namespace), ephemeral_labels()),
            spec: PodSpec {
                containers: vec![Container {
                    name: ACCESS_CONTAINER.to_owned(),
                    image: Some(self.image.clone()),
                    command: KEEPALIVE.iter().map(|part| (*part).to_owned()).collect(),
                    volume_mounts: vec![VolumeMount {
                        name: ACCESS_POD_VOLUME.to_owned(),
                        mount_path: ACCESS_MOUNT_PATH.to_owned(),
                    }],
                }],
                volumes: vec![PodVolume {
                    name: ACCESS_POD_VOLUME.to_owned(),
                    persistent_volume_claim: Some(ClaimVolumeSource {
                        claim_name: names.claim.clone(),
                    }),
                }],
                restart_policy: Some(String::from("Never")),
            },
            status: None,
        }
    }
}

fn ensure_not_terminated(pod: &Pod) -> Result<(), AccessError> {
    if !pod.is_terminated() {
        return Ok(());
    }
    Err(AccessError::ProvisionFailed {
        name: pod.name().to_owned(),
        reason: format!(
            "access pod is in phase {}; run `lhc cleanup` and retry",
            pod.phase().unwrap_or("unknown")
        ),
    })
}
