//! Per-invocation decision of how a volume's data is reached.

use tracing::{debug, info, warn};

use crate::cluster::{ControlPlane, PersistentVolumeClaim, Pod, VolumeCatalog};
use crate::remote::ExecTarget;

use super::{AccessError, AccessHandle, AccessRequest, Exposure, Provisioner, VolumeAccess};

/// Whether a bound volume is mounted by a running workload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClaimUsage {
    /// No bound claim, or no running pod uses it.
    Idle,
    /// Running pods mount the claim.
    InUse {
        /// Claim bound to the volume's persistent volume.
        claim: String,
        /// Running pods referencing the claim.
        pods: Vec<Pod>,
    },
}

/// Resolves a volume name to an [`AccessHandle`].
///
/// Nothing is cached between calls and the in-use check is not atomic with
/// the provisioning that may follow it.
#[derive(Clone, Debug)]
pub struct Resolver<C> {
    provisioner: Provisioner<C>,
}

impl<C> Resolver<C>
where
    C: ControlPlane + VolumeCatalog,
{
    /// Creates a resolver that provisions through `provisioner`.
    #[must_use]
    pub const fn new(provisioner: Provisioner<C>) -> Self {
        Self { provisioner }
    }

    /// Provisioner used for fresh access points.
    #[must_use]
    pub const fn provisioner(&self) -> &Provisioner<C> {
        &self.provisioner
    }

    /// Control plane shared with the provisioner.
    #[must_use]
    pub const fn cluster(&self) -> &C {
        self.provisioner.cluster()
    }

    /// Decides how to reach `request.volume` and prepares the access point.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] for unknown volumes,
    /// [`AccessError::ListFailed`] when the inventory or usage listing fails,
    /// [`AccessError::NoAccessPath`] when a busy volume cannot be exposed, and
    /// any provisioning error for idle volumes.
    pub async fn resolve(&self, request: &AccessRequest) -> Result<VolumeAccess, AccessError> {
        let volume = self
            .cluster()
            .find_volume(&request.volume)
            .await
            .map_err(|source| AccessError::ListFailed {
                what: String::from("Longhorn volumes"),
                source,
            })?
            .ok_or_else(|| AccessError::NotFound {
                volume: request.volume.clone(),
            })?;

        let usage = match volume.pv_name.as_deref() {
            Some(pv) => self.claim_usage(&request.namespace, pv).await?,
            None => ClaimUsage::Idle,
        };

        let ClaimUsage::InUse { claim, pods } = usage else {
            debug!(volume = %volume.name, "volume is idle; provisioning direct access");
            let handle = self
                .provisioner
                .provision(request, &volume, Exposure::Direct)
                .await?;
            return Ok(VolumeAccess::DirectProvision {
                handle,
                names: Exposure::Direct.names(&volume.name),
            });
        };

        if let Some(handle) = find_existing_mount(&request.namespace, &claim, &pods) {
            info!(
                volume = %volume.name,
                pod = %handle.target.pod,
                "reusing pod that already mounts the volume"
            );
            return Ok(VolumeAccess::ReuseExisting { handle });
        }

        warn!(
            volume = %volume.name,
            %claim,
            "volume is in use but no mounting container was found; exposing a \
             reduced-redundancy stand-in in place of a snapshot clone"
        );
        let handle = self
            .provisioner
            .provision(request, &volume, Exposure::ReducedRedundancy)
            .await
            .map_err(|source| AccessError::NoAccessPath {
                volume: volume.name.clone(),
                source: Box::new(source),
            })?;
        Ok(VolumeAccess::IndirectSnapshot {
            handle,
            names: Exposure::ReducedRedundancy.names(&volume.name),
        })
    }

    /// Finds the bound claim for `persistent_volume` and the running pods
    /// that reference it.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::ListFailed`] when claims or pods cannot be
    /// listed.
    pub async fn claim_usage(
        &self,
        namespace: &str,
        persistent_volume: &str,
    ) -> Result<ClaimUsage, AccessError> {
        let claims: Vec<PersistentVolumeClaim> = self
            .cluster()
            .list(Some(namespace), None)
            .await
            .map_err(|source| AccessError::ListFailed {
                what: String::from("persistent volume claims"),
                source,
            })?;
        let Some(claim) = claims.into_iter().find(|claim| {
            claim.is_bound() && claim.spec.volume_name.as_deref() == Some(persistent_volume)
        }) else {
            return Ok(ClaimUsage::Idle);
        };

        let pods: Vec<Pod> = self
            .cluster()
            .list(Some(namespace), None)
            .await
            .map_err(|source| AccessError::ListFailed {
                what: String::from("pods"),
                source,
            })?;
        let claim_name = claim.metadata.name;
        let users: Vec<Pod> = pods
            .into_iter()
            .filter(|pod| pod.is_running() && pod.references_claim(&claim_name))
            .collect();

        if users.is_empty() {
            return Ok(ClaimUsage::Idle);
        }
        Ok(ClaimUsage::InUse {
            claim: claim_name,
            pods: users,
        })
    }
}

/// Locates a container in `pods` that mounts `claim` and returns its handle.
#[must_use]
pub fn find_existing_mount(namespace: &str, claim: &str, pods: &[Pod]) -> Option<AccessHandle> {
    pods.iter().find_map(|pod| {
        let pod_volume = pod
            .spec
            .volumes
            .iter()
            .find(|volume| volume.claim_name() == Some(claim))?;
        pod.spec.containers.iter().find_map(|container| {
            container
                .volume_mounts
                .iter()
                .find(|mount| mount.name == pod_volume.name)
                .map(|mount| AccessHandle {
                    target: ExecTarget::new(namespace, &pod.metadata.name, &container.name),
                    mount_path: mount.mount_path.clone(),
                })
        })
    })
}
