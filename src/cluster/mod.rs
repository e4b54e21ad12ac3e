//! Cluster control-plane abstraction.
//!
//! The access workflow talks to Kubernetes through two narrow traits:
//! [`ControlPlane`] for the core objects `lhc` reads and creates, and
//! [`VolumeCatalog`] for the Longhorn volume inventory. The production
//! implementation ([`Kubectl`]) shells out to the `kubectl` binary; tests use
//! the in-memory double from [`crate::test_support`].

use std::future::Future;
use std::pin::Pin;

mod error;
mod kubectl;
mod resources;
mod runner;
mod volumes;

pub use error::ClusterError;
pub use kubectl::{DEFAULT_KUBECTL_BIN, Kubectl, render_manifest};
pub use resources::{
    CLAIM_BOUND, ClaimVolumeSource, Container, CsiVolumeSource, ObjectMeta, POD_FAILED,
    POD_RUNNING, POD_SUCCEEDED, PersistentVolume, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeSpec, PhaseStatus, Pod, PodSpec, PodVolume,
    Resource, ResourceRequirements, STORAGE, VolumeMount,
};
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner};
pub use volumes::{Volume, VolumeState, parse_volume_list};

pub(crate) use resources::ObjectList;

/// Boxed future returned by cluster trait methods.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClusterError>> + Send + 'a>>;

/// Typed access to the Kubernetes objects backing an access point.
///
/// `namespace` is ignored for cluster-scoped kinds.
pub trait ControlPlane: Send + Sync {
    /// Reads a single object. An absent object is `Ok(None)`, never an error.
    fn get<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> ClusterFuture<'a, Option<T>>;

    /// Creates `object` in the namespace recorded in its metadata.
    ///
    /// A name collision is reported as [`ClusterError::AlreadyExists`].
    fn create<'a, T: Resource>(&'a self, object: &'a T) -> ClusterFuture<'a, T>;

    /// Lists objects, optionally filtered by a label selector.
    fn list<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        selector: Option<&'a str>,
    ) -> ClusterFuture<'a, Vec<T>>;

    /// Deletes an object without waiting for finalisers.
    fn delete<'a, T: Resource>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> ClusterFuture<'a, ()>;
}

/// Inventory of Longhorn volumes.
pub trait VolumeCatalog: Send + Sync {
    /// Lists every volume known to the storage system.
    fn list_volumes(&self) -> ClusterFuture<'_, Vec<Volume>>;

    /// Finds a volume by exact name.
    fn find_volume<'a>(&'a self, name: &'a str) -> ClusterFuture<'a, Option<Volume>> {
        Box::pin(async move {
            let volumes = self.list_volumes().await?;
            Ok(volumes.into_iter().find(|volume| volume.name == name))
        })
    }
}
