//! Ephemeral-resource janitor.
//!
//! Every object `lhc` creates carries the `app=lhc-temp` label. The janitor
//! lists labelled pods and claims in a namespace plus labelled persistent
//! volumes cluster-wide, shows the operator what it found, and deletes it all
//! once confirmed. Operator-owned objects never match the selector.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cluster::{
    ClusterError, ControlPlane, PersistentVolume, PersistentVolumeClaim, Pod, Resource,
};
use crate::naming::{EphemeralNames, ephemeral_selector};

/// Boxed future returned by [`Confirm::confirm`].
pub type ConfirmFuture<'a> = Pin<Box<dyn Future<Output = io::Result<bool>> + Send + 'a>>;

/// Source of the operator's yes/no answer.
pub trait Confirm: Send + Sync {
    /// Resolves to `true` when the operator agrees to proceed.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the answer cannot be read.
    fn confirm(&self) -> ConfirmFuture<'_>;
}

/// Reads the answer from standard input.
///
/// Cancelling the token while the prompt is open answers "no".
#[derive(Clone, Debug, Default)]
pub struct StdinConfirm {
    cancel: CancellationToken,
}

impl StdinConfirm {
    /// Creates a prompt that gives up when `cancel` fires.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

impl Confirm for StdinConfirm {
    fn confirm(&self) -> ConfirmFuture<'_> {
        Box::pin(async move {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            let answer = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line).map(|_| line)
            });
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Ok(false),
                joined = answer => {
                    let line = joined.map_err(io::Error::other)??;
                    Ok(is_affirmative(&line))
                }
            }
        })
    }
}

/// Returns `true` only for `y` or `Y`, ignoring surrounding whitespace.
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}

/// Summary of janitor work.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepSummary {
    /// Labelled objects discovered.
    pub found: usize,
    /// Objects deleted.
    pub deleted: usize,
    /// Objects whose deletion failed.
    pub failed: usize,
    /// Whether the operator confirmed the deletion.
    pub confirmed: bool,
}

/// Errors returned by the janitor.
#[derive(Debug, Error)]
pub enum JanitorError {
    /// Raised when labelled objects cannot be listed.
    #[error("failed to list {kind}: {source}")]
    ListFailed {
        /// Plural kind being listed.
        kind: String,
        /// Underlying cluster error.
        #[source]
        source: ClusterError,
    },
    /// Raised when the confirmation cannot be read.
    #[error("failed to read confirmation: {source}")]
    Prompt {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Raised when the inventory cannot be written.
    #[error("failed to write sweep output: {source}")]
    Output {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl From<io::Error> for JanitorError {
    fn from(source: io::Error) -> Self {
        Self::Output { source }
    }
}

/// Labelled objects found by a sweep.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    /// Access pods.
    pub pods: Vec<Pod>,
    /// Access claims.
    pub claims: Vec<PersistentVolumeClaim>,
    /// Access persistent volumes.
    pub volumes: Vec<PersistentVolume>,
}

impl Inventory {
    /// Total number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pods.len() + self.claims.len() + self.volumes.len()
    }

    /// Returns `true` when nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the human-readable inventory.
    ///
    /// # Errors
    ///
    /// Returns any error from `out`.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "Found {} temporary resources:", self.len())?;
        write_section(out, "Pods", &self.pods)?;
        write_section(out, "PersistentVolumeClaims", &self.claims)?;
        write_section(out, "PersistentVolumes", &self.volumes)
    }
}

fn write_section<T: Resource>(out: &mut impl Write, title: &str, items: &[T]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "{title}:")?;
    for item in items {
        writeln!(
            out,
            "  - {} (Status: {})",
            item.name(),
            item.phase().unwrap_or("Unknown")
        )?;
    }
    Ok(())
}

/// Finds and deletes labelled access resources.
#[derive(Clone, Debug)]
pub struct Janitor<C, P> {
    cluster: C,
    confirm: P,
}

impl<C: ControlPlane, P: Confirm> Janitor<C, P> {
    /// Creates a janitor.
    #[must_use]
    pub const fn new(cluster: C, confirm: P) -> Self {
        Self { cluster, confirm }
    }

    /// Lists labelled pods and claims in `namespace` and labelled persistent
    /// volumes cluster-wide.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError::ListFailed`] when any listing fails.
    pub async fn inventory(&self, namespace: &str) -> Result<Inventory, JanitorError> {
        let selector = ephemeral_selector();
        Ok(Inventory {
            pods: self.list_labelled(Some(namespace), &selector).await?,
            claims: self.list_labelled(Some(namespace), &selector).await?,
            volumes: self.list_labelled(None, &selector).await?,
        })
    }

    /// Performs a sweep, writing the inventory and progress to `out`.
    ///
    /// Nothing is deleted unless the operator confirms. Individual delete
    /// failures are logged and counted; they never abort the sweep.
    ///
    /// # Errors
    ///
    /// Returns [`JanitorError`] when listing fails or the prompt cannot be
    /// written or answered.
    pub async fn sweep(
        &self,
        namespace: &str,
        out: &mut impl Write,
    ) -> Result<SweepSummary, JanitorError> {
        writeln!(
            out,
            "Searching for temporary resources labelled {} in namespace '{namespace}'...",
            ephemeral_selector()
        )?;
        let inventory = self.inventory(namespace).await?;
        let mut summary = SweepSummary {
            found: inventory.len(),
            ..SweepSummary::default()
        };
        if inventory.is_empty() {
            writeln!(out, "No temporary resources found.")?;
            return Ok(summary);
        }

        writeln!(out)?;
        inventory.write_to(out)?;
        write!(out, "\nDo you want to delete these resources? (y/N): ")?;
        out.flush()?;
        summary.confirmed = self
            .confirm
            .confirm()
            .await
            .map_err(|source| JanitorError::Prompt { source })?;
        if !summary.confirmed {
            writeln!(out, "Cleanup cancelled.")?;
            return Ok(summary);
        }

        writeln!(out, "\nDeleting resources...")?;
        for pod in &inventory.pods {
            self.delete_one::<Pod>(Some(namespace), pod.name(), out, &mut summary)
                .await?;
        }
        for claim in &inventory.claims {
            self.delete_one::<PersistentVolumeClaim>(
                Some(namespace),
                claim.name(),
                out,
                &mut summary,
            )
            .await?;
        }
        for volume in &inventory.volumes {
            self.delete_one::<PersistentVolume>(None, volume.name(), out, &mut summary)
                .await?;
        }

        writeln!(out, "\nCleanup completed.")?;
        info!(
            deleted = summary.deleted,
            failed = summary.failed,
            "janitor sweep finished"
        );
        Ok(summary)
    }

    async fn list_labelled<T: Resource>(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<T>, JanitorError> {
        self.cluster
            .list::<T>(namespace, Some(selector))
            .await
            .map_err(|source| JanitorError::ListFailed {
                kind: T::PLURAL.to_owned(),
                source,
            })
    }

    async fn delete_one<T: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
        out: &mut impl Write,
        summary: &mut SweepSummary,
    ) -> Result<(), JanitorError> {
        writeln!(out, "Deleting {} {name}...", T::KIND)?;
        match self.cluster.delete::<T>(namespace, name).await {
            Ok(()) | Err(ClusterError::NotFound { .. }) => summary.deleted += 1,
            Err(err) => {
                warn!(kind = T::KIND, %name, error = %err, "failed to delete");
                summary.failed += 1;
            }
        }
        Ok(())
    }
}

/// Best-effort removal of one ephemeral set, pod first.
///
/// Failures are logged and counted rather than returned; objects that are
/// already gone count as removed.
pub async fn remove_ephemeral_set<C: ControlPlane>(
    cluster: &C,
    names: &EphemeralNames,
    namespace: &str,
) -> usize {
    let results = [
        (
            Pod::KIND,
            &names.pod,
            cluster.delete::<Pod>(Some(namespace), &names.pod).await,
        ),
        (
            PersistentVolumeClaim::KIND,
            &names.claim,
            cluster
                .delete::<PersistentVolumeClaim>(Some(namespace), &names.claim)
                .await,
        ),
        (
            PersistentVolume::KIND,
            &names.persistent_volume,
            cluster
                .delete::<PersistentVolume>(None, &names.persistent_volume)
                .await,
        ),
    ];

    let mut failures = 0;
    for (kind, name, result) in results {
        match result {
            Ok(()) | Err(ClusterError::NotFound { .. }) => {}
            Err(err) => {
                warn!(%kind, %name, error = %err, "failed to delete temporary object");
                failures += 1;
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests;
