//! Volume workflows behind the `lhc` subcommands.
//!
//! Each workflow resolves access through the [`Resolver`], then drives the
//! remote runner or the copy engine against the resulting handles. Output
//! meant for the operator is written to a caller-supplied async writer so the
//! binary can target stdout and tests can capture it.

use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::access::{AccessError, AccessHandle, AccessRequest, Resolver, VolumeAccess};
use crate::cluster::{ClusterError, ControlPlane, VolumeCatalog};
use crate::copy::{CopyEngine, CopyError};
use crate::janitor::remove_ephemeral_set;
use crate::output::{render_access_summary, render_volume_table};
use crate::remote::{ExecChannel, ExecError, RemoteRunner, Writer, command_line};

/// Errors raised by the volume workflows.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Raised when the Longhorn inventory cannot be read.
    #[error("failed to list volumes: {source}")]
    Catalog {
        /// Underlying cluster error.
        #[source]
        source: ClusterError,
    },
    /// Raised when a single-volume operation cannot reach its volume.
    #[error("failed to access volume {volume}: {source}")]
    Access {
        /// Requested volume.
        volume: String,
        /// Resolution failure.
        #[source]
        source: AccessError,
    },
    /// Raised when the copy source cannot be reached.
    #[error("failed to access source volume {volume}: {source}")]
    SourceAccess {
        /// Source volume.
        volume: String,
        /// Resolution failure.
        #[source]
        source: AccessError,
    },
    /// Raised when the copy destination cannot be reached.
    #[error("failed to access destination volume {volume}: {source}")]
    DestinationAccess {
        /// Destination volume.
        volume: String,
        /// Resolution failure.
        #[source]
        source: AccessError,
    },
    /// Raised when a remote listing or archive command fails.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// Raised when the destination cannot be emptied before a copy.
    #[error("failed to clear destination volume: {source}")]
    ClearDestination {
        /// Remote failure.
        #[source]
        source: ExecError,
    },
    /// Raised when the streaming copy fails.
    #[error(transparent)]
    Copy(#[from] CopyError),
    /// Raised when the local download file cannot be written.
    #[error("failed to write {path}: {source}")]
    OutputFile {
        /// Local path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Raised when copy source and destination are the same volume.
    #[error("source and destination are the same volume: {volume}")]
    SameVolume {
        /// Volume named twice.
        volume: String,
    },
    /// Raised when operator output cannot be written.
    #[error("failed to write output: {source}")]
    Output {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl From<io::Error> for OperationError {
    fn from(source: io::Error) -> Self {
        Self::Output { source }
    }
}

/// Rejects a copy whose source and destination name the same volume.
///
/// # Errors
///
/// Returns [`OperationError::SameVolume`] when the names match.
pub fn ensure_distinct(source: &str, destination: &str) -> Result<(), OperationError> {
    if source == destination {
        return Err(OperationError::SameVolume {
            volume: source.to_owned(),
        });
    }
    Ok(())
}

/// Shell command that empties `mount_path`, hidden entries included.
#[must_use]
pub fn clear_command(mount_path: &str) -> Vec<String> {
    let root = escape(mount_path.into());
    let script = format!("rm -rf {root}/* {root}/.[!.]* {root}/..?*");
    command_line(&["sh", "-c", &script])
}

async fn write_text(out: &mut Writer, text: &str) -> Result<(), OperationError> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// The `list`, `contents`, `download`, and `copy` workflows.
#[derive(Debug)]
pub struct VolumeOperations<C, E> {
    resolver: Resolver<C>,
    runner: RemoteRunner<Arc<E>>,
    engine: CopyEngine<E>,
}

impl<C, E> VolumeOperations<C, E>
where
    C: ControlPlane + VolumeCatalog,
    E: ExecChannel + 'static,
{
    /// Assembles the workflows from a resolver and an exec channel.
    #[must_use]
    pub fn new(resolver: Resolver<C>, channel: Arc<E>, engine: CopyEngine<E>) -> Self {
        Self {
            resolver,
            runner: RemoteRunner::new(channel),
            engine,
        }
    }

    /// Resolver used by the workflows.
    #[must_use]
    pub const fn resolver(&self) -> &Resolver<C> {
        &self.resolver
    }

    /// Writes the Longhorn volume table.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Catalog`] when the inventory cannot be read.
    pub async fn list_volumes(&self, out: &mut Writer) -> Result<(), OperationError> {
        let volumes = self
            .resolver
            .cluster()
            .list_volumes()
            .await
            .map_err(|source| OperationError::Catalog { source })?;
        if volumes.is_empty() {
            return write_text(out, "No Longhorn volumes found.\n").await;
        }
        let mut table = render_volume_table(&volumes);
        table.push('\n');
        write_text(out, &table).await
    }

    /// Lists every regular file on the volume.
    ///
    /// The access pod is left running for later invocations.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Access`] when the volume cannot be reached
    /// and [`OperationError::Exec`] when the listing fails.
    pub async fn contents(
        &self,
        request: &AccessRequest,
        out: &mut Writer,
    ) -> Result<VolumeAccess, OperationError> {
        let access = self.access(request).await?;
        let handle = access.handle();
        let summary = render_access_summary(&request.volume, &access);
        write_text(out, &format!("{summary}\nContents (recursive):\n")).await?;

        let command = command_line(&[
            "find",
            &handle.mount_path,
            "-type",
            "f",
            "-exec",
            "ls",
            "-la",
            "{}",
            ";",
        ]);
        let mut diagnostics = tokio::io::stderr();
        self.runner
            .run(&handle.target, &command, None, out, &mut diagnostics)
            .await?;
        Ok(access)
    }

    /// Streams a gzip-compressed tar archive of the volume into `path`.
    ///
    /// A partially written file is removed when the transfer fails.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Access`] when the volume cannot be reached,
    /// [`OperationError::OutputFile`] when the file cannot be written, and
    /// [`OperationError::Exec`] when the archive command fails.
    pub async fn download(
        &self,
        request: &AccessRequest,
        path: &Utf8Path,
        out: &mut Writer,
    ) -> Result<VolumeAccess, OperationError> {
        let access = self.access(request).await?;
        let summary = render_access_summary(&request.volume, &access);
        write_text(
            out,
            &format!("{summary}Output File: {path}\n\nCreating tar.gz archive...\n"),
        )
        .await?;

        if let Err(err) = self.archive_into(&access, path).await {
            if let Err(cleanup) = tokio::fs::remove_file(path).await
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(%path, error = %cleanup, "failed to remove partial download");
            }
            return Err(err);
        }

        write_text(out, &format!("\nDownload completed: {path}\n")).await?;
        Ok(access)
    }

    async fn archive_into(
        &self,
        access: &VolumeAccess,
        path: &Utf8Path,
    ) -> Result<(), OperationError> {
        let file_error = |source| OperationError::OutputFile {
            path: path.to_owned(),
            source,
        };
        let handle = access.handle();
        let mut file = tokio::fs::File::create(path).await.map_err(file_error)?;
        let command = command_line(&["tar", "-czf", "-", "-C", &handle.mount_path, "."]);
        let mut diagnostics = tokio::io::stderr();
        self.runner
            .run(&handle.target, &command, None, &mut file, &mut diagnostics)
            .await?;
        file.flush().await.map_err(file_error)?;
        file.sync_all().await.map_err(file_error)
    }

    /// Replaces the destination volume's contents with the source's.
    ///
    /// Ephemeral sets the resolver provisioned for this copy are removed
    /// afterwards whatever the outcome; cleanup failures are only logged.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::SameVolume`] for identical volumes,
    /// [`OperationError::SourceAccess`] or
    /// [`OperationError::DestinationAccess`] when either side cannot be
    /// reached, [`OperationError::ClearDestination`] when the destination
    /// cannot be emptied, and [`OperationError::Copy`] when streaming fails.
    pub async fn copy(
        &self,
        source: &AccessRequest,
        destination: &AccessRequest,
        out: &mut Writer,
    ) -> Result<(), OperationError> {
        ensure_distinct(&source.volume, &destination.volume)?;
        let mut provisioned = Vec::new();
        let result = self
            .copy_between(source, destination, out, &mut provisioned)
            .await;

        for (namespace, access) in &provisioned {
            if let Some(names) = access.ephemeral_names() {
                info!(pod = %names.pod, "removing temporary access resources");
                remove_ephemeral_set(self.resolver.cluster(), names, namespace).await;
            }
        }
        result
    }

    async fn copy_between(
        &self,
        source: &AccessRequest,
        destination: &AccessRequest,
        out: &mut Writer,
        provisioned: &mut Vec<(String, VolumeAccess)>,
    ) -> Result<(), OperationError> {
        let from = self.resolver.resolve(source).await.map_err(|err| {
            OperationError::SourceAccess {
                volume: source.volume.clone(),
                source: err,
            }
        })?;
        provisioned.push((source.namespace.clone(), from.clone()));
        let to = self.resolver.resolve(destination).await.map_err(|err| {
            OperationError::DestinationAccess {
                volume: destination.volume.clone(),
                source: err,
            }
        })?;
        provisioned.push((destination.namespace.clone(), to.clone()));

        let (src, dst) = (from.handle(), to.handle());
        write_text(
            out,
            &format!(
                "Source Volume: {}\nSource Pod: {}, Container: {}, Mount: {}\n\
                 Destination Volume: {}\nDestination Pod: {}, Container: {}, Mount: {}\n\n\
                 Copying volume contents...\n",
                source.volume,
                src.target.pod,
                src.target.container,
                src.mount_path,
                destination.volume,
                dst.target.pod,
                dst.target.container,
                dst.mount_path,
            ),
        )
        .await?;

        write_text(out, "Clearing destination directory...\n").await?;
        let mut discard = tokio::io::sink();
        let mut diagnostics = tokio::io::stderr();
        self.runner
            .run(
                &dst.target,
                &clear_command(&dst.mount_path),
                None,
                &mut discard,
                &mut diagnostics,
            )
            .await
            .map_err(|source| OperationError::ClearDestination { source })?;

        write_text(out, "Checking source volume contents...\n").await?;
        self.listing(src, "source", out).await?;

        write_text(out, "Streaming data from source to destination...\n").await?;
        self.engine.copy(src, dst).await?;

        write_text(out, "Verifying destination volume contents...\n").await?;
        self.listing(dst, "destination", out).await?;

        write_text(
            out,
            &format!(
                "\nCopy completed: {} -> {}\n",
                source.volume, destination.volume
            ),
        )
        .await
    }

    async fn listing(
        &self,
        handle: &AccessHandle,
        side: &str,
        out: &mut Writer,
    ) -> Result<(), OperationError> {
        let command = command_line(&["ls", "-la", &handle.mount_path]);
        let mut diagnostics = tokio::io::stderr();
        if let Err(err) = self
            .runner
            .run(&handle.target, &command, None, out, &mut diagnostics)
            .await
        {
            warn!(%side, error = %err, "failed to list volume contents");
            write_text(out, &format!("Warning: failed to list {side} contents\n")).await?;
        }
        Ok(())
    }

    async fn access(&self, request: &AccessRequest) -> Result<VolumeAccess, OperationError> {
        let access = self
            .resolver
            .resolve(request)
            .await
            .map_err(|source| OperationError::Access {
                volume: request.volume.clone(),
                source,
            })?;
        info!(
            volume = %request.volume,
            strategy = access.strategy(),
            target = %access.handle().target,
            "volume is accessible"
        );
        Ok(access)
    }
}
