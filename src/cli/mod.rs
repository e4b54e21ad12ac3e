//! Command-line interface definitions for the `lhc` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `lhc` binary.
#[derive(Debug, Parser)]
#[command(
    name = "lhc",
    version,
    about = "Inspect, export, and copy Longhorn volumes through temporary access pods",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// List Longhorn volumes.
    #[command(name = "list", about = "List Longhorn volumes")]
    List(ListCommand),
    /// Show the files stored on a volume.
    #[command(name = "contents", about = "Show the files stored on a volume")]
    Contents(ContentsCommand),
    /// Download a volume as a tar.gz archive.
    #[command(name = "download", about = "Download a volume as a tar.gz archive")]
    Download(DownloadCommand),
    /// Replace one volume's contents with another's.
    #[command(name = "copy", about = "Replace one volume's contents with another's")]
    Copy(CopyCommand),
    /// Remove temporary resources created by lhc.
    #[command(name = "cleanup", about = "Remove temporary resources created by lhc")]
    Cleanup(CleanupCommand),
}

/// Options shared by every command that touches cluster objects.
#[derive(Debug, Args)]
pub(crate) struct ClusterArgs {
    /// Namespace for temporary claims and pods (defaults to configuration).
    #[arg(short = 'n', long, value_name = "NAMESPACE")]
    pub(crate) namespace: Option<String>,
    /// Storage class recorded on temporary objects (defaults to configuration).
    #[arg(short = 'c', long = "storage-class", value_name = "CLASS")]
    pub(crate) storage_class: Option<String>,
}

/// Arguments for `lhc list`.
#[derive(Debug, Parser)]
pub(crate) struct ListCommand {}

/// Arguments for `lhc contents`.
#[derive(Debug, Parser)]
pub(crate) struct ContentsCommand {
    /// Longhorn volume to inspect.
    #[arg(short = 'v', long, value_name = "VOLUME")]
    pub(crate) volume: String,
    #[command(flatten)]
    pub(crate) cluster: ClusterArgs,
}

/// Arguments for `lhc download`.
#[derive(Debug, Parser)]
pub(crate) struct DownloadCommand {
    /// Longhorn volume to archive.
    #[arg(short = 'v', long, value_name = "VOLUME")]
    pub(crate) volume: String,
    /// Local path of the tar.gz archive to write.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub(crate) output: String,
    #[command(flatten)]
    pub(crate) cluster: ClusterArgs,
}

/// Arguments for `lhc copy`.
#[derive(Debug, Parser)]
pub(crate) struct CopyCommand {
    /// Volume to copy from.
    #[arg(short = 's', long, value_name = "VOLUME")]
    pub(crate) source: String,
    /// Volume whose contents are replaced.
    #[arg(short = 'd', long = "destination", value_name = "VOLUME")]
    pub(crate) destination: String,
    #[command(flatten)]
    pub(crate) cluster: ClusterArgs,
}

/// Arguments for `lhc cleanup`.
#[derive(Debug, Parser)]
pub(crate) struct CleanupCommand {
    /// Namespace to sweep (defaults to configuration).
    #[arg(short = 'n', long, value_name = "NAMESPACE")]
    pub(crate) namespace: Option<String>,
}
