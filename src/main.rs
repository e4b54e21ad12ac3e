//! Binary entry point for the `lhc` CLI.

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use lhc::access::{AccessRequest, Provisioner, Resolver};
use lhc::cluster::{Kubectl, ProcessCommandRunner};
use lhc::config::{ClusterCredentials, ConfigError, LhcConfig};
use lhc::copy::CopyEngine;
use lhc::janitor::{Janitor, JanitorError, StdinConfirm};
use lhc::ops::{OperationError, VolumeOperations, ensure_distinct};
use lhc::remote::KubectlExec;

mod cli;

use cli::{ClusterArgs, Cli};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("cleanup failed: {0}")]
    Janitor(#[from] JanitorError),
}

/// Everything a command needs to talk to the cluster.
struct Session {
    config: LhcConfig,
    cluster: Kubectl<ProcessCommandRunner>,
    exec: Arc<KubectlExec>,
    cancel: CancellationToken,
}

impl Session {
    fn connect() -> Result<Self, CliError> {
        let config = LhcConfig::load_without_cli_args()?;
        let credentials = ClusterCredentials::detect(&config);
        let cluster = Kubectl::with_process_runner(
            config.kubectl_bin.clone(),
            credentials.clone(),
            config.longhorn_namespace.clone(),
        );
        let exec = Arc::new(KubectlExec::new(config.kubectl_bin.clone(), credentials));
        Ok(Self {
            config,
            cluster,
            exec,
            cancel: cancel_on_interrupt(),
        })
    }

    fn operations(&self) -> VolumeOperations<Kubectl<ProcessCommandRunner>, KubectlExec> {
        let provisioner =
            Provisioner::from_config(self.cluster.clone(), &self.config, self.cancel.clone());
        let engine = CopyEngine::new(Arc::clone(&self.exec), self.cancel.clone());
        VolumeOperations::new(Resolver::new(provisioner), Arc::clone(&self.exec), engine)
    }

    fn request(&self, volume: &str, args: &ClusterArgs) -> AccessRequest {
        AccessRequest::new(
            volume,
            args.namespace
                .clone()
                .unwrap_or_else(|| self.config.default_namespace.clone()),
            args.storage_class
                .clone()
                .unwrap_or_else(|| self.config.default_storage_class.clone()),
        )
    }
}

fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            trigger.cancel();
        }
    });
    token
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let mut stdout = tokio::io::stdout();
    match cli {
        Cli::List(_) => {
            let session = Session::connect()?;
            session.operations().list_volumes(&mut stdout).await?;
        }
        Cli::Contents(command) => {
            let session = Session::connect()?;
            let request = session.request(&command.volume, &command.cluster);
            session.operations().contents(&request, &mut stdout).await?;
        }
        Cli::Download(command) => {
            let session = Session::connect()?;
            let request = session.request(&command.volume, &command.cluster);
            let path = Utf8PathBuf::from(command.output);
            session
                .operations()
                .download(&request, &path, &mut stdout)
                .await?;
        }
        Cli::Copy(command) => {
            ensure_distinct(&command.source, &command.destination)?;
            let session = Session::connect()?;
            let source = session.request(&command.source, &command.cluster);
            let destination = session.request(&command.destination, &command.cluster);
            session
                .operations()
                .copy(&source, &destination, &mut stdout)
                .await?;
        }
        Cli::Cleanup(command) => {
            let session = Session::connect()?;
            let namespace = command
                .namespace
                .unwrap_or_else(|| session.config.default_namespace.clone());
            let confirm = StdinConfirm::new(session.cancel.clone());
            Janitor::new(session.cluster, confirm)
                .sweep(&namespace, &mut io::stdout())
                .await?;
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "Error: {err}").ok();
}
