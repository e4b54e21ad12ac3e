//! Configuration loading via `ortho-config` and cluster credential selection.

use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::access::WaitPolicy;

/// Environment variable set by Kubernetes inside every pod.
pub const IN_CLUSTER_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";

/// Service-account token mounted into pods.
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Standard kubeconfig override variable honoured by `kubectl`.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Fallback kubeconfig location.
pub const DEFAULT_KUBECONFIG: &str = "~/.kube/config";

/// Settings merged from defaults, `lhc.toml`, and `LHC_*` environment
/// variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LHC",
    discovery(
        app_name = "lhc",
        env_var = "LHC_CONFIG_PATH",
        config_file_name = "lhc.toml",
        dotfile_name = ".lhc.toml",
        project_file_name = "lhc.toml"
    )
)]
pub struct LhcConfig {
    /// Path to the `kubectl` executable.
    #[ortho_config(default = "kubectl".to_owned())]
    pub kubectl_bin: String,
    /// Explicit kubeconfig path. Supports tilde expansion. When unset,
    /// `KUBECONFIG` and then `~/.kube/config` are used outside a cluster.
    pub kubeconfig: Option<String>,
    /// Namespace used when `-n` is not given.
    #[ortho_config(default = "default".to_owned())]
    pub default_namespace: String,
    /// Storage class used when `-c` is not given.
    #[ortho_config(default = "longhorn".to_owned())]
    pub default_storage_class: String,
    /// Namespace holding the Longhorn volume objects.
    #[ortho_config(default = "longhorn-system".to_owned())]
    pub longhorn_namespace: String,
    /// Image run by access pods.
    #[ortho_config(default = "busybox:latest".to_owned())]
    pub access_image: String,
    /// Seconds between readiness polls.
    #[ortho_config(default = 1)]
    pub poll_interval_secs: u64,
    /// Seconds to wait for a claim to bind before proceeding anyway.
    #[ortho_config(default = 60)]
    pub claim_bind_timeout_secs: u64,
    /// Seconds to wait for an access pod to reach `Running`.
    #[ortho_config(default = 120)]
    pub pod_ready_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to lhc.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl Default for LhcConfig {
    fn default() -> Self {
        Self {
            kubectl_bin: String::from("kubectl"),
            kubeconfig: None,
            default_namespace: String::from("default"),
            default_storage_class: String::from("longhorn"),
            longhorn_namespace: String::from("longhorn-system"),
            access_image: String::from("busybox:latest"),
            poll_interval_secs: 1,
            claim_bind_timeout_secs: 60,
            pod_ready_timeout_secs: 120,
        }
    }
}

impl LhcConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("lhc")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is blank
    /// or a timing value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.kubectl_bin,
                FieldMetadata::new("kubectl binary", "LHC_KUBECTL_BIN", "kubectl_bin"),
            ),
            (
                &self.default_namespace,
                FieldMetadata::new(
                    "default namespace",
                    "LHC_DEFAULT_NAMESPACE",
                    "default_namespace",
                ),
            ),
            (
                &self.default_storage_class,
                FieldMetadata::new(
                    "default storage class",
                    "LHC_DEFAULT_STORAGE_CLASS",
                    "default_storage_class",
                ),
            ),
            (
                &self.longhorn_namespace,
                FieldMetadata::new(
                    "Longhorn namespace",
                    "LHC_LONGHORN_NAMESPACE",
                    "longhorn_namespace",
                ),
            ),
            (
                &self.access_image,
                FieldMetadata::new("access pod image", "LHC_ACCESS_IMAGE", "access_image"),
            ),
        ];
        for (value, metadata) in &required {
            if value.trim().is_empty() {
                return Err(metadata.missing());
            }
        }

        if self
            .kubeconfig
            .as_deref()
            .is_some_and(|path| path.trim().is_empty())
        {
            return Err(FieldMetadata::new("kubeconfig path", "LHC_KUBECONFIG", "kubeconfig").missing());
        }

        if self.poll_interval_secs == 0 {
            return Err(FieldMetadata::new(
                "non-zero poll interval",
                "LHC_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            )
            .missing());
        }
        Ok(())
    }

    /// Wait applied while a fresh claim binds.
    #[must_use]
    pub const fn claim_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.claim_bind_timeout_secs),
        )
    }

    /// Wait applied while an access pod starts.
    #[must_use]
    pub const fn pod_wait(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.pod_ready_timeout_secs),
        )
    }
}

/// How `kubectl` authenticates against the cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClusterCredentials {
    /// Use the pod's service account.
    InCluster,
    /// Use the given kubeconfig file.
    Kubeconfig(Utf8PathBuf),
}

impl ClusterCredentials {
    /// Detects credentials from the process environment.
    ///
    /// A process running inside a pod uses its service account; otherwise the
    /// configured kubeconfig, then `KUBECONFIG`, then `~/.kube/config`.
    #[must_use]
    pub fn detect(config: &LhcConfig) -> Self {
        let in_cluster = std::env::var_os(IN_CLUSTER_HOST_ENV).is_some()
            && Path::new(SERVICE_ACCOUNT_TOKEN).is_file();
        let from_env = std::env::var(KUBECONFIG_ENV).ok();
        Self::select(in_cluster, config.kubeconfig.as_deref(), from_env.as_deref())
    }

    /// Chooses credentials from already-gathered inputs.
    #[must_use]
    pub fn select(in_cluster: bool, configured: Option<&str>, from_env: Option<&str>) -> Self {
        if in_cluster {
            return Self::InCluster;
        }
        let chosen = configured
            .or(from_env)
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_KUBECONFIG);
        Self::Kubeconfig(Utf8PathBuf::from(expand_tilde(chosen)))
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If `HOME` is not set the input is returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("invalid configuration: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
