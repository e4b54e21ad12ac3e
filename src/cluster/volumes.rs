//! Longhorn volume records as reported by the storage system.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use super::ClusterError;

/// Lifecycle state reported by Longhorn for a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VolumeState {
    /// Volume is being created.
    Creating,
    /// Volume is attached to a node.
    Attached,
    /// Volume is not attached anywhere.
    Detached,
    /// Volume is being attached.
    Attaching,
    /// Volume is being detached.
    Detaching,
    /// Volume is being deleted.
    Deleting,
    /// A state this tool does not recognise.
    Other(String),
    /// Longhorn did not report a state.
    Unknown,
}

impl VolumeState {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Unknown,
            Some("creating") => Self::Creating,
            Some("attached") => Self::Attached,
            Some("detached") => Self::Detached,
            Some("attaching") => Self::Attaching,
            Some("detaching") => Self::Detaching,
            Some("deleting") => Self::Deleting,
            Some(other) => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Creating => "creating",
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Attaching => "attaching",
            Self::Detaching => "detaching",
            Self::Deleting => "deleting",
            Self::Other(state) => state.as_str(),
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// A Longhorn volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Volume {
    /// Volume name, which doubles as the CSI volume handle.
    pub name: String,
    /// Size as reported by Longhorn (a byte count rendered as a string).
    pub size: Option<String>,
    /// Reported lifecycle state.
    pub state: VolumeState,
    /// Persistent volume currently bound to this volume, if any.
    pub pv_name: Option<String>,
}

impl Volume {
    /// Returns `true` when Kubernetes has a persistent volume for this volume.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.pv_name.is_some()
    }

    /// Size label for display, `Unknown` when absent.
    #[must_use]
    pub fn size_label(&self) -> &str {
        self.size.as_deref().unwrap_or("Unknown")
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawVolumeList {
    #[serde(default)]
    items: Vec<RawVolume>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVolume {
    #[serde(default)]
    metadata: RawMetadata,
    #[serde(default)]
    spec: RawVolumeSpec,
    #[serde(default)]
    status: RawVolumeStatus,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawVolumeSpec {
    #[serde(default)]
    size: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVolumeStatus {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    kubernetes_status: RawKubernetesStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKubernetesStatus {
    #[serde(default)]
    pv_name: Option<String>,
}

fn size_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl From<RawVolume> for Volume {
    fn from(raw: RawVolume) -> Self {
        Self {
            name: raw.metadata.name,
            size: size_text(raw.spec.size),
            state: VolumeState::parse(raw.status.state.as_deref()),
            pv_name: raw
                .status
                .kubernetes_status
                .pv_name
                .filter(|name| !name.trim().is_empty()),
        }
    }
}

/// Parses the JSON list of `volumes.longhorn.io` objects.
///
/// Missing fields degrade to `None`/[`VolumeState::Unknown`] rather than
/// failing, and entries without a name are skipped.
///
/// # Errors
///
/// Returns [`ClusterError::Parse`] when the payload is not a JSON object list.
pub fn parse_volume_list(json: &str) -> Result<Vec<Volume>, ClusterError> {
    let list: RawVolumeList = serde_json::from_str(json).map_err(|err| ClusterError::Parse {
        resource: String::from("volumes.longhorn.io"),
        message: err.to_string(),
    })?;
    Ok(list
        .items
        .into_iter()
        .map(Volume::from)
        .filter(|volume| !volume.name.is_empty())
        .collect())
}
