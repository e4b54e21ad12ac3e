//! Console rendering helpers.

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::access::VolumeAccess;
use crate::cluster::Volume;

#[derive(Tabled)]
struct VolumeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "SIZE")]
    size: String,
    #[tabled(rename = "PV_BOUND")]
    bound: &'static str,
}

/// Renders the Longhorn volume inventory as an aligned table.
#[must_use]
pub fn render_volume_table(volumes: &[Volume]) -> String {
    let rows = volumes.iter().map(|volume| VolumeRow {
        name: volume.name.clone(),
        status: volume.state.to_string(),
        size: volume.size_label().to_owned(),
        bound: if volume.is_bound() { "Yes" } else { "No" },
    });
    let mut table = Table::new(rows);
    table.with(Style::blank());
    table.to_string()
}

/// Renders the handle block printed before a single-volume operation.
#[must_use]
pub fn render_access_summary(volume: &str, access: &VolumeAccess) -> String {
    let handle = access.handle();
    format!(
        "Volume: {volume}\nAccess: {}\nPod: {}\nContainer: {}\nMount Path: {}\n",
        access.strategy(),
        handle.target.pod,
        handle.target.container,
        handle.mount_path
    )
}
