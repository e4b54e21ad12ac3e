//! Shared fixtures and helpers for janitor BDD scenarios.

use std::collections::BTreeMap;

use lhc::cluster::{
    ObjectMeta, POD_RUNNING, PersistentVolume, PersistentVolumeClaim, PhaseStatus, Pod,
};
use lhc::janitor::SweepSummary;
use lhc::naming::{EphemeralNames, ephemeral_labels};
use lhc::test_support::{InMemoryCluster, ScriptedConfirm};
use rstest::fixture;

#[derive(Clone, Debug)]
pub enum SweepOutcome {
    Success(SweepSummary),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct JanitorContext {
    pub cluster: InMemoryCluster,
    pub confirm: ScriptedConfirm,
    pub output: String,
    pub outcome: Option<SweepOutcome>,
}

#[fixture]
pub fn janitor_context() -> JanitorContext {
    JanitorContext {
        cluster: InMemoryCluster::new(),
        confirm: ScriptedConfirm::declining(),
        output: String::new(),
        outcome: None,
    }
}

pub fn seed_access_set(cluster: &InMemoryCluster, namespace: &str, volume: &str) {
    let names = EphemeralNames::for_volume(volume);
    cluster.insert(&PersistentVolume {
        metadata: ObjectMeta::new(&names.persistent_volume, None, ephemeral_labels()),
        ..PersistentVolume::default()
    });
    cluster.insert(&PersistentVolumeClaim {
        metadata: ObjectMeta::new(&names.claim, Some(namespace), ephemeral_labels()),
        ..PersistentVolumeClaim::default()
    });
    cluster.insert(&Pod {
        metadata: ObjectMeta::new(&names.pod, Some(namespace), ephemeral_labels()),
        status: Some(PhaseStatus::with_phase(POD_RUNNING)),
        ..Pod::default()
    });
}

pub fn seed_workload_pod(cluster: &InMemoryCluster, namespace: &str, pod: &str) {
    cluster.insert(&Pod {
        metadata: ObjectMeta::new(pod, Some(namespace), BTreeMap::new()),
        status: Some(PhaseStatus::with_phase(POD_RUNNING)),
        ..Pod::default()
    });
}
