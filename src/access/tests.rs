//! Unit tests for access resolution and provisioning.

use std::time::Duration;

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::cluster::{
    ObjectMeta, POD_FAILED, PersistentVolume, PersistentVolumeClaim, PhaseStatus, Pod, Resource,
};
use crate::naming::{ACCESS_CONTAINER, ACCESS_MOUNT_PATH, ephemeral_labels};
use crate::test_support::InMemoryCluster;

fn request(volume: &str) -> AccessRequest {
    AccessRequest::new(volume, "default", "longhorn")
}

fn resolver(cluster: &InMemoryCluster) -> Resolver<InMemoryCluster> {
    Resolver::new(Provisioner::new(cluster.clone(), CancellationToken::new()))
}

fn short_waits(cluster: &InMemoryCluster, cancel: CancellationToken) -> Resolver<InMemoryCluster> {
    let second = Duration::from_secs(1);
    Resolver::new(
        Provisioner::new(cluster.clone(), cancel)
            .with_waits(WaitPolicy::polls(second, 3), WaitPolicy::polls(second, 5)),
    )
}

#[fixture]
fn idle_cluster() -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    cluster.add_volume("pvc-12345", Some("1073741824"), None);
    cluster
}

#[rstest]
#[tokio::test]
async fn idle_volume_gets_a_direct_access_set(idle_cluster: InMemoryCluster) {
    let access = resolver(&idle_cluster)
        .resolve(&request("pvc-12345"))
        .await
        .expect("resolve should succeed");

    let names = EphemeralNames::for_volume("pvc-12345");
    assert_eq!(access.strategy(), "direct");
    assert_eq!(access.ephemeral_names(), Some(&names));
    assert_eq!(access.handle().target.pod, names.pod);
    assert_eq!(access.handle().target.container, ACCESS_CONTAINER);
    assert_eq!(access.handle().mount_path, ACCESS_MOUNT_PATH);

    let pv = idle_cluster
        .object::<PersistentVolume>(None, &names.persistent_volume)
        .expect("persistent volume should exist");
    let csi = pv.spec.csi.expect("csi source");
    assert_eq!(csi.volume_handle, "pvc-12345");
    assert_eq!(
        csi.volume_attributes.get("numberOfReplicas").map(String::as_str),
        Some("3")
    );
    assert_eq!(pv.spec.persistent_volume_reclaim_policy.as_deref(), Some("Retain"));
    assert_eq!(pv.metadata.labels, ephemeral_labels());

    let claim = idle_cluster
        .object::<PersistentVolumeClaim>(Some("default"), &names.claim)
        .expect("claim should exist");
    assert_eq!(claim.spec.volume_name.as_deref(), Some(names.persistent_volume.as_str()));
}

#[rstest]
#[tokio::test]
async fn provisioning_twice_creates_nothing_new(idle_cluster: InMemoryCluster) {
    let resolver = resolver(&idle_cluster);

    let first = resolver.resolve(&request("pvc-12345")).await.expect("first");
    let creates_after_first = idle_cluster.create_count();
    let second = resolver.resolve(&request("pvc-12345")).await.expect("second");

    assert_eq!(creates_after_first, 3);
    assert_eq!(idle_cluster.create_count(), 3);
    assert_eq!(first, second);
}

#[rstest]
#[tokio::test]
async fn bound_claim_without_running_users_is_idle() {
    let cluster = InMemoryCluster::new();
    cluster.add_volume("pvc-777", Some("1Gi"), Some("pv-777"));
    cluster.add_workload("default", "pv-777", "data-db-0", "db-0", "postgres", "/var/lib/data");
    cluster.set_phase::<Pod>(Some("default"), "db-0", "Succeeded");

    let access = resolver(&cluster)
        .resolve(&request("pvc-777"))
        .await
        .expect("resolve should succeed");

    assert!(matches!(access, VolumeAccess::DirectProvision { .. }));
    assert!(!cluster.contains::<PersistentVolume>(None, "lhc-temp-pv-lhc-temp-rwx-pvc-777"));
}

#[rstest]
#[tokio::test]
async fn mounted_volume_reuses_the_workload_pod() {
    let cluster = InMemoryCluster::new();
    cluster.add_volume("pvc-777", Some("1Gi"), Some("pv-777"));
    cluster.add_workload("default", "pv-777", "data-db-0", "db-0", "postgres", "/var/lib/data");

    let access = resolver(&cluster)
        .resolve(&request("pvc-777"))
        .await
        .expect("resolve should succeed");

    assert_eq!(
        access,
        VolumeAccess::ReuseExisting {
            handle: AccessHandle {
                target: ExecTarget::new("default", "db-0", "postgres"),
                mount_path: String::from("/var/lib/data"),
            },
        }
    );
    assert_eq!(cluster.create_count(), 0);
}

#[rstest]
#[tokio::test]
async fn busy_volume_without_a_mount_falls_back_to_reduced_redundancy() {
    let cluster = InMemoryCluster::new();
    cluster.add_volume("pvc-777", Some("1Gi"), Some("pv-777"));
    cluster.add_workload("default", "pv-777", "data-db-0", "db-0", "postgres", "/var/lib/data");
    let mut pod = cluster
        .object::<Pod>(Some("default"), "db-0")
        .expect("workload pod");
    for container in &mut pod.spec.containers {
        container.volume_mounts.clear();
    }
    cluster.insert(&pod);

    let access = resolver(&cluster)
        .resolve(&request("pvc-777"))
        .await
        .expect("resolve should succeed");

    let names = EphemeralNames::indirect_for_volume("pvc-777");
    assert_eq!(access.strategy(), "indirect");
    assert_eq!(access.ephemeral_names(), Some(&names));
    let pv = cluster
        .object::<PersistentVolume>(None, &names.persistent_volume)
        .expect("stand-in persistent volume");
    let csi = pv.spec.csi.expect("csi source");
    assert_eq!(
        csi.volume_attributes.get("numberOfReplicas").map(String::as_str),
        Some("1")
    );
    assert_eq!(pv.spec.persistent_volume_reclaim_policy.as_deref(), Some("Delete"));
}

#[rstest]
#[tokio::test]
async fn failed_fallback_reports_no_access_path() {
    let cluster = InMemoryCluster::new();
    cluster.add_volume("pvc-777", Some("1Gi"), Some("pv-777"));
    cluster.add_workload("default", "pv-777", "data-db-0", "db-0", "postgres", "/var/lib/data");
    let mut pod = cluster
        .object::<Pod>(Some("default"), "db-0")
        .expect("workload pod");
    pod.spec.containers.clear();
    cluster.insert(&pod);
    let names = EphemeralNames::indirect_for_volume("pvc-777");
    cluster.fail_create(&names.persistent_volume);

    let err = resolver(&cluster)
        .resolve(&request("pvc-777"))
        .await
        .expect_err("fallback should fail");

    let AccessError::NoAccessPath { volume, source } = err else {
        panic!("expected NoAccessPath, got {err:?}");
    };
    assert_eq!(volume, "pvc-777");
    assert!(matches!(*source, AccessError::ProvisionFailed { .. }));
}

#[rstest]
#[tokio::test]
async fn unknown_volume_is_not_found(idle_cluster: InMemoryCluster) {
    let err = resolver(&idle_cluster)
        .resolve(&request("pvc-missing"))
        .await
        .expect_err("missing volume");

    assert!(matches!(err, AccessError::NotFound { ref volume } if volume == "pvc-missing"));
    assert_eq!(idle_cluster.create_count(), 0);
}

#[rstest]
#[tokio::test]
async fn volume_listing_failure_is_reported(idle_cluster: InMemoryCluster) {
    idle_cluster.fail_volume_listing();

    let err = resolver(&idle_cluster)
        .resolve(&request("pvc-12345"))
        .await
        .expect_err("listing should fail");

    assert!(matches!(err, AccessError::ListFailed { .. }));
}

#[rstest]
#[tokio::test]
async fn unknown_size_cannot_be_provisioned() {
    let cluster = InMemoryCluster::new();
    cluster.add_volume("pvc-nosize", None, None);

    let err = resolver(&cluster)
        .resolve(&request("pvc-nosize"))
        .await
        .expect_err("size is required");

    assert!(err.to_string().contains("volume size is unknown"));
}

#[rstest]
#[tokio::test]
async fn existence_check_failure_is_not_treated_as_absence(idle_cluster: InMemoryCluster) {
    let names = EphemeralNames::for_volume("pvc-12345");
    idle_cluster.fail_get(&names.claim);

    let err = resolver(&idle_cluster)
        .resolve(&request("pvc-12345"))
        .await
        .expect_err("get failure should surface");

    assert!(matches!(err, AccessError::GetFailed { ref kind, .. } if kind == PersistentVolumeClaim::KIND));
    assert!(!idle_cluster.contains::<PersistentVolumeClaim>(Some("default"), &names.claim));
}

#[rstest]
#[tokio::test]
async fn concurrent_create_is_reused(idle_cluster: InMemoryCluster) {
    let names = EphemeralNames::for_volume("pvc-12345");
    idle_cluster.race_on_create(&names.pod);

    let access = resolver(&idle_cluster)
        .resolve(&request("pvc-12345"))
        .await
        .expect("race should be absorbed");

    assert_eq!(access.handle().target.pod, names.pod);
    assert_eq!(idle_cluster.names::<Pod>(), vec![names.pod]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_pod_start_is_awaited() {
    let cluster = InMemoryCluster::new().with_pod_start_polls(2);
    cluster.add_volume("pvc-12345", Some("1Gi"), None);

    let access = short_waits(&cluster, CancellationToken::new())
        .resolve(&request("pvc-12345"))
        .await
        .expect("pod should start within the wait");

    assert_eq!(access.strategy(), "direct");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unbound_claim_does_not_block_a_running_pod() {
    let cluster = InMemoryCluster::new().with_manual_readiness();
    cluster.add_volume("pvc-12345", Some("1Gi"), None);
    let names = EphemeralNames::for_volume("pvc-12345");
    cluster.insert(&Pod {
        metadata: ObjectMeta::new(&names.pod, Some("default"), ephemeral_labels()),
        status: Some(PhaseStatus::with_phase("Running")),
        ..Pod::default()
    });

    let access = short_waits(&cluster, CancellationToken::new())
        .resolve(&request("pvc-12345"))
        .await
        .expect("claim timeout should only warn");

    assert_eq!(access.handle().target.pod, names.pod);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn pod_that_never_starts_is_not_ready() {
    let cluster = InMemoryCluster::new().with_manual_readiness();
    cluster.add_volume("pvc-12345", Some("1Gi"), None);

    let err = short_waits(&cluster, CancellationToken::new())
        .resolve(&request("pvc-12345"))
        .await
        .expect_err("pod never runs");

    assert!(
        matches!(err, AccessError::ProvisionFailed { ref reason, .. } if reason == "endpoint not ready"),
        "unexpected error: {err}"
    );
}

#[rstest]
#[tokio::test]
async fn terminated_access_pod_asks_for_cleanup(idle_cluster: InMemoryCluster) {
    let names = EphemeralNames::for_volume("pvc-12345");
    idle_cluster.insert(&Pod {
        metadata: ObjectMeta::new(&names.pod, Some("default"), ephemeral_labels()),
        status: Some(PhaseStatus::with_phase(POD_FAILED)),
        ..Pod::default()
    });

    let err = resolver(&idle_cluster)
        .resolve(&request("pvc-12345"))
        .await
        .expect_err("failed pod cannot be reused");

    assert!(err.to_string().contains("lhc cleanup"), "message: {err}");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_pod_wait() {
    let cluster = InMemoryCluster::new().with_manual_readiness();
    cluster.add_volume("pvc-12345", Some("1Gi"), None);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(4500)).await;
        trigger.cancel();
    });

    let err = short_waits(&cluster, cancel)
        .resolve(&request("pvc-12345"))
        .await
        .expect_err("wait should be cancelled");

    assert!(matches!(err, AccessError::Cancelled { .. }), "unexpected error: {err}");
}

#[rstest]
fn existing_mount_requires_a_container_mount() {
    let pod = Pod {
        metadata: ObjectMeta::new("db-0", Some("default"), Default::default()),
        ..Pod::default()
    };

    assert_eq!(find_existing_mount("default", "data-db-0", &[pod]), None);
}
