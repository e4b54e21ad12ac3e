//! Unit tests for the janitor module.

use super::*;
use crate::cluster::{ObjectMeta, PhaseStatus};
use crate::naming::ephemeral_labels;
use crate::test_support::{InMemoryCluster, ScriptedConfirm};
use tokio_util::sync::CancellationToken;
use rstest::{fixture, rstest};

fn labelled_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta::new(name, Some("default"), ephemeral_labels()),
        status: Some(PhaseStatus::with_phase("Running")),
        ..Pod::default()
    }
}

fn labelled_claim(name: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta::new(name, Some("default"), ephemeral_labels()),
        status: Some(PhaseStatus::with_phase("Bound")),
        ..PersistentVolumeClaim::default()
    }
}

fn labelled_volume(name: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: ObjectMeta::new(name, None, ephemeral_labels()),
        ..PersistentVolume::default()
    }
}

#[fixture]
fn cluster() -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    cluster.insert(&labelled_pod("lhc-temp-pod-vol"));
    cluster.insert(&labelled_claim("lhc-temp-pvc-vol"));
    cluster.insert(&labelled_volume("lhc-temp-pv-vol"));
    cluster.insert(&Pod {
        metadata: ObjectMeta::new("postgres-0", Some("default"), Default::default()),
        ..Pod::default()
    });
    cluster
}

#[rstest]
#[case("y", true)]
#[case("Y\n", true)]
#[case("yes", false)]
#[case("", false)]
#[case("n", false)]
fn only_y_confirms(#[case] answer: &str, #[case] expected: bool) {
    assert_eq!(is_affirmative(answer), expected);
}

#[rstest]
#[tokio::test]
async fn confirmed_sweep_deletes_only_labelled_objects(cluster: InMemoryCluster) {
    let confirm = ScriptedConfirm::accepting();
    let janitor = Janitor::new(cluster.clone(), confirm.clone());
    let mut out = Vec::new();

    let summary = janitor
        .sweep("default", &mut out)
        .await
        .expect("sweep should succeed");

    assert_eq!(
        summary,
        SweepSummary {
            found: 3,
            deleted: 3,
            failed: 0,
            confirmed: true,
        }
    );
    assert_eq!(confirm.times_asked(), 1);
    assert_eq!(cluster.names::<Pod>(), vec![String::from("postgres-0")]);
    assert!(cluster.names::<PersistentVolume>().is_empty());

    let rendered = String::from_utf8(out).expect("utf8");
    assert!(rendered.contains("Found 3 temporary resources:"));
    assert!(rendered.contains("  - lhc-temp-pod-vol (Status: Running)"));
    assert!(rendered.contains("  - lhc-temp-pv-vol (Status: Unknown)"));
    assert!(rendered.contains("Cleanup completed."));
}

#[rstest]
#[tokio::test]
async fn deletes_pods_before_claims_before_volumes(cluster: InMemoryCluster) {
    let janitor = Janitor::new(cluster.clone(), ScriptedConfirm::accepting());

    janitor
        .sweep("default", &mut Vec::new())
        .await
        .expect("sweep should succeed");

    let deleted: Vec<String> = cluster
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            crate::test_support::ClusterCall::Delete { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        deleted,
        vec!["Pod", "PersistentVolumeClaim", "PersistentVolume"]
    );
}

#[rstest]
#[tokio::test]
async fn empty_namespace_skips_the_prompt() {
    let confirm = ScriptedConfirm::accepting();
    let janitor = Janitor::new(InMemoryCluster::new(), confirm.clone());
    let mut out = Vec::new();

    let summary = janitor
        .sweep("default", &mut out)
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.found, 0);
    assert_eq!(confirm.times_asked(), 0);
    assert!(
        String::from_utf8_lossy(&out).contains("No temporary resources found."),
        "output: {}",
        String::from_utf8_lossy(&out)
    );
}

#[rstest]
#[tokio::test]
async fn declined_sweep_deletes_nothing(cluster: InMemoryCluster) {
    let janitor = Janitor::new(cluster.clone(), ScriptedConfirm::declining());
    let mut out = Vec::new();

    let summary = janitor
        .sweep("default", &mut out)
        .await
        .expect("declining is not an error");

    assert!(!summary.confirmed);
    assert_eq!(summary.deleted, 0);
    assert_eq!(cluster.names::<Pod>().len(), 2);
    assert!(String::from_utf8_lossy(&out).contains("Cleanup cancelled."));
}

#[rstest]
#[tokio::test]
async fn delete_failures_are_counted_not_fatal(cluster: InMemoryCluster) {
    cluster.fail_delete("lhc-temp-pvc-vol");
    let janitor = Janitor::new(cluster.clone(), ScriptedConfirm::accepting());

    let summary = janitor
        .sweep("default", &mut Vec::new())
        .await
        .expect("sweep should continue past failures");

    assert_eq!(summary.deleted, 2);
    assert_eq!(summary.failed, 1);
    assert!(cluster.contains::<PersistentVolumeClaim>(Some("default"), "lhc-temp-pvc-vol"));
    assert!(!cluster.contains::<PersistentVolume>(None, "lhc-temp-pv-vol"));
}

#[rstest]
#[tokio::test]
async fn listing_failures_abort_before_prompting(cluster: InMemoryCluster) {
    cluster.fail_list::<PersistentVolumeClaim>();
    let confirm = ScriptedConfirm::accepting();
    let janitor = Janitor::new(cluster, confirm.clone());

    let err = janitor
        .sweep("default", &mut Vec::new())
        .await
        .expect_err("listing failure should surface");

    assert!(matches!(err, JanitorError::ListFailed { ref kind, .. } if kind == "persistentvolumeclaims"));
    assert_eq!(confirm.times_asked(), 0);
}

#[rstest]
#[tokio::test]
async fn removing_a_set_tolerates_missing_objects() {
    let cluster = InMemoryCluster::new();
    cluster.insert(&labelled_pod("lhc-temp-pod-vol"));
    let names = EphemeralNames::for_volume("vol");

    let failures = remove_ephemeral_set(&cluster, &names, "default").await;

    assert_eq!(failures, 0);
    assert!(cluster.names::<Pod>().is_empty());
}

#[rstest]
#[tokio::test]
async fn interrupted_prompt_declines_the_sweep(cluster: InMemoryCluster) {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let janitor = Janitor::new(cluster.clone(), StdinConfirm::new(cancel));
    let mut out = Vec::new();

    let summary = janitor
        .sweep("default", &mut out)
        .await
        .expect("an interrupted prompt is a refusal, not an error");

    assert!(!summary.confirmed);
    assert_eq!(summary.deleted, 0);
    assert!(String::from_utf8_lossy(&out).ends_with("Cleanup cancelled.\n"));
    assert!(cluster.contains::<Pod>(Some("default"), "lhc-temp-pod-vol"));
}
