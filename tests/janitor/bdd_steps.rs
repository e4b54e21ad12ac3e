//! BDD step definitions for janitor behaviour.

use lhc::cluster::{PersistentVolume, PersistentVolumeClaim, Pod};
use lhc::janitor::{Janitor, is_affirmative};
use lhc::naming::EphemeralNames;
use lhc::test_support::ScriptedConfirm;
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{JanitorContext, SweepOutcome, seed_access_set, seed_workload_pod};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a namespace \"{namespace}\" holding the temporary access set for volume \"{volume}\"")]
fn namespace_with_access_set(
    janitor_context: JanitorContext,
    namespace: String,
    volume: String,
) -> JanitorContext {
    seed_access_set(&janitor_context.cluster, &namespace, &volume);
    janitor_context
}

#[given("an unrelated workload pod \"{pod}\" in namespace \"{namespace}\"")]
fn unrelated_workload(janitor_context: JanitorContext, pod: String, namespace: String) -> JanitorContext {
    seed_workload_pod(&janitor_context.cluster, &namespace, &pod);
    janitor_context
}

#[given("the operator answers \"{answer}\"")]
fn operator_answers(mut janitor_context: JanitorContext, answer: String) -> JanitorContext {
    janitor_context.confirm = if is_affirmative(&answer) {
        ScriptedConfirm::accepting()
    } else {
        ScriptedConfirm::declining()
    };
    janitor_context
}

#[when("I run the cleanup sweep in namespace \"{namespace}\"")]
fn run_sweep(mut janitor_context: JanitorContext, namespace: String) -> JanitorContext {
    let runtime = Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"));
    let janitor = Janitor::new(
        janitor_context.cluster.clone(),
        janitor_context.confirm.clone(),
    );
    let mut output = Vec::new();
    let result = runtime.block_on(janitor.sweep(&namespace, &mut output));
    janitor_context.output = String::from_utf8_lossy(&output).into_owned();
    janitor_context.outcome = Some(match result {
        Ok(summary) => SweepOutcome::Success(summary),
        Err(err) => SweepOutcome::Failure(err.to_string()),
    });
    janitor_context
}

#[then("the sweep reports {count:usize} deleted objects")]
fn reports_deleted(janitor_context: &JanitorContext, count: usize) -> Result<(), StepError> {
    match janitor_context.outcome.as_ref() {
        Some(SweepOutcome::Success(summary)) if summary.deleted == count => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {count} deletions, got {other:?}"
        ))),
    }
}

#[then("only the pod \"{pod}\" remains")]
fn only_pod_remains(janitor_context: &JanitorContext, pod: String) -> Result<(), StepError> {
    let cluster = &janitor_context.cluster;
    let pods = cluster.names::<Pod>();
    let leftovers = cluster.names::<PersistentVolumeClaim>().len()
        + cluster.names::<PersistentVolume>().len();
    if pods == vec![pod.clone()] && leftovers == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only {pod}, found pods {pods:?} and {leftovers} other objects"
        )))
    }
}

#[then("the temporary access set for volume \"{volume}\" still exists")]
fn access_set_exists(janitor_context: &JanitorContext, volume: String) -> Result<(), StepError> {
    let names = EphemeralNames::for_volume(&volume);
    let cluster = &janitor_context.cluster;
    let present = cluster.contains::<Pod>(Some("default"), &names.pod)
        && cluster.contains::<PersistentVolumeClaim>(Some("default"), &names.claim)
        && cluster.contains::<PersistentVolume>(None, &names.persistent_volume);
    if present {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "access set for {volume} was deleted"
        )))
    }
}

#[then("the output contains \"{text}\"")]
fn output_contains(janitor_context: &JanitorContext, text: String) -> Result<(), StepError> {
    if janitor_context.output.contains(&text) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {text:?} in output: {}",
            janitor_context.output
        )))
    }
}

#[then("the operator is never asked")]
fn never_asked(janitor_context: &JanitorContext) -> Result<(), StepError> {
    match janitor_context.confirm.times_asked() {
        0 => Ok(()),
        asked => Err(StepError::Assertion(format!("operator was asked {asked} times"))),
    }
}
