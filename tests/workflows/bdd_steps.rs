//! BDD step definitions for the end-to-end workflows.

use lhc::cluster::{PersistentVolume, PersistentVolumeClaim, Pod};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{NAMESPACE, WorkflowContext, access_pod, request};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a Longhorn volume \"{volume}\" holding {count:usize} files")]
fn volume_with_files(workflow_context: WorkflowContext, volume: String, count: usize) -> WorkflowContext {
    workflow_context
        .cluster
        .add_volume(&volume, Some("1073741824"), None);
    let files: Vec<(String, String)> = (1..=count)
        .map(|index| (format!("{volume}/file-{index}.txt"), format!("{volume} #{index}")))
        .collect();
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(path, body)| (path.as_str(), body.as_str()))
        .collect();
    workflow_context.exec.seed(&access_pod(&volume), &borrowed);
    workflow_context
}

#[when("I list the contents of \"{volume}\"")]
fn list_contents(mut workflow_context: WorkflowContext, volume: String) -> WorkflowContext {
    let runtime = Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"));
    let operations = workflow_context.operations();
    let mut output = Vec::new();
    let result = runtime.block_on(operations.contents(&request(&volume), &mut output));
    workflow_context.output = String::from_utf8_lossy(&output).into_owned();
    workflow_context.outcome = Some(result.map(|_| ()).map_err(|err| err.to_string()));
    workflow_context
}

#[when("I copy \"{source}\" to \"{destination}\"")]
fn copy_volume(
    mut workflow_context: WorkflowContext,
    source: String,
    destination: String,
) -> WorkflowContext {
    let runtime = Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"));
    let operations = workflow_context.operations();
    let mut output = Vec::new();
    let result = runtime.block_on(operations.copy(
        &request(&source),
        &request(&destination),
        &mut output,
    ));
    workflow_context.output = String::from_utf8_lossy(&output).into_owned();
    workflow_context.outcome = Some(result.map_err(|err| err.to_string()));
    workflow_context
}

#[then("the listing shows {count:usize} files")]
fn listing_shows(workflow_context: &WorkflowContext, count: usize) -> Result<(), StepError> {
    let listed = workflow_context
        .output
        .lines()
        .filter(|line| line.starts_with("-rw"))
        .count();
    if listed == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} files, listing was:\n{}",
            workflow_context.output
        )))
    }
}

#[then("the temporary pod for \"{volume}\" is still running")]
fn pod_still_running(workflow_context: &WorkflowContext, volume: String) -> Result<(), StepError> {
    let pod = workflow_context
        .cluster
        .object::<Pod>(Some(NAMESPACE), &access_pod(&volume));
    match pod {
        Some(pod) if pod.is_running() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a running access pod, found {other:?}"
        ))),
    }
}

#[then("the workflow succeeds")]
fn workflow_succeeds(workflow_context: &WorkflowContext) -> Result<(), StepError> {
    match &workflow_context.outcome {
        Some(Ok(())) => Ok(()),
        other => Err(StepError::Assertion(format!("expected success, got {other:?}"))),
    }
}

#[then("the workflow fails with \"{text}\"")]
fn workflow_fails(workflow_context: &WorkflowContext, text: String) -> Result<(), StepError> {
    match &workflow_context.outcome {
        Some(Err(message)) if message.contains(&text) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure mentioning {text:?}, got {other:?}"
        ))),
    }
}

#[then("\"{destination}\" holds exactly the files of \"{source}\"")]
fn holds_same_files(
    workflow_context: &WorkflowContext,
    destination: String,
    source: String,
) -> Result<(), StepError> {
    let copied = workflow_context.exec.files(&access_pod(&destination));
    let original = workflow_context.exec.files(&access_pod(&source));
    if copied == original {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "destination {copied:?} differs from source {original:?}"
        )))
    }
}

#[then("no temporary resources remain")]
fn nothing_remains(workflow_context: &WorkflowContext) -> Result<(), StepError> {
    let cluster = &workflow_context.cluster;
    let remaining = cluster.names::<Pod>().len()
        + cluster.names::<PersistentVolumeClaim>().len()
        + cluster.names::<PersistentVolume>().len();
    if remaining == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "{remaining} temporary objects remain"
        )))
    }
}
