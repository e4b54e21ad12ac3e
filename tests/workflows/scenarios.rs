//! BDD scenarios for the end-to-end workflows.

use rstest_bdd_macros::scenario;

use super::test_helpers::{WorkflowContext, workflow_context};

#[scenario(
    path = "tests/features/workflows.feature",
    name = "List the contents of an idle volume"
)]
fn scenario_contents(workflow_context: WorkflowContext) {
    let _ = workflow_context;
}

#[scenario(
    path = "tests/features/workflows.feature",
    name = "Replace one volume's contents with another's"
)]
fn scenario_copy(workflow_context: WorkflowContext) {
    let _ = workflow_context;
}

#[scenario(
    path = "tests/features/workflows.feature",
    name = "Reject copying a volume onto itself"
)]
fn scenario_copy_onto_itself(workflow_context: WorkflowContext) {
    let _ = workflow_context;
}
