//! BDD scenarios for the janitor sweep.

use rstest_bdd_macros::scenario;

use super::test_helpers::{JanitorContext, janitor_context};

#[scenario(
    path = "tests/features/janitor.feature",
    name = "Delete labelled resources after confirmation"
)]
fn scenario_delete_after_confirmation(janitor_context: JanitorContext) {
    let _ = janitor_context;
}

#[scenario(
    path = "tests/features/janitor.feature",
    name = "Keep everything when the operator declines"
)]
fn scenario_keep_when_declined(janitor_context: JanitorContext) {
    let _ = janitor_context;
}

#[scenario(
    path = "tests/features/janitor.feature",
    name = "Skip the prompt when nothing is labelled"
)]
fn scenario_skip_prompt_when_empty(janitor_context: JanitorContext) {
    let _ = janitor_context;
}
