//! Assertions over stage results.

use crate::core::{StageResult, StepStatus};

/// Asserts the stage succeeded with every step in its success variant.
///
/// # Panics
///
/// Panics if any step did not succeed.
pub fn assert_stage_succeeded(result: &StageResult) {
    assert!(
        result.is_success(),
        "expected stage {} to succeed, got {} ({:?})",
        result.kind,
        result.status,
        result.error
    );
    for step in &result.steps {
        assert_eq!(
            step.status,
            result.kind.success_status(),
            "step '{}' did not succeed",
            step.id
        );
    }
}

/// Asserts the stage stopped at `step_id`: earlier steps succeeded, the
/// step failed and every later step is still pending.
///
/// # Panics
///
/// Panics if the result does not match.
pub fn assert_stage_failed_at(result: &StageResult, step_id: &str) {
    assert!(result.is_failure(), "expected stage {} to fail", result.kind);
    let index = result
        .steps
        .iter()
        .position(|s| s.id == step_id)
        .unwrap_or_else(|| panic!("no step '{step_id}' in result"));

    for step in &result.steps[..index] {
        assert!(step.status.is_success(), "step '{}' before failure did not succeed", step.id);
    }
    assert_eq!(result.steps[index].status, StepStatus::Failed, "step '{step_id}' did not fail");
    for step in &result.steps[index + 1..] {
        assert!(step.is_pending(), "step '{}' after failure is not pending", step.id);
    }
    assert_eq!(
        result.error, result.steps[index].error,
        "stage error does not match the failing step"
    );
}
