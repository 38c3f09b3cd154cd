use serde::{Deserialize, Serialize};

use crate::domain::step::{ApprovalStep, StepStatus};

/// Aggregate status of a request, derived from its full ordered step list.
/// This is a read-time projection; it is never persisted, so it cannot drift
/// out of sync with the steps it summarizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestProjection {
    /// No steps exist yet: the request has not entered the approval workflow.
    /// Distinct from `Approved` so a zero-step request can never pass.
    NotStarted,
    /// At least one step is still pending and nothing is rejected.
    /// `current_step` is the lowest-numbered pending position.
    Pending { current_step: u32 },
    Approved,
    Rejected,
}

/// Reduce a step list into its aggregate status.
///
/// A single rejection blocks the whole request regardless of position; the
/// request is approved only when every step is approved or skipped. Input
/// order does not matter.
pub fn project_status(steps: &[ApprovalStep]) -> RequestProjection {
    if steps.is_empty() {
        return RequestProjection::NotStarted;
    }

    if steps.iter().any(|step| step.status == StepStatus::Rejected) {
        return RequestProjection::Rejected;
    }

    let lowest_pending = steps
        .iter()
        .filter(|step| step.status == StepStatus::Pending)
        .map(|step| step.position)
        .min();

    match lowest_pending {
        Some(current_step) => RequestProjection::Pending { current_step },
        None => RequestProjection::Approved,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceViolation {
    DuplicatePosition { position: u32 },
    GapAtPosition { expected: u32, found: u32 },
    DoesNotStartAtOne { first: u32 },
}

/// Report malformed step sequences (duplicates, gaps, wrong starting
/// position). The projector never repairs data; creation-time logic is
/// expected to prevent these, and the read path surfaces them for diagnosis.
pub fn sequence_violations(steps: &[ApprovalStep]) -> Vec<SequenceViolation> {
    let mut positions: Vec<u32> = steps.iter().map(|step| step.position).collect();
    positions.sort_unstable();

    let mut violations = Vec::new();
    let Some(&first) = positions.first() else {
        return violations;
    };

    if first != 1 {
        violations.push(SequenceViolation::DoesNotStartAtOne { first });
    }

    for pair in positions.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        if current == previous {
            violations.push(SequenceViolation::DuplicatePosition { position: current });
        } else if current != previous + 1 {
            violations.push(SequenceViolation::GapAtPosition {
                expected: previous + 1,
                found: current,
            });
        }
    }

    violations
}
