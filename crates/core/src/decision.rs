use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::RequestId;
use crate::domain::step::{ApprovalStep, Approver, StepId, StepStatus};
use crate::errors::DecisionError;

/// Durable storage for approval steps, scoped to a parent request.
///
/// `persist_decision` must be atomic with respect to concurrent decisions on
/// the same step: when two callers race, at most one write wins and the loser
/// observes `AlreadyDecided`. The SQL implementation does this with a
/// conditional update keyed on `status = 'pending'`.
#[async_trait]
pub trait ApprovalStepStore: Send + Sync {
    /// All steps for a request, ordered by position ascending.
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalStep>, DecisionError>;

    /// A single step; unknown ids fail with `StepNotFound`.
    async fn fetch(&self, step_id: &StepId) -> Result<ApprovalStep, DecisionError>;

    /// Write one decision to one step and return the updated row. Fails with
    /// `AlreadyDecided` when the step is no longer pending at write time.
    async fn persist_decision(
        &self,
        step_id: &StepId,
        record: DecisionRecord,
    ) -> Result<ApprovalStep, DecisionError>;
}

/// A reviewer's verdict on one step. Skipping is not a reviewer action; it is
/// reserved for workflow tooling, so it is absent here on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl From<Verdict> for StepStatus {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Approved => StepStatus::Approved,
            Verdict::Rejected => StepStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    pub verdict: Verdict,
    pub comment: Option<String>,
    pub approver: Option<Approver>,
}

/// The fields `persist_decision` writes. `decided_at` is stamped by the
/// service, not the caller, so stored timestamps are never client-supplied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionRecord {
    pub status: StepStatus,
    pub comment: Option<String>,
    pub approver: Option<Approver>,
    pub decided_at: DateTime<Utc>,
}

/// Applies one reviewer decision to one step.
///
/// Deliberately non-idempotent: retrying a decide() that already applied is
/// rejected with `AlreadyDecided` rather than treated as a no-op, so callers
/// must re-fetch step state before retrying network-level failures. Sibling
/// steps and the parent request are never touched; aggregate status is a
/// read-time projection (see `projection::project_status`).
pub struct DecisionService<S> {
    store: S,
}

impl<S> DecisionService<S>
where
    S: ApprovalStepStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and apply a single decision. Exactly one row mutation on
    /// success; no partial writes on any failure path.
    pub async fn decide(
        &self,
        step_id: &StepId,
        input: DecisionInput,
    ) -> Result<ApprovalStep, DecisionError> {
        let step = self.store.fetch(step_id).await?;

        if step.status != StepStatus::Pending {
            return Err(DecisionError::AlreadyDecided {
                step_id: step_id.0.clone(),
                status: step.status,
            });
        }

        let record = DecisionRecord {
            status: input.verdict.into(),
            comment: input.comment,
            approver: input.approver,
            decided_at: Utc::now(),
        };

        self.store.persist_decision(step_id, record).await
    }

    /// `decide` plus an audit event for both applied and refused decisions.
    pub async fn decide_with_audit<A>(
        &self,
        step_id: &StepId,
        input: DecisionInput,
        sink: &A,
        audit: &AuditContext,
    ) -> Result<ApprovalStep, DecisionError>
    where
        A: AuditSink,
    {
        let verdict = input.verdict;
        let result = self.decide(step_id, input).await;

        match &result {
            Ok(step) => {
                sink.emit(
                    AuditEvent::new(
                        Some(step.request_id.clone()),
                        audit.correlation_id.clone(),
                        "decision.applied",
                        AuditCategory::Decision,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("step_id", step.id.0.clone())
                    .with_metadata("position", step.position.to_string())
                    .with_metadata("verdict", format!("{verdict:?}")),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.request_id.clone(),
                        audit.correlation_id.clone(),
                        "decision.refused",
                        AuditCategory::Decision,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("step_id", step_id.0.clone())
                    .with_metadata("error_class", error.class())
                    .with_metadata("error", error.to_string()),
                );
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::{ApprovalStepStore, DecisionInput, DecisionRecord, DecisionService, Verdict};
    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::request::RequestId;
    use crate::domain::step::{ApprovalStep, Approver, StepId, StepStatus};
    use crate::errors::DecisionError;

    /// Test double backed by a plain mutex map; mirrors the contract of the
    /// real stores in procura-db.
    #[derive(Default)]
    struct FakeStore {
        steps: Mutex<HashMap<String, ApprovalStep>>,
    }

    impl FakeStore {
        fn insert(&self, step: ApprovalStep) {
            self.steps.lock().expect("lock").insert(step.id.0.clone(), step);
        }

        fn get(&self, step_id: &str) -> Option<ApprovalStep> {
            self.steps.lock().expect("lock").get(step_id).cloned()
        }
    }

    #[async_trait]
    impl ApprovalStepStore for FakeStore {
        async fn list_for_request(
            &self,
            request_id: &RequestId,
        ) -> Result<Vec<ApprovalStep>, DecisionError> {
            let mut steps: Vec<ApprovalStep> = self
                .steps
                .lock()
                .expect("lock")
                .values()
                .filter(|step| step.request_id == *request_id)
                .cloned()
                .collect();
            steps.sort_by_key(|step| step.position);
            Ok(steps)
        }

        async fn fetch(&self, step_id: &StepId) -> Result<ApprovalStep, DecisionError> {
            self.get(&step_id.0)
                .ok_or_else(|| DecisionError::StepNotFound { step_id: step_id.0.clone() })
        }

        async fn persist_decision(
            &self,
            step_id: &StepId,
            record: DecisionRecord,
        ) -> Result<ApprovalStep, DecisionError> {
            let mut steps = self.steps.lock().expect("lock");
            let step = steps
                .get_mut(&step_id.0)
                .ok_or_else(|| DecisionError::StepNotFound { step_id: step_id.0.clone() })?;
            if step.status != StepStatus::Pending {
                return Err(DecisionError::AlreadyDecided {
                    step_id: step_id.0.clone(),
                    status: step.status,
                });
            }
            step.status = record.status;
            step.comment = record.comment;
            step.approver = record.approver;
            step.decided_at = Some(record.decided_at);
            Ok(step.clone())
        }
    }

    fn pending_step(id: &str, position: u32) -> ApprovalStep {
        ApprovalStep::pending(
            StepId(id.to_owned()),
            RequestId("req-1".to_owned()),
            position,
            None,
        )
    }

    fn approve_input(comment: Option<&str>) -> DecisionInput {
        DecisionInput {
            verdict: Verdict::Approved,
            comment: comment.map(str::to_owned),
            approver: Some(Approver { id: "u-9".to_owned(), name: "Grace".to_owned() }),
        }
    }

    #[tokio::test]
    async fn decide_writes_verdict_comment_and_timestamp() {
        let store = FakeStore::default();
        store.insert(pending_step("s-1", 1));
        let service = DecisionService::new(store);
        let before = Utc::now();

        let updated = service
            .decide(&StepId("s-1".to_owned()), approve_input(Some("looks good")))
            .await
            .expect("decision should apply");

        assert_eq!(updated.status, StepStatus::Approved);
        assert_eq!(updated.comment.as_deref(), Some("looks good"));
        assert_eq!(updated.approver.as_ref().map(|a| a.id.as_str()), Some("u-9"));
        assert!(updated.decided_at.expect("decided_at must be set") >= before);
    }

    #[tokio::test]
    async fn decide_unknown_step_fails_not_found_without_write() {
        let store = FakeStore::default();
        store.insert(pending_step("s-1", 1));
        let service = DecisionService::new(store);

        let error = service
            .decide(&StepId("missing".to_owned()), approve_input(None))
            .await
            .expect_err("unknown id must fail");

        assert_eq!(error, DecisionError::StepNotFound { step_id: "missing".to_owned() });
        let untouched = service.store().get("s-1").expect("step still present");
        assert_eq!(untouched.status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn decide_twice_fails_closed_the_second_time() {
        let store = FakeStore::default();
        store.insert(pending_step("s-1", 1));
        let service = DecisionService::new(store);
        let id = StepId("s-1".to_owned());

        service.decide(&id, approve_input(Some("first"))).await.expect("first decision");
        let error = service
            .decide(&id, DecisionInput { verdict: Verdict::Rejected, comment: None, approver: None })
            .await
            .expect_err("second decision must be refused");

        assert!(matches!(
            error,
            DecisionError::AlreadyDecided { ref step_id, status: StepStatus::Approved }
                if step_id == "s-1"
        ));

        // Fail closed: the refused decision left every stored field alone.
        let stored = service.store().get("s-1").expect("step present");
        assert_eq!(stored.status, StepStatus::Approved);
        assert_eq!(stored.comment.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn decide_on_skipped_step_is_refused() {
        let store = FakeStore::default();
        let mut step = pending_step("s-2", 2);
        step.status = StepStatus::Skipped;
        step.decided_at = Some(Utc::now());
        store.insert(step);
        let service = DecisionService::new(store);

        let error = service
            .decide(&StepId("s-2".to_owned()), approve_input(None))
            .await
            .expect_err("skipped step is not decidable");

        assert!(matches!(error, DecisionError::AlreadyDecided { status: StepStatus::Skipped, .. }));
    }

    #[tokio::test]
    async fn out_of_order_decisions_are_tolerated() {
        let store = FakeStore::default();
        store.insert(pending_step("s-1", 1));
        store.insert(pending_step("s-2", 2));
        store.insert(pending_step("s-3", 3));
        let service = DecisionService::new(store);

        // Step 2 before step 1; turn-order policy belongs to the caller.
        service
            .decide(&StepId("s-2".to_owned()), approve_input(None))
            .await
            .expect("step 2 decidable out of order");
        service
            .decide(
                &StepId("s-1".to_owned()),
                DecisionInput { verdict: Verdict::Rejected, comment: None, approver: None },
            )
            .await
            .expect("step 1 still decidable");

        let steps = service
            .store()
            .list_for_request(&RequestId("req-1".to_owned()))
            .await
            .expect("list steps");
        assert_eq!(
            steps.iter().map(|s| s.status).collect::<Vec<_>>(),
            vec![StepStatus::Rejected, StepStatus::Approved, StepStatus::Pending]
        );
    }

    #[tokio::test]
    async fn audited_decide_emits_applied_and_refused_events() {
        let store = FakeStore::default();
        store.insert(pending_step("s-1", 1));
        let service = DecisionService::new(store);
        let sink = InMemoryAuditSink::default();
        let context =
            AuditContext::new(Some(RequestId("req-1".to_owned())), "corr-9", "api:decide");
        let id = StepId("s-1".to_owned());

        service
            .decide_with_audit(&id, approve_input(None), &sink, &context)
            .await
            .expect("first decision applies");
        let _ = service.decide_with_audit(&id, approve_input(None), &sink, &context).await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "decision.applied");
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[1].event_type, "decision.refused");
        assert_eq!(events[1].metadata.get("error_class").map(String::as_str), Some("invalid_state"));
    }
}
