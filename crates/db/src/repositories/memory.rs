use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use procura_core::decision::{ApprovalStepStore, DecisionRecord};
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestLifecycle};
use procura_core::domain::step::{ApprovalStep, Approver, StepId, StepStatus};
use procura_core::errors::DecisionError;

use super::{PurchaseRequestRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryApprovalStepStore {
    steps: RwLock<HashMap<String, ApprovalStep>>,
}

impl InMemoryApprovalStepStore {
    pub async fn insert(&self, step: ApprovalStep) {
        let mut steps = self.steps.write().await;
        steps.insert(step.id.0.clone(), step);
    }
}

#[async_trait]
impl ApprovalStepStore for InMemoryApprovalStepStore {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalStep>, DecisionError> {
        let steps = self.steps.read().await;
        let mut matched: Vec<ApprovalStep> =
            steps.values().filter(|step| step.request_id == *request_id).cloned().collect();
        matched.sort_by_key(|step| step.position);
        Ok(matched)
    }

    async fn fetch(&self, step_id: &StepId) -> Result<ApprovalStep, DecisionError> {
        let steps = self.steps.read().await;
        steps
            .get(&step_id.0)
            .cloned()
            .ok_or_else(|| DecisionError::StepNotFound { step_id: step_id.0.clone() })
    }

    async fn persist_decision(
        &self,
        step_id: &StepId,
        record: DecisionRecord,
    ) -> Result<ApprovalStep, DecisionError> {
        let mut steps = self.steps.write().await;
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
        if record.comment.is_some() {
            step.comment = record.comment;
        }
        if record.approver.is_some() {
            step.approver = record.approver;
        }
        step.decided_at = Some(record.decided_at);
        Ok(step.clone())
    }
}

#[derive(Default)]
pub struct InMemoryPurchaseRequestRepository {
    requests: RwLock<HashMap<String, PurchaseRequest>>,
    steps: InMemoryApprovalStepStore,
}

impl InMemoryPurchaseRequestRepository {
    pub fn step_store(&self) -> &InMemoryApprovalStepStore {
        &self.steps
    }
}

#[async_trait]
impl PurchaseRequestRepository for InMemoryPurchaseRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut all: Vec<PurchaseRequest> = requests.values().cloned().collect();
        all.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn submit_with_chain(
        &self,
        request: PurchaseRequest,
        approvers: Vec<Approver>,
    ) -> Result<PurchaseRequest, RepositoryError> {
        if approvers.is_empty() {
            return Err(RepositoryError::InvalidSubmission(
                "a submitted request needs at least one approver".to_string(),
            ));
        }

        let mut request = request;
        request.lifecycle = RequestLifecycle::Submitted;
        request.updated_at = Utc::now();

        for (index, approver) in approvers.into_iter().enumerate() {
            self.steps
                .insert(ApprovalStep::pending(
                    StepId(Uuid::new_v4().to_string()),
                    request.id.clone(),
                    index as u32 + 1,
                    Some(approver),
                ))
                .await;
        }

        self.save(request.clone()).await?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use procura_core::decision::ApprovalStepStore;
    use procura_core::domain::request::{RequestId, RequestLifecycle};
    use procura_core::domain::step::{Approver, StepStatus};
    use procura_core::projection::{project_status, RequestProjection};

    use super::InMemoryPurchaseRequestRepository;
    use crate::fixtures::request_record;
    use crate::repositories::PurchaseRequestRepository;

    #[tokio::test]
    async fn in_memory_submission_round_trip() {
        let repo = InMemoryPurchaseRequestRepository::default();
        let approvers = vec![
            Approver { id: "u-1".to_owned(), name: "Ada".to_owned() },
            Approver { id: "u-2".to_owned(), name: "Grace".to_owned() },
        ];

        let submitted = repo
            .submit_with_chain(request_record("req-1", "PR-2026-0001"), approvers)
            .await
            .expect("submission");
        assert_eq!(submitted.lifecycle, RequestLifecycle::Submitted);

        let found = repo
            .find_by_id(&RequestId("req-1".to_owned()))
            .await
            .expect("find")
            .expect("request exists");
        assert_eq!(found.lifecycle, RequestLifecycle::Submitted);

        let steps = repo
            .step_store()
            .list_for_request(&RequestId("req-1".to_owned()))
            .await
            .expect("steps");
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(project_status(&steps), RequestProjection::Pending { current_step: 1 });
    }
}
