//! Deterministic demo data for `procura seed` and repository tests.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use procura_core::decision::{ApprovalStepStore, DecisionInput, DecisionService, Verdict};
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestLifecycle};
use procura_core::domain::step::Approver;
use procura_core::errors::DecisionError;

use crate::repositories::{
    PurchaseRequestRepository, RepositoryError, SqlApprovalStepStore, SqlPurchaseRequestRepository,
};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub requests_created: u32,
    pub steps_created: u32,
    pub decisions_applied: u32,
}

/// A draft request record with fixed fields apart from id/number. Shared by
/// the seeder and the repository tests.
pub fn request_record(id: &str, request_number: &str) -> PurchaseRequest {
    let now = Utc::now();
    PurchaseRequest {
        id: RequestId(id.to_owned()),
        request_number: request_number.to_owned(),
        title: "Workshop equipment restock".to_owned(),
        requested_by: "u-requester".to_owned(),
        total_amount: Decimal::new(125_000, 2),
        lifecycle: RequestLifecycle::Draft,
        created_at: now,
        updated_at: now,
    }
}

fn demo_approvers() -> Vec<Approver> {
    vec![
        Approver { id: "u-lead".to_owned(), name: "Team Lead".to_owned() },
        Approver { id: "u-purchasing".to_owned(), name: "Purchasing Manager".to_owned() },
        Approver { id: "u-finance".to_owned(), name: "Finance Director".to_owned() },
    ]
}

fn input(verdict: Verdict, comment: Option<&str>) -> DecisionInput {
    DecisionInput { verdict, comment: comment.map(str::to_owned), approver: None }
}

fn store_error(error: DecisionError) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

/// Seed three requests: one untouched pending chain, one mid-flight (first
/// step approved), and one rejected at step two. Intended for a fresh
/// database; the fixed request numbers collide on a re-run.
pub async fn seed_demo_dataset(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let repo = SqlPurchaseRequestRepository::new(pool.clone());
    let store = SqlApprovalStepStore::new(pool.clone());
    let service = DecisionService::new(SqlApprovalStepStore::new(pool.clone()));

    let mut result = SeedResult { requests_created: 0, steps_created: 0, decisions_applied: 0 };

    repo.submit_with_chain(request_record("seed-req-pending", "PR-2026-0101"), demo_approvers())
        .await?;
    result.requests_created += 1;
    result.steps_created += 3;

    let in_flight = repo
        .submit_with_chain(request_record("seed-req-in-flight", "PR-2026-0102"), demo_approvers())
        .await?;
    result.requests_created += 1;
    result.steps_created += 3;

    let rejected = repo
        .submit_with_chain(request_record("seed-req-rejected", "PR-2026-0103"), demo_approvers())
        .await?;
    result.requests_created += 1;
    result.steps_created += 3;

    // In-flight: first approver has signed off.
    let in_flight_steps = store.list_for_request(&in_flight.id).await.map_err(store_error)?;
    service
        .decide(&in_flight_steps[0].id, input(Verdict::Approved, Some("within budget")))
        .await
        .map_err(store_error)?;
    result.decisions_applied += 1;

    // Rejected: step one approved, step two rejected.
    let rejected_steps = store.list_for_request(&rejected.id).await.map_err(store_error)?;
    service
        .decide(&rejected_steps[0].id, input(Verdict::Approved, None))
        .await
        .map_err(store_error)?;
    service
        .decide(
            &rejected_steps[1].id,
            input(Verdict::Rejected, Some("supplier not on approved list")),
        )
        .await
        .map_err(store_error)?;
    result.decisions_applied += 2;

    Ok(result)
}
