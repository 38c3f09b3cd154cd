//! End-to-end decision flow against a real sqlite store: submission,
//! decisions through the service, and the derived request status.

use procura_core::decision::{
    ApprovalStepStore, DecisionInput, DecisionService, Verdict,
};
use procura_core::domain::request::RequestId;
use procura_core::domain::step::{ApprovalStep, Approver, StepStatus};
use procura_core::errors::DecisionError;
use procura_core::projection::{project_status, RequestProjection};

use procura_db::fixtures::request_record;
use procura_db::repositories::{
    PurchaseRequestRepository, SqlApprovalStepStore, SqlPurchaseRequestRepository,
};
use procura_db::{connect_with_settings, migrations, DbPool};

async fn setup() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

fn approvers() -> Vec<Approver> {
    vec![
        Approver { id: "u-1".to_owned(), name: "Team Lead".to_owned() },
        Approver { id: "u-2".to_owned(), name: "Purchasing Manager".to_owned() },
        Approver { id: "u-3".to_owned(), name: "Finance Director".to_owned() },
    ]
}

async fn submit_three_step_request(pool: &DbPool, request_id: &str) -> Vec<ApprovalStep> {
    let repo = SqlPurchaseRequestRepository::new(pool.clone());
    repo.submit_with_chain(request_record(request_id, "PR-2026-0001"), approvers())
        .await
        .expect("submission");

    let store = SqlApprovalStepStore::new(pool.clone());
    store.list_for_request(&RequestId(request_id.to_owned())).await.expect("list steps")
}

fn approve(comment: &str) -> DecisionInput {
    DecisionInput {
        verdict: Verdict::Approved,
        comment: Some(comment.to_owned()),
        approver: None,
    }
}

fn reject(comment: &str) -> DecisionInput {
    DecisionInput {
        verdict: Verdict::Rejected,
        comment: Some(comment.to_owned()),
        approver: None,
    }
}

#[tokio::test]
async fn full_approval_path_derives_approved() {
    let pool = setup().await;
    let steps = submit_three_step_request(&pool, "req-1").await;
    let service = DecisionService::new(SqlApprovalStepStore::new(pool.clone()));

    for step in &steps {
        service.decide(&step.id, approve("looks good")).await.expect("decision");
    }

    let store = SqlApprovalStepStore::new(pool);
    let decided =
        store.list_for_request(&RequestId("req-1".to_owned())).await.expect("list steps");
    assert!(decided.iter().all(|s| s.status == StepStatus::Approved));
    assert!(decided.iter().all(|s| s.decided_at.is_some()));
    assert_eq!(project_status(&decided), RequestProjection::Approved);
}

#[tokio::test]
async fn rejection_anywhere_wins_over_earlier_pending_step() {
    let pool = setup().await;
    let steps = submit_three_step_request(&pool, "req-1").await;
    let service = DecisionService::new(SqlApprovalStepStore::new(pool.clone()));

    // Approvers act out of order: step 2 approves, then step 3 rejects,
    // while step 1 never acts.
    service.decide(&steps[1].id, approve("fine")).await.expect("step 2");
    service.decide(&steps[2].id, reject("over budget")).await.expect("step 3");

    let store = SqlApprovalStepStore::new(pool);
    let decided =
        store.list_for_request(&RequestId("req-1".to_owned())).await.expect("list steps");
    assert_eq!(decided[0].status, StepStatus::Pending);
    assert_eq!(project_status(&decided), RequestProjection::Rejected);
}

#[tokio::test]
async fn second_decision_on_same_step_fails_closed() {
    let pool = setup().await;
    let steps = submit_three_step_request(&pool, "req-1").await;
    let service = DecisionService::new(SqlApprovalStepStore::new(pool.clone()));

    service.decide(&steps[0].id, approve("ok")).await.expect("first decision");
    let error = service
        .decide(&steps[0].id, reject("changed my mind"))
        .await
        .expect_err("second decision must fail");

    assert!(matches!(
        error,
        DecisionError::AlreadyDecided { status: StepStatus::Approved, .. }
    ));

    // The losing decision left no trace.
    let store = SqlApprovalStepStore::new(pool);
    let step = store.fetch(&steps[0].id).await.expect("fetch");
    assert_eq!(step.status, StepStatus::Approved);
    assert_eq!(step.comment.as_deref(), Some("ok"));
}

#[tokio::test]
async fn pending_projection_tracks_lowest_undecided_position() {
    let pool = setup().await;
    let steps = submit_three_step_request(&pool, "req-1").await;
    let service = DecisionService::new(SqlApprovalStepStore::new(pool.clone()));
    let store = SqlApprovalStepStore::new(pool);
    let request_id = RequestId("req-1".to_owned());

    let fresh = store.list_for_request(&request_id).await.expect("list");
    assert_eq!(project_status(&fresh), RequestProjection::Pending { current_step: 1 });

    service.decide(&steps[0].id, approve("ok")).await.expect("step 1");
    let after_one = store.list_for_request(&request_id).await.expect("list");
    assert_eq!(project_status(&after_one), RequestProjection::Pending { current_step: 2 });

    // Step 3 approving early leaves the pointer at step 2.
    service.decide(&steps[2].id, approve("pre-approved")).await.expect("step 3");
    let after_skip = store.list_for_request(&request_id).await.expect("list");
    assert_eq!(project_status(&after_skip), RequestProjection::Pending { current_step: 2 });
}

#[tokio::test]
async fn decision_records_explicit_approver_identity() {
    let pool = setup().await;
    let steps = submit_three_step_request(&pool, "req-1").await;
    let service = DecisionService::new(SqlApprovalStepStore::new(pool.clone()));

    let delegate = Approver { id: "u-9".to_owned(), name: "Deputy Director".to_owned() };
    let input = DecisionInput {
        verdict: Verdict::Approved,
        comment: None,
        approver: Some(delegate),
    };
    let decided = service.decide(&steps[0].id, input).await.expect("decision");

    assert_eq!(decided.approver.as_ref().map(|a| a.id.as_str()), Some("u-9"));
    assert_eq!(decided.approver.as_ref().map(|a| a.name.as_str()), Some("Deputy Director"));
}
