//! JSON API for purchase-request submission and approval decisions.
//!
//! Endpoints:
//! - `POST /api/v1/requests`             — create a request with its approval chain
//! - `GET  /api/v1/requests/{id}`        — request details, steps, derived status
//! - `GET  /api/v1/requests/{id}/steps`  — ordered approval steps
//! - `POST /api/v1/steps/{id}/decide`    — apply one reviewer decision

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use procura_core::audit::{AuditContext, AuditEvent, AuditSink};
use procura_core::decision::{ApprovalStepStore, DecisionInput, DecisionService, Verdict};
use procura_core::domain::request::{PurchaseRequest, RequestId, RequestLifecycle};
use procura_core::domain::step::{ApprovalStep, Approver, StepId};
use procura_core::errors::DecisionError;
use procura_core::projection::{project_status, sequence_violations, RequestProjection};
use procura_db::repositories::step::step_status_as_str;
use procura_db::repositories::{
    PurchaseRequestRepository, RepositoryError, SqlApprovalStepStore, SqlPurchaseRequestRepository,
};
use procura_db::DbPool;

#[derive(Clone)]
pub struct ApiState {
    db_pool: DbPool,
}

/// Forwards audit events into the tracing pipeline so decision outcomes show
/// up in the server logs alongside everything else.
struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            request_id = event.request_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            actor = %event.actor,
            outcome = ?event.outcome,
            "audit event emitted"
        );
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    pub request_number: Option<String>,
    pub title: String,
    pub requested_by: Option<String>,
    /// Decimal string, e.g. `"1250.00"`.
    pub total_amount: Option<String>,
    pub approvers: Vec<ApproverBody>,
}

#[derive(Debug, Deserialize)]
pub struct ApproverBody {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideBody {
    pub status: Verdict,
    pub comment: Option<String>,
    pub approver_id: Option<String>,
    pub approver_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub id: String,
    pub request_id: String,
    pub position: u32,
    pub status: String,
    pub comment: Option<String>,
    pub approver_id: Option<String>,
    pub approver_name: Option<String>,
    pub decided_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetailResponse {
    pub id: String,
    pub request_number: String,
    pub title: String,
    pub requested_by: String,
    pub total_amount: String,
    pub lifecycle: RequestLifecycle,
    pub approval: RequestProjection,
    pub steps: Vec<StepResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl From<&ApprovalStep> for StepResponse {
    fn from(step: &ApprovalStep) -> Self {
        Self {
            id: step.id.0.clone(),
            request_id: step.request_id.0.clone(),
            position: step.position,
            status: step_status_as_str(step.status).to_string(),
            comment: step.comment.clone(),
            approver_id: step.approver.as_ref().map(|a| a.id.clone()),
            approver_name: step.approver.as_ref().map(|a| a.name.clone()),
            decided_at: step.decided_at.map(|dt| dt.to_rfc3339()),
            created_at: step.created_at.to_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(db_pool: DbPool) -> Router {
    Router::new()
        .route("/api/v1/requests", post(create_request))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/steps", get(list_request_steps))
        .route("/api/v1/steps/{id}/decide", post(decide_step))
        .with_state(ApiState { db_pool })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<RequestDetailResponse>), (StatusCode, Json<ApiError>)> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "title is required".to_string() }),
        ));
    }
    if body.approvers.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "at least one approver is required".to_string() }),
        ));
    }

    let total_amount = match body.total_amount.as_deref() {
        Some(raw) => raw.trim().parse::<Decimal>().map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiError { error: format!("totalAmount is not a valid amount: `{raw}`") }),
            )
        })?,
        None => Decimal::ZERO,
    };

    let now = Utc::now();
    let id = Uuid::new_v4().to_string();
    let request_number = body
        .request_number
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("PR-{}", &id[..8]));

    let request = PurchaseRequest {
        id: RequestId(id),
        request_number: request_number.clone(),
        title: title.to_string(),
        requested_by: body.requested_by.unwrap_or_else(|| "unknown".to_string()),
        total_amount,
        lifecycle: RequestLifecycle::Draft,
        created_at: now,
        updated_at: now,
    };

    let approvers: Vec<Approver> = body
        .approvers
        .into_iter()
        .map(|a| Approver { id: a.id, name: a.name })
        .collect();

    let repo = SqlPurchaseRequestRepository::new(state.db_pool.clone());
    let submitted = match repo.submit_with_chain(request, approvers).await {
        Ok(submitted) => submitted,
        Err(RepositoryError::Database(error))
            if error.as_database_error().is_some_and(|db| db.is_unique_violation()) =>
        {
            return Err((
                StatusCode::CONFLICT,
                Json(ApiError {
                    error: format!("request number `{request_number}` is already taken"),
                }),
            ));
        }
        Err(other) => return Err(repository_error(other)),
    };

    info!(
        event_name = "api.request.submitted",
        correlation_id = %submitted.id.0,
        request_id = %submitted.id.0,
        request_number = %submitted.request_number,
        "purchase request submitted with approval chain"
    );

    let detail = load_request_detail(&state.db_pool, &submitted.id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn get_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<RequestDetailResponse>, (StatusCode, Json<ApiError>)> {
    let detail = load_request_detail(&state.db_pool, &RequestId(id)).await?;
    Ok(Json(detail))
}

async fn list_request_steps(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Vec<StepResponse>>, (StatusCode, Json<ApiError>)> {
    let request_id = RequestId(id);
    let repo = SqlPurchaseRequestRepository::new(state.db_pool.clone());
    ensure_request_exists(&repo, &request_id).await?;

    let store = SqlApprovalStepStore::new(state.db_pool.clone());
    let steps = store.list_for_request(&request_id).await.map_err(decision_error)?;

    Ok(Json(steps.iter().map(StepResponse::from).collect()))
}

async fn decide_step(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<DecideBody>,
) -> Result<Json<StepResponse>, (StatusCode, Json<ApiError>)> {
    let step_id = StepId(id);
    let correlation_id = Uuid::new_v4().to_string();

    // An approver identity is taken only when an id is supplied; a bare name
    // cannot be attributed to anyone.
    let approver = match (body.approver_id, body.approver_name) {
        (Some(id), name) => Some(Approver { id, name: name.unwrap_or_default() }),
        (None, _) => None,
    };
    let actor = approver.as_ref().map(|a| a.id.clone()).unwrap_or_else(|| "api".to_string());

    let input = DecisionInput { verdict: body.status, comment: body.comment, approver };

    let service = DecisionService::new(SqlApprovalStepStore::new(state.db_pool.clone()));
    let audit = AuditContext::new(None, correlation_id.clone(), actor);
    let step = service
        .decide_with_audit(&step_id, input, &TracingAuditSink, &audit)
        .await
        .map_err(decision_error)?;

    info!(
        event_name = "api.step.decided",
        correlation_id = %correlation_id,
        request_id = %step.request_id.0,
        step_id = %step.id.0,
        position = step.position,
        verdict = ?body.status,
        "approval decision applied"
    );

    Ok(Json(StepResponse::from(&step)))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load_request_detail(
    pool: &DbPool,
    request_id: &RequestId,
) -> Result<RequestDetailResponse, (StatusCode, Json<ApiError>)> {
    let repo = SqlPurchaseRequestRepository::new(pool.clone());
    let request = ensure_request_exists(&repo, request_id).await?;

    let store = SqlApprovalStepStore::new(pool.clone());
    let steps = store.list_for_request(request_id).await.map_err(decision_error)?;

    let violations = sequence_violations(&steps);
    if !violations.is_empty() {
        warn!(
            event_name = "api.request.sequence_violation",
            correlation_id = %request_id.0,
            request_id = %request_id.0,
            violations = ?violations,
            "approval chain has a malformed position sequence"
        );
    }

    Ok(RequestDetailResponse {
        id: request.id.0.clone(),
        request_number: request.request_number,
        title: request.title,
        requested_by: request.requested_by,
        total_amount: request.total_amount.to_string(),
        lifecycle: request.lifecycle,
        approval: project_status(&steps),
        steps: steps.iter().map(StepResponse::from).collect(),
        created_at: request.created_at.to_rfc3339(),
        updated_at: request.updated_at.to_rfc3339(),
    })
}

async fn ensure_request_exists(
    repo: &SqlPurchaseRequestRepository,
    request_id: &RequestId,
) -> Result<PurchaseRequest, (StatusCode, Json<ApiError>)> {
    match repo.find_by_id(request_id).await.map_err(repository_error)? {
        Some(request) => Ok(request),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ApiError { error: format!("purchase request `{}` not found", request_id.0) }),
        )),
    }
}

fn decision_error(error: DecisionError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        DecisionError::StepNotFound { .. } => StatusCode::NOT_FOUND,
        DecisionError::AlreadyDecided { .. } => StatusCode::CONFLICT,
        DecisionError::Store(_) => {
            error!(event_name = "api.store.failure", error = %error, "step store failure");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, Json(ApiError { error: error.to_string() }))
}

fn repository_error(error: RepositoryError) -> (StatusCode, Json<ApiError>) {
    match error {
        RepositoryError::InvalidSubmission(message) => {
            (StatusCode::BAD_REQUEST, Json(ApiError { error: message }))
        }
        other => {
            error!(event_name = "api.repository.failure", error = %other, "repository failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: "an internal error occurred".to_string() }),
            )
        }
    }
}
