use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use procura_core::decision::{ApprovalStepStore, DecisionRecord};
use procura_core::domain::request::RequestId;
use procura_core::domain::step::{ApprovalStep, Approver, StepId, StepStatus};
use procura_core::errors::DecisionError;

use crate::DbPool;

pub struct SqlApprovalStepStore {
    pool: DbPool,
}

impl SqlApprovalStepStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(s: &str) -> StepStatus {
    match s {
        "approved" => StepStatus::Approved,
        "rejected" => StepStatus::Rejected,
        "skipped" => StepStatus::Skipped,
        _ => StepStatus::Pending,
    }
}

pub fn step_status_as_str(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "pending",
        StepStatus::Approved => "approved",
        StepStatus::Rejected => "rejected",
        StepStatus::Skipped => "skipped",
    }
}

fn decode_error(error: impl std::fmt::Display) -> DecisionError {
    DecisionError::Store(format!("decode error: {error}"))
}

fn db_error(error: sqlx::Error) -> DecisionError {
    DecisionError::Store(error.to_string())
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, DecisionError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let request_id: String = row.try_get("request_id").map_err(decode_error)?;
    let position: i64 = row.try_get("position").map_err(decode_error)?;
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let comment: Option<String> = row.try_get("comment").map_err(decode_error)?;
    let approver_id: Option<String> = row.try_get("approver_id").map_err(decode_error)?;
    let approver_name: Option<String> = row.try_get("approver_name").map_err(decode_error)?;
    let decided_at_str: Option<String> = row.try_get("decided_at").map_err(decode_error)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_error)?;

    // A corrupt timestamp must fail the decode: silently dropping decided_at
    // would make a decided step look pending again.
    let decided_at = decided_at_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(decode_error)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode_error)?;

    let approver = match (approver_id, approver_name) {
        (Some(id), name) => Some(Approver { id, name: name.unwrap_or_default() }),
        (None, _) => None,
    };

    Ok(ApprovalStep {
        id: StepId(id),
        request_id: RequestId(request_id),
        position: u32::try_from(position).map_err(decode_error)?,
        status: parse_status(&status_str),
        comment,
        approver,
        decided_at,
        created_at,
    })
}

const STEP_COLUMNS: &str = "id, request_id, position, status, comment, \
                            approver_id, approver_name, decided_at, created_at";

impl SqlApprovalStepStore {
    /// Insert a fresh step row. Used by submission and fixtures; the decision
    /// path never inserts.
    pub async fn insert(&self, step: &ApprovalStep) -> Result<(), DecisionError> {
        sqlx::query(
            "INSERT INTO approval_step
                (id, request_id, position, status, comment,
                 approver_id, approver_name, decided_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&step.id.0)
        .bind(&step.request_id.0)
        .bind(i64::from(step.position))
        .bind(step_status_as_str(step.status))
        .bind(&step.comment)
        .bind(step.approver.as_ref().map(|a| a.id.as_str()))
        .bind(step.approver.as_ref().map(|a| a.name.as_str()))
        .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(step.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

#[async_trait]
impl ApprovalStepStore for SqlApprovalStepStore {
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ApprovalStep>, DecisionError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step WHERE request_id = ? ORDER BY position ASC",
        ))
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_step).collect()
    }

    async fn fetch(&self, step_id: &StepId) -> Result<ApprovalStep, DecisionError> {
        let row = sqlx::query(&format!("SELECT {STEP_COLUMNS} FROM approval_step WHERE id = ?"))
            .bind(&step_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(ref r) => row_to_step(r),
            None => Err(DecisionError::StepNotFound { step_id: step_id.0.clone() }),
        }
    }

    async fn persist_decision(
        &self,
        step_id: &StepId,
        record: DecisionRecord,
    ) -> Result<ApprovalStep, DecisionError> {
        // Compare-and-swap on status: concurrent decisions on the same step
        // race here, and exactly one update matches the pending row.
        let result = sqlx::query(
            "UPDATE approval_step
             SET status = ?,
                 comment = COALESCE(?, comment),
                 approver_id = COALESCE(?, approver_id),
                 approver_name = COALESCE(?, approver_name),
                 decided_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(step_status_as_str(record.status))
        .bind(&record.comment)
        .bind(record.approver.as_ref().map(|a| a.id.as_str()))
        .bind(record.approver.as_ref().map(|a| a.name.as_str()))
        .bind(record.decided_at.to_rfc3339())
        .bind(&step_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            // Either the row is gone or it was decided under us; re-fetch to
            // tell the two apart.
            let existing = self.fetch(step_id).await?;
            return Err(DecisionError::AlreadyDecided {
                step_id: step_id.0.clone(),
                status: existing.status,
            });
        }

        self.fetch(step_id).await
    }
}
