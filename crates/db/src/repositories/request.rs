use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;

use procura_core::domain::request::{PurchaseRequest, RequestId, RequestLifecycle};
use procura_core::domain::step::Approver;

use super::{PurchaseRequestRepository, RepositoryError};
use crate::repositories::step::step_status_as_str;
use crate::DbPool;

pub struct SqlPurchaseRequestRepository {
    pool: DbPool,
}

impl SqlPurchaseRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_lifecycle(s: &str) -> RequestLifecycle {
    match s {
        "submitted" => RequestLifecycle::Submitted,
        "converted" => RequestLifecycle::Converted,
        _ => RequestLifecycle::Draft,
    }
}

pub fn lifecycle_as_str(lifecycle: RequestLifecycle) -> &'static str {
    match lifecycle {
        RequestLifecycle::Draft => "draft",
        RequestLifecycle::Submitted => "submitted",
        RequestLifecycle::Converted => "converted",
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<PurchaseRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_number: String =
        row.try_get("request_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requested_by: String =
        row.try_get("requested_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total_amount_str: String =
        row.try_get("total_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let lifecycle_str: String =
        row.try_get("lifecycle").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let total_amount = total_amount_str
        .parse::<Decimal>()
        .map_err(|e| RepositoryError::Decode(format!("total_amount: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("created_at: {e}")))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("updated_at: {e}")))?;

    Ok(PurchaseRequest {
        id: RequestId(id),
        request_number,
        title,
        requested_by,
        total_amount,
        lifecycle: parse_lifecycle(&lifecycle_str),
        created_at,
        updated_at,
    })
}

const REQUEST_COLUMNS: &str = "id, request_number, title, requested_by, \
                               total_amount, lifecycle, created_at, updated_at";

#[async_trait]
impl PurchaseRequestRepository for SqlPurchaseRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM purchase_request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO purchase_request
                (id, request_number, title, requested_by, total_amount,
                 lifecycle, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 request_number = excluded.request_number,
                 title = excluded.title,
                 requested_by = excluded.requested_by,
                 total_amount = excluded.total_amount,
                 lifecycle = excluded.lifecycle,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.request_number)
        .bind(&request.title)
        .bind(&request.requested_by)
        .bind(request.total_amount.to_string())
        .bind(lifecycle_as_str(request.lifecycle))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM purchase_request ORDER BY created_at DESC LIMIT ?",
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
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
        request.lifecycle = procura_core::domain::request::RequestLifecycle::Submitted;
        request.updated_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO purchase_request
                (id, request_number, title, requested_by, total_amount,
                 lifecycle, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.request_number)
        .bind(&request.title)
        .bind(&request.requested_by)
        .bind(request.total_amount.to_string())
        .bind(lifecycle_as_str(request.lifecycle))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let now = Utc::now();
        for (index, approver) in approvers.iter().enumerate() {
            let position = index as i64 + 1;
            sqlx::query(
                "INSERT INTO approval_step
                    (id, request_id, position, status, approver_id, approver_name, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&request.id.0)
            .bind(position)
            .bind(step_status_as_str(procura_core::domain::step::StepStatus::Pending))
            .bind(&approver.id)
            .bind(&approver.name)
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(request)
    }
}
