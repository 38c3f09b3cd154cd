use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Reviewer reference denormalized onto the step for presentation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub id: String,
    pub name: String,
}

/// One reviewer's decision slot within a request's ordered approval chain.
/// `position` is 1-based and unique within the parent request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: StepId,
    pub request_id: RequestId,
    pub position: u32,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub approver: Option<Approver>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalStep {
    /// A fresh pending slot at `position` for `request_id`.
    pub fn pending(
        id: StepId,
        request_id: RequestId,
        position: u32,
        approver: Option<Approver>,
    ) -> Self {
        Self {
            id,
            request_id,
            position,
            status: StepStatus::Pending,
            comment: None,
            approver,
            decided_at: None,
            created_at: Utc::now(),
        }
    }
}
