use async_trait::async_trait;
use thiserror::Error;

use procura_core::domain::request::{PurchaseRequest, RequestId};
use procura_core::domain::step::Approver;

pub mod memory;
pub mod request;
pub mod step;

pub use memory::{InMemoryApprovalStepStore, InMemoryPurchaseRequestRepository};
pub use request::SqlPurchaseRequestRepository;
pub use step::SqlApprovalStepStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("submission rejected: {0}")]
    InvalidSubmission(String),
}

#[async_trait]
pub trait PurchaseRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId)
        -> Result<Option<PurchaseRequest>, RepositoryError>;

    async fn save(&self, request: PurchaseRequest) -> Result<(), RepositoryError>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<PurchaseRequest>, RepositoryError>;

    /// Persist a request together with its full ordered approval chain
    /// (steps 1..=approvers.len(), all pending) in one transaction. The
    /// chain is numbered here, so malformed sequences cannot enter the
    /// store. An empty approver list is rejected.
    async fn submit_with_chain(
        &self,
        request: PurchaseRequest,
        approvers: Vec<Approver>,
    ) -> Result<PurchaseRequest, RepositoryError>;
}
