pub mod audit;
pub mod config;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod projection;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use decision::{ApprovalStepStore, DecisionInput, DecisionRecord, DecisionService, Verdict};
pub use domain::request::{PurchaseRequest, RequestId, RequestLifecycle};
pub use domain::step::{ApprovalStep, Approver, StepId, StepStatus};
pub use errors::DecisionError;
pub use projection::{project_status, sequence_violations, RequestProjection, SequenceViolation};
