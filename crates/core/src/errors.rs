use thiserror::Error;

use crate::domain::step::StepStatus;

/// Failure taxonomy for the decision path. Every variant surfaces
/// synchronously to the immediate caller; nothing is retried or swallowed
/// inside the core.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("approval step `{step_id}` was not found")]
    StepNotFound { step_id: String },
    #[error("approval step `{step_id}` is already decided ({status:?})")]
    AlreadyDecided { step_id: String, status: StepStatus },
    #[error("store failure: {0}")]
    Store(String),
}

impl DecisionError {
    /// Stable machine-readable class, used by the API edge and CLI output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::StepNotFound { .. } => "not_found",
            Self::AlreadyDecided { .. } => "invalid_state",
            Self::Store(_) => "store_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DecisionError;
    use crate::domain::step::StepStatus;

    #[test]
    fn error_classes_are_distinguishable() {
        let not_found = DecisionError::StepNotFound { step_id: "s-1".to_owned() };
        let invalid = DecisionError::AlreadyDecided {
            step_id: "s-1".to_owned(),
            status: StepStatus::Approved,
        };
        let store = DecisionError::Store("connection reset".to_owned());

        assert_eq!(not_found.class(), "not_found");
        assert_eq!(invalid.class(), "invalid_state");
        assert_eq!(store.class(), "store_failure");
    }

    #[test]
    fn messages_name_the_offending_step() {
        let error = DecisionError::AlreadyDecided {
            step_id: "step-42".to_owned(),
            status: StepStatus::Rejected,
        };
        assert!(error.to_string().contains("step-42"));
        assert!(error.to_string().contains("already decided"));
    }
}
