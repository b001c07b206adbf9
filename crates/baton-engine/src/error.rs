// Errors from engine operations
//
// Display strings double as the `error` field of tool responses, so the
// wording here is part of the caller-visible surface.

use baton_core::{ExecutionState, TokenError};
use baton_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested state change is not in the legal transition table
    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
    },

    /// No execution row with this id
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// An execution with this id already exists
    #[error("execution '{0}' already exists")]
    DuplicateExecutionId(String),

    /// The step targeted by the operation is not in running status
    #[error("invalid step status for '{step_name}': expected running, found {found}")]
    InvalidStepStatus { step_name: String, found: String },

    /// No step row for the execution's current step
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// Token was issued for a step that is no longer current (replay or
    /// stale token)
    #[error("Token step mismatch: token was issued for step '{token_step}' but the current step is '{current}'")]
    TokenStepMismatch { token_step: String, current: String },

    /// Workflow definition cannot be executed as given
    #[error("workflow '{workflow}' is not executable: {reason}")]
    InvalidWorkflow { workflow: String, reason: String },

    /// The execution's current step does not appear in the supplied phases
    #[error("step '{step}' is not a phase of workflow '{workflow}'")]
    PhaseMismatch { workflow: String, step: String },

    /// Token failed to decode or validate
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Underlying database failure
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// JSON serialization/deserialization failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
