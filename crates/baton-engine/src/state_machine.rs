// Execution state machine
//
// Owns execution-row creation and the legal transition table. The step
// executor composes the same checks inside its own transaction via the free
// functions; the StateMachine methods are the standalone (administrative)
// surface.

use baton_core::{EventType, Execution, ExecutionState};
use baton_store::execution_store::{self, NewExecution, StateUpdate};
use baton_store::telemetry_store::NewEvent;
use baton_store::{now_ms, Database};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::telemetry::TelemetryRecorder;

/// States reachable from `from` in one transition
pub fn allowed_transitions(from: ExecutionState) -> &'static [ExecutionState] {
    use ExecutionState::*;
    match from {
        Idle => &[Running],
        Running => &[Completed, Failed, Paused, Abandoned, Diverged],
        Paused => &[Running, Abandoned],
        // Terminal states admit nothing
        Completed | Failed | Abandoned | Diverged => &[],
    }
}

/// Check one transition against the table
pub fn check_transition(from: ExecutionState, to: ExecutionState) -> Result<(), EngineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// Build the row update for a verified transition. Terminal transitions pick
/// up completed_at and duration_ms; current_step is kept only for running and
/// paused states.
pub fn build_update(
    to: ExecutionState,
    current_step: Option<String>,
    started_at_ms: i64,
    now: i64,
) -> StateUpdate {
    let terminal = to.is_terminal();
    StateUpdate {
        state: to,
        current_step: match to {
            ExecutionState::Running | ExecutionState::Paused => current_step,
            _ => None,
        },
        completed_at: terminal.then_some(now),
        duration_ms: terminal.then(|| now - started_at_ms),
    }
}

/// Standalone state-machine operations over the store
#[derive(Clone)]
pub struct StateMachine {
    db: Database,
    telemetry: TelemetryRecorder,
}

impl StateMachine {
    pub fn new(db: Database, telemetry: TelemetryRecorder) -> Self {
        Self { db, telemetry }
    }

    /// Create an execution in idle state. Fails when the id is taken.
    #[instrument(skip(self, metadata))]
    pub async fn create(
        &self,
        workflow_name: &str,
        execution_id: &str,
        timeout_ms: Option<i64>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Execution, EngineError> {
        let new = NewExecution {
            execution_id: execution_id.to_string(),
            workflow_name: workflow_name.to_string(),
            timeout_ms,
            metadata,
        };

        execution_store::insert(self.db.writer(), &new, now_ms())
            .await
            .map_err(|e| {
                if e.is_unique_violation() {
                    EngineError::DuplicateExecutionId(execution_id.to_string())
                } else {
                    e.into()
                }
            })?;

        self.telemetry
            .record(
                NewEvent::new(EventType::WorkflowCreated)
                    .execution(execution_id)
                    .metadata(serde_json::json!({ "workflow_name": workflow_name })),
            )
            .await;

        info!(%execution_id, workflow = workflow_name, "created execution");
        self.require(execution_id).await
    }

    /// Verify and apply a transition. `current_step` is honored for running
    /// and paused targets and cleared otherwise.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        execution_id: &str,
        to: ExecutionState,
        current_step: Option<String>,
    ) -> Result<Execution, EngineError> {
        let mut tx = self.db.begin().await?;

        let row = execution_store::get(&mut *tx, execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        let from = row.state()?;
        check_transition(from, to)?;

        let now = now_ms();
        let update = build_update(to, current_step, row.started_at, now);
        execution_store::apply_state(&mut *tx, execution_id, &update, now).await?;

        // A terminal transition strands any in-flight step; fail it so its
        // token cannot linger
        if to.is_terminal() {
            if let Some(step) = baton_store::step_store::running_step(&mut *tx, execution_id).await? {
                baton_store::step_store::fail(&mut *tx, step.id, now).await?;
            }
        }

        tx.commit().await?;

        self.telemetry
            .record(
                NewEvent::new(EventType::WorkflowStateTransition)
                    .execution(execution_id)
                    .metadata(serde_json::json!({
                        "old_state": from.to_string(),
                        "new_state": to.to_string(),
                    })),
            )
            .await;

        info!(%execution_id, %from, %to, "execution transitioned");
        self.require(execution_id).await
    }

    /// Suspend a running execution, keeping its current step
    pub async fn pause(&self, execution_id: &str) -> Result<Execution, EngineError> {
        let current = self.require(execution_id).await?;
        self.transition(execution_id, ExecutionState::Paused, current.current_step)
            .await
    }

    /// Resume a paused execution at its recorded step
    pub async fn resume(&self, execution_id: &str) -> Result<Execution, EngineError> {
        let current = self.require(execution_id).await?;
        self.transition(execution_id, ExecutionState::Running, current.current_step)
            .await
    }

    /// Cancel an execution (terminal)
    pub async fn abandon(&self, execution_id: &str) -> Result<Execution, EngineError> {
        self.transition(execution_id, ExecutionState::Abandoned, None)
            .await
    }

    pub async fn get(&self, execution_id: &str) -> Result<Option<Execution>, EngineError> {
        let row = execution_store::get(self.db.reader(), execution_id).await?;
        Ok(row.map(|r| r.into_model()).transpose()?)
    }

    async fn require(&self, execution_id: &str) -> Result<Execution, EngineError> {
        self.get(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))
    }

    pub async fn list_by_workflow(&self, name: &str) -> Result<Vec<Execution>, EngineError> {
        let rows = execution_store::list_by_workflow(self.db.reader(), name).await?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_model())
            .collect::<Result<_, _>>()?)
    }

    pub async fn list_by_state(
        &self,
        state: ExecutionState,
    ) -> Result<Vec<Execution>, EngineError> {
        let rows = execution_store::list_by_state(self.db.reader(), state).await?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_model())
            .collect::<Result<_, _>>()?)
    }
}
