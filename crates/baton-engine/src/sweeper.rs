// Running-step timeout sweeper
//
// Executions carry an optional timeout_ms budget. The sweeper fails any
// execution still running past started_at + timeout_ms, failing its in-flight
// step so the outstanding token dies with it. Executions without a budget are
// never touched. Advisory: the server runs this on an interval task.

use baton_core::{EventType, ExecutionState};
use baton_store::execution_store;
use baton_store::step_store;
use baton_store::telemetry_store::NewEvent;
use baton_store::{now_ms, Database};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::state_machine::build_update;
use crate::telemetry::TelemetryRecorder;

#[derive(Clone)]
pub struct TimeoutSweeper {
    db: Database,
    telemetry: TelemetryRecorder,
}

impl TimeoutSweeper {
    pub fn new(db: Database, telemetry: TelemetryRecorder) -> Self {
        Self { db, telemetry }
    }

    /// One sweep pass. Returns the ids of executions that were failed.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<Vec<String>, EngineError> {
        self.run_at(now_ms()).await
    }

    /// Sweep against an explicit clock (tests)
    pub async fn run_at(&self, now: i64) -> Result<Vec<String>, EngineError> {
        let overdue = execution_store::list_running_past_timeout(self.db.reader(), now).await?;
        let mut failed = Vec::new();

        for row in overdue {
            let execution_id = row.execution_id.clone();
            let mut tx = self.db.begin().await?;

            // Re-check under the transaction; the execution may have advanced
            // or finished since the scan.
            let Some(current) = execution_store::get(&mut *tx, &execution_id).await? else {
                continue;
            };
            if current.state()? != ExecutionState::Running {
                continue;
            }
            let budget = match current.timeout_ms {
                Some(budget) if current.started_at + budget < now => budget,
                _ => continue,
            };

            if let Some(step) = step_store::running_step(&mut *tx, &execution_id).await? {
                step_store::fail(&mut *tx, step.id, now).await?;
            }
            execution_store::apply_state(
                &mut *tx,
                &execution_id,
                &build_update(ExecutionState::Failed, None, current.started_at, now),
                now,
            )
            .await?;
            tx.commit().await?;

            self.telemetry
                .record(
                    NewEvent::new(EventType::WorkflowFailed)
                        .execution(&execution_id)
                        .metadata(serde_json::json!({
                            "reason": "timeout",
                            "timeout_ms": budget,
                        })),
                )
                .await;

            info!(%execution_id, timeout_ms = budget, "timed out running execution");
            failed.push(execution_id);
        }

        Ok(failed)
    }
}
