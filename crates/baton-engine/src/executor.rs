// Step executor: the write core of the orchestrator
//
// start_workflow and next_step run their mutations inside one store
// transaction, so "complete current step + advance + issue token" is atomic:
// a failure anywhere rolls everything back and the caller keeps a usable
// token. Telemetry is emitted after commit, in operation order.

use baton_core::{
    ArtifactInput, EventType, ExecutionState, StepOutput, TokenCodec, WorkflowDefinition,
};
use baton_store::execution_store;
use baton_store::knowledge_store;
use baton_store::step_store;
use baton_store::telemetry_store::NewEvent;
use baton_store::{artifact_store, now_ms, Database};
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::state_machine::build_update;
use crate::telemetry::TelemetryRecorder;

/// Result of starting a workflow
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub execution_id: String,
    pub step_name: String,
    pub agent_name: String,
    pub workflow_state: ExecutionState,
    pub new_token: String,
}

/// Result of advancing a workflow by one step
#[derive(Debug, Clone)]
pub enum AdvanceOutcome {
    /// A next phase exists; the caller holds a fresh token for it
    Continued {
        execution_id: String,
        step_name: String,
        agent_name: String,
        workflow_state: ExecutionState,
        new_token: String,
    },
    /// The final phase completed; the execution is terminal
    Completed {
        execution_id: String,
        workflow_state: ExecutionState,
        total_steps: i64,
        message: String,
    },
}

/// Internal result of the transactional part of next_step
struct TxOutcome {
    outcome: AdvanceOutcome,
    events: Vec<NewEvent>,
}

#[derive(Clone)]
pub struct StepExecutor {
    db: Database,
    codec: TokenCodec,
    telemetry: TelemetryRecorder,
}

impl StepExecutor {
    pub fn new(db: Database, telemetry: TelemetryRecorder) -> Self {
        Self {
            db,
            codec: TokenCodec::new(),
            telemetry,
        }
    }

    pub fn with_codec(mut self, codec: TokenCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Create an execution for `definition`, enter its first phase, and issue
    /// the first continuation token.
    #[instrument(skip(self, definition, metadata), fields(workflow = %definition.name))]
    pub async fn start_workflow(
        &self,
        execution_id: &str,
        definition: &WorkflowDefinition,
        timeout_ms: Option<i64>,
        metadata: Option<serde_json::Value>,
    ) -> Result<StartOutcome, EngineError> {
        if execution_id.trim().is_empty() {
            return Err(EngineError::InvalidWorkflow {
                workflow: definition.name.clone(),
                reason: "execution_id must be non-empty".to_string(),
            });
        }
        definition
            .validate()
            .map_err(|reason| EngineError::InvalidWorkflow {
                workflow: definition.name.clone(),
                reason,
            })?;
        let first = definition
            .first_phase()
            .ok_or_else(|| EngineError::InvalidWorkflow {
                workflow: definition.name.clone(),
                reason: "no startable phase".to_string(),
            })?;

        let result = self
            .start_in_tx(execution_id, definition, first, timeout_ms, metadata)
            .await;

        match result {
            Ok(outcome) => {
                self.telemetry
                    .record_all(vec![
                        NewEvent::new(EventType::WorkflowCreated)
                            .execution(execution_id)
                            .metadata(serde_json::json!({ "workflow_name": definition.name })),
                        NewEvent::new(EventType::WorkflowStarted)
                            .execution(execution_id)
                            .metadata(serde_json::json!({ "workflow_name": definition.name })),
                        NewEvent::new(EventType::StepStarted)
                            .execution(execution_id)
                            .step(&outcome.step_name)
                            .agent(&outcome.agent_name),
                        NewEvent::new(EventType::TokenGenerated)
                            .execution(execution_id)
                            .step(&outcome.step_name),
                    ])
                    .await;
                info!(%execution_id, step = %outcome.step_name, "workflow started");
                Ok(outcome)
            }
            Err(e) => {
                // Duplicate ids are a caller error, not a failed start
                if !matches!(e, EngineError::DuplicateExecutionId(_)) {
                    self.telemetry
                        .record(
                            NewEvent::new(EventType::WorkflowFailed)
                                .metadata(serde_json::json!({
                                    "execution_id": execution_id,
                                    "error": e.to_string(),
                                })),
                        )
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn start_in_tx(
        &self,
        execution_id: &str,
        definition: &WorkflowDefinition,
        first: &baton_core::Phase,
        timeout_ms: Option<i64>,
        metadata: Option<serde_json::Value>,
    ) -> Result<StartOutcome, EngineError> {
        let now = now_ms();
        let project_id = metadata
            .as_ref()
            .and_then(|m| m.get("project_id"))
            .and_then(|v| v.as_i64());

        let mut tx = self.db.begin().await?;

        execution_store::insert(
            &mut *tx,
            &execution_store::NewExecution {
                execution_id: execution_id.to_string(),
                workflow_name: definition.name.clone(),
                timeout_ms,
                metadata,
            },
            now,
        )
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                EngineError::DuplicateExecutionId(execution_id.to_string())
            } else {
                e.into()
            }
        })?;

        // An execution that references a project keeps it warm
        if let Some(project_id) = project_id {
            baton_store::project_store::touch(&mut *tx, project_id, now).await?;
        }

        let step_id =
            step_store::insert_running(&mut *tx, execution_id, &first.phase, &first.agent, now)
                .await?;

        let token = self.codec.generate(execution_id, &first.phase)?;
        step_store::set_token(&mut *tx, step_id, &token).await?;

        execution_store::apply_state(
            &mut *tx,
            execution_id,
            &build_update(ExecutionState::Running, Some(first.phase.clone()), now, now),
            now,
        )
        .await?;

        tx.commit().await?;

        Ok(StartOutcome {
            execution_id: execution_id.to_string(),
            step_name: first.phase.clone(),
            agent_name: first.agent.clone(),
            workflow_state: ExecutionState::Running,
            new_token: token,
        })
    }

    /// Complete the step bound to `token`, advance to the next phase, and
    /// issue the next token (or complete the execution).
    #[instrument(skip(self, token, output, definition), fields(workflow = %definition.name))]
    pub async fn next_step(
        &self,
        token: &str,
        output: &StepOutput,
        definition: &WorkflowDefinition,
    ) -> Result<AdvanceOutcome, EngineError> {
        // Validation gate: no write transaction is opened until the token and
        // the execution's current step line up.
        // Every validate() failure (malformed, schema, future-issued, or
        // past the TTL) is recorded as token_expired
        let payload = match self.codec.validate(token) {
            Ok(payload) => payload,
            Err(e) => {
                self.telemetry
                    .record(
                        NewEvent::new(EventType::TokenExpired).metadata(serde_json::json!({
                            "type": "token_rejected",
                            "error": e.to_string(),
                        })),
                    )
                    .await;
                return Err(e.into());
            }
        };

        let execution = execution_store::get(self.db.reader(), &payload.execution_id).await?;
        let Some(execution) = execution else {
            self.telemetry
                .record(NewEvent::new(EventType::Error).metadata(serde_json::json!({
                    "type": "execution_not_found",
                    "execution_id": payload.execution_id,
                })))
                .await;
            return Err(EngineError::ExecutionNotFound(payload.execution_id));
        };
        let state = execution.state()?;

        // Single-use enforcement: once current_step advances, every earlier
        // token for this execution stops matching here.
        if execution.current_step.as_deref() != Some(payload.step_name.as_str()) {
            let current = execution.current_step.clone().unwrap_or_else(|| "<none>".to_string());
            self.telemetry
                .record(
                    NewEvent::new(EventType::Error)
                        .execution(&payload.execution_id)
                        .step(&payload.step_name)
                        .metadata(serde_json::json!({
                            "type": "token_step_mismatch",
                            "token_step": payload.step_name,
                            "current_step": current,
                        })),
                )
                .await;
            return Err(EngineError::TokenStepMismatch {
                token_step: payload.step_name,
                current,
            });
        }

        if state != ExecutionState::Running {
            return Err(EngineError::InvalidStepStatus {
                step_name: payload.step_name,
                found: format!("execution {}", state),
            });
        }

        self.telemetry
            .record(
                NewEvent::new(EventType::TokenValidated)
                    .execution(&payload.execution_id)
                    .step(&payload.step_name),
            )
            .await;

        let result = self
            .advance_in_tx(&payload.execution_id, &payload.step_name, output, definition)
            .await;

        match result {
            Ok(TxOutcome { outcome, events }) => {
                self.telemetry.record_all(events).await;
                self.persist_suggested_findings(&payload.execution_id, output).await;
                Ok(outcome)
            }
            Err(e) => {
                self.telemetry
                    .record(
                        NewEvent::new(EventType::StepFailed)
                            .execution(&payload.execution_id)
                            .step(&payload.step_name)
                            .metadata(serde_json::json!({ "error": e.to_string() })),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn advance_in_tx(
        &self,
        execution_id: &str,
        step_name: &str,
        output: &StepOutput,
        definition: &WorkflowDefinition,
    ) -> Result<TxOutcome, EngineError> {
        let now = now_ms();
        let mut tx = self.db.begin().await?;

        let step = step_store::get(&mut *tx, execution_id, step_name)
            .await?
            .ok_or_else(|| EngineError::StepNotFound(step_name.to_string()))?;
        let status = step.status()?;
        if status != baton_core::StepStatus::Running {
            return Err(EngineError::InvalidStepStatus {
                step_name: step_name.to_string(),
                found: status.to_string(),
            });
        }

        let duration_ms = now - step.started_at;
        let output_json = serde_json::to_value(output)?;
        step_store::complete(&mut *tx, step.id, &output_json, now, duration_ms).await?;

        // The completed step must be a phase of the supplied definition; a
        // mismatched definition aborts here and the step update above rolls
        // back with the transaction.
        if definition.phase(step_name).is_none() {
            return Err(EngineError::PhaseMismatch {
                workflow: definition.name.clone(),
                step: step_name.to_string(),
            });
        }

        let mut events = vec![NewEvent::new(EventType::StepCompleted)
            .execution(execution_id)
            .step(step_name)
            .agent(&step.agent_name)
            .metadata(serde_json::json!({ "duration_ms": duration_ms }))];
        for artifact in &output.artifacts {
            events.push(
                NewEvent::new(EventType::ArtifactStored)
                    .execution(execution_id)
                    .step(step_name)
                    .metadata(serde_json::json!({ "artifact": artifact })),
            );
        }

        let outcome = match definition.next_phase(step_name) {
            Some(next) => {
                let next_id = step_store::insert_running(
                    &mut *tx,
                    execution_id,
                    &next.phase,
                    &next.agent,
                    now,
                )
                .await?;
                let token = self.codec.generate(execution_id, &next.phase)?;
                step_store::set_token(&mut *tx, next_id, &token).await?;

                let execution = execution_store::get(&mut *tx, execution_id)
                    .await?
                    .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
                execution_store::apply_state(
                    &mut *tx,
                    execution_id,
                    &build_update(
                        ExecutionState::Running,
                        Some(next.phase.clone()),
                        execution.started_at,
                        now,
                    ),
                    now,
                )
                .await?;

                events.push(
                    NewEvent::new(EventType::StepStarted)
                        .execution(execution_id)
                        .step(&next.phase)
                        .agent(&next.agent),
                );
                events.push(
                    NewEvent::new(EventType::TokenGenerated)
                        .execution(execution_id)
                        .step(&next.phase),
                );

                AdvanceOutcome::Continued {
                    execution_id: execution_id.to_string(),
                    step_name: next.phase.clone(),
                    agent_name: next.agent.clone(),
                    workflow_state: ExecutionState::Running,
                    new_token: token,
                }
            }
            None => {
                let counts = step_store::counts(&mut *tx, execution_id).await?;
                let execution = execution_store::get(&mut *tx, execution_id)
                    .await?
                    .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
                execution_store::apply_state(
                    &mut *tx,
                    execution_id,
                    &build_update(ExecutionState::Completed, None, execution.started_at, now),
                    now,
                )
                .await?;

                events.push(
                    NewEvent::new(EventType::WorkflowCompleted)
                        .execution(execution_id)
                        .metadata(serde_json::json!({ "total_steps": counts.total })),
                );

                AdvanceOutcome::Completed {
                    execution_id: execution_id.to_string(),
                    workflow_state: ExecutionState::Completed,
                    total_steps: counts.total,
                    message: "Workflow completed successfully".to_string(),
                }
            }
        };

        tx.commit().await?;
        Ok(TxOutcome { outcome, events })
    }

    /// Insert structured findings suggested in the output envelope. Failures
    /// are logged and never fail the advance that carried them.
    async fn persist_suggested_findings(&self, execution_id: &str, output: &StepOutput) {
        for suggestion in &output.suggested_findings {
            let mut finding = suggestion.clone();
            finding.source_execution_id = Some(execution_id.to_string());
            match knowledge_store::insert(self.db.writer(), &finding, now_ms()).await {
                Ok(id) => info!(%execution_id, finding = id, "stored suggested finding"),
                Err(e) => {
                    warn!(%execution_id, "failed to store suggested finding: {}", e);
                }
            }
        }
    }

    /// Store an immutable artifact for a step and record its telemetry event
    pub async fn store_artifact(
        &self,
        execution_id: &str,
        step_name: &str,
        input: &ArtifactInput,
    ) -> Result<i64, EngineError> {
        execution_store::get(self.db.reader(), execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;

        let id =
            artifact_store::insert(self.db.writer(), execution_id, step_name, input, now_ms())
                .await?;

        self.telemetry
            .record(
                NewEvent::new(EventType::ArtifactStored)
                    .execution(execution_id)
                    .step(step_name)
                    .metadata(serde_json::json!({ "artifact_id": id, "name": input.name })),
            )
            .await;

        Ok(id)
    }
}
