// baton-server: the caller-facing surface of the orchestrator
//
// Two write tools (workflow.start, workflow.next_step, plus the
// administrative workflow.control) and a set of read resources are exposed
// over a newline-delimited JSON transport on stdin/stdout. All handler
// results are JSON values; errors are structured payloads, never panics.

pub mod config;
pub mod resources;
pub mod rpc;
pub mod tools;

use std::sync::Arc;

use baton_core::{ContentProvider, TokenCodec};
use baton_engine::{StateMachine, StepExecutor, TelemetryRecorder, TimeoutSweeper};
use baton_store::Database;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub provider: Arc<dyn ContentProvider>,
    pub codec: TokenCodec,
    pub telemetry: TelemetryRecorder,
    pub executor: StepExecutor,
    pub state_machine: StateMachine,
    pub sweeper: TimeoutSweeper,
}

impl AppState {
    pub fn new(db: Database, provider: Arc<dyn ContentProvider>) -> Self {
        let telemetry = TelemetryRecorder::new(db.clone());
        Self {
            executor: StepExecutor::new(db.clone(), telemetry.clone()),
            state_machine: StateMachine::new(db.clone(), telemetry.clone()),
            sweeper: TimeoutSweeper::new(db.clone(), telemetry.clone()),
            codec: TokenCodec::new(),
            telemetry,
            provider,
            db,
        }
    }
}
