// Engine for the baton orchestrator
//
// The state machine owns execution lifecycle; the step executor advances
// workflows one continuation at a time, transactionally. Neither component
// performs any agent work: callers carry the baton.

pub mod error;
pub mod executor;
pub mod state_machine;
pub mod sweeper;
pub mod telemetry;

pub use error::EngineError;
pub use executor::{AdvanceOutcome, StartOutcome, StepExecutor};
pub use state_machine::{allowed_transitions, check_transition, StateMachine};
pub use sweeper::TimeoutSweeper;
pub use telemetry::TelemetryRecorder;
