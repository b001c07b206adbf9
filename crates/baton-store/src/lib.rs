// Durable store for the baton orchestrator
//
// One SQLite file holds executions, steps, artifacts, telemetry, knowledge
// findings, and projects. Writes serialize through a single-connection pool;
// the schema is owned by the versioned migration sequence in `migrations`.

pub mod artifact_store;
pub mod db;
pub mod error;
pub mod execution_store;
pub mod knowledge_store;
pub mod migrations;
pub mod models;
pub mod project_store;
pub mod step_store;
pub mod telemetry_store;

pub use db::{now_ms, Database};
pub use error::StoreError;
