// Content provider seam
//
// The orchestrator loads workflow and agent definitions through this trait
// and treats the backing source as opaque. Two implementations ship:
// a filesystem provider for real deployments and an in-memory provider used
// as the test double.

mod filesystem;
mod memory;

pub use filesystem::FsContentProvider;
pub use memory::MemoryContentProvider;

use async_trait::async_trait;
use thiserror::Error;

use crate::definition::{AgentDefinition, WorkflowDefinition, WorkflowSummary};

/// Errors from loading definitions
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse definition '{name}': {message}")]
    Parse { name: String, message: String },
}

/// Source of workflow and agent definitions
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Load a workflow definition by name, or None if unknown
    async fn get_workflow(&self, name: &str) -> Result<Option<WorkflowDefinition>, ContentError>;

    /// Load an agent persona by name, or None if unknown
    async fn get_agent(&self, name: &str) -> Result<Option<AgentDefinition>, ContentError>;

    /// Summaries of every available workflow
    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, ContentError>;
}
