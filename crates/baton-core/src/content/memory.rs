// In-memory content provider, primarily for tests

use std::collections::HashMap;

use async_trait::async_trait;

use super::{ContentError, ContentProvider};
use crate::definition::{AgentDefinition, WorkflowDefinition, WorkflowSummary};

/// In-memory implementation of ContentProvider
///
/// Holds definitions in maps and never fails. Doubles as the workflow source
/// in unit and integration tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentProvider {
    workflows: HashMap<String, WorkflowDefinition>,
    agents: HashMap<String, AgentDefinition>,
}

impl MemoryContentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow(mut self, definition: WorkflowDefinition) -> Self {
        self.workflows.insert(definition.name.clone(), definition);
        self
    }

    pub fn with_agent(mut self, agent: AgentDefinition) -> Self {
        self.agents.insert(agent.name.clone(), agent);
        self
    }

    pub fn insert_workflow(&mut self, definition: WorkflowDefinition) {
        self.workflows.insert(definition.name.clone(), definition);
    }

    pub fn insert_agent(&mut self, agent: AgentDefinition) {
        self.agents.insert(agent.name.clone(), agent);
    }
}

#[async_trait]
impl ContentProvider for MemoryContentProvider {
    async fn get_workflow(&self, name: &str) -> Result<Option<WorkflowDefinition>, ContentError> {
        Ok(self.workflows.get(name).cloned())
    }

    async fn get_agent(&self, name: &str) -> Result<Option<AgentDefinition>, ContentError> {
        Ok(self.agents.get(name).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, ContentError> {
        let mut summaries: Vec<_> = self.workflows.values().map(|w| w.summary()).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}
