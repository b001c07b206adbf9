// Filesystem-backed content provider
//
// Layout under the content root:
//   workflows/<name>.json   serde-parsed WorkflowDefinition
//   agents/<name>.md        persona text; first "# " heading is the description

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use super::{ContentError, ContentProvider};
use crate::definition::{AgentDefinition, WorkflowDefinition, WorkflowSummary};

/// Filesystem implementation of ContentProvider
#[derive(Debug, Clone)]
pub struct FsContentProvider {
    root: PathBuf,
}

impl FsContentProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workflow_path(&self, name: &str) -> PathBuf {
        self.root.join("workflows").join(format!("{}.json", name))
    }

    fn agent_path(&self, name: &str) -> PathBuf {
        self.root.join("agents").join(format!("{}.md", name))
    }
}

/// Extract a one-line description from a persona document: the first
/// "# " heading, stripped, else the first non-empty line.
fn markdown_description(body: &str) -> String {
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        return trimmed.trim_start_matches('#').trim().to_string();
    }
    String::new()
}

#[async_trait]
impl ContentProvider for FsContentProvider {
    async fn get_workflow(&self, name: &str) -> Result<Option<WorkflowDefinition>, ContentError> {
        let path = self.workflow_path(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let definition: WorkflowDefinition =
            serde_json::from_str(&raw).map_err(|e| ContentError::Parse {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(definition))
    }

    async fn get_agent(&self, name: &str) -> Result<Option<AgentDefinition>, ContentError> {
        let path = self.agent_path(name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(AgentDefinition {
            name: name.to_string(),
            description: markdown_description(&content),
            content,
        }))
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowSummary>, ContentError> {
        let dir = self.root.join("workflows");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.get_workflow(stem).await {
                Ok(Some(definition)) => summaries.push(definition.summary()),
                Ok(None) => {}
                // A single broken file must not hide the rest of the catalog
                Err(e) => warn!(workflow = stem, "skipping unparseable definition: {}", e),
            }
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }
}
