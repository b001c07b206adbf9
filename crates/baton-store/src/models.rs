// Database row types (internal, may differ from public DTOs)
//
// Timestamps are stored as integer epoch milliseconds; JSON blobs are stored
// as TEXT. Rows decode into the baton-core value types on the way out.

use baton_core::{
    Artifact, ArtifactType, ContentType, Execution, ExecutionState, FindingCategory,
    FindingScope, FindingStatus, KnowledgeFinding, Project, Severity, Step, StepStatus,
    TelemetryEvent,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::error::StoreError;

/// Decode an epoch-milliseconds column
fn ts(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn opt_ts(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(ts)
}

/// Decode an optional JSON TEXT column
fn opt_json(raw: Option<String>) -> Result<Option<serde_json::Value>, StoreError> {
    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(StoreError::from)
}

fn parse<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

/// Execution row from the database
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub execution_id: String,
    pub workflow_name: String,
    pub state: String,
    pub current_step: Option<String>,
    pub started_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub metadata: Option<String>,
}

impl ExecutionRow {
    pub fn state(&self) -> Result<ExecutionState, StoreError> {
        parse(&self.state)
    }

    pub fn into_model(self) -> Result<Execution, StoreError> {
        Ok(Execution {
            state: parse(&self.state)?,
            metadata: opt_json(self.metadata)?,
            execution_id: self.execution_id,
            workflow_name: self.workflow_name,
            current_step: self.current_step,
            started_at: ts(self.started_at),
            updated_at: ts(self.updated_at),
            completed_at: opt_ts(self.completed_at),
            duration_ms: self.duration_ms,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Step row from the database
#[derive(Debug, Clone, FromRow)]
pub struct StepRow {
    pub id: i64,
    pub execution_id: String,
    pub step_name: String,
    pub agent_name: String,
    pub status: String,
    pub started_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub output: Option<String>,
    pub token: Option<String>,
}

impl StepRow {
    pub fn status(&self) -> Result<StepStatus, StoreError> {
        parse(&self.status)
    }

    pub fn into_model(self) -> Result<Step, StoreError> {
        Ok(Step {
            status: parse(&self.status)?,
            output: opt_json(self.output)?,
            id: self.id,
            execution_id: self.execution_id,
            step_name: self.step_name,
            agent_name: self.agent_name,
            started_at: ts(self.started_at),
            completed_at: opt_ts(self.completed_at),
            duration_ms: self.duration_ms,
        })
    }
}

/// Artifact row including content
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub id: i64,
    pub execution_id: String,
    pub step_name: String,
    pub artifact_type: String,
    pub name: String,
    pub content: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub metadata: Option<String>,
    pub created_at: i64,
}

impl ArtifactRow {
    pub fn into_model(self) -> Result<(Artifact, String), StoreError> {
        let artifact = Artifact {
            artifact_type: parse::<ArtifactType>(&self.artifact_type)?,
            content_type: parse::<ContentType>(&self.content_type)?,
            metadata: opt_json(self.metadata)?,
            id: self.id,
            execution_id: self.execution_id,
            step_name: self.step_name,
            name: self.name,
            size_bytes: self.size_bytes,
            created_at: ts(self.created_at),
        };
        Ok((artifact, self.content))
    }
}

/// Artifact listing row (content deliberately not selected)
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactSummaryRow {
    pub id: i64,
    pub execution_id: String,
    pub step_name: String,
    pub artifact_type: String,
    pub name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub metadata: Option<String>,
    pub created_at: i64,
}

impl ArtifactSummaryRow {
    pub fn into_model(self) -> Result<Artifact, StoreError> {
        Ok(Artifact {
            artifact_type: parse::<ArtifactType>(&self.artifact_type)?,
            content_type: parse::<ContentType>(&self.content_type)?,
            metadata: opt_json(self.metadata)?,
            id: self.id,
            execution_id: self.execution_id,
            step_name: self.step_name,
            name: self.name,
            size_bytes: self.size_bytes,
            created_at: ts(self.created_at),
        })
    }
}

/// Telemetry row from the database
#[derive(Debug, Clone, FromRow)]
pub struct TelemetryRow {
    pub id: i64,
    pub event_type: String,
    pub execution_id: Option<String>,
    pub step_name: Option<String>,
    pub agent_name: Option<String>,
    pub metadata: Option<String>,
    pub created_at: i64,
}

impl TelemetryRow {
    pub fn into_model(self) -> Result<TelemetryEvent, StoreError> {
        Ok(TelemetryEvent {
            metadata: opt_json(self.metadata)?,
            id: self.id,
            event_type: self.event_type,
            execution_id: self.execution_id,
            step_name: self.step_name,
            agent_name: self.agent_name,
            created_at: ts(self.created_at),
        })
    }
}

/// Knowledge finding row from the database
#[derive(Debug, Clone, FromRow)]
pub struct FindingRow {
    pub id: i64,
    pub scope: String,
    pub project_id: Option<i64>,
    pub category: String,
    pub severity: String,
    pub status: String,
    pub title: String,
    pub content: String,
    pub tags: Option<String>,
    pub source_execution_id: Option<String>,
    pub source_agent: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FindingRow {
    pub fn into_model(self) -> Result<KnowledgeFinding, StoreError> {
        let tags: Vec<String> = match self.tags {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        Ok(KnowledgeFinding {
            scope: parse::<FindingScope>(&self.scope)?,
            category: parse::<FindingCategory>(&self.category)?,
            severity: parse::<Severity>(&self.severity)?,
            status: parse::<FindingStatus>(&self.status)?,
            tags,
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            content: self.content,
            source_execution_id: self.source_execution_id,
            source_agent: self.source_agent,
            created_at: ts(self.created_at),
            updated_at: ts(self.updated_at),
        })
    }
}

/// Project row from the database
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub is_git_repo: bool,
    pub metadata: Option<String>,
    pub discovered_at: i64,
    pub last_used_at: i64,
}

impl ProjectRow {
    pub fn into_model(self) -> Result<Project, StoreError> {
        Ok(Project {
            metadata: opt_json(self.metadata)?,
            id: self.id,
            name: self.name,
            path: self.path,
            is_git_repo: self.is_git_repo,
            discovered_at: ts(self.discovered_at),
            last_used_at: ts(self.last_used_at),
        })
    }
}

/// Step counts grouped by status for one execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounts {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}
