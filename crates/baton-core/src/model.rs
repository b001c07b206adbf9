// Execution, step, artifact, telemetry, and knowledge value types
//
// These are the public shapes shared by the engine, the store, and the
// tool/resource surface. Database row types live in baton-store and are
// converted into these on the way out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created but not yet started
    Idle,

    /// A step is in flight (a continuation token is outstanding)
    Running,

    /// Suspended by an administrative transition
    Paused,

    /// All phases completed
    Completed,

    /// Terminal failure
    Failed,

    /// Cancelled by the caller
    Abandoned,

    /// Caller went off-script; execution can no longer be advanced
    Diverged,
}

impl ExecutionState {
    /// Terminal states admit no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Abandoned | Self::Diverged
        )
    }

    /// All states, for exhaustive transition checks in tests
    pub const ALL: [ExecutionState; 7] = [
        Self::Idle,
        Self::Running,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Abandoned,
        Self::Diverged,
    ];
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::Diverged => write!(f, "diverged"),
        }
    }
}

impl std::str::FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            "diverged" => Ok(Self::Diverged),
            _ => Err(format!("Unknown execution state: {}", s)),
        }
    }
}

/// Status of a single step row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown step status: {}", s)),
        }
    }
}

/// Kind of artifact produced during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    File,
    Data,
    Report,
    Finding,
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Data => write!(f, "data"),
            Self::Report => write!(f, "report"),
            Self::Finding => write!(f, "finding"),
        }
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "data" => Ok(Self::Data),
            "report" => Ok(Self::Report),
            "finding" => Ok(Self::Finding),
            _ => Err(format!("Unknown artifact type: {}", s)),
        }
    }
}

/// Encoding of artifact content. Binary payloads are stored base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Markdown,
    Json,
    Binary,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "binary" => Ok(Self::Binary),
            _ => Err(format!("Unknown content type: {}", s)),
        }
    }
}

/// Recognized telemetry event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowCreated,
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowStateTransition,
    StepStarted,
    StepCompleted,
    StepFailed,
    TokenGenerated,
    TokenValidated,
    TokenExpired,
    ArtifactStored,
    Error,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WorkflowCreated => "workflow_created",
            Self::WorkflowStarted => "workflow_started",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::WorkflowStateTransition => "workflow_state_transition",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepFailed => "step_failed",
            Self::TokenGenerated => "token_generated",
            Self::TokenValidated => "token_validated",
            Self::TokenExpired => "token_expired",
            Self::ArtifactStored => "artifact_stored",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Visibility scope of a knowledge finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingScope {
    Global,
    Project,
    System,
}

impl std::fmt::Display for FindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Project => write!(f, "project"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for FindingScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Self::Global),
            "project" => Ok(Self::Project),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown finding scope: {}", s)),
        }
    }
}

/// Category of a knowledge finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Security,
    Architecture,
    Performance,
    Constraint,
    Pattern,
}

impl std::fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Security => write!(f, "security"),
            Self::Architecture => write!(f, "architecture"),
            Self::Performance => write!(f, "performance"),
            Self::Constraint => write!(f, "constraint"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

impl std::str::FromStr for FindingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "security" => Ok(Self::Security),
            "architecture" => Ok(Self::Architecture),
            "performance" => Ok(Self::Performance),
            "constraint" => Ok(Self::Constraint),
            "pattern" => Ok(Self::Pattern),
            _ => Err(format!("Unknown finding category: {}", s)),
        }
    }
}

/// Severity of a knowledge finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric rank used for ORDER BY severity DESC
    pub fn rank(&self) -> i64 {
        match self {
            Self::Info => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// Active/deprecated flag on a knowledge finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Active,
    Deprecated,
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Deprecated => write!(f, "deprecated"),
        }
    }
}

impl std::str::FromStr for FindingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(format!("Unknown finding status: {}", s)),
        }
    }
}

/// One workflow invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub workflow_name: String,
    pub state: ExecutionState,
    /// Set iff state is running or paused
    pub current_step: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Runtime realization of a phase within one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub execution_id: String,
    pub step_name: String,
    pub agent_name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub output: Option<serde_json::Value>,
}

/// Immutable output produced during a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub execution_id: String,
    pub step_name: String,
    pub artifact_type: ArtifactType,
    pub name: String,
    pub content_type: ContentType,
    pub size_bytes: i64,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Input for storing an artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInput {
    pub artifact_type: ArtifactType,
    pub name: String,
    pub content: String,
    pub content_type: ContentType,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Append-only observability event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: i64,
    pub event_type: String,
    pub execution_id: Option<String>,
    pub step_name: Option<String>,
    pub agent_name: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Persistent cross-execution insight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFinding {
    pub id: i64,
    pub scope: FindingScope,
    pub project_id: Option<i64>,
    pub category: FindingCategory,
    pub severity: Severity,
    pub status: FindingStatus,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source_execution_id: Option<String>,
    pub source_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a knowledge finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFindingInput {
    pub scope: FindingScope,
    #[serde(default)]
    pub project_id: Option<i64>,
    pub category: FindingCategory,
    pub severity: Severity,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_execution_id: Option<String>,
    #[serde(default)]
    pub source_agent: Option<String>,
}

/// Discovered code repository associated with executions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub is_git_repo: bool,
    pub metadata: Option<serde_json::Value>,
    pub discovered_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Output envelope the caller returns with a continuation token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    /// What the caller did for this step (required)
    pub summary: String,

    /// Identifiers of artifacts produced during the step
    #[serde(default)]
    pub artifacts: Vec<String>,

    /// Free-form finding notes
    #[serde(default)]
    pub findings: Vec<String>,

    /// Caller's hint for what should happen next (informational)
    #[serde(default)]
    pub next_step_recommendation: Option<String>,

    /// Structured findings to persist into the knowledge store
    #[serde(default)]
    pub suggested_findings: Vec<KnowledgeFindingInput>,
}

impl StepOutput {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            artifacts: Vec::new(),
            findings: Vec::new(),
            next_step_recommendation: None,
            suggested_findings: Vec::new(),
        }
    }
}
