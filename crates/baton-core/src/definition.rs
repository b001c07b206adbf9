// Workflow and agent definitions
//
// Definitions are loaded through a ContentProvider and never mutated by the
// orchestrator. Phases are a linear sequence; dependsOn only refines which
// phase is eligible to start first.

use serde::{Deserialize, Serialize};

/// Declared complexity of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    High,
}

impl Default for Complexity {
    fn default() -> Self {
        Self::Moderate
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One declarative element of a workflow: a step name bound to an agent persona
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Step name this phase produces when entered
    pub phase: String,

    /// Agent persona that performs the step's work
    pub agent: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Name of the phase this one depends on. A phase without dependsOn is
    /// eligible to be the first phase.
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Option<String>,
}

/// A loaded workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub complexity: Complexity,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    pub phases: Vec<Phase>,
}

impl WorkflowDefinition {
    /// The phase an execution enters on start: the first phase in declaration
    /// order that has no dependency. Sibling candidates (same dependsOn key)
    /// are always picked in declaration order.
    pub fn first_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.depends_on.is_none())
    }

    /// Look up a phase by step name
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.phase == name)
    }

    /// Sequential v1 progression: the phase after `current` in declaration
    /// order, or None when `current` is the last phase.
    pub fn next_phase(&self, current: &str) -> Option<&Phase> {
        let idx = self.phases.iter().position(|p| p.phase == current)?;
        self.phases.get(idx + 1)
    }

    /// Total number of phases (the N in "i/N" progress strings)
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// 1-based position of a step name, for progress reporting
    pub fn phase_index(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.phase == name).map(|i| i + 1)
    }

    /// A definition is startable when it has at least one phase and at least
    /// one of them carries no dependency.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("workflow name must be non-empty".to_string());
        }
        if self.phases.is_empty() {
            return Err(format!("workflow '{}' has no phases", self.name));
        }
        if self.first_phase().is_none() {
            return Err(format!(
                "workflow '{}' has no phase without dependsOn; nothing can start",
                self.name
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            complexity: self.complexity,
            tags: self.tags.clone(),
            phases: self.phases.clone(),
        }
    }
}

/// Listing-level view of a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub complexity: Complexity,
    pub tags: Vec<String>,
    pub phases: Vec<Phase>,
}

/// A named agent persona: the prompt text handed to the external caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub description: String,
    /// Full persona text the caller consumes to perform a step
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "demo".to_string(),
            description: "two-phase demo".to_string(),
            complexity: Complexity::Simple,
            tags: vec![],
            keywords: vec![],
            phases: vec![
                Phase {
                    phase: "plan".to_string(),
                    agent: "planner".to_string(),
                    description: None,
                    depends_on: None,
                },
                Phase {
                    phase: "build".to_string(),
                    agent: "builder".to_string(),
                    description: None,
                    depends_on: Some("plan".to_string()),
                },
            ],
        }
    }

    #[test]
    fn first_phase_is_first_without_dependency() {
        let def = demo();
        assert_eq!(def.first_phase().unwrap().phase, "plan");
    }

    #[test]
    fn next_phase_follows_declaration_order() {
        let def = demo();
        assert_eq!(def.next_phase("plan").unwrap().phase, "build");
        assert!(def.next_phase("build").is_none());
        assert!(def.next_phase("nope").is_none());
    }

    #[test]
    fn siblings_resolve_in_declaration_order() {
        let mut def = demo();
        def.phases.push(Phase {
            phase: "verify".to_string(),
            agent: "verifier".to_string(),
            description: None,
            depends_on: Some("plan".to_string()),
        });
        // "build" and "verify" both depend on "plan"; progression stays
        // positional, so "plan" advances to "build".
        assert_eq!(def.next_phase("plan").unwrap().phase, "build");
        assert_eq!(def.next_phase("build").unwrap().phase, "verify");
    }

    #[test]
    fn validate_rejects_empty_and_unstartable() {
        let mut def = demo();
        def.phases.clear();
        assert!(def.validate().is_err());

        let mut def = demo();
        for p in &mut def.phases {
            p.depends_on = Some("elsewhere".to_string());
        }
        assert!(def.validate().is_err());

        assert!(demo().validate().is_ok());
    }

    #[test]
    fn depends_on_uses_camel_case_wire_name() {
        let json = r#"{"phase":"build","agent":"builder","dependsOn":"plan"}"#;
        let phase: Phase = serde_json::from_str(json).unwrap();
        assert_eq!(phase.depends_on.as_deref(), Some("plan"));
    }
}
