//! The task brief supplied by the orchestrator when starting a run.
//!
//! A brief is immutable once created: it is embedded verbatim inside
//! serialized checkpoints so a resumed run sees exactly the assignment
//! the original run was given. The provider-config bag is opaque and
//! passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{AgentStatus, ArtifactKind, ArtifactStatus, Severity};

/// Nested project description inside a brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBrief {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub goals: Vec<String>,
    #[serde(default)]
    pub checkpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkstreamSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub active_agent_ids: Vec<String>,
    #[serde(default)]
    pub artifact_count: u32,
    #[serde(default)]
    pub pending_decision_count: u32,
    #[serde(default)]
    pub recent_activity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Option,
    ToolApproval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSummary {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub agent_id: String,
    pub subtype: DecisionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: String,
    pub name: String,
    pub kind: ArtifactKind,
    pub status: ArtifactStatus,
    pub workstream: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: String,
    pub role: String,
    pub workstream: String,
    pub status: AgentStatus,
    pub plugin_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_preference: Option<String>,
}

/// Point-in-time view of the surrounding project knowledge, used to
/// size and populate the prompt's context section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSnapshot {
    pub version: u32,
    pub generated_at: String,
    #[serde(default)]
    pub workstreams: Vec<WorkstreamSummary>,
    #[serde(default)]
    pub pending_decisions: Vec<DecisionSummary>,
    #[serde(default)]
    pub artifact_index: Vec<ArtifactSummary>,
    #[serde(default)]
    pub active_agents: Vec<AgentSummary>,
    #[serde(default)]
    pub estimated_tokens: u64,
}

/// Immutable task specification for one agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBrief {
    pub agent_id: String,
    pub role: String,
    pub description: String,
    pub workstream: String,
    #[serde(default)]
    pub readable_workstreams: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub project_brief: ProjectBrief,
    pub knowledge_snapshot: KnowledgeSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_preference: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Opaque backend tuning, passed through verbatim and never
    /// destructured by the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionFormat {
    Markdown,
    Json,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPriority {
    Required,
    Recommended,
    Supplementary,
}

/// Context pushed at the adapter mid-run. Accepted and recorded only;
/// applied on a future activation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInjection {
    pub content: String,
    pub format: InjectionFormat,
    pub snapshot_version: u32,
    pub estimated_tokens: u64,
    pub priority: InjectionPriority,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn minimal_brief() -> AgentBrief {
        AgentBrief {
            agent_id: "agent-1".to_string(),
            role: "backend engineer".to_string(),
            description: "Implement the storage layer.".to_string(),
            workstream: "backend".to_string(),
            readable_workstreams: vec![],
            constraints: vec![],
            project_brief: ProjectBrief {
                id: None,
                title: "Widget service".to_string(),
                description: "A service for widgets.".to_string(),
                goals: vec![],
                checkpoints: vec![],
                constraints: None,
            },
            knowledge_snapshot: KnowledgeSnapshot {
                version: 1,
                generated_at: "2025-01-01T00:00:00Z".to_string(),
                workstreams: vec![],
                pending_decisions: vec![],
                artifact_index: vec![],
                active_agents: vec![],
                estimated_tokens: 0,
            },
            model_preference: None,
            allowed_tools: vec![],
            provider_config: None,
        }
    }

    #[test]
    fn brief_round_trips() {
        let mut brief = minimal_brief();
        brief.provider_config =
            Some(json!({"reasoningEffort": "high"}).as_object().unwrap().clone());

        let wire = serde_json::to_string(&brief).unwrap();
        let back: AgentBrief = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, brief);
    }

    #[test]
    fn brief_deserializes_with_camel_case_keys() {
        let v = json!({
            "agentId": "agent-7",
            "role": "reviewer",
            "description": "Review things.",
            "workstream": "qa",
            "projectBrief": {
                "title": "P",
                "description": "D",
                "goals": ["g1"]
            },
            "knowledgeSnapshot": {
                "version": 2,
                "generatedAt": "2025-06-01T00:00:00Z",
                "estimatedTokens": 100
            }
        });

        let brief: AgentBrief = serde_json::from_value(v).unwrap();
        assert_eq!(brief.agent_id, "agent-7");
        assert_eq!(brief.knowledge_snapshot.estimated_tokens, 100);
        assert!(brief.constraints.is_empty());
    }

    #[test]
    fn provider_config_is_preserved_verbatim() {
        let config = json!({"nested": {"a": [1, 2, 3]}, "flag": true});
        let mut brief = minimal_brief();
        brief.provider_config = Some(config.as_object().unwrap().clone());

        let wire = serde_json::to_value(&brief).unwrap();
        assert_eq!(wire["providerConfig"], config);
    }

    #[test]
    fn unknown_brief_fields_are_ignored() {
        let v = json!({
            "agentId": "agent-1",
            "role": "r",
            "description": "d",
            "workstream": "w",
            "escalationProtocol": {"alwaysEscalate": []},
            "projectBrief": {"title": "t", "description": "d", "goals": []},
            "knowledgeSnapshot": {"version": 1, "generatedAt": "2025-01-01T00:00:00Z"}
        });
        let brief: AgentBrief = serde_json::from_value(v).unwrap();
        assert_eq!(brief.agent_id, "agent-1");
    }

    #[test]
    fn context_injection_round_trips() {
        let injection = ContextInjection {
            content: "# Update\nNew constraint.".to_string(),
            format: InjectionFormat::Markdown,
            snapshot_version: 3,
            estimated_tokens: 42,
            priority: InjectionPriority::Recommended,
        };
        let wire = serde_json::to_string(&injection).unwrap();
        let back: ContextInjection = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, injection);
    }
}
