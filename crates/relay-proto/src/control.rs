//! Control-surface request/response types: the mutable status handle,
//! health probe, kill/pause/checkpoint shapes, and decision resolution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::brief::AgentBrief;
use crate::event::{ActionKind, AgentStatus};

/// Mutable status projection for the active run.
///
/// Replaced wholesale (never field-mutated) on every status transition
/// so concurrent health probes never observe a torn handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentHandle {
    pub id: String,
    pub plugin_name: String,
    pub status: AgentStatus,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_brief_changes: Option<serde_json::Map<String, Value>>,
}

impl AgentHandle {
    pub fn new(
        id: impl Into<String>,
        plugin_name: impl Into<String>,
        status: AgentStatus,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            plugin_name: plugin_name.into(),
            status,
            session_id: session_id.into(),
            pending_brief_changes: None,
        }
    }

    /// A copy of this handle with a different status.
    pub fn with_status(&self, status: AgentStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResourceUsage {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_mb: f64,
    #[serde(default)]
    pub disk_mb: f64,
    pub collected_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub agent_status: AgentStatus,
    pub uptime_ms: u64,
    pub resource_usage: SandboxResourceUsage,
    #[serde(default)]
    pub pending_event_buffer_size: usize,
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// Opaque per-backend checkpoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkCheckpoint {
    pub sdk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_state_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_snapshot: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_position: Option<u64>,
}

impl SdkCheckpoint {
    pub fn for_session(sdk: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            sdk: sdk.into(),
            run_state_json: None,
            session_id: Some(session_id.into()),
            last_message_id: None,
            state_snapshot: None,
            script_position: None,
        }
    }

    pub fn at_position(sdk: impl Into<String>, position: u64) -> Self {
        Self {
            sdk: sdk.into(),
            run_state_json: None,
            session_id: None,
            last_message_id: None,
            state_snapshot: None,
            script_position: Some(position),
        }
    }
}

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializeReason {
    Pause,
    KillGrace,
    CrashRecovery,
    DecisionCheckpoint,
}

/// Point-in-time snapshot sufficient to resume a run under a fresh
/// runner instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedAgentState {
    pub agent_id: String,
    pub plugin_name: String,
    pub session_id: String,
    pub checkpoint: SdkCheckpoint,
    pub brief_snapshot: AgentBrief,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,
    #[serde(default)]
    pub pending_decision_ids: Vec<String>,
    pub last_sequence: u64,
    pub serialized_at: String,
    pub serialized_by: SerializeReason,
    pub estimated_size_bytes: u64,
}

// ---------------------------------------------------------------------------
// Kill / resolve
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillRequest {
    #[serde(default = "default_true")]
    pub grace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_timeout_ms: Option<u64>,
}

impl Default for KillRequest {
    fn default() -> Self {
        Self {
            grace: true,
            grace_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillResponse {
    pub state: Option<SerializedAgentState>,
    #[serde(default)]
    pub artifacts_extracted: u32,
    #[serde(default = "default_true")]
    pub clean_shutdown: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Modify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDecisionResolution {
    pub chosen_option_id: String,
    pub rationale: String,
    pub action_kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolApprovalResolution {
    pub action: ApprovalAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_args: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub always_approve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub action_kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionResolution {
    #[serde(rename = "option")]
    OptionChoice(OptionDecisionResolution),
    ToolApproval(ToolApprovalResolution),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub decision_id: String,
    pub resolution: DecisionResolution,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handle_with_status_replaces_wholesale() {
        let handle = AgentHandle::new("agent-1", "openai-codex", AgentStatus::Running, "sess-1");
        let paused = handle.with_status(AgentStatus::Paused);
        assert_eq!(paused.status, AgentStatus::Paused);
        assert_eq!(paused.session_id, "sess-1");
        assert_eq!(handle.status, AgentStatus::Running, "original untouched");
    }

    #[test]
    fn kill_request_defaults_to_graceful() {
        let request: KillRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.grace);
        assert!(request.grace_timeout_ms.is_none());
    }

    #[test]
    fn kill_response_wire_shape() {
        let response = KillResponse {
            state: None,
            artifacts_extracted: 0,
            clean_shutdown: false,
        };
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["cleanShutdown"], false);
        assert_eq!(v["artifactsExtracted"], 0);
        assert_eq!(v["state"], Value::Null);
    }

    #[test]
    fn resolve_request_parses_tool_approval() {
        let v = json!({
            "decisionId": "dec-1",
            "resolution": {
                "type": "tool_approval",
                "action": "approve",
                "actionKind": "update"
            }
        });
        let request: ResolveRequest = serde_json::from_value(v).unwrap();
        assert_eq!(request.decision_id, "dec-1");
        match request.resolution {
            DecisionResolution::ToolApproval(r) => {
                assert_eq!(r.action, ApprovalAction::Approve);
            }
            other => panic!("expected tool_approval, got {other:?}"),
        }
    }

    #[test]
    fn resolve_request_parses_option_choice() {
        let v = json!({
            "decisionId": "dec-2",
            "resolution": {
                "type": "option",
                "chosenOptionId": "opt-a",
                "rationale": "lowest risk",
                "actionKind": "create"
            }
        });
        let request: ResolveRequest = serde_json::from_value(v).unwrap();
        match request.resolution {
            DecisionResolution::OptionChoice(r) => assert_eq!(r.chosen_option_id, "opt-a"),
            other => panic!("expected option, got {other:?}"),
        }
    }

    #[test]
    fn serialized_state_round_trips() {
        let state = SerializedAgentState {
            agent_id: "agent-1".to_string(),
            plugin_name: "openai-codex".to_string(),
            session_id: "sess-1".to_string(),
            checkpoint: SdkCheckpoint::for_session("codex", "sess-1"),
            brief_snapshot: crate::brief::tests::minimal_brief(),
            conversation_summary: None,
            pending_decision_ids: vec!["dec-1".to_string()],
            last_sequence: 12,
            serialized_at: "2025-06-01T00:00:00Z".to_string(),
            serialized_by: SerializeReason::Pause,
            estimated_size_bytes: 512,
        };

        let wire = serde_json::to_string(&state).unwrap();
        assert!(wire.contains("\"serializedBy\":\"pause\""));
        let back: SerializedAgentState = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, state);
    }
}
