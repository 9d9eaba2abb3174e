//! Codex event mapper -- translates the Codex CLI's NDJSON events into
//! wire protocol [`AgentEvent`] values.
//!
//! The mapper is stateful: it tracks the backend session id, a turn
//! counter, and correlation state pairing each `item.started`
//! notification with its later `item.completed` counterpart. An
//! unmatched completion is a first-class degraded case (fresh tool-call
//! id, no duration), not an error. Well-formed but unrecognised shapes
//! map to no events; the mapper itself never fails.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use relay_proto::event::{
    AgentEvent, ArtifactEvent, ArtifactKind, ArtifactStatus, ErrorCategory, ErrorEvent,
    ProgressEvent, Provenance, Severity, StatusEvent, ToolCallEvent, ToolCallPhase,
};

/// Infer an artifact kind from its file name.
///
/// Test-file name patterns win over extension rules.
pub fn infer_artifact_kind(file_path: &str) -> ArtifactKind {
    let base = Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path);

    if base.contains(".test.") || base.contains(".spec.") || base.starts_with("test_") {
        return ArtifactKind::Test;
    }

    let ext = Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "ts" | "js" | "py" | "rs" | "go" | "java" | "tsx" | "jsx" => ArtifactKind::Code,
        "md" | "txt" | "rst" => ArtifactKind::Document,
        "json" | "yaml" | "yml" | "toml" | "ini" | "cfg" => ArtifactKind::Config,
        _ => ArtifactKind::Other,
    }
}

/// Correlation record for an item that has started but not completed.
struct OpenToolCall {
    tool_call_id: String,
    tool_name: String,
    started_at: Instant,
    file_path: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ItemPhase {
    Started,
    Completed,
}

/// Stateful translator from Codex NDJSON objects to [`AgentEvent`]s.
pub struct CodexEventMapper {
    agent_id: String,
    workstream: String,
    session_id: Option<String>,
    turn_count: u32,
    open_tool_calls: HashMap<String, OpenToolCall>,
}

impl CodexEventMapper {
    pub fn new(agent_id: impl Into<String>, workstream: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            workstream: workstream.into(),
            session_id: None,
            turn_count: 0,
            open_tool_calls: HashMap::new(),
        }
    }

    /// Backend session id, once a `thread.started` event has been seen.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Map one parsed NDJSON object to zero or more domain events.
    pub fn map(&mut self, data: &Value) -> Vec<AgentEvent> {
        let event_type = data.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "thread.started" => {
                self.session_id = nonempty_str(data, "thread_id")
                    .or_else(|| nonempty_str(data, "id"))
                    .map(String::from);
                vec![]
            }
            "turn.started" => {
                self.turn_count += 1;
                vec![self.status(format!("Turn {} started", self.turn_count))]
            }
            "turn.completed" => {
                let usage = data.get("usage");
                let input_tokens = usage
                    .and_then(|u| u.get("input_tokens"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let output_tokens = usage
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                vec![self.status(format!(
                    "Turn completed (in: {input_tokens}, out: {output_tokens} tokens)"
                ))]
            }
            "turn.failed" => {
                let message = data
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("Turn failed")
                    .to_string();
                vec![AgentEvent::Error(ErrorEvent {
                    agent_id: self.agent_id.clone(),
                    severity: Severity::High,
                    message,
                    recoverable: false,
                    error_code: None,
                    category: ErrorCategory::Model,
                    context: None,
                })]
            }
            "item.started" => self.handle_item(ItemPhase::Started, data),
            "item.completed" => self.handle_item(ItemPhase::Completed, data),
            _ => vec![],
        }
    }

    /// Dispatch `item.*` events by item type.
    ///
    /// Codex nests item fields under an `item` wrapper object, e.g.
    /// `{"type": "item.started", "item": {"id": "item_2", "type":
    /// "command_execution", ...}}`; the wrapper is authoritative, with
    /// flat top-level fields kept as a fallback for the legacy shape.
    fn handle_item(&mut self, phase: ItemPhase, data: &Value) -> Vec<AgentEvent> {
        let item = data.get("item").unwrap_or(&Value::Null);
        let item_type = item
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| data.get("item_type").and_then(Value::as_str))
            .unwrap_or("");
        let item_id = item
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| data.get("item_id").and_then(Value::as_str))
            .or_else(|| data.get("id").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();

        match item_type {
            "reasoning" => vec![],
            "command_execution" => self.handle_command(phase, &item_id, data),
            "file_change" => self.handle_file_change(phase, &item_id, data),
            "agent_message" => self.handle_agent_message(phase, data),
            "mcp_tool_call" => self.handle_mcp_tool(phase, &item_id, data),
            "todo_list" => self.handle_todo_list(phase, &item_id, data),
            _ => vec![],
        }
    }

    fn handle_command(&mut self, phase: ItemPhase, item_id: &str, data: &Value) -> Vec<AgentEvent> {
        let item = data.get("item").unwrap_or(data);
        match phase {
            ItemPhase::Started => {
                let command = item
                    .get("command")
                    .or_else(|| data.get("command"))
                    .or_else(|| data.get("input").and_then(|i| i.get("command")))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let tool_call_id = Uuid::new_v4().to_string();
                self.open_tool_calls.insert(
                    item_id.to_string(),
                    OpenToolCall {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: "Bash".to_string(),
                        started_at: Instant::now(),
                        file_path: None,
                    },
                );
                vec![AgentEvent::ToolCall(ToolCallEvent {
                    agent_id: self.agent_id.clone(),
                    tool_call_id,
                    tool_name: "Bash".to_string(),
                    phase: ToolCallPhase::Requested,
                    input: object(serde_json::json!({ "command": command })),
                    output: None,
                    approved: true,
                    duration_ms: None,
                })]
            }
            ItemPhase::Completed => {
                let open = self.open_tool_calls.remove(item_id);
                let exit_code = item
                    .get("exit_code")
                    .or_else(|| data.get("exit_code"))
                    .or_else(|| data.get("status"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                let output = item
                    .get("aggregated_output")
                    .or_else(|| item.get("output"))
                    .or_else(|| data.get("output"))
                    .or_else(|| data.get("stdout"))
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new()));
                let duration_ms = open
                    .as_ref()
                    .map(|o| o.started_at.elapsed().as_millis() as u64);
                let tool_call_id = open
                    .map(|o| o.tool_call_id)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                let phase = if exit_code == 0 {
                    ToolCallPhase::Completed
                } else {
                    ToolCallPhase::Failed
                };
                vec![AgentEvent::ToolCall(ToolCallEvent {
                    agent_id: self.agent_id.clone(),
                    tool_call_id,
                    tool_name: "Bash".to_string(),
                    phase,
                    input: serde_json::Map::new(),
                    output: Some(serde_json::json!({
                        "stdout": output,
                        "exit_code": exit_code,
                    })),
                    approved: true,
                    duration_ms,
                })]
            }
        }
    }

    fn handle_file_change(
        &mut self,
        phase: ItemPhase,
        item_id: &str,
        data: &Value,
    ) -> Vec<AgentEvent> {
        let item = data.get("item").unwrap_or(data);
        let file_path = item
            .get("file_path")
            .or_else(|| item.get("path"))
            .or_else(|| data.get("file_path"))
            .or_else(|| data.get("path"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        match phase {
            ItemPhase::Started => {
                let tool_call_id = Uuid::new_v4().to_string();
                self.open_tool_calls.insert(
                    item_id.to_string(),
                    OpenToolCall {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: "Edit".to_string(),
                        started_at: Instant::now(),
                        file_path: Some(file_path.clone()),
                    },
                );
                vec![AgentEvent::ToolCall(ToolCallEvent {
                    agent_id: self.agent_id.clone(),
                    tool_call_id,
                    tool_name: "Edit".to_string(),
                    phase: ToolCallPhase::Requested,
                    input: object(serde_json::json!({ "file_path": file_path })),
                    output: None,
                    approved: true,
                    duration_ms: None,
                })]
            }
            ItemPhase::Completed => {
                let open = self.open_tool_calls.remove(item_id);
                let path = if file_path.is_empty() {
                    open.as_ref()
                        .and_then(|o| o.file_path.clone())
                        .unwrap_or_default()
                } else {
                    file_path
                };
                let duration_ms = open
                    .as_ref()
                    .map(|o| o.started_at.elapsed().as_millis() as u64);
                let tool_call_id = open
                    .map(|o| o.tool_call_id)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());

                let mut events = vec![AgentEvent::ToolCall(ToolCallEvent {
                    agent_id: self.agent_id.clone(),
                    tool_call_id,
                    tool_name: "Edit".to_string(),
                    phase: ToolCallPhase::Completed,
                    input: object(serde_json::json!({ "file_path": path })),
                    output: Some(serde_json::json!({ "success": true })),
                    approved: true,
                    duration_ms,
                })];

                if !path.is_empty() {
                    let name = Path::new(&path)
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or(path.as_str())
                        .to_string();
                    events.push(AgentEvent::Artifact(ArtifactEvent {
                        agent_id: self.agent_id.clone(),
                        artifact_id: Uuid::new_v4().to_string(),
                        name,
                        kind: infer_artifact_kind(&path),
                        workstream: self.workstream.clone(),
                        status: ArtifactStatus::Draft,
                        quality_score: 0.5,
                        provenance: Provenance::created(
                            self.agent_id.clone(),
                            Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                        ),
                        uri: Some(path),
                        mime_type: None,
                        size_bytes: None,
                        content_hash: None,
                    }));
                }
                events
            }
        }
    }

    fn handle_agent_message(&self, phase: ItemPhase, data: &Value) -> Vec<AgentEvent> {
        if phase != ItemPhase::Completed {
            return vec![];
        }
        let item = data.get("item").unwrap_or(data);
        let raw = item
            .get("text")
            .or_else(|| item.get("content"))
            .or_else(|| data.get("content"))
            .or_else(|| data.get("text"));

        let mut text = match raw {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(parts)) => parts
                .iter()
                .map(|part| match part {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        };
        if text.chars().count() > 500 {
            text = text.chars().take(500).collect();
        }
        vec![self.status(text)]
    }

    fn handle_mcp_tool(&mut self, phase: ItemPhase, item_id: &str, data: &Value) -> Vec<AgentEvent> {
        let item = data.get("item").unwrap_or(data);
        let tool_name = item
            .get("tool_name")
            .or_else(|| item.get("name"))
            .or_else(|| data.get("tool_name"))
            .or_else(|| data.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("mcp_tool")
            .to_string();

        match phase {
            ItemPhase::Started => {
                let tool_call_id = Uuid::new_v4().to_string();
                let input = item
                    .get("input")
                    .or_else(|| item.get("arguments"))
                    .or_else(|| data.get("input"))
                    .or_else(|| data.get("arguments"))
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                self.open_tool_calls.insert(
                    item_id.to_string(),
                    OpenToolCall {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: tool_name.clone(),
                        started_at: Instant::now(),
                        file_path: None,
                    },
                );
                vec![AgentEvent::ToolCall(ToolCallEvent {
                    agent_id: self.agent_id.clone(),
                    tool_call_id,
                    tool_name,
                    phase: ToolCallPhase::Requested,
                    input,
                    output: None,
                    approved: true,
                    duration_ms: None,
                })]
            }
            ItemPhase::Completed => {
                let open = self.open_tool_calls.remove(item_id);
                let output = item
                    .get("output")
                    .or_else(|| item.get("result"))
                    .or_else(|| data.get("output"))
                    .or_else(|| data.get("result"))
                    .cloned();
                let duration_ms = open
                    .as_ref()
                    .map(|o| o.started_at.elapsed().as_millis() as u64);
                let (tool_call_id, tool_name) = match open {
                    Some(o) => (o.tool_call_id, o.tool_name),
                    None => (Uuid::new_v4().to_string(), tool_name),
                };
                vec![AgentEvent::ToolCall(ToolCallEvent {
                    agent_id: self.agent_id.clone(),
                    tool_call_id,
                    tool_name,
                    phase: ToolCallPhase::Completed,
                    input: serde_json::Map::new(),
                    output,
                    approved: true,
                    duration_ms,
                })]
            }
        }
    }

    fn handle_todo_list(&self, phase: ItemPhase, item_id: &str, data: &Value) -> Vec<AgentEvent> {
        if phase != ItemPhase::Completed {
            return vec![];
        }
        let item = data.get("item").unwrap_or(data);
        let empty = vec![];
        let items = item
            .get("items")
            .or_else(|| data.get("items"))
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        let total = items.len();
        let done = items
            .iter()
            .filter(|i| i.get("completed").and_then(Value::as_bool).unwrap_or(false))
            .count();
        let pct = if total > 0 {
            done as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let operation_id = if item_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            item_id.to_string()
        };

        vec![AgentEvent::Progress(ProgressEvent {
            agent_id: self.agent_id.clone(),
            operation_id,
            description: format!("Todo: {done}/{total} completed"),
            progress_pct: Some(pct),
        })]
    }

    fn status(&self, message: String) -> AgentEvent {
        AgentEvent::Status(StatusEvent {
            agent_id: self.agent_id.clone(),
            message,
            tick: None,
        })
    }
}

/// Coerce a `json!` object literal into the map type tool-call inputs use.
fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn nonempty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::event::AgentEvent;
    use serde_json::json;

    fn mapper() -> CodexEventMapper {
        CodexEventMapper::new("agent-1", "backend")
    }

    fn single(events: Vec<AgentEvent>) -> AgentEvent {
        assert_eq!(events.len(), 1, "expected exactly one event, got {events:?}");
        events.into_iter().next().unwrap()
    }

    // -- session / turn events ---------------------------------------------

    #[test]
    fn thread_started_records_session_id() {
        let mut m = mapper();
        let events = m.map(&json!({"type": "thread.started", "thread_id": "thread-9"}));
        assert!(events.is_empty());
        assert_eq!(m.session_id(), Some("thread-9"));
    }

    #[test]
    fn thread_started_falls_back_to_id() {
        let mut m = mapper();
        m.map(&json!({"type": "thread.started", "id": "fallback-id"}));
        assert_eq!(m.session_id(), Some("fallback-id"));
    }

    #[test]
    fn turn_started_increments_counter() {
        let mut m = mapper();
        let first = single(m.map(&json!({"type": "turn.started"})));
        let second = single(m.map(&json!({"type": "turn.started"})));
        match (first, second) {
            (AgentEvent::Status(a), AgentEvent::Status(b)) => {
                assert_eq!(a.message, "Turn 1 started");
                assert_eq!(b.message, "Turn 2 started");
            }
            other => panic!("expected status events, got {other:?}"),
        }
    }

    #[test]
    fn turn_completed_reports_token_usage() {
        let mut m = mapper();
        let event = single(m.map(&json!({
            "type": "turn.completed",
            "usage": {"input_tokens": 1200, "output_tokens": 340}
        })));
        match event {
            AgentEvent::Status(s) => {
                assert_eq!(s.message, "Turn completed (in: 1200, out: 340 tokens)");
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn turn_completed_defaults_missing_usage_to_zero() {
        let mut m = mapper();
        let event = single(m.map(&json!({"type": "turn.completed"})));
        match event {
            AgentEvent::Status(s) => {
                assert_eq!(s.message, "Turn completed (in: 0, out: 0 tokens)");
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn turn_failed_maps_to_model_error() {
        let mut m = mapper();
        let event = single(m.map(&json!({
            "type": "turn.failed",
            "error": {"message": "rate limit exceeded"}
        })));
        match event {
            AgentEvent::Error(e) => {
                assert_eq!(e.message, "rate limit exceeded");
                assert_eq!(e.severity, Severity::High);
                assert!(!e.recoverable);
                assert_eq!(e.category, ErrorCategory::Model);
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn turn_failed_without_error_object_uses_default_message() {
        let mut m = mapper();
        let event = single(m.map(&json!({"type": "turn.failed"})));
        match event {
            AgentEvent::Error(e) => assert_eq!(e.message, "Turn failed"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    // -- command execution -------------------------------------------------

    #[test]
    fn command_execution_correlates_start_and_completion() {
        let mut m = mapper();
        let started = single(m.map(&json!({
            "type": "item.started",
            "item": {"id": "item_1", "type": "command_execution", "command": "cargo build"}
        })));
        let requested_id = match started {
            AgentEvent::ToolCall(tc) => {
                assert_eq!(tc.tool_name, "Bash");
                assert_eq!(tc.phase, ToolCallPhase::Requested);
                assert_eq!(tc.input["command"], "cargo build");
                tc.tool_call_id
            }
            other => panic!("expected tool_call, got {other:?}"),
        };

        let completed = single(m.map(&json!({
            "type": "item.completed",
            "item": {
                "id": "item_1",
                "type": "command_execution",
                "exit_code": 0,
                "aggregated_output": "Compiling relay v0.1.0"
            }
        })));
        match completed {
            AgentEvent::ToolCall(tc) => {
                assert_eq!(tc.tool_call_id, requested_id, "completion must reuse the id");
                assert_eq!(tc.phase, ToolCallPhase::Completed);
                assert!(tc.duration_ms.is_some());
                let output = tc.output.unwrap();
                assert_eq!(output["stdout"], "Compiling relay v0.1.0");
                assert_eq!(output["exit_code"], 0);
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    #[test]
    fn command_nonzero_exit_code_is_failed_phase() {
        let mut m = mapper();
        m.map(&json!({
            "type": "item.started",
            "item": {"id": "item_2", "type": "command_execution", "command": "false"}
        }));
        let completed = single(m.map(&json!({
            "type": "item.completed",
            "item": {"id": "item_2", "type": "command_execution", "exit_code": 1}
        })));
        match completed {
            AgentEvent::ToolCall(tc) => assert_eq!(tc.phase, ToolCallPhase::Failed),
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    #[test]
    fn unmatched_command_completion_synthesizes_id_without_duration() {
        let mut m = mapper();
        let completed = single(m.map(&json!({
            "type": "item.completed",
            "item": {"id": "never_started", "type": "command_execution", "exit_code": 0}
        })));
        match completed {
            AgentEvent::ToolCall(tc) => {
                assert!(!tc.tool_call_id.is_empty());
                assert!(tc.duration_ms.is_none());
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    #[test]
    fn command_fields_fall_back_to_flat_shape() {
        let mut m = mapper();
        let started = single(m.map(&json!({
            "type": "item.started",
            "item_type": "command_execution",
            "item_id": "flat_1",
            "command": "ls -la"
        })));
        match started {
            AgentEvent::ToolCall(tc) => assert_eq!(tc.input["command"], "ls -la"),
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    // -- file changes ------------------------------------------------------

    #[test]
    fn file_change_emits_tool_call_and_artifact() {
        let mut m = mapper();
        m.map(&json!({
            "type": "item.started",
            "item": {"id": "item_3", "type": "file_change", "file_path": "src/app.ts"}
        }));
        let events = m.map(&json!({
            "type": "item.completed",
            "item": {"id": "item_3", "type": "file_change", "file_path": "src/app.ts"}
        }));
        assert_eq!(events.len(), 2);

        match &events[0] {
            AgentEvent::ToolCall(tc) => {
                assert_eq!(tc.tool_name, "Edit");
                assert_eq!(tc.phase, ToolCallPhase::Completed);
                assert_eq!(tc.output.as_ref().unwrap()["success"], true);
                assert!(tc.duration_ms.is_some());
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
        match &events[1] {
            AgentEvent::Artifact(a) => {
                assert_eq!(a.name, "app.ts");
                assert_eq!(a.kind, ArtifactKind::Code);
                assert_eq!(a.workstream, "backend");
                assert_eq!(a.status, ArtifactStatus::Draft);
                assert!((a.quality_score - 0.5).abs() < f64::EPSILON);
                assert_eq!(a.uri.as_deref(), Some("src/app.ts"));
                assert_eq!(a.provenance.created_by, "agent-1");
            }
            other => panic!("expected artifact, got {other:?}"),
        }
    }

    #[test]
    fn unmatched_file_change_completion_is_test_kind_without_duration() {
        let mut m = mapper();
        let events = m.map(&json!({
            "type": "item.completed",
            "item": {"id": "orphan", "type": "file_change", "file_path": "src/test_utils.spec.ts"}
        }));
        assert_eq!(events.len(), 2);
        match &events[0] {
            AgentEvent::ToolCall(tc) => assert!(tc.duration_ms.is_none()),
            other => panic!("expected tool_call, got {other:?}"),
        }
        match &events[1] {
            AgentEvent::Artifact(a) => {
                assert_eq!(a.kind, ArtifactKind::Test);
                assert_eq!(a.name, "test_utils.spec.ts");
            }
            other => panic!("expected artifact, got {other:?}"),
        }
    }

    #[test]
    fn file_change_completion_uses_recorded_path_when_absent() {
        let mut m = mapper();
        m.map(&json!({
            "type": "item.started",
            "item": {"id": "item_4", "type": "file_change", "file_path": "notes/README.md"}
        }));
        let events = m.map(&json!({
            "type": "item.completed",
            "item": {"id": "item_4", "type": "file_change"}
        }));
        assert_eq!(events.len(), 2);
        match &events[1] {
            AgentEvent::Artifact(a) => {
                assert_eq!(a.name, "README.md");
                assert_eq!(a.kind, ArtifactKind::Document);
            }
            other => panic!("expected artifact, got {other:?}"),
        }
    }

    #[test]
    fn file_change_without_any_path_emits_no_artifact() {
        let mut m = mapper();
        let events = m.map(&json!({
            "type": "item.completed",
            "item": {"id": "pathless", "type": "file_change"}
        }));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AgentEvent::ToolCall(_)));
    }

    // -- agent messages ----------------------------------------------------

    #[test]
    fn agent_message_completion_becomes_status() {
        let mut m = mapper();
        assert!(m
            .map(&json!({
                "type": "item.started",
                "item": {"id": "m1", "type": "agent_message"}
            }))
            .is_empty());

        let event = single(m.map(&json!({
            "type": "item.completed",
            "item": {"id": "m1", "type": "agent_message", "text": "All tests pass."}
        })));
        match event {
            AgentEvent::Status(s) => assert_eq!(s.message, "All tests pass."),
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn agent_message_list_is_joined_with_spaces() {
        let mut m = mapper();
        let event = single(m.map(&json!({
            "type": "item.completed",
            "item": {"id": "m2", "type": "agent_message", "text": ["part one", "part two"]}
        })));
        match event {
            AgentEvent::Status(s) => assert_eq!(s.message, "part one part two"),
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn agent_message_is_truncated_to_500_chars_without_marker() {
        let mut m = mapper();
        let long = "x".repeat(900);
        let event = single(m.map(&json!({
            "type": "item.completed",
            "item": {"id": "m3", "type": "agent_message", "text": long}
        })));
        match event {
            AgentEvent::Status(s) => {
                assert_eq!(s.message.chars().count(), 500);
                assert!(s.message.ends_with('x'), "no ellipsis marker expected");
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    // -- MCP tool calls ----------------------------------------------------

    #[test]
    fn mcp_tool_call_uses_supplied_name_and_arguments() {
        let mut m = mapper();
        let started = single(m.map(&json!({
            "type": "item.started",
            "item": {
                "id": "mcp_1",
                "type": "mcp_tool_call",
                "tool_name": "search_docs",
                "arguments": {"query": "retry policy"}
            }
        })));
        let started_id = match started {
            AgentEvent::ToolCall(tc) => {
                assert_eq!(tc.tool_name, "search_docs");
                assert_eq!(tc.input["query"], "retry policy");
                tc.tool_call_id
            }
            other => panic!("expected tool_call, got {other:?}"),
        };

        let completed = single(m.map(&json!({
            "type": "item.completed",
            "item": {"id": "mcp_1", "type": "mcp_tool_call", "result": {"hits": 3}}
        })));
        match completed {
            AgentEvent::ToolCall(tc) => {
                assert_eq!(tc.tool_call_id, started_id);
                assert_eq!(tc.tool_name, "search_docs");
                assert_eq!(tc.output.unwrap()["hits"], 3);
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    #[test]
    fn mcp_tool_call_defaults_name() {
        let mut m = mapper();
        let started = single(m.map(&json!({
            "type": "item.started",
            "item": {"id": "mcp_2", "type": "mcp_tool_call"}
        })));
        match started {
            AgentEvent::ToolCall(tc) => assert_eq!(tc.tool_name, "mcp_tool"),
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    // -- todo lists --------------------------------------------------------

    #[test]
    fn todo_list_reports_progress_percentage() {
        let mut m = mapper();
        let event = single(m.map(&json!({
            "type": "item.completed",
            "item_type": "todo_list",
            "items": [
                {"completed": true},
                {"completed": true},
                {"completed": false}
            ]
        })));
        match event {
            AgentEvent::Progress(p) => {
                assert_eq!(p.description, "Todo: 2/3 completed");
                let pct = p.progress_pct.unwrap();
                assert!((pct - 200.0 / 3.0).abs() < 0.01, "pct was {pct}");
            }
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[test]
    fn empty_todo_list_is_zero_percent() {
        let mut m = mapper();
        let event = single(m.map(&json!({
            "type": "item.completed",
            "item": {"id": "t1", "type": "todo_list", "items": []}
        })));
        match event {
            AgentEvent::Progress(p) => {
                assert_eq!(p.description, "Todo: 0/0 completed");
                assert_eq!(p.progress_pct, Some(0.0));
            }
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[test]
    fn todo_list_start_is_ignored() {
        let mut m = mapper();
        let events = m.map(&json!({
            "type": "item.started",
            "item": {"id": "t2", "type": "todo_list", "items": [{"completed": false}]}
        }));
        assert!(events.is_empty());
    }

    // -- ignored and unknown shapes ----------------------------------------

    #[test]
    fn reasoning_items_are_ignored_in_both_phases() {
        let mut m = mapper();
        assert!(m
            .map(&json!({"type": "item.started", "item": {"id": "r1", "type": "reasoning"}}))
            .is_empty());
        assert!(m
            .map(&json!({"type": "item.completed", "item": {"id": "r1", "type": "reasoning"}}))
            .is_empty());
    }

    #[test]
    fn unknown_top_level_type_maps_to_nothing() {
        let mut m = mapper();
        assert!(m.map(&json!({"type": "session.heartbeat"})).is_empty());
        assert!(m.map(&json!({"no_type": true})).is_empty());
    }

    #[test]
    fn unknown_item_type_maps_to_nothing() {
        let mut m = mapper();
        assert!(m
            .map(&json!({"type": "item.completed", "item": {"id": "u1", "type": "web_search"}}))
            .is_empty());
    }

    #[test]
    fn nested_item_fields_take_precedence_over_flat() {
        let mut m = mapper();
        let event = single(m.map(&json!({
            "type": "item.started",
            "item_type": "reasoning",
            "item": {"id": "n1", "type": "command_execution", "command": "pwd"}
        })));
        match event {
            AgentEvent::ToolCall(tc) => assert_eq!(tc.input["command"], "pwd"),
            other => panic!("nested item type should win, got {other:?}"),
        }
    }

    // -- artifact kind inference -------------------------------------------

    #[test]
    fn artifact_kind_inference_table() {
        assert_eq!(infer_artifact_kind("src/main.rs"), ArtifactKind::Code);
        assert_eq!(infer_artifact_kind("web/App.tsx"), ArtifactKind::Code);
        assert_eq!(infer_artifact_kind("README.md"), ArtifactKind::Document);
        assert_eq!(infer_artifact_kind("notes.txt"), ArtifactKind::Document);
        assert_eq!(infer_artifact_kind("config.YAML"), ArtifactKind::Config);
        assert_eq!(infer_artifact_kind("Cargo.toml"), ArtifactKind::Config);
        assert_eq!(infer_artifact_kind("logo.png"), ArtifactKind::Other);
        assert_eq!(infer_artifact_kind("Makefile"), ArtifactKind::Other);
    }

    #[test]
    fn test_patterns_win_over_extension_rules() {
        assert_eq!(infer_artifact_kind("src/app.test.ts"), ArtifactKind::Test);
        assert_eq!(infer_artifact_kind("lib/util.spec.js"), ArtifactKind::Test);
        assert_eq!(infer_artifact_kind("tests/test_models.py"), ArtifactKind::Test);
    }
}
