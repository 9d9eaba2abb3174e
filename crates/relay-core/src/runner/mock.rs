//! Scripted runner: emits a fixed timed sequence of events for tests
//! and demos, including one decision rendezvous that suspends the
//! script until the decision is resolved (or the run is killed).
//!
//! The scripted sequence is:
//!   1. lifecycle started
//!   2. status "Starting task..."
//!   3. tool call requested -> running -> completed
//!   4. tool-approval decision -- suspend until resolved
//!   5. artifact
//!   6. completion (success)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use relay_proto::brief::AgentBrief;
use relay_proto::control::{
    AgentHandle, KillResponse, ResolveRequest, SdkCheckpoint, SerializeReason,
    SerializedAgentState,
};
use relay_proto::envelope::AdapterEvent;
use relay_proto::event::{
    AgentEvent, AgentStatus, ArtifactEvent, ArtifactKind, ArtifactStatus, BlastRadius,
    CompletionEvent, CompletionOutcome, DecisionEvent, LifecycleAction, LifecycleEvent,
    Provenance, Severity, StatusEvent, ToolApprovalEvent, ToolCallEvent, ToolCallPhase,
};

use crate::runner::{AgentRunner, EventSink};

const PLUGIN_NAME: &str = "openai-mock";

struct MockShared {
    handle: AgentHandle,
    pending_decision_id: Option<String>,
    decision_tx: Option<oneshot::Sender<ResolveRequest>>,
    killed: bool,
    completed: bool,
}

struct MockInner {
    brief: AgentBrief,
    agent_id: String,
    session_id: String,
    sink: Mutex<EventSink>,
    shared: Mutex<MockShared>,
    cancel: CancellationToken,
}

/// Runs a scripted mock agent that emits events over time.
pub struct MockRunner {
    inner: Arc<MockInner>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MockRunner {
    pub fn new(brief: AgentBrief) -> Self {
        let agent_id = brief.agent_id.clone();
        let session_id = Uuid::new_v4().to_string();
        let handle = AgentHandle::new(
            agent_id.clone(),
            PLUGIN_NAME,
            AgentStatus::Running,
            session_id.clone(),
        );

        Self {
            inner: Arc::new(MockInner {
                brief,
                agent_id,
                session_id,
                sink: Mutex::new(EventSink::new(Uuid::new_v4().to_string())),
                shared: Mutex::new(MockShared {
                    handle,
                    pending_decision_id: None,
                    decision_tx: None,
                    killed: false,
                    completed: false,
                }),
                cancel: CancellationToken::new(),
            }),
            task: std::sync::Mutex::new(None),
        }
    }

    /// Stop the script cooperatively, without emitting anything.
    async fn stop_script(&self) {
        {
            let mut shared = self.inner.shared.lock().await;
            shared.killed = true;
            // Dropping the sender aborts a pending rendezvous.
            shared.decision_tx = None;
        }
        self.inner.cancel.cancel();
        let task = self
            .task
            .lock()
            .expect("mock script task lock poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn serialize_state(
        &self,
        reason: SerializeReason,
        conversation_summary: Option<String>,
        pending_decision_ids: Vec<String>,
    ) -> SerializedAgentState {
        let last_sequence = self.inner.sink.lock().await.last_sequence();
        SerializedAgentState {
            agent_id: self.inner.agent_id.clone(),
            plugin_name: PLUGIN_NAME.to_string(),
            session_id: self.inner.session_id.clone(),
            checkpoint: SdkCheckpoint::at_position("mock", last_sequence),
            brief_snapshot: self.inner.brief.clone(),
            conversation_summary,
            pending_decision_ids,
            last_sequence,
            serialized_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            serialized_by: reason,
            estimated_size_bytes: 256,
        }
    }
}

#[async_trait]
impl AgentRunner for MockRunner {
    fn plugin_name(&self) -> &str {
        PLUGIN_NAME
    }

    fn brief(&self) -> &AgentBrief {
        &self.inner.brief
    }

    fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(run_script(inner));
        *self.task.lock().expect("mock script task lock poisoned") = Some(task);
    }

    async fn handle(&self) -> AgentHandle {
        self.inner.shared.lock().await.handle.clone()
    }

    async fn is_running(&self) -> bool {
        let shared = self.inner.shared.lock().await;
        !shared.killed && !shared.completed
    }

    async fn drain_events(&self) -> Vec<AdapterEvent> {
        self.inner.sink.lock().await.drain()
    }

    async fn resolve_decision(&self, request: &ResolveRequest) -> bool {
        let mut shared = self.inner.shared.lock().await;
        if shared.pending_decision_id.as_deref() == Some(request.decision_id.as_str()) {
            if let Some(tx) = shared.decision_tx.take() {
                return tx.send(request.clone()).is_ok();
            }
        }
        false
    }

    async fn kill(&self, grace: bool) -> KillResponse {
        self.stop_script().await;

        let reason = if grace {
            "kill requested (graceful)"
        } else {
            "kill requested (force)"
        };
        emit(
            &self.inner,
            AgentEvent::Lifecycle(LifecycleEvent {
                agent_id: self.inner.agent_id.clone(),
                action: LifecycleAction::Killed,
                reason: Some(reason.to_string()),
            }),
        )
        .await;

        set_status(&self.inner, AgentStatus::Completed).await;

        KillResponse {
            state: None,
            artifacts_extracted: 0,
            // No subprocess to escalate on; the stop is always clean
            // when it was requested gracefully.
            clean_shutdown: grace,
        }
    }

    async fn pause(&self) -> SerializedAgentState {
        let pending = {
            let shared = self.inner.shared.lock().await;
            shared.pending_decision_id.clone()
        };
        self.stop_script().await;

        emit(
            &self.inner,
            AgentEvent::Lifecycle(LifecycleEvent {
                agent_id: self.inner.agent_id.clone(),
                action: LifecycleAction::Paused,
                reason: None,
            }),
        )
        .await;

        set_status(&self.inner, AgentStatus::Paused).await;

        self.serialize_state(
            SerializeReason::Pause,
            None,
            pending.into_iter().collect(),
        )
        .await
    }

    async fn get_checkpoint(&self, decision_id: &str) -> SerializedAgentState {
        let pending = if decision_id.is_empty() {
            vec![]
        } else {
            vec![decision_id.to_string()]
        };
        self.serialize_state(
            SerializeReason::DecisionCheckpoint,
            Some("Agent blocked on decision".to_string()),
            pending,
        )
        .await
    }

    async fn set_pending_brief_changes(&self, changes: serde_json::Map<String, Value>) {
        let mut shared = self.inner.shared.lock().await;
        let mut handle = shared.handle.clone();
        handle.pending_brief_changes = Some(changes);
        shared.handle = handle;
    }
}

// ---------------------------------------------------------------------------
// The script
// ---------------------------------------------------------------------------

async fn run_script(inner: Arc<MockInner>) {
    // Step 1: lifecycle started.
    emit(
        &inner,
        AgentEvent::Lifecycle(LifecycleEvent {
            agent_id: inner.agent_id.clone(),
            action: LifecycleAction::Started,
            reason: None,
        }),
    )
    .await;
    if !pace(&inner, 100).await {
        return;
    }

    // Step 2: status.
    emit(
        &inner,
        AgentEvent::Status(StatusEvent {
            agent_id: inner.agent_id.clone(),
            message: "Starting task...".to_string(),
            tick: None,
        }),
    )
    .await;
    if !pace(&inner, 100).await {
        return;
    }

    // Step 3: tool call requested -> running -> completed.
    let tool_call_id = Uuid::new_v4().to_string();
    let query = serde_json::json!({ "query": "project requirements" });
    emit(&inner, tool_call(&inner, &tool_call_id, ToolCallPhase::Requested, &query, None, None)).await;
    if !pace(&inner, 50).await {
        return;
    }
    emit(&inner, tool_call(&inner, &tool_call_id, ToolCallPhase::Running, &query, None, None)).await;
    if !pace(&inner, 100).await {
        return;
    }
    emit(
        &inner,
        tool_call(
            &inner,
            &tool_call_id,
            ToolCallPhase::Completed,
            &query,
            Some(serde_json::json!({ "results": ["requirements.md"] })),
            Some(150),
        ),
    )
    .await;
    if !pace(&inner, 50).await {
        return;
    }

    // Step 4: tool-approval decision -- suspend until resolved.
    let decision_id = Uuid::new_v4().to_string();
    let (tx, rx) = oneshot::channel();
    {
        let mut shared = inner.shared.lock().await;
        shared.pending_decision_id = Some(decision_id.clone());
        shared.decision_tx = Some(tx);
        shared.handle = AgentHandle::new(
            inner.agent_id.clone(),
            PLUGIN_NAME,
            AgentStatus::WaitingOnHuman,
            inner.session_id.clone(),
        );
    }

    emit(
        &inner,
        AgentEvent::Decision(DecisionEvent::ToolApproval(ToolApprovalEvent {
            agent_id: inner.agent_id.clone(),
            decision_id,
            tool_name: "execute_code".to_string(),
            tool_args: serde_json::json!({
                "code": "print('hello world')",
                "language": "python",
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
            severity: Some(Severity::Medium),
            confidence: Some(0.85),
            blast_radius: Some(BlastRadius::Small),
            affected_artifact_ids: None,
            due_by_tick: None,
        })),
    )
    .await;

    let _resolution = tokio::select! {
        () = inner.cancel.cancelled() => return,
        resolution = rx => match resolution {
            Ok(resolution) => resolution,
            // Sender dropped: the rendezvous was abandoned by kill/pause.
            Err(_) => return,
        },
    };

    {
        let mut shared = inner.shared.lock().await;
        shared.pending_decision_id = None;
        shared.handle = AgentHandle::new(
            inner.agent_id.clone(),
            PLUGIN_NAME,
            AgentStatus::Running,
            inner.session_id.clone(),
        );
    }

    // Step 5: artifact.
    let artifact_id = Uuid::new_v4().to_string();
    emit(
        &inner,
        AgentEvent::Artifact(ArtifactEvent {
            agent_id: inner.agent_id.clone(),
            artifact_id: artifact_id.clone(),
            name: "report.md".to_string(),
            kind: ArtifactKind::Document,
            workstream: inner.brief.workstream.clone(),
            status: ArtifactStatus::Draft,
            quality_score: 0.9,
            provenance: Provenance::created(
                inner.agent_id.clone(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ),
            uri: Some("/workspace/output/report.md".to_string()),
            mime_type: Some("text/markdown".to_string()),
            size_bytes: Some(1024),
            content_hash: None,
        }),
    )
    .await;
    if !pace(&inner, 50).await {
        return;
    }

    // Step 6: completion.
    emit(
        &inner,
        AgentEvent::Completion(CompletionEvent {
            agent_id: inner.agent_id.clone(),
            summary: "Mock task completed successfully. Generated report.md.".to_string(),
            artifacts_produced: vec![artifact_id],
            decisions_needed: vec![],
            outcome: CompletionOutcome::Success,
            reason: None,
        }),
    )
    .await;

    let mut shared = inner.shared.lock().await;
    shared.completed = true;
    shared.handle = AgentHandle::new(
        inner.agent_id.clone(),
        PLUGIN_NAME,
        AgentStatus::Completed,
        inner.session_id.clone(),
    );
}

/// Sleep between script steps; false when the run was cancelled.
async fn pace(inner: &MockInner, ms: u64) -> bool {
    tokio::select! {
        () = inner.cancel.cancelled() => false,
        () = tokio::time::sleep(Duration::from_millis(ms)) => true,
    }
}

fn tool_call(
    inner: &MockInner,
    tool_call_id: &str,
    phase: ToolCallPhase,
    input: &Value,
    output: Option<Value>,
    duration_ms: Option<u64>,
) -> AgentEvent {
    AgentEvent::ToolCall(ToolCallEvent {
        agent_id: inner.agent_id.clone(),
        tool_call_id: tool_call_id.to_string(),
        tool_name: "file_search".to_string(),
        phase,
        input: input.as_object().cloned().unwrap_or_default(),
        output,
        approved: true,
        duration_ms,
    })
}

async fn emit(inner: &MockInner, event: AgentEvent) {
    inner.sink.lock().await.emit(event);
}

async fn set_status(inner: &MockInner, status: AgentStatus) {
    let mut shared = inner.shared.lock().await;
    shared.handle = AgentHandle::new(
        inner.agent_id.clone(),
        PLUGIN_NAME,
        status,
        inner.session_id.clone(),
    );
}
