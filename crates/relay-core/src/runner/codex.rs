//! Process-backed runner: spawns the Codex CLI and maps its streaming
//! NDJSON output into wire protocol events.
//!
//! All in-run failures become domain events; the control operations
//! never surface subprocess errors. Kill and pause cancel the read task
//! cooperatively and terminate the child (SIGTERM, then SIGKILL after
//! the grace window), so the finalizing lifecycle event is always the
//! last event of the run.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use relay_proto::brief::AgentBrief;
use relay_proto::control::{
    AgentHandle, KillResponse, ResolveRequest, SdkCheckpoint, SerializeReason,
    SerializedAgentState,
};
use relay_proto::envelope::AdapterEvent;
use relay_proto::event::{
    AgentEvent, AgentStatus, CompletionEvent, CompletionOutcome, ErrorCategory, ErrorEvent,
    LifecycleAction, LifecycleEvent, Severity,
};

use crate::mapper::CodexEventMapper;
use crate::prompt::render_prompt;
use crate::runner::{AgentRunner, EventSink, KILL_GRACE_WINDOW};

const PLUGIN_NAME: &str = "openai-codex";

/// How much captured stderr a crash report carries.
const STDERR_CAPTURE_CHARS: usize = 500;

/// Construction options for a [`CodexRunner`].
#[derive(Debug, Clone)]
pub struct CodexRunnerConfig {
    /// Path to the `codex` binary. Defaults to `"codex"` (found via `$PATH`).
    pub codex_binary: String,
    /// Working directory passed to the CLI via `--cd`.
    pub workspace: Option<PathBuf>,
    /// Backend session to resume instead of starting fresh.
    pub resume_session_id: Option<String>,
    /// Prefix the prompt with a continuation preamble.
    pub continuation: bool,
}

impl Default for CodexRunnerConfig {
    fn default() -> Self {
        Self {
            codex_binary: "codex".to_string(),
            workspace: None,
            resume_session_id: None,
            continuation: false,
        }
    }
}

struct Shared {
    handle: AgentHandle,
    session_id: String,
    child: Option<Child>,
    /// Kept even after the child is handed to the exit path, so a
    /// concurrent kill can still signal the process.
    child_pid: Option<u32>,
    killed: bool,
    completed: bool,
}

struct CodexInner {
    brief: AgentBrief,
    agent_id: String,
    config: CodexRunnerConfig,
    sink: Mutex<EventSink>,
    shared: Mutex<Shared>,
    cancel: CancellationToken,
}

/// Runs the Codex CLI and maps its streaming output to wire protocol
/// events.
pub struct CodexRunner {
    inner: Arc<CodexInner>,
    read_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CodexRunner {
    pub fn new(brief: AgentBrief, config: CodexRunnerConfig) -> Self {
        let agent_id = brief.agent_id.clone();
        let session_id = config
            .resume_session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let handle = AgentHandle::new(
            agent_id.clone(),
            PLUGIN_NAME,
            AgentStatus::Running,
            session_id.clone(),
        );

        Self {
            inner: Arc::new(CodexInner {
                brief,
                agent_id,
                config,
                sink: Mutex::new(EventSink::new(Uuid::new_v4().to_string())),
                shared: Mutex::new(Shared {
                    handle,
                    session_id,
                    child: None,
                    child_pid: None,
                    killed: false,
                    completed: false,
                }),
                cancel: CancellationToken::new(),
            }),
            read_task: std::sync::Mutex::new(None),
        }
    }

    /// Terminate the child and the read task, without emitting any
    /// lifecycle event. Returns true when escalation to SIGKILL was
    /// needed.
    async fn stop_production(&self, grace: bool) -> bool {
        let mut forced = !grace;

        let (child, child_pid) = {
            let mut shared = self.inner.shared.lock().await;
            shared.killed = true;
            (shared.child.take(), shared.child_pid)
        };

        if child.is_none() {
            // The exit path already owns the child object; signal the
            // process directly so its wait() cannot outlive this stop.
            signal_pid(child_pid, grace);
        }

        if let Some(mut child) = child {
            if grace {
                request_terminate(&child);
                match tokio::time::timeout(KILL_GRACE_WINDOW, child.wait()).await {
                    Ok(Ok(_status)) => {}
                    _ => {
                        debug!("codex did not exit within the grace window, sending SIGKILL");
                        forced = true;
                        let _ = child.kill().await;
                    }
                }
            } else {
                let _ = child.kill().await;
            }
        }

        // Cancellation is observed at the read task's next suspension
        // point; awaiting it here guarantees the caller's finalizing
        // lifecycle event lands after everything the task produced.
        self.inner.cancel.cancel();
        let task = self
            .read_task
            .lock()
            .expect("codex read task lock poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        forced
    }

    async fn serialize_state(
        &self,
        reason: SerializeReason,
        conversation_summary: Option<String>,
        pending_decision_ids: Vec<String>,
    ) -> SerializedAgentState {
        let session_id = self.inner.shared.lock().await.session_id.clone();
        let last_sequence = self.inner.sink.lock().await.last_sequence();
        SerializedAgentState {
            agent_id: self.inner.agent_id.clone(),
            plugin_name: PLUGIN_NAME.to_string(),
            session_id: session_id.clone(),
            checkpoint: SdkCheckpoint::for_session("codex", session_id),
            brief_snapshot: self.inner.brief.clone(),
            conversation_summary,
            pending_decision_ids,
            last_sequence,
            serialized_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            serialized_by: reason,
            estimated_size_bytes: 512,
        }
    }
}

#[async_trait]
impl AgentRunner for CodexRunner {
    fn plugin_name(&self) -> &str {
        PLUGIN_NAME
    }

    fn brief(&self) -> &AgentBrief {
        &self.inner.brief
    }

    fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(run(inner));
        *self
            .read_task
            .lock()
            .expect("codex read task lock poisoned") = Some(task);
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
        // Full-auto mode has no interactive decisions.
        debug!(
            decision_id = %request.decision_id,
            "resolve_decision is a no-op for the codex runner"
        );
        false
    }

    async fn kill(&self, grace: bool) -> KillResponse {
        let forced = self.stop_production(grace).await;

        let reason = if forced {
            "kill requested (force)"
        } else {
            "kill requested (graceful)"
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

        {
            let mut shared = self.inner.shared.lock().await;
            shared.completed = true;
            shared.handle = AgentHandle::new(
                self.inner.agent_id.clone(),
                PLUGIN_NAME,
                AgentStatus::Completed,
                shared.session_id.clone(),
            );
        }

        KillResponse {
            state: None,
            artifacts_extracted: 0,
            clean_shutdown: !forced,
        }
    }

    async fn pause(&self) -> SerializedAgentState {
        self.stop_production(true).await;

        emit(
            &self.inner,
            AgentEvent::Lifecycle(LifecycleEvent {
                agent_id: self.inner.agent_id.clone(),
                action: LifecycleAction::Paused,
                reason: None,
            }),
        )
        .await;

        {
            let mut shared = self.inner.shared.lock().await;
            shared.handle = AgentHandle::new(
                self.inner.agent_id.clone(),
                PLUGIN_NAME,
                AgentStatus::Paused,
                shared.session_id.clone(),
            );
        }

        self.serialize_state(SerializeReason::Pause, None, vec![])
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
            Some("Agent running in full-auto mode".to_string()),
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
// Background production task
// ---------------------------------------------------------------------------

async fn run(inner: Arc<CodexInner>) {
    let prompt = render_prompt(&inner.brief, inner.config.continuation);

    let mut cmd = Command::new(&inner.config.codex_binary);
    cmd.arg("exec");
    if let Some(session_id) = &inner.config.resume_session_id {
        if let Some(workspace) = &inner.config.workspace {
            cmd.arg("--cd").arg(workspace);
        }
        cmd.arg("resume")
            .arg(session_id)
            .arg("--full-auto")
            .arg("--json")
            .arg(&prompt);
    } else {
        cmd.arg("--full-auto").arg("--json");
        if let Some(workspace) = &inner.config.workspace {
            cmd.arg("--cd").arg(workspace);
        }
        cmd.arg(&prompt);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(
                binary = %inner.config.codex_binary,
                error = %e,
                "failed to spawn codex CLI"
            );
            emit(
                &inner,
                AgentEvent::Error(ErrorEvent {
                    agent_id: inner.agent_id.clone(),
                    severity: Severity::Critical,
                    message: format!(
                        "failed to spawn codex binary '{}': {e} -- is it installed and on PATH?",
                        inner.config.codex_binary
                    ),
                    recoverable: false,
                    error_code: None,
                    category: ErrorCategory::Internal,
                    context: None,
                }),
            )
            .await;
            emit(
                &inner,
                AgentEvent::Completion(CompletionEvent {
                    agent_id: inner.agent_id.clone(),
                    summary: "Failed to start: codex CLI not found".to_string(),
                    artifacts_produced: vec![],
                    decisions_needed: vec![],
                    outcome: CompletionOutcome::Abandoned,
                    reason: None,
                }),
            )
            .await;
            let mut shared = inner.shared.lock().await;
            shared.completed = true;
            shared.handle = AgentHandle::new(
                inner.agent_id.clone(),
                PLUGIN_NAME,
                AgentStatus::Error,
                shared.session_id.clone(),
            );
            return;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    {
        let mut shared = inner.shared.lock().await;
        if shared.killed {
            // Kill raced the spawn; don't leave an orphan behind.
            let _ = child.start_kill();
            return;
        }
        shared.child_pid = child.id();
        shared.child = Some(child);
    }

    emit(
        &inner,
        AgentEvent::Lifecycle(LifecycleEvent {
            agent_id: inner.agent_id.clone(),
            action: LifecycleAction::Started,
            reason: None,
        }),
    )
    .await;

    let Some(stdout) = stdout else {
        warn!("codex stdout pipe missing");
        handle_exit(&inner, stderr).await;
        return;
    };

    let mut mapper = CodexEventMapper::new(inner.agent_id.clone(), inner.brief.workstream.clone());
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            () = inner.cancel.cancelled() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let Ok(data) = serde_json::from_str::<Value>(trimmed) else {
                        debug!(line = trimmed, "skipping malformed NDJSON line");
                        continue;
                    };

                    let events = mapper.map(&data);
                    {
                        let mut sink = inner.sink.lock().await;
                        for event in events {
                            sink.emit(event);
                        }
                    }

                    // Adopt the backend session id as soon as the
                    // mapper sees it.
                    if let Some(session_id) = mapper.session_id() {
                        let mut shared = inner.shared.lock().await;
                        if shared.session_id != session_id {
                            shared.session_id = session_id.to_string();
                            shared.handle = AgentHandle::new(
                                inner.agent_id.clone(),
                                PLUGIN_NAME,
                                AgentStatus::Running,
                                session_id,
                            );
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "error reading codex stdout");
                    break;
                }
            }
        }
    }

    handle_exit(&inner, stderr).await;
}

async fn handle_exit(inner: &CodexInner, stderr: Option<ChildStderr>) {
    let child = { inner.shared.lock().await.child.take() };
    let Some(mut child) = child else {
        // A concurrent kill/pause owns shutdown and the final event.
        return;
    };

    match child.wait().await {
        Ok(status) if status.success() => {
            emit(
                inner,
                AgentEvent::Completion(CompletionEvent {
                    agent_id: inner.agent_id.clone(),
                    summary: "Codex session completed successfully".to_string(),
                    artifacts_produced: vec![],
                    decisions_needed: vec![],
                    outcome: CompletionOutcome::Success,
                    reason: None,
                }),
            )
            .await;
            set_terminal_status(inner, AgentStatus::Completed).await;
        }
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            let stderr_text = capture_stderr(stderr).await;
            let message = if stderr_text.is_empty() {
                format!("Codex exited with code {code}")
            } else {
                format!("Codex exited with code {code}: {stderr_text}")
            };
            emit(
                inner,
                AgentEvent::Error(ErrorEvent {
                    agent_id: inner.agent_id.clone(),
                    severity: Severity::High,
                    message,
                    recoverable: false,
                    error_code: None,
                    category: ErrorCategory::Internal,
                    context: None,
                }),
            )
            .await;
            emit(
                inner,
                AgentEvent::Lifecycle(LifecycleEvent {
                    agent_id: inner.agent_id.clone(),
                    action: LifecycleAction::Crashed,
                    reason: Some(format!("Exit code {code}")),
                }),
            )
            .await;
            set_terminal_status(inner, AgentStatus::Error).await;
        }
        Err(e) => {
            warn!(error = %e, "failed to reap codex process");
            emit(
                inner,
                AgentEvent::Error(ErrorEvent {
                    agent_id: inner.agent_id.clone(),
                    severity: Severity::High,
                    message: format!("failed to reap codex process: {e}"),
                    recoverable: false,
                    error_code: None,
                    category: ErrorCategory::Internal,
                    context: None,
                }),
            )
            .await;
            emit(
                inner,
                AgentEvent::Lifecycle(LifecycleEvent {
                    agent_id: inner.agent_id.clone(),
                    action: LifecycleAction::Crashed,
                    reason: Some("wait failed".to_string()),
                }),
            )
            .await;
            set_terminal_status(inner, AgentStatus::Error).await;
        }
    }
}

async fn capture_stderr(stderr: Option<ChildStderr>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut buf).await {
        debug!(error = %e, "failed to read codex stderr");
        return String::new();
    }
    String::from_utf8_lossy(&buf)
        .chars()
        .take(STDERR_CAPTURE_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

async fn set_terminal_status(inner: &CodexInner, status: AgentStatus) {
    let mut shared = inner.shared.lock().await;
    shared.completed = true;
    shared.handle = AgentHandle::new(
        inner.agent_id.clone(),
        PLUGIN_NAME,
        status,
        shared.session_id.clone(),
    );
}

async fn emit(inner: &CodexInner, event: AgentEvent) {
    inner.sink.lock().await.emit(event);
}

/// Signal a process by pid when the `Child` object is no longer held.
fn signal_pid(pid: Option<u32>, grace: bool) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        let signal = if grace { libc::SIGTERM } else { libc::SIGKILL };
        // SAFETY: pid belongs to a child this runner spawned.
        let _ = unsafe { libc::kill(pid as i32, signal) };
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, grace);
    }
}

/// Ask the child to terminate cooperatively.
fn request_terminate(child: &Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child this runner spawned.
        let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if ret != 0 {
            warn!(pid, "SIGTERM failed, will escalate after the grace window");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child;
    }
}
