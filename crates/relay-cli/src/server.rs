//! The HTTP/WebSocket control surface.
//!
//! One runner is active at a time. Control handlers report protocol
//! misuse (conflict, not-found) synchronously; everything that happens
//! inside a run arrives as domain events over `/events`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use relay_core::runner::{AgentRunner, CodexRunner, CodexRunnerConfig, MockRunner};
use relay_core::upload::{artifact_upload_endpoint, rewrite_artifact_uri, upload_client};
use relay_proto::brief::{AgentBrief, ContextInjection};
use relay_proto::control::{
    AgentHandle, HealthResponse, HealthStatus, KillRequest, KillResponse, ResolveRequest,
    SandboxResourceUsage, SerializedAgentState,
};
use relay_proto::envelope::AdapterEvent;
use relay_proto::event::AgentStatus;

/// Bound on the shared event buffer; oldest entries are dropped first.
pub const MAX_EVENT_BUFFER: usize = 1000;

/// Settle time after spawn/resume before the handle is reported.
const SPAWN_SETTLE: Duration = Duration::from_millis(50);
/// Settle time after a resolution before the response returns.
const RESOLVE_SETTLE: Duration = Duration::from_millis(200);
/// Push-loop poll interval for the event stream.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Mutable application state shared across handlers.
pub struct AppState {
    mock: bool,
    workspace: Option<PathBuf>,
    codex_binary: String,
    runner: tokio::sync::Mutex<Option<Arc<dyn AgentRunner>>>,
    event_buffer: tokio::sync::Mutex<Vec<AdapterEvent>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(mock: bool, workspace: Option<PathBuf>, codex_binary: String) -> Self {
        Self {
            mock,
            workspace,
            codex_binary,
            runner: tokio::sync::Mutex::new(None),
            event_buffer: tokio::sync::Mutex::new(Vec::new()),
            started_at: Instant::now(),
        }
    }

    fn build_runner(
        &self,
        brief: AgentBrief,
        resume_session_id: Option<String>,
    ) -> Arc<dyn AgentRunner> {
        if self.mock {
            Arc::new(MockRunner::new(brief))
        } else {
            Arc::new(CodexRunner::new(
                brief,
                CodexRunnerConfig {
                    codex_binary: self.codex_binary.clone(),
                    workspace: self.workspace.clone(),
                    resume_session_id,
                    continuation: false,
                },
            ))
        }
    }
}

async fn current_runner(state: &AppState) -> Result<Arc<dyn AgentRunner>, ApiError> {
    state
        .runner
        .lock()
        .await
        .clone()
        .ok_or_else(|| ApiError::NotFound("No agent running".to_string()))
}

/// Move events from the runner's buffer into the shared buffer,
/// dropping the oldest entries past the cap.
async fn drain_to_buffer(state: &AppState) {
    let runner = state.runner.lock().await.clone();
    let Some(runner) = runner else { return };

    let events = runner.drain_events().await;
    if events.is_empty() {
        return;
    }

    let mut buffer = state.event_buffer.lock().await;
    buffer.extend(events);
    if buffer.len() > MAX_EVENT_BUFFER {
        let excess = buffer.len() - MAX_EVENT_BUFFER;
        buffer.drain(..excess);
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/spawn", post(spawn))
        .route("/kill", post(kill))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/resolve", post(resolve))
        .route("/checkpoint", post(checkpoint))
        .route("/inject-context", post(inject_context))
        .route("/update-brief", post(update_brief))
        .route("/events", get(events_ws));

    // The config echo is a debugging aid for scripted runs only.
    if state.mock {
        router = router.route("/debug/config", get(debug_config));
    }

    router.layer(CorsLayer::permissive()).with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(
    host: &str,
    port: u16,
    mock: bool,
    workspace: Option<PathBuf>,
    codex_binary: String,
) -> Result<()> {
    let state = Arc::new(AppState::new(mock, workspace, codex_binary));
    let app = build_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;

    // Announce the bound port on stdout for parent-process discovery
    // (port 0 requests an OS-assigned port).
    println!("{}", serde_json::json!({ "port": bound.port() }));

    info!(mock, "relay listening on http://{bound}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("relay shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let agent_status = match &*state.runner.lock().await {
        Some(runner) => runner.handle().await.status,
        None => AgentStatus::Completed,
    };
    let pending = state.event_buffer.lock().await.len();

    Json(HealthResponse {
        status: HealthStatus::Healthy,
        agent_status,
        uptime_ms: state.started_at.elapsed().as_millis() as u64,
        resource_usage: SandboxResourceUsage {
            cpu_percent: 0.0,
            memory_mb: 0.0,
            disk_mb: 0.0,
            collected_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        },
        pending_event_buffer_size: pending,
    })
}

async fn spawn(
    State(state): State<Arc<AppState>>,
    Json(brief): Json<AgentBrief>,
) -> Result<Json<AgentHandle>, ApiError> {
    let runner = {
        let mut guard = state.runner.lock().await;
        if let Some(active) = guard.as_ref() {
            if active.is_running().await {
                return Err(ApiError::Conflict("Agent already running".to_string()));
            }
        }
        let runner = state.build_runner(brief, None);
        runner.start();
        *guard = Some(Arc::clone(&runner));
        runner
    };

    // Give the runner a moment to emit initial events.
    tokio::time::sleep(SPAWN_SETTLE).await;
    Ok(Json(runner.handle().await))
}

async fn kill(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<KillResponse>, ApiError> {
    let runner = current_runner(&state).await?;
    // The body is optional; an absent or malformed one means a
    // graceful stop.
    let grace = if body.is_empty() {
        true
    } else {
        serde_json::from_slice::<KillRequest>(&body)
            .map(|r| r.grace)
            .unwrap_or(true)
    };

    let response = runner.kill(grace).await;
    // Pull the final events into the shared buffer so the stream can
    // still deliver them.
    drain_to_buffer(&state).await;
    Ok(Json(response))
}

async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SerializedAgentState>, ApiError> {
    let runner = current_runner(&state).await?;
    let serialized = runner.pause().await;
    drain_to_buffer(&state).await;
    Ok(Json(serialized))
}

async fn resume(
    State(state): State<Arc<AppState>>,
    Json(agent_state): Json<SerializedAgentState>,
) -> Json<AgentHandle> {
    let resume_session_id = Some(agent_state.session_id.clone());
    let runner = {
        let mut guard = state.runner.lock().await;
        let runner = state.build_runner(agent_state.brief_snapshot, resume_session_id);
        runner.start();
        *guard = Some(Arc::clone(&runner));
        runner
    };

    tokio::time::sleep(SPAWN_SETTLE).await;
    Json(runner.handle().await)
}

async fn resolve(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<Value>, ApiError> {
    let runner = current_runner(&state).await?;

    if !runner.resolve_decision(&request).await {
        return Err(ApiError::NotFound(format!(
            "No pending decision with id {}",
            request.decision_id
        )));
    }

    // Give the runner time to process the resolution and emit events.
    tokio::time::sleep(RESOLVE_SETTLE).await;
    Ok(Json(serde_json::json!({
        "status": "resolved",
        "decisionId": request.decision_id,
    })))
}

async fn checkpoint(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Value>,
) -> Result<Json<SerializedAgentState>, ApiError> {
    let runner = current_runner(&state).await?;
    let decision_id = request
        .get("decisionId")
        .and_then(Value::as_str)
        .unwrap_or("");
    Ok(Json(runner.get_checkpoint(decision_id).await))
}

async fn inject_context(Json(injection): Json<ContextInjection>) -> Json<Value> {
    // Recorded only; applied on a future activation cycle.
    debug!(
        snapshot_version = injection.snapshot_version,
        estimated_tokens = injection.estimated_tokens,
        "context injection accepted"
    );
    Json(serde_json::json!({ "status": "accepted" }))
}

async fn update_brief(
    State(state): State<Arc<AppState>>,
    Json(changes): Json<serde_json::Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let runner = current_runner(&state).await?;
    runner.set_pending_brief_changes(changes).await;
    Ok(Json(serde_json::json!({ "status": "accepted" })))
}

async fn debug_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    let provider_config = match &*state.runner.lock().await {
        Some(runner) => runner
            .brief()
            .provider_config
            .clone()
            .map(Value::Object)
            .unwrap_or(Value::Null),
        None => Value::Null,
    };
    Json(serde_json::json!({ "providerConfig": provider_config }))
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

async fn events_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Push buffered envelopes to one client in sequence order. A
/// disconnect stops this loop without affecting the runner.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("event stream client connected");
    let (mut sender, mut receiver) = socket.split();

    let upload_endpoint = artifact_upload_endpoint();
    let client = match upload_endpoint {
        Some(_) => match upload_client() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "artifact upload client unavailable");
                None
            }
        },
        None => None,
    };

    loop {
        drain_to_buffer(&state).await;

        loop {
            let next = {
                let mut buffer = state.event_buffer.lock().await;
                if buffer.is_empty() {
                    None
                } else {
                    Some(buffer.remove(0))
                }
            };
            let Some(mut event) = next else { break };

            if let (Some(endpoint), Some(client)) = (upload_endpoint.as_deref(), client.as_ref()) {
                event = rewrite_artifact_uri(client, endpoint, event).await;
            }

            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "failed to serialize event for the stream");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                info!("event stream client disconnected");
                return;
            }
        }

        tokio::select! {
            () = tokio::time::sleep(EVENT_POLL_INTERVAL) => {}
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        info!("event stream client disconnected");
                        return;
                    }
                    // Pings are answered by axum; other frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
