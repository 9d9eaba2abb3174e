//! The `AgentRunner` trait -- the lifecycle interface over one agent run.
//!
//! Two variants implement it: [`CodexRunner`] spawns the real agent CLI
//! and maps its output, [`MockRunner`] replays a scripted sequence for
//! tests and demos. The trait is object-safe so the control surface can
//! hold either as `Arc<dyn AgentRunner>` and swap the execution strategy
//! at construction time.

pub mod codex;
pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use relay_proto::brief::AgentBrief;
use relay_proto::control::{AgentHandle, KillResponse, ResolveRequest, SerializedAgentState};
use relay_proto::envelope::{AdapterEvent, EventFactory};
use relay_proto::event::AgentEvent;

pub use codex::{CodexRunner, CodexRunnerConfig};
pub use mock::MockRunner;

/// How long a graceful stop waits before escalating to a forced kill.
pub const KILL_GRACE_WINDOW: std::time::Duration = std::time::Duration::from_secs(5);

/// Lifecycle interface over one agent run.
///
/// A runner starts in `running` status and owns its background
/// production task; every status transition replaces the handle
/// wholesale. `completed` and `error` are terminal; a paused run is
/// resumed by constructing a fresh runner from the checkpoint, never by
/// reanimating this one.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Runner-kind name reported on the handle (e.g. "openai-codex").
    fn plugin_name(&self) -> &str;

    /// The brief this run was started from.
    fn brief(&self) -> &AgentBrief;

    /// Begin producing events in the background. Never blocks.
    fn start(&self);

    /// Current status snapshot.
    async fn handle(&self) -> AgentHandle;

    /// False once the run has been killed or reached a terminal status.
    async fn is_running(&self) -> bool;

    /// Atomically take all events buffered since the last drain,
    /// in production order.
    async fn drain_events(&self) -> Vec<AdapterEvent>;

    /// Fulfil a pending decision. Returns false when no decision with
    /// that id is pending (always false for fully autonomous runners).
    async fn resolve_decision(&self, request: &ResolveRequest) -> bool;

    /// Stop the run. Graceful kills get [`KILL_GRACE_WINDOW`] before
    /// escalation; the single `killed` lifecycle event is the last
    /// event of the run.
    async fn kill(&self, grace: bool) -> KillResponse;

    /// Stop the run and return a checkpoint it can be resumed from.
    async fn pause(&self) -> SerializedAgentState;

    /// Snapshot without stopping. A non-empty `decision_id` is recorded
    /// as pending in the checkpoint.
    async fn get_checkpoint(&self, decision_id: &str) -> SerializedAgentState;

    /// Record brief amendments on the handle for a future activation
    /// cycle; the running session is not changed.
    async fn set_pending_brief_changes(&self, changes: serde_json::Map<String, Value>);
}

// Compile-time assertion: AgentRunner must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn AgentRunner) {}
};

/// Envelope factory plus the run's event buffer, guarded together so
/// sequence assignment and buffering stay a single atomic step.
pub(crate) struct EventSink {
    factory: EventFactory,
    buffer: Vec<AdapterEvent>,
}

impl EventSink {
    pub(crate) fn new(run_id: String) -> Self {
        Self {
            factory: EventFactory::new(run_id),
            buffer: Vec::new(),
        }
    }

    pub(crate) fn emit(&mut self, event: AgentEvent) {
        let envelope = self.factory.wrap(event);
        self.buffer.push(envelope);
    }

    /// Take-all drain; a second call with no intervening emission
    /// returns an empty list.
    pub(crate) fn drain(&mut self) -> Vec<AdapterEvent> {
        std::mem::take(&mut self.buffer)
    }

    pub(crate) fn last_sequence(&self) -> u64 {
        self.factory.last_sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_proto::event::StatusEvent;

    fn status(message: &str) -> AgentEvent {
        AgentEvent::Status(StatusEvent {
            agent_id: "agent-1".to_string(),
            message: message.to_string(),
            tick: None,
        })
    }

    #[test]
    fn sink_drain_is_take_all_then_empty() {
        let mut sink = EventSink::new("run-1".to_string());
        sink.emit(status("one"));
        sink.emit(status("two"));

        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].source_sequence, 1);
        assert_eq!(drained[1].source_sequence, 2);

        assert!(sink.drain().is_empty());
    }

    #[test]
    fn sink_sequence_continues_across_drains() {
        let mut sink = EventSink::new("run-1".to_string());
        sink.emit(status("one"));
        sink.drain();
        sink.emit(status("two"));

        let drained = sink.drain();
        assert_eq!(drained[0].source_sequence, 2);
        assert_eq!(sink.last_sequence(), 2);
    }
}
