//! Wire protocol types for the relay adapter.
//!
//! This crate defines the types exchanged with the orchestrator: the
//! closed set of domain event payloads ([`AgentEvent`]), the sequenced
//! envelope ([`AdapterEvent`]) and its factory, the task brief
//! ([`AgentBrief`]), and the control-surface request/response types.
//!
//! All types serialize with camelCase field names and omit absent
//! optional fields, matching the orchestrator's wire format.

pub mod brief;
pub mod control;
pub mod envelope;
pub mod event;

pub use brief::{AgentBrief, ContextInjection, KnowledgeSnapshot, ProjectBrief};
pub use control::{
    AgentHandle, HealthResponse, KillRequest, KillResponse, ResolveRequest, SandboxResourceUsage,
    SdkCheckpoint, SerializeReason, SerializedAgentState,
};
pub use envelope::{AdapterEvent, EventFactory};
pub use event::{
    AgentEvent, AgentStatus, ArtifactEvent, ArtifactKind, CompletionEvent, CompletionOutcome,
    DecisionEvent, ErrorEvent, LifecycleAction, LifecycleEvent, ProgressEvent, Provenance,
    StatusEvent, ToolApprovalEvent, ToolCallEvent, ToolCallPhase,
};
