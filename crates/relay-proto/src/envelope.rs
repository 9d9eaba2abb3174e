//! The sequenced event envelope and its factory.
//!
//! Every domain event leaving a run is wrapped in an [`AdapterEvent`]
//! carrying a globally unique event id, a run-scoped sequence number,
//! an occurrence timestamp, and the run id shared by all envelopes of
//! that run. The sequence is the canonical total order of the run.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::AgentEvent;

/// A sequenced, timestamped wrapper around one domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterEvent {
    pub source_event_id: String,
    pub source_sequence: u64,
    pub source_occurred_at: String,
    pub run_id: String,
    pub event: AgentEvent,
}

/// Creates [`AdapterEvent`] envelopes with monotonic sequencing.
///
/// `wrap` is not safe for concurrent invocation; callers serialize all
/// emission for a run through a single logical thread of control.
#[derive(Debug)]
pub struct EventFactory {
    run_id: String,
    sequence: u64,
}

impl EventFactory {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            sequence: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The last sequence number handed out, or 0 before any `wrap` call.
    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }

    /// Wrap a domain event in the next envelope of this run.
    pub fn wrap(&mut self, event: AgentEvent) -> AdapterEvent {
        self.sequence += 1;
        AdapterEvent {
            source_event_id: Uuid::new_v4().to_string(),
            source_sequence: self.sequence,
            source_occurred_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            run_id: self.run_id.clone(),
            event,
        }
    }
}
