//! Deterministic audit event stream.
//!
//! # Architecture
//!
//! ```text
//! Workflow ──record()──▶ AuditLog ──────▶ export_json() / export_csv()
//!                           │
//!                           └──────────▶ Sink (optional live stream)
//! ```
//!
//! Every state entry, state exit, transition, error, user action, and
//! timeout is appended here with a strictly monotonic sequence number — the
//! sole ordering truth. The log is bounded; when full, the oldest entry is
//! evicted (FIFO) and counted, never silently lost. Deterministic logging is
//! a permanent feature: there is no off switch.

use std::collections::VecDeque;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::signal::clamp_str;
use crate::workflow::WorkflowState;

/// Default bound on retained events.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Maximum length of an event identifier.
pub const EVENT_NAME_MAX: usize = 31;

/// Maximum length of a reason field.
pub const REASON_MAX: usize = 63;

/// Maximum length of an auxiliary data field.
pub const DATA_MAX: usize = 63;

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    StateEntry,
    StateExit,
    Transition,
    Error,
    UserAction,
    Timeout,
}

impl EventKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::StateEntry => "STATE_ENTRY",
            Self::StateExit => "STATE_EXIT",
            Self::Transition => "TRANSITION",
            Self::Error => "ERROR",
            Self::UserAction => "USER_ACTION",
            Self::Timeout => "TIMEOUT",
        }
    }
}

/// One audit record. Field lengths are clamped on storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Strictly monotonic sequence number; starts at 0.
    pub seq: u32,
    pub timestamp_ms: u32,
    pub timestamp_us: u32,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    /// State at the moment the event was recorded.
    pub state: WorkflowState,
    /// State before the most recent transition.
    pub prev_state: WorkflowState,
    /// Event identifier, e.g. `ENTER_LISTENING`.
    pub event: String,
    /// Cause of the event.
    pub reason: String,
    /// Auxiliary `key=value` data or a JSON fragment.
    pub data: String,
}

/// Receives audit events as they are appended. The in-memory log is always
/// retained regardless of any sink.
pub trait Sink {
    fn write_event(&mut self, event: &AuditEvent);
}

#[derive(Serialize)]
struct LogExport<'a> {
    workflow_logs: Vec<&'a AuditEvent>,
}

/// Bounded, append-only event stream.
#[derive(Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditEvent>,
    capacity: usize,
    next_seq: u32,
    evicted: u32,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
            evicted: 0,
        }
    }

    /// Append an event. The sequence number is issued immediately before
    /// insertion and is never reordered.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record(
        &mut self,
        kind: EventKind,
        state: WorkflowState,
        prev_state: WorkflowState,
        timestamp_ms: u32,
        timestamp_us: u32,
        event: &str,
        reason: &str,
        data: &str,
    ) -> &AuditEvent {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted = self.evicted.wrapping_add(1);
        }

        let entry = AuditEvent {
            seq: self.next_seq,
            timestamp_ms,
            timestamp_us,
            kind,
            state,
            prev_state,
            event: clamp_str(event, EVENT_NAME_MAX),
            reason: clamp_str(reason, REASON_MAX),
            data: clamp_str(data, DATA_MAX),
        };
        self.next_seq = self.next_seq.wrapping_add(1);
        self.entries.push_back(entry);
        self.entries.back().expect("entry just pushed")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AuditEvent> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuditEvent> {
        self.entries.iter()
    }

    /// Number of entries lost to FIFO eviction since the last clear.
    pub fn evicted(&self) -> u32 {
        self.evicted
    }

    /// Drop all entries and restart sequence numbering at 0.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
        self.evicted = 0;
    }

    /// Export as `{"workflow_logs": [...]}`.
    pub fn export_json(&self) -> String {
        let export = LogExport {
            workflow_logs: self.entries.iter().collect(),
        };
        serde_json::to_string_pretty(&export).unwrap_or_default()
    }

    /// Export as CSV. Values are length-bounded and comma-free by
    /// construction, so no quoting is applied.
    pub fn export_csv(&self) -> String {
        let mut csv =
            String::from("sequence,timestamp_ms,timestamp_us,event_type,state,prev_state,event,reason,data\n");
        for entry in &self.entries {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{},{}",
                entry.seq,
                entry.timestamp_ms,
                entry.timestamp_us,
                entry.kind.name(),
                entry.state.name(),
                entry.prev_state.name(),
                entry.event,
                entry.reason,
                entry.data
            );
        }
        csv
    }
}
