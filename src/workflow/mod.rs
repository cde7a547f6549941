//! The workflow engine: a deterministic eight-state machine.
//!
//! # States
//!
//! ```text
//! IDLE ──start()──▶ INIT ──▶ LISTENING ──▶ ANALYZING ──▶ READY
//!                     │          │  ▲          │           │ select
//!                     │          │  └──────────┘           ▼
//!                     │          │                      TX_GATED ──all 4 gates──▶ TRANSMIT
//!                     │          │                          │ deny/cancel/timeout    │
//!                     │          ▼                          ▼                        ▼
//!                     └─────▶ CLEANUP ◀─────────────────── READY                 CLEANUP
//!                                │
//!                                ▼
//!                              IDLE
//! ```
//!
//! Every transmission path runs LISTENING before TRANSMIT — nothing is ever
//! emitted that was not first observed. CLEANUP is unavoidable on every
//! non-IDLE path and always disables the transmitter.
//!
//! # Scheduling
//!
//! One cooperative loop. Each [`Workflow::tick`] drains the input port,
//! processes the current state (or services the emergency stop), checks the
//! state deadline, then the error threshold. [`Workflow::run`] wraps that in
//! a blocking loop with a ~10 ms yield; tests drive `tick()` directly with a
//! manual clock. No state processor blocks — even the Gate-2 confirmation
//! wait is spread across ticks.

mod gates;
mod states;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::AnalysisResult;
use crate::audit::{AuditLog, EventKind, Sink, REASON_MAX};
use crate::buffer::CaptureBuffer;
use crate::clock::Clock;
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::input::InputPort;
use crate::policy::SafetyPolicy;
use crate::radio::Radio;
use crate::signal::{clamp_str, CapturedSignal};

/// Errors accumulated past this count force CLEANUP.
pub const ERROR_THRESHOLD: u32 = 10;

/// TX_GATED entries at or past this count bounce straight back to READY.
pub const MAX_TRANSMISSION_ATTEMPTS: u8 = 4;

/// Cooperative yield between `run()` iterations.
pub const TICK_YIELD_MS: u64 = 10;

/// The eight workflow states. The machine is in exactly one at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Idle,
    Init,
    Listening,
    Analyzing,
    Ready,
    TxGated,
    Transmit,
    Cleanup,
}

impl WorkflowState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Init => "INIT",
            Self::Listening => "LISTENING",
            Self::Analyzing => "ANALYZING",
            Self::Ready => "READY",
            Self::TxGated => "TX_GATED",
            Self::Transmit => "TRANSMIT",
            Self::Cleanup => "CLEANUP",
        }
    }
}

/// Where the TX_GATED pipeline currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatePhase {
    /// Not in the pipeline.
    Inactive,
    /// Freshly entered; attempt counting and Gate 1 pending.
    Entry,
    /// Gate 1 passed; polling the input port for Confirm/Cancel.
    AwaitConfirm,
}

/// One entry in the coarse transition history.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub timestamp_ms: u32,
    pub reason: String,
}

/// The workflow engine. See module docs.
pub struct Workflow<C: Clock> {
    clock: C,
    config: WorkflowConfig,
    radio: Option<Box<dyn Radio>>,
    input: Arc<InputPort>,
    policy: SafetyPolicy,
    audit: AuditLog,
    sink: Option<Box<dyn Sink>>,

    buffer: CaptureBuffer,
    analysis: AnalysisResult,

    state: WorkflowState,
    previous_state: WorkflowState,
    state_entry_ms: u32,
    running: bool,
    emergency_stop: bool,

    selected_signal: Option<usize>,
    user_confirmed: bool,
    user_canceled: bool,
    transmission_attempts: u8,
    gate_phase: GatePhase,

    last_error: Option<WorkflowError>,
    error_count: u32,
    error_log: Vec<String>,
    transition_log: Vec<TransitionRecord>,
}

impl<C: Clock> Workflow<C> {
    pub fn new(clock: C) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            config: WorkflowConfig::default(),
            radio: None,
            input: Arc::new(InputPort::new()),
            policy: SafetyPolicy::new(),
            audit: AuditLog::new(),
            sink: None,
            buffer: CaptureBuffer::with_capacity(0),
            analysis: AnalysisResult::default(),
            state: WorkflowState::Idle,
            previous_state: WorkflowState::Idle,
            state_entry_ms: now,
            running: false,
            emergency_stop: false,
            selected_signal: None,
            user_confirmed: false,
            user_canceled: false,
            transmission_attempts: 0,
            gate_phase: GatePhase::Inactive,
            last_error: None,
            error_count: 0,
            error_log: Vec::new(),
            transition_log: Vec::new(),
        }
    }

    // --- Initialization and control ---

    /// Freeze the configuration and take ownership of the radio.
    ///
    /// The radio's band must match the configured band; the buffer size must
    /// be nonzero. Fully reinitializes run state.
    pub fn initialize(
        &mut self,
        config: WorkflowConfig,
        radio: Box<dyn Radio>,
    ) -> Result<(), WorkflowError> {
        if config.buffer_size == 0 {
            warn!("buffer size of zero rejected");
            return Err(WorkflowError::InitFailed);
        }
        if radio.band() != config.band {
            warn!(
                radio = radio.band().name(),
                configured = config.band.name(),
                "radio band does not match configuration"
            );
            return Err(WorkflowError::InitFailed);
        }
        self.config = config;
        self.radio = Some(radio);
        self.reset_run_state();
        info!(band = config.band.name(), "workflow initialized");
        Ok(())
    }

    /// Arm the workflow: IDLE → INIT. Non-blocking; drive with [`tick`] or
    /// let [`run`] own the loop.
    ///
    /// [`tick`]: Workflow::tick
    /// [`run`]: Workflow::run
    pub fn start(&mut self) -> Result<(), WorkflowError> {
        if self.state != WorkflowState::Idle {
            warn!(state = self.state.name(), "cannot start: not in IDLE");
            return Err(WorkflowError::InitFailed);
        }
        let radio_matches = self
            .radio
            .as_ref()
            .map(|r| r.band() == self.config.band)
            .unwrap_or(false);
        if !radio_matches {
            self.log_error(WorkflowError::InitFailed, "RF radio not available");
            return Err(WorkflowError::InitFailed);
        }

        info!("workflow starting");
        self.running = true;
        self.transition_to(WorkflowState::Init, "User started workflow");
        Ok(())
    }

    /// One cooperative iteration: drain input, process the state (or service
    /// the emergency stop), check the deadline, apply the error threshold.
    pub fn tick(&mut self) {
        self.drain_input();

        // A latched emergency stop preempts the processor so no further
        // radio I/O happens before the transmitter is disabled.
        if self.emergency_stop
            && !matches!(self.state, WorkflowState::Cleanup | WorkflowState::Idle)
        {
            self.check_emergency_stop();
        } else {
            self.process_state();
        }

        self.check_timeout();
        self.check_emergency_stop();

        if self.error_count > ERROR_THRESHOLD
            && !matches!(self.state, WorkflowState::Cleanup | WorkflowState::Idle)
        {
            warn!(errors = self.error_count, "forcing cleanup");
            self.transition_to(WorkflowState::Cleanup, "Error threshold exceeded");
        }
    }

    /// Blocking convenience loop: arm, then tick with a ~10 ms yield until
    /// the machine returns to IDLE. `Ok` only when no errors accumulated.
    pub fn run(&mut self) -> Result<(), WorkflowError> {
        self.start()?;
        while self.running {
            self.tick();
            std::thread::sleep(Duration::from_millis(TICK_YIELD_MS));
        }
        info!(errors = self.error_count, "workflow completed");
        if self.error_count == 0 {
            Ok(())
        } else {
            Err(self.last_error.unwrap_or(WorkflowError::Timeout))
        }
    }

    /// Raise the emergency stop. The next tick forces CLEANUP and the
    /// transmitter stays disabled for the remainder of the run.
    pub fn abort(&mut self) {
        warn!("abort requested");
        self.emergency_stop = true;
    }

    /// Reinitialize all mutable run state. Legal only outside the running
    /// loop; ignored (with a warning) while running. Audit and transition
    /// logs are retained — use [`clear_logs`] to drop them.
    ///
    /// [`clear_logs`]: Workflow::clear_logs
    pub fn reset(&mut self) {
        if self.running {
            warn!("reset ignored while running");
            return;
        }
        self.reset_run_state();
    }

    // --- State information ---

    #[inline]
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    #[inline]
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Milliseconds spent in the current state.
    pub fn elapsed_in_state_ms(&self) -> u32 {
        self.clock.now_ms().wrapping_sub(self.state_entry_ms)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    // --- Results and data access ---

    pub fn captured_signal_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn captured_signal(&self, index: usize) -> Option<&CapturedSignal> {
        self.buffer.get(index)
    }

    pub fn analysis_result(&self) -> &AnalysisResult {
        &self.analysis
    }

    /// Producer-side handle to the user-input port. Safe to hand to another
    /// execution context (button ISR, UI task, test).
    pub fn input(&self) -> Arc<InputPort> {
        Arc::clone(&self.input)
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut SafetyPolicy {
        &mut self.policy
    }

    /// Attach a live audit stream. The in-memory log is kept either way.
    pub fn set_sink(&mut self, sink: Box<dyn Sink>) {
        self.sink = Some(sink);
    }

    // --- Error handling ---

    pub fn last_error(&self) -> Option<WorkflowError> {
        self.last_error
    }

    pub fn error_count(&self) -> usize {
        self.error_count as usize
    }

    pub fn error_log(&self) -> &[String] {
        &self.error_log
    }

    // --- Logging and audit ---

    pub fn transition_log_count(&self) -> usize {
        self.transition_log.len()
    }

    pub fn transition_log(&self, index: usize) -> Option<&TransitionRecord> {
        self.transition_log.get(index)
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn export_logs_json(&self) -> String {
        self.audit.export_json()
    }

    pub fn export_logs_csv(&self) -> String {
        self.audit.export_csv()
    }

    /// Drop the transition history, the error log, and the audit stream
    /// (restarting its sequence numbering).
    pub fn clear_logs(&mut self) {
        self.transition_log.clear();
        self.error_log.clear();
        self.audit.clear();
    }

    // --- State machine internals ---

    fn reset_run_state(&mut self) {
        self.state = WorkflowState::Idle;
        self.previous_state = WorkflowState::Idle;
        self.state_entry_ms = self.clock.now_ms();
        self.running = false;
        self.emergency_stop = false;
        self.buffer = CaptureBuffer::with_capacity(self.config.buffer_size);
        self.analysis = AnalysisResult::default();
        self.selected_signal = None;
        self.user_confirmed = false;
        self.user_canceled = false;
        self.transmission_attempts = 0;
        self.gate_phase = GatePhase::Inactive;
        self.last_error = None;
        self.error_count = 0;
        self.error_log.clear();
        self.input.clear_all();
    }

    fn process_state(&mut self) {
        match self.state {
            WorkflowState::Idle => {}
            WorkflowState::Init => self.process_init(),
            WorkflowState::Listening => self.process_listening(),
            WorkflowState::Analyzing => self.process_analyzing(),
            WorkflowState::Ready => self.process_ready(),
            WorkflowState::TxGated => self.process_tx_gated(),
            WorkflowState::Transmit => self.process_transmit(),
            WorkflowState::Cleanup => self.process_cleanup(),
        }
    }

    /// Consume pending user input relevant to the current state. Events for
    /// other states are dropped so they cannot fire stale.
    fn drain_input(&mut self) {
        let input = Arc::clone(&self.input);

        if input.take_abort() {
            self.audit_event(EventKind::UserAction, "ABORT", "User abort", "");
            self.emergency_stop = true;
        }

        match self.state {
            WorkflowState::Listening => {
                if self.elapsed_in_state_ms() >= self.config.listen_min_ms
                    && input.take_trigger()
                {
                    self.audit_event(
                        EventKind::UserAction,
                        "TRIGGER_ANALYSIS",
                        "User manually triggered analysis",
                        "",
                    );
                    self.transition_to(WorkflowState::Analyzing, "User trigger");
                    return;
                }
            }
            WorkflowState::Ready => {
                if let Some(index) = input.take_select() {
                    if index < self.buffer.len() {
                        self.selected_signal = Some(index);
                        let data = format!("signal_index={index}");
                        self.audit_event(
                            EventKind::UserAction,
                            "SELECT_SIGNAL",
                            "User selected signal for transmission",
                            &data,
                        );
                        self.transition_to(WorkflowState::TxGated, "User requested transmission");
                        return;
                    }
                    tracing::debug!(index, "selection out of range, ignored");
                }
                if input.take_continue() {
                    self.audit_event(
                        EventKind::UserAction,
                        "CONTINUE_OBSERVATION",
                        "User requested more observation",
                        "",
                    );
                    self.transition_to(WorkflowState::Listening, "User requested more observation");
                    return;
                }
                if input.take_cancel() {
                    self.user_canceled = true;
                    self.audit_event(
                        EventKind::UserAction,
                        "CANCEL_TX",
                        "User canceled transmission",
                        "",
                    );
                }
            }
            WorkflowState::TxGated => {
                if input.take_confirm() {
                    self.user_confirmed = true;
                    self.audit_event(
                        EventKind::UserAction,
                        "CONFIRM_TX",
                        "User confirmed transmission",
                        "",
                    );
                }
                if input.take_cancel() {
                    self.user_canceled = true;
                    self.audit_event(
                        EventKind::UserAction,
                        "CANCEL_TX",
                        "User canceled transmission",
                        "",
                    );
                }
            }
            _ => {}
        }

        if self.state != WorkflowState::Listening {
            let _ = input.take_trigger();
        }
        if self.state != WorkflowState::Ready {
            let _ = input.take_select();
            let _ = input.take_continue();
        }
        if self.state != WorkflowState::TxGated {
            let _ = input.take_confirm();
        }
        if !matches!(self.state, WorkflowState::TxGated | WorkflowState::Ready) {
            let _ = input.take_cancel();
        }
    }

    /// Perform a transition with the full audit triple: EXIT on the old
    /// state, the TRANSITION itself, ENTRY on the new state — consecutive
    /// sequence numbers, in that order.
    pub(super) fn transition_to(&mut self, new_state: WorkflowState, reason: &str) {
        let old = self.state;
        info!(
            from = old.name(),
            to = new_state.name(),
            reason,
            "state transition"
        );

        let exit_event = format!("EXIT_{}", old.name());
        self.audit_event(EventKind::StateExit, &exit_event, reason, "");

        self.transition_log.push(TransitionRecord {
            from: old,
            to: new_state,
            timestamp_ms: self.clock.now_ms(),
            reason: clamp_str(reason, REASON_MAX),
        });
        let data = format!("from={} to={}", old.name(), new_state.name());
        self.audit_event(EventKind::Transition, "TRANSITION", reason, &data);

        self.previous_state = old;
        self.state = new_state;
        self.state_entry_ms = self.clock.now_ms();

        let entry_event = format!("ENTER_{}", new_state.name());
        self.audit_event(EventKind::StateEntry, &entry_event, reason, "");

        self.on_state_entry(new_state);
    }

    fn on_state_entry(&mut self, state: WorkflowState) {
        match state {
            WorkflowState::TxGated => {
                self.gate_phase = GatePhase::Entry;
                self.user_confirmed = false;
                self.user_canceled = false;
            }
            WorkflowState::Idle => {
                self.gate_phase = GatePhase::Inactive;
                self.running = false;
            }
            _ => {
                self.gate_phase = GatePhase::Inactive;
                self.user_confirmed = false;
                self.user_canceled = false;
            }
        }
    }

    fn check_timeout(&mut self) {
        let timeout = self.timeout_for(self.state);
        if timeout == 0 {
            return;
        }
        let elapsed = self.elapsed_in_state_ms();
        if elapsed > timeout {
            self.handle_timeout(elapsed);
        }
    }

    fn timeout_for(&self, state: WorkflowState) -> u32 {
        match state {
            WorkflowState::Idle => 0,
            WorkflowState::Init => self.config.init_timeout_ms,
            WorkflowState::Listening => self.config.listen_max_ms,
            WorkflowState::Analyzing => self.config.analyze_timeout_ms,
            WorkflowState::Ready => self.config.ready_timeout_ms,
            WorkflowState::TxGated => self.config.tx_gate_timeout_ms,
            WorkflowState::Transmit => self.config.transmit_max_ms,
            WorkflowState::Cleanup => self.config.cleanup_timeout_ms,
        }
    }

    fn handle_timeout(&mut self, elapsed_ms: u32) {
        // LISTENING's deadline is a forcing floor, not a fault.
        if self.state != WorkflowState::Listening {
            self.log_error(WorkflowError::Timeout, "State timeout");
        }
        let data = format!("state={} elapsed={}", self.state.name(), elapsed_ms);
        self.audit_event(EventKind::Timeout, "TIMEOUT", "State deadline exceeded", &data);

        match self.state {
            WorkflowState::Idle => {}
            WorkflowState::Init => self.transition_to(WorkflowState::Cleanup, "Init timeout"),
            WorkflowState::Listening => {
                self.transition_to(WorkflowState::Analyzing, "Listen timeout");
            }
            WorkflowState::Analyzing => {
                // The result keeps complete == false; incomplete analysis is
                // never promoted.
                self.transition_to(WorkflowState::Ready, "Analysis timeout");
            }
            WorkflowState::Ready => self.transition_to(WorkflowState::Cleanup, "Ready timeout"),
            WorkflowState::TxGated => self.transition_to(WorkflowState::Ready, "Gate timeout"),
            WorkflowState::Transmit => {
                self.emergency_stop = true;
                self.transition_to(WorkflowState::Cleanup, "Transmit timeout");
            }
            WorkflowState::Cleanup => self.transition_to(WorkflowState::Idle, "Cleanup timeout"),
        }
    }

    fn check_emergency_stop(&mut self) {
        if !self.emergency_stop {
            return;
        }
        if matches!(self.state, WorkflowState::Cleanup | WorkflowState::Idle) {
            return;
        }
        warn!("emergency stop active");
        if let Some(radio) = self.radio.as_mut() {
            radio.set_transmit_enabled(false);
        }
        self.transition_to(WorkflowState::Cleanup, "Emergency stop");
    }

    pub(super) fn log_error(&mut self, error: WorkflowError, message: &str) {
        self.last_error = Some(error);
        self.error_count += 1;
        self.error_log.push(message.to_string());
        tracing::error!(code = error.code(), "{message}");
        self.audit_event(EventKind::Error, "ERROR", message, error.as_str());
    }

    pub(super) fn audit_event(&mut self, kind: EventKind, event: &str, reason: &str, data: &str) {
        let now_ms = self.clock.now_ms();
        let now_us = self.clock.now_us();
        let entry = self.audit.record(
            kind,
            self.state,
            self.previous_state,
            now_ms,
            now_us,
            event,
            reason,
            data,
        );
        if let Some(sink) = self.sink.as_mut() {
            sink.write_event(entry);
        }
    }
}
