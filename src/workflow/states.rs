//! Per-state processors. One is invoked per tick by the engine.

use tracing::{debug, info};

use crate::analysis::{run_analysis, AnalysisResult};
use crate::buffer::{CaptureBuffer, FULL_TRIGGER_RATIO};
use crate::clock::Clock;
use crate::error::WorkflowError;
use crate::policy::TransmitRequest;
use crate::radio::EmissionError;

use super::gates::estimate_duration_ms;
use super::{Workflow, WorkflowState};

impl<C: Clock> Workflow<C> {
    /// INIT: bring up the radio in receive-only mode, reserve the capture
    /// buffer, zero the statistics. One tick.
    pub(super) fn process_init(&mut self) {
        debug!("initialization phase");

        let hardware_ok = match self.radio.as_mut() {
            Some(radio) if radio.band() == self.config.band => {
                radio.start_receive();
                radio.set_transmit_enabled(false);
                true
            }
            _ => false,
        };

        if !hardware_ok {
            self.log_error(WorkflowError::InitFailed, "Hardware initialization failed");
            self.transition_to(WorkflowState::Cleanup, "Init failed");
            return;
        }

        self.buffer = CaptureBuffer::with_capacity(self.config.buffer_size);
        self.analysis = AnalysisResult::default();
        self.error_count = 0;

        debug!(slots = self.config.buffer_size, "buffer reserved");
        self.transition_to(WorkflowState::Listening, "Init successful");
    }

    /// LISTENING: passive observation. Exits are gated on `listen_min_ms`;
    /// past it, a ≥90% buffer or `listen_max_ms` forces ANALYZING.
    pub(super) fn process_listening(&mut self) {
        // Passive observation: the transmitter stays down.
        if let Some(radio) = self.radio.as_mut() {
            radio.set_transmit_enabled(false);
        }

        let elapsed = self.elapsed_in_state_ms();
        if elapsed < self.config.listen_min_ms {
            self.capture_signals();
            return;
        }

        if self.buffer.fill_ratio() >= FULL_TRIGGER_RATIO {
            info!("buffer 90% full, triggering analysis");
            self.transition_to(WorkflowState::Analyzing, "Buffer full");
            return;
        }

        if elapsed >= self.config.listen_max_ms {
            info!("maximum observation time reached");
            self.transition_to(WorkflowState::Analyzing, "Max time reached");
            return;
        }

        self.capture_signals();
    }

    /// Drain the radio into the buffer: capture → validate → append by move.
    /// Signals failing validation are dropped (their pulse buffers freed
    /// with them).
    fn capture_signals(&mut self) {
        loop {
            if self.buffer.is_full() {
                break;
            }
            let Some(signal) = self.radio.as_mut().and_then(|r| r.poll()) else {
                break;
            };
            if !signal.is_valid {
                continue;
            }
            if !signal.passes_capture_validation() {
                debug!("capture failed validation, dropped");
                continue;
            }
            if !self.buffer.push(signal) {
                self.log_error(WorkflowError::BufferOverflow, "Capture buffer overflow");
                break;
            }
        }
    }

    /// ANALYZING: classify, detect bindings, build statistics. An empty
    /// buffer loops back to LISTENING instead.
    pub(super) fn process_analyzing(&mut self) {
        if self.buffer.is_empty() {
            info!("no signals captured, returning to listening");
            self.transition_to(WorkflowState::Listening, "No data");
            return;
        }

        let now_ms = self.clock.now_ms();
        self.analysis = run_analysis(&mut self.buffer, self.config.band, now_ms);
        info!(
            signals = self.analysis.signal_count,
            valid = self.analysis.valid_signal_count,
            patterns = self.analysis.unique_patterns,
            "analysis complete"
        );

        self.transition_to(WorkflowState::Ready, "Analysis complete");
    }

    /// READY: wait for the operator. A cancel drops any pending selection;
    /// prolonged inactivity ends the run.
    pub(super) fn process_ready(&mut self) {
        if self.user_canceled {
            self.user_canceled = false;
            self.selected_signal = None;
        }

        if self.elapsed_in_state_ms() >= self.config.ready_timeout_ms {
            info!("ready timeout, ending workflow");
            self.transition_to(WorkflowState::Cleanup, "Inactivity timeout");
        }
    }

    /// TRANSMIT: final policy verification, attempt audit, then emission
    /// (or simulation in dry-run mode). Always exits into CLEANUP.
    pub(super) fn process_transmit(&mut self) {
        let signal_info = self
            .selected_signal
            .and_then(|i| self.buffer.get(i).map(|s| (i, s.frequency_mhz)));
        let Some((index, frequency)) = signal_info else {
            self.log_error(WorkflowError::InvalidSignal, "No valid signal selected");
            self.transition_to(WorkflowState::Cleanup, "Transmit failed");
            return;
        };

        let duration_ms = self
            .buffer
            .get(index)
            .map(|s| estimate_duration_ms(s, self.config.band))
            .unwrap_or(0);

        let now_ms = self.clock.now_ms();
        let mut request =
            TransmitRequest::new(frequency, duration_ms, now_ms, "Gated workflow transmission");
        request.confirmed = true;

        let verdict = self.policy.check_transmit_policy(&request, now_ms);
        self.policy
            .log_transmit_attempt(&request, verdict.is_allowed(), verdict, now_ms);

        if !verdict.is_allowed() {
            self.log_error(WorkflowError::GateDenied, "Final policy check denied");
            self.transition_to(WorkflowState::Cleanup, "Transmit denied");
            return;
        }

        info!(
            index,
            frequency_mhz = frequency,
            dry_run = self.config.dry_run_mode,
            "transmitting signal"
        );

        let emit_result: Result<(), EmissionError> = if self.config.dry_run_mode {
            debug!("dry run, emission simulated");
            Ok(())
        } else {
            match (self.radio.as_mut(), self.buffer.get(index)) {
                (Some(radio), Some(signal)) => {
                    radio.set_transmit_enabled(true);
                    let result = radio.emit(signal);
                    radio.set_transmit_enabled(false);
                    result
                }
                _ => Err(EmissionError::Hardware("radio unavailable".into())),
            }
        };

        match emit_result {
            Ok(()) => {
                info!("transmission completed");
                self.transition_to(WorkflowState::Cleanup, "Transmit success");
            }
            Err(err) => {
                tracing::error!(error = %err, "emission failed");
                self.log_error(WorkflowError::TransmissionFailed, "Transmission execution failed");
                self.transition_to(WorkflowState::Cleanup, "Transmit failed");
            }
        }
    }

    /// CLEANUP: the transmitter goes down, reception stops, and the machine
    /// returns to IDLE. Reached on every non-IDLE path.
    pub(super) fn process_cleanup(&mut self) {
        debug!("cleanup phase");

        if let Some(radio) = self.radio.as_mut() {
            radio.set_transmit_enabled(false);
            radio.stop_receive();
        }

        self.transition_to(WorkflowState::Idle, "Cleanup done");
    }
}
