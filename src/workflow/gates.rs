//! The four-gate transmission approval pipeline.
//!
//! Entered only from READY with a validated selection. Gates run in order
//! and the first refusal bounces back to READY with the denial reason in
//! the audit trail:
//!
//! 1. **Policy** — blacklist, estimated duration, signal validity.
//! 2. **Confirmation** — explicit user Confirm within `tx_gate_timeout`,
//!    single-use; Cancel or silence is a denial. Polled across ticks, never
//!    blocking.
//! 3. **Rate limit** — the safety policy's trailing 60 s window.
//! 4. **Band-specific** — pulse-timing sanity (sub-GHz) or packet shape and
//!    binding evidence (2.4 GHz).
//!
//! Only a pass through all four reaches TRANSMIT.

use tracing::info;

use crate::clock::Clock;
use crate::radio::Band;
use crate::signal::{CapturedSignal, RAW_DATA_LEN};

use super::{GatePhase, Workflow, WorkflowState, MAX_TRANSMISSION_ATTEMPTS};

/// Shortest emittable pulse, inclusive (µs).
pub const PULSE_MIN_US: u16 = 100;

/// Longest emittable pulse, inclusive (µs).
pub const PULSE_MAX_US: u16 = 10_000;

/// Repeat count assumed when estimating sub-GHz on-air time.
pub const TRANSMIT_REPEATS: u32 = 10;

/// Flat on-air estimate for a 2.4 GHz packet burst (ms).
pub const PACKET_EMIT_ESTIMATE_MS: u32 = 10;

/// Estimated on-air duration for one rebroadcast, in milliseconds.
pub(crate) fn estimate_duration_ms(signal: &CapturedSignal, band: Band) -> u32 {
    match band {
        Band::SubGhz => {
            let total_us: u32 = signal.pulses.iter().map(|&p| u32::from(p)).sum();
            total_us.saturating_mul(TRANSMIT_REPEATS) / 1_000
        }
        Band::Packet24 => PACKET_EMIT_ESTIMATE_MS,
    }
}

impl<C: Clock> Workflow<C> {
    /// TX_GATED processor. The attempt counter and Gate 1 run on the entry
    /// tick; the confirmation wait spans ticks; Gates 3 and 4 run on the
    /// tick that observes the Confirm.
    pub(super) fn process_tx_gated(&mut self) {
        match self.gate_phase {
            GatePhase::Inactive => {
                self.gate_phase = GatePhase::Entry;
            }
            GatePhase::Entry => self.process_gate_entry(),
            GatePhase::AwaitConfirm => self.process_gate_confirmation(),
        }
    }

    fn process_gate_entry(&mut self) {
        self.transmission_attempts = self.transmission_attempts.saturating_add(1);
        if self.transmission_attempts >= MAX_TRANSMISSION_ATTEMPTS {
            info!(
                attempts = self.transmission_attempts,
                "too many transmission attempts"
            );
            self.transition_to(WorkflowState::Ready, "Max attempts");
            return;
        }

        let Some(index) = self.selected_signal.filter(|&i| i < self.buffer.len()) else {
            self.transition_to(WorkflowState::Ready, "Invalid selection");
            return;
        };

        if let Err(denial) = self.check_policy_gate(index) {
            info!(gate = 1, denial, "gate denied");
            self.transition_to(WorkflowState::Ready, denial);
            return;
        }
        info!(gate = 1, "passed");

        if !self.policy.require_confirmation() {
            info!(gate = 2, "confirmation not required");
            self.run_final_gates(index);
            return;
        }

        self.gate_phase = GatePhase::AwaitConfirm;
    }

    fn process_gate_confirmation(&mut self) {
        if self.user_canceled {
            self.user_canceled = false;
            info!(gate = 2, "user canceled");
            self.transition_to(WorkflowState::Ready, "User canceled");
            return;
        }

        if self.user_confirmed {
            // Single-use: consumed here, never reusable for a later gate run.
            self.user_confirmed = false;
            info!(gate = 2, "passed");

            let Some(index) = self.selected_signal.filter(|&i| i < self.buffer.len()) else {
                self.transition_to(WorkflowState::Ready, "Invalid selection");
                return;
            };
            self.run_final_gates(index);
            return;
        }

        if self.elapsed_in_state_ms() >= self.config.tx_gate_timeout_ms {
            info!(gate = 2, "confirmation timed out");
            self.transition_to(WorkflowState::Ready, "Confirmation timeout");
        }
    }

    fn run_final_gates(&mut self, index: usize) {
        let now_ms = self.clock.now_ms();
        if !self.policy.is_rate_limit_ok(now_ms) {
            info!(gate = 3, "rate limit exceeded");
            self.transition_to(WorkflowState::Ready, "Rate limit exceeded");
            return;
        }
        info!(gate = 3, "passed");

        if let Err(denial) = self.check_band_gate(index) {
            info!(gate = 4, denial, "gate denied");
            self.transition_to(WorkflowState::Ready, denial);
            return;
        }
        info!(gate = 4, "passed");

        info!("all gates passed");
        self.transition_to(WorkflowState::Transmit, "All gates passed");
    }

    /// Gate 1: frequency not blacklisted, estimated duration within the
    /// ceiling, validity bit intact.
    fn check_policy_gate(&self, index: usize) -> Result<(), &'static str> {
        let Some(signal) = self.buffer.get(index) else {
            return Err("Invalid selection");
        };

        if !self.policy.is_frequency_allowed(signal.frequency_mhz) {
            return Err("Blacklisted frequency");
        }

        let duration_ms = estimate_duration_ms(signal, self.config.band);
        if duration_ms > self.config.transmit_max_ms {
            return Err("Duration limit exceeded");
        }

        if !signal.is_valid {
            return Err("Invalid signal");
        }

        Ok(())
    }

    /// Gate 4: band-specific sanity.
    fn check_band_gate(&self, index: usize) -> Result<(), &'static str> {
        let Some(signal) = self.buffer.get(index) else {
            return Err("Invalid selection");
        };

        match self.config.band {
            Band::SubGhz => {
                let in_range = signal
                    .pulses
                    .iter()
                    .all(|&p| (PULSE_MIN_US..=PULSE_MAX_US).contains(&p));
                if !in_range {
                    return Err("Pulse timing out of range");
                }
                Ok(())
            }
            Band::Packet24 => {
                if signal.data_len < 1 || usize::from(signal.data_len) > RAW_DATA_LEN {
                    return Err("Packet length invalid");
                }
                let observed = self
                    .buffer
                    .iter()
                    .any(|other| other.protocol == signal.protocol);
                if !observed {
                    return Err("Address not observed");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_estimate_sub_ghz() {
        let mut signal = CapturedSignal::new(Band::SubGhz);
        signal.pulses = vec![500; 20]; // 10_000 µs total
        // 10_000 µs × 10 repeats = 100_000 µs = 100 ms
        assert_eq!(estimate_duration_ms(&signal, Band::SubGhz), 100);
    }

    #[test]
    fn test_duration_estimate_packet_is_flat() {
        let signal = CapturedSignal::new(Band::Packet24);
        assert_eq!(
            estimate_duration_ms(&signal, Band::Packet24),
            PACKET_EMIT_ESTIMATE_MS
        );
    }

    #[test]
    fn test_duration_estimate_empty_pulses() {
        let signal = CapturedSignal::new(Band::SubGhz);
        assert_eq!(estimate_duration_ms(&signal, Band::SubGhz), 0);
    }
}
