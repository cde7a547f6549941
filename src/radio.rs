//! Radio abstraction.
//!
//! The workflow core is radio-agnostic: it drives a [`Radio`] capability and
//! never touches hardware. Two physical layers exist behind the trait — a
//! sub-GHz on/off-keyed pulse radio and a 2.4 GHz packet radio — selected by
//! [`Band`]. Band-specific capture validation and gate rules live in the
//! core; everything below `poll`/`emit` is the driver's problem.

use thiserror::Error;

use crate::signal::CapturedSignal;

/// Which physical layer is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Band {
    /// Sub-GHz pulse-timed on/off keying (around 433 MHz).
    SubGhz,
    /// 2.4 GHz packet band.
    Packet24,
}

impl Band {
    pub const fn name(self) -> &'static str {
        match self {
            Band::SubGhz => "433 MHz",
            Band::Packet24 => "2.4 GHz",
        }
    }
}

/// Errors a radio driver can report from `emit`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmissionError {
    /// Emission requested while the transmitter is disabled.
    #[error("transmitter disabled")]
    TransmitterDisabled,
    /// The driver reported a hardware fault.
    #[error("radio hardware fault: {0}")]
    Hardware(String),
    /// The signal cannot be rendered on this band.
    #[error("signal not representable on this band")]
    Unsupported,
}

/// Band-specific capture and emission primitives.
///
/// All operations are non-blocking. The workflow owns the radio for the
/// duration of a run and guarantees the transmitter is disabled on entry to
/// INIT and LISTENING, on emergency stop, and during CLEANUP.
pub trait Radio {
    /// The band this driver serves. Checked against the workflow config.
    fn band(&self) -> Band;

    /// Begin passive reception.
    fn start_receive(&mut self);

    /// Stop reception.
    fn stop_receive(&mut self);

    /// Arm or disarm the transmitter. Disarmed radios must refuse `emit`.
    fn set_transmit_enabled(&mut self, enabled: bool);

    /// Fetch the next decoded signal, if one is pending. Never blocks.
    fn poll(&mut self) -> Option<CapturedSignal>;

    /// Rebroadcast a previously captured signal.
    fn emit(&mut self, signal: &CapturedSignal) -> Result<(), EmissionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_names() {
        assert_eq!(Band::SubGhz.name(), "433 MHz");
        assert_eq!(Band::Packet24.name(), "2.4 GHz");
    }

    #[test]
    fn test_emission_error_display() {
        let err = EmissionError::Hardware("PLL unlock".into());
        assert_eq!(err.to_string(), "radio hardware fault: PLL unlock");
    }
}
