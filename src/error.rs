//! Workflow error taxonomy.

use thiserror::Error;

/// Errors surfaced by the workflow engine.
///
/// Every error that occurs during a run increments the engine's error count,
/// becomes `last_error`, and is appended to the audit log as an ERROR event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// Missing/failed radio or buffer reservation failure.
    #[error("Initialization failed")]
    InitFailed,
    /// Radio reported a fault during capture or emission.
    #[error("Hardware failure")]
    HardwareFailure,
    /// Append attempted past capture-buffer capacity.
    #[error("Buffer overflow")]
    BufferOverflow,
    /// A state deadline elapsed.
    #[error("Timeout")]
    Timeout,
    /// Signal failed validation at gate time.
    #[error("Invalid signal")]
    InvalidSignal,
    /// The radio's emit operation returned an error.
    #[error("Transmission failed")]
    TransmissionFailed,
    /// One of the four transmission gates refused.
    #[error("Transmission gate denied")]
    GateDenied,
}

impl WorkflowError {
    /// Stable numeric code, usable in audit data fields.
    pub const fn code(self) -> u8 {
        match self {
            Self::InitFailed => 1,
            Self::HardwareFailure => 2,
            Self::BufferOverflow => 3,
            Self::Timeout => 4,
            Self::InvalidSignal => 5,
            Self::TransmissionFailed => 6,
            Self::GateDenied => 7,
        }
    }

    /// Short identifier for log data fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitFailed => "INIT_FAILED",
            Self::HardwareFailure => "HARDWARE_FAILURE",
            Self::BufferOverflow => "BUFFER_OVERFLOW",
            Self::Timeout => "TIMEOUT",
            Self::InvalidSignal => "INVALID_SIGNAL",
            Self::TransmissionFailed => "TRANSMISSION_FAILED",
            Self::GateDenied => "GATE_DENIED",
        }
    }
}
