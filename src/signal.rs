//! Module: signal
//!
//! Purpose: Captured-signal data type and per-band validation rules.
//! One `CapturedSignal` is one radio observation: identity (timestamp, band,
//! frequency, RSSI), a fixed raw payload, and — for sub-GHz — an owned
//! pulse-duration sequence.
//!
//! Ownership: the pulse sequence belongs exclusively to the signal. Cloning
//! deep-copies it, moving transfers it, dropping frees it. The pulse count
//! is always `pulses.len()`; there is no separate counter to fall out of
//! sync.

use crate::radio::Band;

/// Fixed raw payload size in bytes.
pub const RAW_DATA_LEN: usize = 32;

/// Maximum length of protocol / device-type labels, in characters.
pub const LABEL_MAX: usize = 31;

/// Minimum pulse count for a plausible sub-GHz frame.
pub const SUB_GHZ_MIN_PULSES: usize = 10;

/// RSSI floor for sub-GHz captures (dBm). Applied only when RSSI is present.
pub const SUB_GHZ_RSSI_FLOOR_DBM: i8 = -100;

/// RSSI floor for 2.4 GHz packet captures (dBm).
pub const PACKET_RSSI_FLOOR_DBM: i8 = -90;

/// Clamp a string to at most `max` characters.
pub(crate) fn clamp_str(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// One captured radio observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSignal {
    /// Capture timestamp in microseconds.
    pub capture_time_us: u32,
    /// Physical layer the signal was observed on.
    pub band: Band,
    /// Carrier frequency in MHz.
    pub frequency_mhz: f32,
    /// Received signal strength in dBm. Zero means "not measured".
    pub rssi_dbm: i8,
    /// Raw payload bytes. Only the first `data_len` are meaningful.
    pub raw_data: [u8; RAW_DATA_LEN],
    /// Number of meaningful bytes in `raw_data`.
    pub data_len: u8,
    /// Pulse durations in microseconds (sub-GHz only; empty for packets).
    pub pulses: Vec<u16>,
    /// Protocol identifier, at most [`LABEL_MAX`] characters.
    pub protocol: String,
    /// Device-type classification, written by analysis.
    pub device_type: String,
    /// Set by the decoder; re-checked by analysis and Gate 1.
    pub is_valid: bool,
}

impl CapturedSignal {
    /// An empty, invalid signal on the given band.
    pub fn new(band: Band) -> Self {
        Self {
            capture_time_us: 0,
            band,
            frequency_mhz: 0.0,
            rssi_dbm: 0,
            raw_data: [0; RAW_DATA_LEN],
            data_len: 0,
            pulses: Vec::new(),
            protocol: String::new(),
            device_type: String::new(),
            is_valid: false,
        }
    }

    /// Number of pulses in the owned sequence.
    #[inline]
    pub fn pulse_count(&self) -> usize {
        self.pulses.len()
    }

    /// Mean pulse duration in microseconds, or `None` for pulseless signals.
    pub fn average_pulse_us(&self) -> Option<f32> {
        if self.pulses.is_empty() {
            return None;
        }
        let sum: u32 = self.pulses.iter().map(|&p| u32::from(p)).sum();
        Some(sum as f32 / self.pulses.len() as f32)
    }

    /// Set the protocol identifier, clamped to [`LABEL_MAX`].
    pub fn set_protocol(&mut self, protocol: &str) {
        self.protocol = clamp_str(protocol, LABEL_MAX);
    }

    /// Set the device classification, clamped to [`LABEL_MAX`].
    pub fn set_device_type(&mut self, device_type: &str) {
        self.device_type = clamp_str(device_type, LABEL_MAX);
    }

    /// Band-specific plausibility check applied before a capture is kept.
    ///
    /// Sub-GHz: at least [`SUB_GHZ_MIN_PULSES`] pulses; when an RSSI reading
    /// is present it must be at or above the sub-GHz floor.
    /// 2.4 GHz: payload length in `1..=32` and RSSI at or above the packet
    /// floor.
    pub fn passes_capture_validation(&self) -> bool {
        match self.band {
            Band::SubGhz => {
                if self.pulses.len() < SUB_GHZ_MIN_PULSES {
                    return false;
                }
                // rssi 0 = no reading; anything else must clear the floor.
                if self.rssi_dbm != 0 && self.rssi_dbm < SUB_GHZ_RSSI_FLOOR_DBM {
                    return false;
                }
                true
            }
            Band::Packet24 => {
                if self.data_len < 1 || usize::from(self.data_len) > RAW_DATA_LEN {
                    return false;
                }
                if self.rssi_dbm < PACKET_RSSI_FLOOR_DBM {
                    return false;
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_ghz(pulses: &[u16], rssi: i8) -> CapturedSignal {
        let mut sig = CapturedSignal::new(Band::SubGhz);
        sig.pulses = pulses.to_vec();
        sig.rssi_dbm = rssi;
        sig.is_valid = true;
        sig
    }

    #[test]
    fn test_sub_ghz_validation_pulse_floor() {
        let ok = sub_ghz(&[350; 10], -60);
        assert!(ok.passes_capture_validation());

        let short = sub_ghz(&[350; 9], -60);
        assert!(!short.passes_capture_validation());
    }

    #[test]
    fn test_sub_ghz_validation_rssi() {
        // RSSI of zero means "no reading" and is accepted.
        let unread = sub_ghz(&[350; 10], 0);
        assert!(unread.passes_capture_validation());

        let weak = sub_ghz(&[350; 10], -101);
        assert!(!weak.passes_capture_validation());

        let edge = sub_ghz(&[350; 10], -100);
        assert!(edge.passes_capture_validation());
    }

    #[test]
    fn test_packet_validation() {
        let mut pkt = CapturedSignal::new(Band::Packet24);
        pkt.data_len = 4;
        pkt.rssi_dbm = -70;
        assert!(pkt.passes_capture_validation());

        pkt.data_len = 0;
        assert!(!pkt.passes_capture_validation());

        pkt.data_len = 4;
        pkt.rssi_dbm = -91;
        assert!(!pkt.passes_capture_validation());
    }

    #[test]
    fn test_clone_is_deep_copy() {
        let mut original = sub_ghz(&[100, 200, 300], 0);
        let copy = original.clone();
        original.pulses[0] = 999;
        assert_eq!(copy.pulses[0], 100);
    }

    #[test]
    fn test_label_clamping() {
        let mut sig = CapturedSignal::new(Band::SubGhz);
        let long = "x".repeat(100);
        sig.set_protocol(&long);
        sig.set_device_type(&long);
        assert_eq!(sig.protocol.chars().count(), LABEL_MAX);
        assert_eq!(sig.device_type.chars().count(), LABEL_MAX);
    }

    #[test]
    fn test_average_pulse() {
        let sig = sub_ghz(&[100, 200, 300, 400, 100, 200, 300, 400, 100, 200], 0);
        let avg = sig.average_pulse_us().unwrap();
        assert!((avg - 230.0).abs() < f32::EPSILON);

        let empty = CapturedSignal::new(Band::Packet24);
        assert!(empty.average_pulse_us().is_none());
    }
}
