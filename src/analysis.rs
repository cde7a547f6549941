//! Capture analysis: device classification, binding detection, statistics.
//!
//! Runs once on entry to ANALYZING, over the whole capture buffer. The only
//! mutation is writing each valid signal's `device_type`; everything else is
//! summarized into an [`AnalysisResult`].

use std::collections::HashMap;

use crate::buffer::CaptureBuffer;
use crate::radio::Band;
use crate::signal::clamp_str;

/// Maximum length of the free-form summary.
pub const SUMMARY_MAX: usize = 255;

/// Mean pulse duration above which a long frame reads as a garage door.
pub const GARAGE_DOOR_MIN_AVG_US: f32 = 400.0;

/// Mean pulse duration below which a short frame reads as a doorbell.
pub const DOORBELL_MAX_AVG_US: f32 = 350.0;

/// Pulse count separating short frames from long ones.
pub const LONG_FRAME_PULSES: usize = 48;

/// Pulse count at which a frame reads as a car remote.
pub const CAR_REMOTE_MIN_PULSES: usize = 128;

/// Device label for 2.4 GHz packets whose address recurs in the buffer.
pub const BOUND_DEVICE_LABEL: &str = "Bound Device";

/// Device label for 2.4 GHz packets seen only once.
pub const UNPAIRED_LABEL: &str = "Unpaired";

/// Result of one analysis pass. Published to READY consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Total signals in the buffer at analysis time.
    pub signal_count: u16,
    /// Signals whose validity bit survived re-checking.
    pub valid_signal_count: u16,
    /// Distinct protocol identifiers observed.
    pub unique_patterns: u16,
    /// Mean RSSI over signals with a reading; `None` when no signal has one.
    pub avg_rssi: Option<f32>,
    /// Weakest observed RSSI, `None` without readings.
    pub min_rssi: Option<i8>,
    /// Strongest observed RSSI, `None` without readings.
    pub max_rssi: Option<i8>,
    /// Span from first to last capture, in milliseconds.
    pub capture_duration_ms: u32,
    /// When the analysis pass started (engine clock, ms).
    pub analysis_time_ms: u32,
    /// Whether the pass ran to completion. Never promoted on timeout.
    pub complete: bool,
    /// Human-readable one-liner, at most [`SUMMARY_MAX`] characters.
    pub summary: String,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            signal_count: 0,
            valid_signal_count: 0,
            unique_patterns: 0,
            avg_rssi: None,
            min_rssi: None,
            max_rssi: None,
            capture_duration_ms: 0,
            analysis_time_ms: 0,
            complete: false,
            summary: String::new(),
        }
    }
}

/// Classify a sub-GHz pulse pattern by mean pulse duration and pulse count.
///
/// Rules are evaluated in order; the first match wins:
/// 1. mean > 400 µs and count ≥ 48 → "Garage Door"
/// 2. mean < 350 µs and count < 48 → "Doorbell"
/// 3. count ≥ 128 → "Car Remote"
/// 4. otherwise → "Unknown"
pub fn classify_pulse_pattern(avg_pulse_us: f32, pulse_count: usize) -> &'static str {
    if avg_pulse_us > GARAGE_DOOR_MIN_AVG_US && pulse_count >= LONG_FRAME_PULSES {
        "Garage Door"
    } else if avg_pulse_us < DOORBELL_MAX_AVG_US && pulse_count < LONG_FRAME_PULSES {
        "Doorbell"
    } else if pulse_count >= CAR_REMOTE_MIN_PULSES {
        "Car Remote"
    } else {
        "Unknown"
    }
}

/// Run one full analysis pass over the buffer.
pub(crate) fn run_analysis(
    buffer: &mut CaptureBuffer,
    band: Band,
    analysis_start_ms: u32,
) -> AnalysisResult {
    let mut result = AnalysisResult {
        signal_count: buffer.len() as u16,
        analysis_time_ms: analysis_start_ms,
        ..AnalysisResult::default()
    };

    match band {
        Band::SubGhz => classify_signals(buffer, &mut result),
        Band::Packet24 => mark_bindings(buffer, &mut result),
    }

    result.unique_patterns = count_unique_patterns(buffer);
    apply_statistics(&mut result, buffer);
    result.summary = clamp_str(&build_summary(&result), SUMMARY_MAX);
    result.complete = true;
    result
}

fn classify_signals(buffer: &mut CaptureBuffer, result: &mut AnalysisResult) {
    for signal in buffer.iter_mut() {
        if !signal.is_valid {
            continue;
        }
        let avg = signal.average_pulse_us().unwrap_or(0.0);
        let label = classify_pulse_pattern(avg, signal.pulse_count());
        signal.set_device_type(label);
        result.valid_signal_count += 1;
    }
}

/// 2.4 GHz binding detection: an address recurring at least twice in the
/// buffer is evidence that the device was genuinely observed, not glitched.
fn mark_bindings(buffer: &mut CaptureBuffer, result: &mut AnalysisResult) {
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for signal in buffer.iter() {
        *occurrences.entry(signal.protocol.clone()).or_insert(0) += 1;
    }

    for signal in buffer.iter_mut() {
        if !signal.is_valid {
            continue;
        }
        let bound = occurrences.get(&signal.protocol).copied().unwrap_or(0) >= 2;
        signal.set_device_type(if bound { BOUND_DEVICE_LABEL } else { UNPAIRED_LABEL });
        result.valid_signal_count += 1;
    }
}

fn count_unique_patterns(buffer: &CaptureBuffer) -> u16 {
    let mut seen: Vec<&str> = Vec::new();
    for signal in buffer.iter() {
        if !seen.contains(&signal.protocol.as_str()) {
            seen.push(&signal.protocol);
        }
    }
    seen.len() as u16
}

fn apply_statistics(result: &mut AnalysisResult, buffer: &CaptureBuffer) {
    let mut sum: i32 = 0;
    let mut count: u32 = 0;

    for signal in buffer.iter() {
        // rssi 0 = no reading.
        if signal.rssi_dbm != 0 {
            sum += i32::from(signal.rssi_dbm);
            count += 1;
            result.min_rssi = Some(match result.min_rssi {
                Some(min) => min.min(signal.rssi_dbm),
                None => signal.rssi_dbm,
            });
            result.max_rssi = Some(match result.max_rssi {
                Some(max) => max.max(signal.rssi_dbm),
                None => signal.rssi_dbm,
            });
        }
    }

    if count > 0 {
        result.avg_rssi = Some(sum as f32 / count as f32);
    }

    if buffer.len() >= 2 {
        let first = buffer.get(0).map(|s| s.capture_time_us).unwrap_or(0);
        let last = buffer
            .get(buffer.len() - 1)
            .map(|s| s.capture_time_us)
            .unwrap_or(first);
        result.capture_duration_ms = last.wrapping_sub(first) / 1_000;
    }
}

fn build_summary(result: &AnalysisResult) -> String {
    match result.avg_rssi {
        Some(avg) => format!(
            "{} signals, {} valid, avg RSSI: {:.1} dBm",
            result.signal_count, result.valid_signal_count, avg
        ),
        None => format!(
            "{} signals, {} valid, no RSSI data",
            result.signal_count, result.valid_signal_count
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::CapturedSignal;

    fn sub_ghz(pulses: Vec<u16>, rssi: i8, time_us: u32) -> CapturedSignal {
        let mut sig = CapturedSignal::new(Band::SubGhz);
        sig.pulses = pulses;
        sig.rssi_dbm = rssi;
        sig.capture_time_us = time_us;
        sig.is_valid = true;
        sig.set_protocol("ook-1");
        sig
    }

    fn packet(protocol: &str, rssi: i8) -> CapturedSignal {
        let mut sig = CapturedSignal::new(Band::Packet24);
        sig.data_len = 8;
        sig.rssi_dbm = rssi;
        sig.is_valid = true;
        sig.set_protocol(protocol);
        sig
    }

    #[test]
    fn test_classification_rules() {
        assert_eq!(classify_pulse_pattern(450.0, 64), "Garage Door");
        assert_eq!(classify_pulse_pattern(300.0, 24), "Doorbell");
        assert_eq!(classify_pulse_pattern(375.0, 200), "Car Remote");
        assert_eq!(classify_pulse_pattern(375.0, 24), "Unknown");
    }

    #[test]
    fn test_classification_first_match_wins() {
        // Long slow frame with >= 128 pulses: rule 1 beats rule 3.
        assert_eq!(classify_pulse_pattern(500.0, 200), "Garage Door");
        // Short fast frame never reaches rule 3.
        assert_eq!(classify_pulse_pattern(100.0, 12), "Doorbell");
    }

    #[test]
    fn test_classification_gap_maps_to_unknown() {
        // The 350..=400 µs band with a short, sub-128 frame.
        assert_eq!(classify_pulse_pattern(350.0, 24), "Unknown");
        assert_eq!(classify_pulse_pattern(400.0, 24), "Unknown");
        assert_eq!(classify_pulse_pattern(375.0, 47), "Unknown");
    }

    #[test]
    fn test_run_analysis_classifies_and_counts() {
        let mut buffer = CaptureBuffer::with_capacity(10);
        buffer.push(sub_ghz(vec![500; 64], -60, 1_000));
        buffer.push(sub_ghz(vec![300; 24], -80, 2_500_000));

        let result = run_analysis(&mut buffer, Band::SubGhz, 42);
        assert!(result.complete);
        assert_eq!(result.signal_count, 2);
        assert_eq!(result.valid_signal_count, 2);
        assert_eq!(buffer.get(0).unwrap().device_type, "Garage Door");
        assert_eq!(buffer.get(1).unwrap().device_type, "Doorbell");
        assert_eq!(result.analysis_time_ms, 42);
        // (2_500_000 - 1_000) µs ≈ 2_499 ms
        assert_eq!(result.capture_duration_ms, 2_499);
    }

    #[test]
    fn test_rssi_statistics() {
        let mut buffer = CaptureBuffer::with_capacity(10);
        buffer.push(sub_ghz(vec![300; 24], -80, 0));
        buffer.push(sub_ghz(vec![300; 24], -60, 0));
        buffer.push(sub_ghz(vec![300; 24], 0, 0)); // no reading

        let result = run_analysis(&mut buffer, Band::SubGhz, 0);
        assert_eq!(result.min_rssi, Some(-80));
        assert_eq!(result.max_rssi, Some(-60));
        assert_eq!(result.avg_rssi, Some(-70.0));
    }

    #[test]
    fn test_no_rssi_data_reports_none() {
        let mut buffer = CaptureBuffer::with_capacity(4);
        buffer.push(sub_ghz(vec![300; 24], 0, 0));

        let result = run_analysis(&mut buffer, Band::SubGhz, 0);
        assert_eq!(result.min_rssi, None);
        assert_eq!(result.max_rssi, None);
        assert_eq!(result.avg_rssi, None);
        assert!(result.summary.contains("no RSSI data"));
    }

    #[test]
    fn test_binding_detection() {
        let mut buffer = CaptureBuffer::with_capacity(10);
        buffer.push(packet("E7:E7:E7:E7:E7", -50));
        buffer.push(packet("E7:E7:E7:E7:E7", -52));
        buffer.push(packet("C2:C2:C2:C2:C2", -60));

        let result = run_analysis(&mut buffer, Band::Packet24, 0);
        assert_eq!(buffer.get(0).unwrap().device_type, BOUND_DEVICE_LABEL);
        assert_eq!(buffer.get(1).unwrap().device_type, BOUND_DEVICE_LABEL);
        assert_eq!(buffer.get(2).unwrap().device_type, UNPAIRED_LABEL);
        assert_eq!(result.unique_patterns, 2);
    }

    #[test]
    fn test_invalid_signals_not_counted() {
        let mut buffer = CaptureBuffer::with_capacity(4);
        let mut bad = sub_ghz(vec![300; 24], -60, 0);
        bad.is_valid = false;
        buffer.push(bad);

        let result = run_analysis(&mut buffer, Band::SubGhz, 0);
        assert_eq!(result.signal_count, 1);
        assert_eq!(result.valid_signal_count, 0);
        // Classification is skipped for invalid signals.
        assert!(buffer.get(0).unwrap().device_type.is_empty());
    }
}
