//! Shared test fixtures: a hand-cranked clock, a scripted radio, and a
//! collecting sink.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rf_test_harness::{
    AuditEvent, Band, CapturedSignal, Clock, EmissionError, Radio, Sink, Workflow, WorkflowConfig,
};

/// Manually advanced clock shared between the test and the engine.
#[derive(Clone)]
pub struct ManualClock {
    ms: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            ms: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn advance(&self, delta_ms: u32) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.ms.load(Ordering::SeqCst)
    }

    fn now_us(&self) -> u32 {
        self.now_ms().wrapping_mul(1_000)
    }
}

/// Observable side of a [`ScriptedRadio`], shared with the test body.
#[derive(Default)]
pub struct RadioLog {
    pub emitted: Vec<CapturedSignal>,
    pub tx_enabled: bool,
    pub tx_enable_calls: Vec<bool>,
    pub receiving: bool,
    pub fail_emission: bool,
}

/// Radio double that serves queued signals and records everything.
pub struct ScriptedRadio {
    band: Band,
    pending: VecDeque<CapturedSignal>,
    log: Rc<RefCell<RadioLog>>,
}

impl ScriptedRadio {
    pub fn new(band: Band) -> (Self, Rc<RefCell<RadioLog>>) {
        let log = Rc::new(RefCell::new(RadioLog::default()));
        (
            Self {
                band,
                pending: VecDeque::new(),
                log: Rc::clone(&log),
            },
            log,
        )
    }

    pub fn queue(&mut self, signal: CapturedSignal) {
        self.pending.push_back(signal);
    }
}

impl Radio for ScriptedRadio {
    fn band(&self) -> Band {
        self.band
    }

    fn start_receive(&mut self) {
        self.log.borrow_mut().receiving = true;
    }

    fn stop_receive(&mut self) {
        self.log.borrow_mut().receiving = false;
    }

    fn set_transmit_enabled(&mut self, enabled: bool) {
        let mut log = self.log.borrow_mut();
        log.tx_enabled = enabled;
        log.tx_enable_calls.push(enabled);
    }

    fn poll(&mut self) -> Option<CapturedSignal> {
        self.pending.pop_front()
    }

    fn emit(&mut self, signal: &CapturedSignal) -> Result<(), EmissionError> {
        let mut log = self.log.borrow_mut();
        if log.fail_emission {
            return Err(EmissionError::Hardware("scripted failure".into()));
        }
        if !log.tx_enabled {
            return Err(EmissionError::TransmitterDisabled);
        }
        log.emitted.push(signal.clone());
        Ok(())
    }
}

/// Sink that copies every event into a shared vector.
pub struct CollectingSink {
    pub events: Rc<RefCell<Vec<AuditEvent>>>,
}

impl CollectingSink {
    pub fn new() -> (Self, Rc<RefCell<Vec<AuditEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                events: Rc::clone(&events),
            },
            events,
        )
    }
}

impl Sink for CollectingSink {
    fn write_event(&mut self, event: &AuditEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// A valid sub-GHz observation.
pub fn sub_ghz_signal(capture_time_us: u32, pulses: &[u16]) -> CapturedSignal {
    let mut signal = CapturedSignal::new(Band::SubGhz);
    signal.capture_time_us = capture_time_us;
    signal.frequency_mhz = 433.92;
    signal.rssi_dbm = -60;
    signal.pulses = pulses.to_vec();
    signal.set_protocol("OOK-1");
    signal.is_valid = true;
    signal
}

/// A valid 2.4 GHz packet observation bound to `address`.
pub fn packet_signal(capture_time_us: u32, address: &str) -> CapturedSignal {
    let mut signal = CapturedSignal::new(Band::Packet24);
    signal.capture_time_us = capture_time_us;
    signal.frequency_mhz = 2_440.0;
    signal.rssi_dbm = -55;
    signal.data_len = 8;
    signal.raw_data[..8].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4]);
    signal.set_protocol(address);
    signal.is_valid = true;
    signal
}

/// Config with the waiting knobs opened up so tests drive transitions
/// explicitly.
pub fn quick_config(band: Band) -> WorkflowConfig {
    WorkflowConfig {
        band,
        listen_min_ms: 0,
        listen_max_ms: 1_000_000,
        ready_timeout_ms: 1_000_000,
        ..WorkflowConfig::default()
    }
}

/// Drive a freshly initialized workflow into READY with the queued signals
/// captured and analyzed.
pub fn drive_to_ready(wf: &mut Workflow<ManualClock>) {
    wf.start().expect("start");
    wf.tick(); // INIT → LISTENING
    wf.tick(); // capture queued signals
    wf.input().signal_trigger();
    wf.tick(); // LISTENING → ANALYZING → READY
    assert_eq!(wf.state(), rf_test_harness::WorkflowState::Ready);
}
