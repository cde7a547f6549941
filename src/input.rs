//! Cross-context user-input port.
//!
//! # Philosophy
//!
//! > A harness that transmits without an observed approval is broken.
//! > A harness that drops a button press is merely annoying.
//!
//! Each input channel is a single small atomic cell: the producer side
//! (button ISR, UI task, test harness) writes it from any context, and the
//! workflow loop reads-and-clears it on its next tick. One producer, one
//! consumer, no locks, no blocking. A second signal before the first is
//! consumed overwrites it (last-wins), which is the right behavior for
//! human-scale input.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Lock-free signal port for the six user actions.
///
/// Producer side: `signal_*`. Consumer side: `take_*`, which returns and
/// clears at most one pending event per call.
#[derive(Debug, Default)]
pub struct InputPort {
    trigger: AtomicBool,
    confirm: AtomicBool,
    cancel: AtomicBool,
    resume: AtomicBool,
    abort: AtomicBool,
    select_armed: AtomicBool,
    select_index: AtomicUsize,
}

impl InputPort {
    pub const fn new() -> Self {
        Self {
            trigger: AtomicBool::new(false),
            confirm: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            resume: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            select_armed: AtomicBool::new(false),
            select_index: AtomicUsize::new(0),
        }
    }

    // --- Producer side ---

    /// Request analysis of the current capture buffer (LISTENING only).
    #[inline]
    pub fn signal_trigger(&self) {
        self.trigger.store(true, Ordering::Release);
    }

    /// Approve the pending transmission (TX_GATED only).
    #[inline]
    pub fn signal_confirm(&self) {
        self.confirm.store(true, Ordering::Release);
    }

    /// Refuse the pending transmission (TX_GATED or READY).
    #[inline]
    pub fn signal_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Return from READY to LISTENING for more observation.
    #[inline]
    pub fn signal_continue(&self) {
        self.resume.store(true, Ordering::Release);
    }

    /// Raise the emergency stop.
    #[inline]
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Select a captured signal for transmission (READY only).
    ///
    /// The index is published before the armed flag so the consumer never
    /// observes a stale index.
    #[inline]
    pub fn signal_select(&self, index: usize) {
        self.select_index.store(index, Ordering::Release);
        self.select_armed.store(true, Ordering::Release);
    }

    // --- Consumer side (workflow loop only) ---

    #[inline]
    pub fn take_trigger(&self) -> bool {
        self.trigger.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn take_confirm(&self) -> bool {
        self.confirm.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn take_cancel(&self) -> bool {
        self.cancel.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn take_continue(&self) -> bool {
        self.resume.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn take_abort(&self) -> bool {
        self.abort.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn take_select(&self) -> Option<usize> {
        if self.select_armed.swap(false, Ordering::AcqRel) {
            Some(self.select_index.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Drop every pending event. Used by `reset()`.
    pub fn clear_all(&self) {
        self.trigger.store(false, Ordering::Release);
        self.confirm.store(false, Ordering::Release);
        self.cancel.store(false, Ordering::Release);
        self.resume.store(false, Ordering::Release);
        self.abort.store(false, Ordering::Release);
        self.select_armed.store(false, Ordering::Release);
    }
}
