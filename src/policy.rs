//! Safety policy evaluator.
//!
//! The safe-by-default contract, enforced here and nowhere else:
//!
//! - every transmission needs explicit, single-use user confirmation,
//! - blacklisted frequencies are never transmittable,
//! - a trailing 60 s rate window caps transmission volume,
//! - duration is bounded,
//! - every attempt — allowed or denied — lands in the transmit audit trail.
//!
//! The policy is a plain value threaded into the workflow at construction.
//! Tests instantiate independent policies; there is no process-wide state.
//!
//! Internal consistency checks report violations through `tracing::error!`
//! and a counter. They are compiled unconditionally, never panic, and never
//! alter a verdict.

use tracing::{debug, error, info};

use crate::signal::clamp_str;

/// Width of the trailing rate window, in milliseconds.
pub const RATE_WINDOW_MS: u32 = 60_000;

/// Transmit audit trail capacity; oldest records are evicted first.
pub const TRANSMIT_AUDIT_CAP: usize = 100;

/// Default rate budget per minute.
pub const DEFAULT_RATE_LIMIT: u32 = 10;

/// Default pending-confirmation expiry.
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u32 = 10_000;

/// Default single-transmission duration ceiling.
pub const DEFAULT_MAX_TRANSMIT_MS: u32 = 5_000;

/// Blacklist match tolerance in MHz (±100 kHz).
pub const BLACKLIST_TOLERANCE_MHZ: f32 = 0.1;

/// Maximum length of a transmit-request reason.
pub const REQUEST_REASON_MAX: usize = 63;

/// Maximum length of a transmit-log details field.
pub const TRANSMIT_DETAILS_MAX: usize = 127;

/// Verdict of a policy evaluation. Exactly one is returned per check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitPermission {
    Allowed,
    DeniedNoConfirmation,
    DeniedBlacklist,
    DeniedRateLimit,
    DeniedPolicy,
    DeniedTimeout,
}

impl TransmitPermission {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Allowed => "ALLOWED",
            Self::DeniedNoConfirmation => "NO_CONFIRMATION",
            Self::DeniedBlacklist => "BLACKLISTED",
            Self::DeniedRateLimit => "RATE_LIMITED",
            Self::DeniedPolicy => "POLICY_VIOLATION",
            Self::DeniedTimeout => "TIMEOUT",
        }
    }

    #[inline]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// A prospective transmission, submitted for policy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitRequest {
    pub frequency_mhz: f32,
    /// Estimated on-air duration in milliseconds.
    pub duration_ms: u32,
    /// When the request was raised (engine clock, ms).
    pub timestamp_ms: u32,
    /// Whether the user has confirmed this specific request.
    pub confirmed: bool,
    /// Human-readable reason, at most [`REQUEST_REASON_MAX`] characters.
    pub reason: String,
}

impl TransmitRequest {
    pub fn new(frequency_mhz: f32, duration_ms: u32, timestamp_ms: u32, reason: &str) -> Self {
        Self {
            frequency_mhz,
            duration_ms,
            timestamp_ms,
            confirmed: false,
            reason: clamp_str(reason, REQUEST_REASON_MAX),
        }
    }
}

/// One record in the transmit audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmitLog {
    pub timestamp_ms: u32,
    pub frequency_mhz: f32,
    pub duration_ms: u32,
    pub allowed: bool,
    pub verdict: TransmitPermission,
    pub details: String,
}

/// The policy evaluator. See module docs for the contract.
#[derive(Debug)]
pub struct SafetyPolicy {
    require_confirmation: bool,
    confirmation_timeout_ms: u32,
    max_transmit_duration_ms: u32,
    rate_limit_per_minute: u32,
    recent_transmits_ms: Vec<u32>,
    blacklist_mhz: Vec<f32>,
    confirmation_pending: bool,
    confirmation_request_ms: u32,
    pending_request: Option<TransmitRequest>,
    audit: Vec<TransmitLog>,
    last_transmit_ms: u32,
    violation_count: u32,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyPolicy {
    pub fn new() -> Self {
        Self {
            require_confirmation: true,
            confirmation_timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT_MS,
            max_transmit_duration_ms: DEFAULT_MAX_TRANSMIT_MS,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT,
            recent_transmits_ms: Vec::new(),
            blacklist_mhz: Vec::new(),
            confirmation_pending: false,
            confirmation_request_ms: 0,
            pending_request: None,
            audit: Vec::new(),
            last_transmit_ms: 0,
            violation_count: 0,
        }
    }

    // --- Policy evaluation ---

    /// Evaluate a transmit request. Short-circuits in a fixed order:
    /// pending-confirmation expiry, confirmation, blacklist, rate limit,
    /// duration.
    pub fn check_transmit_policy(
        &mut self,
        request: &TransmitRequest,
        now_ms: u32,
    ) -> TransmitPermission {
        if self.expire_stale_confirmation(now_ms) {
            return TransmitPermission::DeniedTimeout;
        }

        if self.require_confirmation && !request.confirmed {
            return TransmitPermission::DeniedNoConfirmation;
        }

        if !self.is_frequency_allowed(request.frequency_mhz) {
            return TransmitPermission::DeniedBlacklist;
        }

        if !self.is_rate_limit_ok(now_ms) {
            self.invariant(
                self.recent_transmits_ms.len() as u32 >= self.rate_limit_per_minute,
                "rate-limit verdict inconsistent with window size",
            );
            return TransmitPermission::DeniedRateLimit;
        }

        if request.duration_ms > self.max_transmit_duration_ms {
            return TransmitPermission::DeniedPolicy;
        }

        TransmitPermission::Allowed
    }

    /// True when `frequency` is not within ±0.1 MHz of any blacklist entry.
    pub fn is_frequency_allowed(&self, frequency_mhz: f32) -> bool {
        !self
            .blacklist_mhz
            .iter()
            .any(|&blocked| (frequency_mhz - blocked).abs() < BLACKLIST_TOLERANCE_MHZ)
    }

    /// True when the trailing window holds fewer transmissions than the
    /// budget. Prunes the window as a side effect.
    pub fn is_rate_limit_ok(&mut self, now_ms: u32) -> bool {
        self.prune_rate_window(now_ms);
        (self.recent_transmits_ms.len() as u32) < self.rate_limit_per_minute
    }

    // --- Pending confirmation ---

    /// Park a request awaiting user confirmation. The request expires after
    /// the confirmation timeout and then evaluates as `DeniedTimeout`.
    pub fn request_user_confirmation(&mut self, request: TransmitRequest, now_ms: u32) {
        info!(
            frequency_mhz = request.frequency_mhz,
            "confirmation requested"
        );
        self.confirmation_pending = true;
        self.confirmation_request_ms = now_ms;
        self.pending_request = Some(request);
    }

    /// Drop the pending confirmation, if any.
    pub fn cancel_confirmation(&mut self) {
        self.confirmation_pending = false;
        self.confirmation_request_ms = 0;
        self.pending_request = None;
        debug!("pending confirmation cancelled");
    }

    #[inline]
    pub fn is_confirmation_pending(&self) -> bool {
        self.confirmation_pending
    }

    // --- Audit trail ---

    /// Record a transmit attempt. On an allowed attempt the current time
    /// joins the rate window and becomes `last_transmit_time`.
    pub fn log_transmit_attempt(
        &mut self,
        request: &TransmitRequest,
        allowed: bool,
        verdict: TransmitPermission,
        now_ms: u32,
    ) {
        self.invariant(
            allowed == verdict.is_allowed(),
            "allowed flag disagrees with verdict",
        );

        if self.audit.len() >= TRANSMIT_AUDIT_CAP {
            self.audit.remove(0);
        }

        self.audit.push(TransmitLog {
            timestamp_ms: now_ms,
            frequency_mhz: request.frequency_mhz,
            duration_ms: request.duration_ms,
            allowed,
            verdict,
            details: clamp_str(&request.reason, TRANSMIT_DETAILS_MAX),
        });

        if allowed {
            self.recent_transmits_ms.push(now_ms);
            self.last_transmit_ms = now_ms;
        }

        info!(
            frequency_mhz = request.frequency_mhz,
            duration_ms = request.duration_ms,
            verdict = verdict.name(),
            "transmit attempt logged"
        );
    }

    pub fn audit_len(&self) -> usize {
        self.audit.len()
    }

    pub fn audit_entry(&self, index: usize) -> Option<&TransmitLog> {
        self.audit.get(index)
    }

    /// Most recent records first, newest-to-oldest, at most `max` of them,
    /// not older than `since_ms`.
    pub fn recent_logs(&self, max: usize, since_ms: u32) -> Vec<&TransmitLog> {
        self.audit
            .iter()
            .rev()
            .filter(|log| log.timestamp_ms >= since_ms)
            .take(max)
            .collect()
    }

    pub fn clear_logs(&mut self) {
        self.audit.clear();
    }

    // --- Configuration ---

    pub fn set_require_confirmation(&mut self, required: bool) {
        self.require_confirmation = required;
    }

    pub fn require_confirmation(&self) -> bool {
        self.require_confirmation
    }

    pub fn set_confirmation_timeout(&mut self, timeout_ms: u32) {
        self.confirmation_timeout_ms = timeout_ms;
    }

    pub fn set_max_transmit_duration(&mut self, duration_ms: u32) {
        self.max_transmit_duration_ms = duration_ms;
    }

    pub fn max_transmit_duration(&self) -> u32 {
        self.max_transmit_duration_ms
    }

    // --- Blacklist management ---

    /// Add a frequency to the blacklist. Returns `false` when an existing
    /// entry already covers it (within tolerance).
    pub fn add_blacklisted_frequency(&mut self, frequency_mhz: f32) -> bool {
        if !self.is_frequency_allowed(frequency_mhz) {
            return false;
        }
        self.blacklist_mhz.push(frequency_mhz);
        true
    }

    /// Remove the first blacklist entry within tolerance of `frequency_mhz`.
    pub fn remove_blacklisted_frequency(&mut self, frequency_mhz: f32) -> bool {
        let position = self
            .blacklist_mhz
            .iter()
            .position(|&blocked| (frequency_mhz - blocked).abs() < BLACKLIST_TOLERANCE_MHZ);
        match position {
            Some(index) => {
                self.blacklist_mhz.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn blacklisted_frequencies(&self) -> &[f32] {
        &self.blacklist_mhz
    }

    // --- Rate limiting ---

    pub fn set_rate_limit(&mut self, max_per_minute: u32) {
        self.rate_limit_per_minute = max_per_minute;
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limit_per_minute
    }

    /// Number of allowed transmissions in the trailing window. Prunes.
    pub fn recent_transmit_count(&mut self, now_ms: u32) -> usize {
        self.prune_rate_window(now_ms);
        self.recent_transmits_ms.len()
    }

    pub fn last_transmit_time(&self) -> u32 {
        self.last_transmit_ms
    }

    // --- Status ---

    /// One-line operator status.
    pub fn status_line(&mut self, now_ms: u32) -> String {
        let armed = if self.require_confirmation {
            "LOCKED"
        } else {
            "UNLOCKED"
        };
        let recent = self.recent_transmit_count(now_ms);
        format!(
            "Safety: {} | Rate: {}/{}",
            armed, recent, self.rate_limit_per_minute
        )
    }

    /// Count of internal consistency violations observed so far.
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    // --- Internal helpers ---

    /// Returns true (and clears the pending state) when the pending
    /// confirmation has outlived its timeout.
    fn expire_stale_confirmation(&mut self, now_ms: u32) -> bool {
        if !self.confirmation_pending {
            return false;
        }
        self.invariant(
            self.pending_request.is_some(),
            "confirmation pending without a parked request",
        );
        if now_ms.wrapping_sub(self.confirmation_request_ms) > self.confirmation_timeout_ms {
            self.confirmation_pending = false;
            self.pending_request = None;
            return true;
        }
        false
    }

    /// Drop window entries older than [`RATE_WINDOW_MS`].
    fn prune_rate_window(&mut self, now_ms: u32) {
        self.recent_transmits_ms
            .retain(|&t| now_ms.wrapping_sub(t) < RATE_WINDOW_MS);
    }

    fn invariant(&mut self, condition: bool, what: &'static str) {
        if !condition {
            self.violation_count += 1;
            error!(target: "safety", "consistency violation: {what}");
        }
    }
}
