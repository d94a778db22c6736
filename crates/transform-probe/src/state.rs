//! Per-controller probe statistics.
//!
//! Counters and flags that gate the hard ceilings are atomics or
//! [`Latch`]es so racing probes can never under-count or un-latch them.
//! The warm-up statistics live together in one [`Baseline`] behind a mutex:
//! averaging and rescheduling must see a consistent view of all of them.
//!
//! # Concurrency
//!
//! The baseline mutex is a `std::sync::Mutex` and is only held for short
//! synchronous sections. It is never held across the transform call.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::latch::Latch;

/// Number of canaries in the warm-up window. The first one is discarded
/// from the learned average.
pub const AVERAGE_OVER_TRANSFORMS: u32 = 5;

/// Which orchestrator check a probe request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    Live,
    Ready,
}

impl ProbeKind {
    pub fn is_live(self) -> bool {
        self == ProbeKind::Live
    }

    /// Message prefix for this kind of probe.
    pub fn label(self) -> &'static str {
        match self {
            ProbeKind::Live => "Live Probe: ",
            ProbeKind::Ready => "Ready Probe: ",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Live => f.write_str("live"),
            ProbeKind::Ready => f.write_str("ready"),
        }
    }
}

/// Learned timing baseline, mutated only under the state's mutex.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Baseline {
    /// Canaries that fed the warm-up window, capped at
    /// [`AVERAGE_OVER_TRANSFORMS`].
    pub canary_count: u32,
    /// Sum of every warm-up duration except the first.
    pub sum_millis: u64,
    pub learned_normal_millis: u64,
    /// `None` until a second canary has been observed.
    pub failure_threshold_millis: Option<u64>,
    /// Zero until the first schedule is set.
    pub next_canary_at_millis: u64,
}

impl Baseline {
    pub fn is_warming_up(&self) -> bool {
        self.canary_count < AVERAGE_OVER_TRANSFORMS
    }

    /// A threshold exists once two canaries have been observed.
    pub fn is_established(&self) -> bool {
        self.canary_count > 1
    }
}

/// Coarse lifecycle phase, derived from the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uninitialized,
    WarmingUp,
    SteadyState,
    PermanentlyFailing,
}

/// Mutable probe state, owned by one controller for the process lifetime.
#[derive(Debug, Default)]
pub struct ProbeState {
    probe_count: AtomicU64,
    transforms_executed: AtomicU64,
    initialized: Latch,
    ready_reported: Latch,
    permanently_failing: Latch,
    baseline: Mutex<Baseline>,
}

impl ProbeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a probe and return its sequence number (starting at 1).
    pub fn next_probe(&self) -> u64 {
        self.probe_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn probe_count(&self) -> u64 {
        self.probe_count.load(Ordering::SeqCst)
    }

    /// Count one executed transform, canary or real. Returns the new total.
    pub fn record_transform(&self) -> u64 {
        self.transforms_executed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn transforms_executed(&self) -> u64 {
        self.transforms_executed.load(Ordering::SeqCst)
    }

    /// Set once the first canary has produced valid output.
    pub fn initialized(&self) -> &Latch {
        &self.initialized
    }

    /// Set once the first ready-probe success has been reported.
    pub fn ready_reported(&self) -> &Latch {
        &self.ready_reported
    }

    /// Set when a transform breached the duration ceiling. Never cleared.
    pub fn permanently_failing(&self) -> &Latch {
        &self.permanently_failing
    }

    /// Lock the warm-up statistics.
    ///
    /// The baseline is plain data and consistent at every unlock, so a
    /// poisoned lock is recovered rather than propagated.
    pub fn baseline(&self) -> MutexGuard<'_, Baseline> {
        self.baseline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        if self.permanently_failing.is_set() {
            Phase::PermanentlyFailing
        } else if !self.initialized.is_set() {
            Phase::Uninitialized
        } else if self.baseline().is_warming_up() {
            Phase::WarmingUp
        } else {
            Phase::SteadyState
        }
    }

    pub fn snapshot(&self) -> ProbeSnapshot {
        let baseline = self.baseline().clone();
        ProbeSnapshot {
            phase: self.phase(),
            probe_count: self.probe_count(),
            canary_count: baseline.canary_count,
            learned_normal_millis: baseline.learned_normal_millis,
            failure_threshold_millis: baseline.failure_threshold_millis,
            next_canary_at_millis: baseline.next_canary_at_millis,
            transforms_executed: self.transforms_executed(),
            initialized: self.initialized.is_set(),
            ready_reported: self.ready_reported.is_set(),
            permanently_failing: self.permanently_failing.is_set(),
        }
    }
}

/// Point-in-time copy of the probe state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSnapshot {
    pub phase: Phase,
    pub probe_count: u64,
    pub canary_count: u32,
    pub learned_normal_millis: u64,
    pub failure_threshold_millis: Option<u64>,
    pub next_canary_at_millis: u64,
    pub transforms_executed: u64,
    pub initialized: bool,
    pub ready_reported: bool,
    pub permanently_failing: bool,
}
