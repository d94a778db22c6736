//! Canary scheduling.
//!
//! Liveness probes should be frequent, but not every one should pay for a
//! test transform. A probe runs a canary when the controller has never
//! completed one, or when it is a live probe with periodic canaries enabled
//! and either the warm-up window is still open or the next canary is due.
//! Ready probes never schedule canaries on their own once initialised.

use tracing::debug;

use crate::config::ProbeConfig;
use crate::state::{ProbeKind, ProbeState};

/// What a probe request should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    RunCanary,
    NoOp,
}

/// A counted probe request and the decision taken for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledProbe {
    pub sequence: u64,
    pub kind: ProbeKind,
    pub decision: Decision,
}

impl ScheduledProbe {
    /// `"<sequence> Live Probe: "` / `"<sequence> Ready Probe: "`.
    pub fn prefix(&self) -> String {
        format!("{} {}", self.sequence, self.kind.label())
    }
}

/// Count the probe and decide whether it runs a canary. Never blocks on I/O.
pub fn decide(state: &ProbeState, config: &ProbeConfig, kind: ProbeKind, now_millis: u64) -> ScheduledProbe {
    let sequence = state.next_probe();

    let periodic = kind.is_live() && config.liveness_period_millis() > 0 && {
        let baseline = state.baseline();
        baseline.is_warming_up() || now_millis >= baseline.next_canary_at_millis
    };

    let decision = if periodic || !state.initialized().is_set() {
        Decision::RunCanary
    } else {
        Decision::NoOp
    };

    debug!(sequence, %kind, ?decision, "probe scheduled");
    ScheduledProbe {
        sequence,
        kind,
        decision,
    }
}

/// Advance a canary schedule past `now_millis` without drifting.
///
/// Steps forward by at least one whole period, and by as many more as it
/// takes to reach `now_millis`, so a long gap between probes neither moves
/// the schedule backward nor queues a backlog of canaries. An unset
/// schedule (zero) or a zero period is returned unchanged.
pub fn catch_up(next_millis: u64, period_millis: u64, now_millis: u64) -> u64 {
    if next_millis == 0 || period_millis == 0 {
        return next_millis;
    }

    let next = next_millis.saturating_add(period_millis);
    if next >= now_millis {
        return next;
    }

    let behind = now_millis - next;
    let periods = behind.div_ceil(period_millis);
    next.saturating_add(periods.saturating_mul(period_millis))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::ProbeSettings;
    use crate::state::AVERAGE_OVER_TRANSFORMS;

    fn config(period_seconds: u64) -> ProbeConfig {
        let mut settings = ProbeSettings::new("quick.pdf", "quick.png", 1000, 100);
        settings.liveness_transform_period_seconds = period_seconds;
        ProbeConfig::resolve(&settings, &HashMap::<String, String>::new())
    }

    fn steady_state(next_canary_at_millis: u64) -> ProbeState {
        let state = ProbeState::new();
        state.initialized().set();
        let mut baseline = state.baseline();
        baseline.canary_count = AVERAGE_OVER_TRANSFORMS;
        baseline.next_canary_at_millis = next_canary_at_millis;
        drop(baseline);
        state
    }

    #[test]
    fn uninitialized_always_runs_canary() {
        let state = ProbeState::new();
        for kind in [ProbeKind::Ready, ProbeKind::Live] {
            let probe = decide(&state, &config(0), kind, 1_000);
            assert_eq!(probe.decision, Decision::RunCanary);
        }
        assert_eq!(state.probe_count(), 2);
    }

    #[test]
    fn live_probe_runs_canary_during_warm_up() {
        let state = ProbeState::new();
        state.initialized().set();
        state.baseline().canary_count = 3;
        let probe = decide(&state, &config(30), ProbeKind::Live, 1_000);
        assert_eq!(probe.decision, Decision::RunCanary);
    }

    #[test]
    fn ready_probe_is_noop_once_initialized() {
        let state = ProbeState::new();
        state.initialized().set();
        state.baseline().canary_count = 1;
        let probe = decide(&state, &config(30), ProbeKind::Ready, 1_000);
        assert_eq!(probe.decision, Decision::NoOp);
    }

    #[test]
    fn live_probe_waits_for_schedule() {
        let state = steady_state(50_000);
        let cfg = config(30);
        assert_eq!(decide(&state, &cfg, ProbeKind::Live, 49_999).decision, Decision::NoOp);
        assert_eq!(decide(&state, &cfg, ProbeKind::Live, 50_000).decision, Decision::RunCanary);
        assert_eq!(decide(&state, &cfg, ProbeKind::Ready, 90_000).decision, Decision::NoOp);
    }

    #[test]
    fn zero_period_disables_live_canaries() {
        let state = ProbeState::new();
        state.initialized().set();
        let probe = decide(&state, &config(0), ProbeKind::Live, 1_000);
        assert_eq!(probe.decision, Decision::NoOp);
    }

    #[test]
    fn sequence_numbers_prefix_messages() {
        let state = ProbeState::new();
        let first = decide(&state, &config(0), ProbeKind::Live, 0);
        let second = decide(&state, &config(0), ProbeKind::Ready, 0);
        assert_eq!(first.prefix(), "1 Live Probe: ");
        assert_eq!(second.prefix(), "2 Ready Probe: ");
    }

    #[test]
    fn catch_up_leaves_unset_schedule() {
        assert_eq!(catch_up(0, 30_000, 100_000), 0);
        assert_eq!(catch_up(10_000, 0, 100_000), 10_000);
    }

    #[test]
    fn catch_up_steps_at_least_once() {
        assert_eq!(catch_up(100_000, 30_000, 50_000), 130_000);
        assert_eq!(catch_up(100_000, 30_000, 130_000), 130_000);
    }

    #[test]
    fn catch_up_skips_missed_periods() {
        // 100s schedule, 30s period, probe arrives at 200s:
        // 130 -> 160 -> 190 -> 220.
        assert_eq!(catch_up(100_000, 30_000, 200_000), 220_000);
        // Landing exactly on a period boundary stops there.
        assert_eq!(catch_up(100_000, 30_000, 190_000), 190_000);
    }

    #[test]
    fn catch_up_matches_stepwise_loop() {
        for now in (0..400_000).step_by(7_919) {
            let mut expected = 100_000u64;
            loop {
                expected += 30_000;
                if expected >= now {
                    break;
                }
            }
            assert_eq!(catch_up(100_000, 30_000, now), expected, "now={now}");
        }
    }
}
