//! Adaptive timing model.
//!
//! The first [`AVERAGE_OVER_TRANSFORMS`] canaries teach the controller what a
//! normal canary costs. The very first one is usually slower (cold caches and
//! engine start-up) and is left out of the average. Once
//! the window closes the baseline is frozen, so a service that degrades
//! gradually is still measured against how it performed when it started.

use tracing::{debug, info};

use crate::config::ProbeConfig;
use crate::state::{Baseline, ProbeKind, ProbeState, AVERAGE_OVER_TRANSFORMS};

/// What one canary duration did to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Whether the duration fed the warm-up window.
    pub counted: bool,
    pub learned_normal_millis: u64,
    /// Threshold to judge this canary against, if one is established.
    pub failure_threshold_millis: Option<u64>,
}

/// `normal * (100 + percent) / 100`, in integer milliseconds.
pub fn failure_threshold(normal_millis: u64, liveness_percent: u64) -> u64 {
    normal_millis.saturating_mul(100 + liveness_percent) / 100
}

/// Feed one canary duration into the baseline, rescheduling when warm-up
/// completes or on the first ready-probe success.
///
/// The whole update happens under the baseline lock, so concurrent canaries
/// are serialised and the running average never loses a sample.
pub fn observe(
    state: &ProbeState,
    config: &ProbeConfig,
    elapsed_millis: u64,
    kind: ProbeKind,
    now_millis: u64,
) -> Observation {
    let mut baseline = state.baseline();

    if !baseline.is_warming_up() {
        return Observation {
            counted: false,
            learned_normal_millis: baseline.learned_normal_millis,
            failure_threshold_millis: baseline.failure_threshold_millis,
        };
    }

    record_sample(&mut baseline, elapsed_millis, config.liveness_percent());
    let first_ready = !kind.is_live() && state.ready_reported().set();

    let message = format!("{}Success - Transform {elapsed_millis}ms", kind.label());
    if baseline.is_established() && (first_ready || !baseline.is_warming_up()) {
        baseline.next_canary_at_millis = now_millis.saturating_add(config.liveness_period_millis());
        info!(
            canary = baseline.canary_count,
            elapsed_ms = elapsed_millis,
            normal_ms = baseline.learned_normal_millis,
            percent = config.liveness_percent(),
            threshold_ms = baseline.failure_threshold_millis,
            next_canary_at = baseline.next_canary_at_millis,
            "{message} - {}ms+{}%={}ms",
            baseline.learned_normal_millis,
            config.liveness_percent(),
            baseline.failure_threshold_millis.unwrap_or_default(),
        );
    } else if first_ready {
        info!(canary = baseline.canary_count, elapsed_ms = elapsed_millis, "{message}");
    } else {
        debug!(
            canary = baseline.canary_count,
            elapsed_ms = elapsed_millis,
            normal_ms = baseline.learned_normal_millis,
            "warm-up canary observed"
        );
    }

    Observation {
        counted: true,
        learned_normal_millis: baseline.learned_normal_millis,
        failure_threshold_millis: baseline.failure_threshold_millis,
    }
}

/// Count one warm-up sample. The first sample only bumps the count.
fn record_sample(baseline: &mut Baseline, elapsed_millis: u64, liveness_percent: u64) {
    debug_assert!(baseline.canary_count < AVERAGE_OVER_TRANSFORMS);
    baseline.canary_count += 1;
    if baseline.canary_count < 2 {
        return;
    }

    baseline.sum_millis = baseline.sum_millis.saturating_add(elapsed_millis);
    baseline.learned_normal_millis = baseline.sum_millis / u64::from(baseline.canary_count - 1);
    baseline.failure_threshold_millis = Some(failure_threshold(
        baseline.learned_normal_millis,
        liveness_percent,
    ));
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::ProbeSettings;

    fn config(percent: u64) -> ProbeConfig {
        let mut settings = ProbeSettings::new("quick.pdf", "quick.png", 1000, 100);
        settings.liveness_percent = percent;
        settings.liveness_transform_period_seconds = 30;
        ProbeConfig::resolve(&settings, &HashMap::<String, String>::new())
    }

    fn feed(state: &ProbeState, cfg: &ProbeConfig, kind: ProbeKind, durations: &[u64]) {
        for (i, d) in durations.iter().enumerate() {
            observe(state, cfg, *d, kind, 1_000 * (i as u64 + 1));
        }
    }

    #[test]
    fn first_canary_sets_no_threshold() {
        let state = ProbeState::new();
        let obs = observe(&state, &config(50), 500, ProbeKind::Live, 1_000);
        assert!(obs.counted);
        assert_eq!(obs.failure_threshold_millis, None);
        assert_eq!(state.baseline().canary_count, 1);
        assert_eq!(state.baseline().learned_normal_millis, 0);
    }

    #[test]
    fn first_canary_is_excluded_from_the_average() {
        let state = ProbeState::new();
        let cfg = config(50);
        feed(&state, &cfg, ProbeKind::Live, &[5_000, 100]);
        let baseline = state.baseline();
        assert_eq!(baseline.learned_normal_millis, 100);
        assert_eq!(baseline.failure_threshold_millis, Some(150));
    }

    #[test]
    fn warm_up_learns_mean_of_second_to_fifth() {
        for kind in [ProbeKind::Live, ProbeKind::Ready] {
            let state = ProbeState::new();
            let cfg = config(50);
            feed(&state, &cfg, kind, &[50, 60, 58, 62, 61]);
            let baseline = state.baseline();
            assert_eq!(baseline.canary_count, AVERAGE_OVER_TRANSFORMS);
            // (60 + 58 + 62 + 61) / 4 = 60.25
            assert_eq!(baseline.learned_normal_millis, 60);
            assert_eq!(baseline.failure_threshold_millis, Some(90));
        }
    }

    #[test]
    fn mean_is_exact_where_a_running_average_would_truncate() {
        let state = ProbeState::new();
        let cfg = config(100);
        feed(&state, &cfg, ProbeKind::Live, &[100, 1, 2, 3, 3]);
        // Exact mean of [1, 2, 3, 3] is 2.25. Truncating at every step
        // (1, 1, 1, 1) would have pinned the baseline at 1.
        let baseline = state.baseline();
        assert_eq!(baseline.learned_normal_millis, 2);
        assert_eq!(baseline.failure_threshold_millis, Some(4));
    }

    #[test]
    fn baseline_freezes_after_warm_up() {
        let state = ProbeState::new();
        let cfg = config(50);
        feed(&state, &cfg, ProbeKind::Live, &[50, 60, 58, 62, 61]);
        let frozen = state.baseline().clone();

        let obs = observe(&state, &cfg, 10_000, ProbeKind::Live, 99_000);
        assert!(!obs.counted);
        assert_eq!(obs.failure_threshold_millis, Some(90));
        assert_eq!(*state.baseline(), frozen);
    }

    #[test]
    fn warm_up_completion_schedules_next_canary() {
        let state = ProbeState::new();
        let cfg = config(50);
        feed(&state, &cfg, ProbeKind::Live, &[50, 60, 58, 62]);
        assert_eq!(state.baseline().next_canary_at_millis, 0);

        observe(&state, &cfg, 61, ProbeKind::Live, 7_000);
        assert_eq!(state.baseline().next_canary_at_millis, 37_000);
    }

    #[test]
    fn first_ready_success_schedules_and_latches() {
        let state = ProbeState::new();
        let cfg = config(50);
        observe(&state, &cfg, 50, ProbeKind::Live, 1_000);
        observe(&state, &cfg, 60, ProbeKind::Ready, 2_000);
        assert!(state.ready_reported().is_set());
        assert_eq!(state.baseline().next_canary_at_millis, 32_000);

        // Later ready successes do not move the schedule.
        observe(&state, &cfg, 60, ProbeKind::Ready, 3_000);
        assert_eq!(state.baseline().next_canary_at_millis, 32_000);
    }

    #[test]
    fn threshold_formula_is_exact() {
        assert_eq!(failure_threshold(60, 50), 90);
        assert_eq!(failure_threshold(200, 150), 500);
        assert_eq!(failure_threshold(33, 10), 36);
    }
}
