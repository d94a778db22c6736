//! Lifecycle guard: hard ceilings and the permanent-failure latch.
//!
//! Two ceilings ask the orchestrator for a restart (429): the number of
//! transforms performed, and the duration of any single transform. Breaching
//! the duration ceiling latches the controller into permanent failure; every
//! probe after that fails until the process is replaced. A canary that is
//! merely slower than the learned threshold is reported as degraded (500)
//! and does not latch anything.

use tracing::warn;

use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::state::ProbeState;
use crate::timing::Observation;

/// Reject the probe if the permanent-failure latch is set.
pub fn check_latch(state: &ProbeState, config: &ProbeConfig) -> ProbeResult<()> {
    if state.permanently_failing().is_set() {
        return Err(ProbeError::TooManyRequests(format!(
            "A transform took longer than {} seconds",
            config.max_transform_seconds()
        )));
    }
    Ok(())
}

/// Reject the probe if either hard ceiling has been breached.
pub fn check_ceilings(state: &ProbeState, config: &ProbeConfig) -> ProbeResult<()> {
    check_latch(state, config)?;

    let max = config.max_transform_count();
    if max > 0 && state.transforms_executed() > max {
        return Err(ProbeError::TooManyRequests(format!(
            "It has performed more than {max} transformations"
        )));
    }
    Ok(())
}

/// Checks run before a canary starts.
pub fn pre_check(state: &ProbeState, config: &ProbeConfig) -> ProbeResult<()> {
    check_ceilings(state, config)
}

/// Latch permanent failure if `elapsed_millis` breached the duration ceiling.
///
/// Returns whether the latch is now set.
pub fn record_duration(state: &ProbeState, config: &ProbeConfig, elapsed_millis: u64) -> bool {
    let max = config.max_transform_millis();
    if max > 0 && elapsed_millis > max && state.permanently_failing().set() {
        warn!(
            elapsed_ms = elapsed_millis,
            max_ms = max,
            "transform exceeded the duration ceiling, requesting restart"
        );
    }
    state.permanently_failing().is_set()
}

/// Checks run after a canary, once its duration has been observed.
///
/// Ceilings are checked first, so a canary that breached the duration
/// ceiling reports a restart rather than a slowdown.
pub fn post_check(
    state: &ProbeState,
    config: &ProbeConfig,
    elapsed_millis: u64,
    observation: &Observation,
) -> ProbeResult<()> {
    record_duration(state, config, elapsed_millis);
    check_ceilings(state, config)?;

    if let Some(threshold) = observation.failure_threshold_millis {
        if elapsed_millis > threshold {
            return Err(ProbeError::Degraded {
                elapsed_ms: elapsed_millis,
                percent: config.liveness_percent(),
                normal_ms: observation.learned_normal_millis,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::ProbeSettings;

    fn config(max_transforms: u64, max_transform_seconds: u64) -> ProbeConfig {
        let mut settings = ProbeSettings::new("quick.pdf", "quick.png", 1000, 100);
        settings.liveness_percent = 50;
        settings.max_transforms = max_transforms;
        settings.max_transform_seconds = max_transform_seconds;
        ProbeConfig::resolve(&settings, &HashMap::<String, String>::new())
    }

    fn established(normal: u64, threshold: u64) -> Observation {
        Observation {
            counted: true,
            learned_normal_millis: normal,
            failure_threshold_millis: Some(threshold),
        }
    }

    const UNLEARNED: Observation = Observation {
        counted: true,
        learned_normal_millis: 0,
        failure_threshold_millis: None,
    };

    #[test]
    fn fresh_state_passes() {
        let state = ProbeState::new();
        assert!(pre_check(&state, &config(10, 60)).is_ok());
    }

    #[test]
    fn count_ceiling_is_exclusive() {
        let state = ProbeState::new();
        let cfg = config(2, 0);
        state.record_transform();
        state.record_transform();
        assert!(pre_check(&state, &cfg).is_ok());

        state.record_transform();
        let err = pre_check(&state, &cfg).unwrap_err();
        assert!(err.requests_restart());
        assert_eq!(
            err.to_string(),
            "Transformer requested to die. It has performed more than 2 transformations"
        );
    }

    #[test]
    fn zero_count_ceiling_is_unlimited() {
        let state = ProbeState::new();
        for _ in 0..100 {
            state.record_transform();
        }
        assert!(pre_check(&state, &config(0, 0)).is_ok());
    }

    #[test]
    fn duration_ceiling_latches_and_reports_restart() {
        let state = ProbeState::new();
        let cfg = config(0, 1);
        let err = post_check(&state, &cfg, 1_001, &UNLEARNED).unwrap_err();
        assert!(err.requests_restart());
        assert_eq!(
            err.to_string(),
            "Transformer requested to die. A transform took longer than 1 seconds"
        );
        assert!(state.permanently_failing().is_set());

        // Sticky: a fast canary afterwards still fails.
        assert!(post_check(&state, &cfg, 1, &UNLEARNED).unwrap_err().requests_restart());
        assert!(pre_check(&state, &cfg).unwrap_err().requests_restart());
    }

    #[test]
    fn duration_at_ceiling_does_not_latch() {
        let state = ProbeState::new();
        assert!(!record_duration(&state, &config(0, 1), 1_000));
        assert!(!record_duration(&state, &config(0, 0), u64::MAX));
    }

    #[test]
    fn ceiling_beats_degraded() {
        let state = ProbeState::new();
        let err = post_check(&state, &config(0, 1), 5_000, &established(60, 90)).unwrap_err();
        assert!(matches!(err, ProbeError::TooManyRequests(_)));
    }

    #[test]
    fn slow_canary_is_degraded_but_not_latched() {
        let state = ProbeState::new();
        let cfg = config(0, 0);
        let err = post_check(&state, &cfg, 91, &established(60, 90)).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Degraded {
                elapsed_ms: 91,
                percent: 50,
                normal_ms: 60
            }
        ));
        assert!(!state.permanently_failing().is_set());

        assert!(post_check(&state, &cfg, 90, &established(60, 90)).is_ok());
    }

    #[test]
    fn no_threshold_before_baseline() {
        let state = ProbeState::new();
        assert!(post_check(&state, &config(0, 0), 60_000, &UNLEARNED).is_ok());
    }
}
