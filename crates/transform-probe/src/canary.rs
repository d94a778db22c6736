//! Canary execution and output validation.

use std::path::Path;

use tracing::{debug, warn};

use crate::artifacts::ArtifactProvider;
use crate::clock::Clock;
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::schedule::catch_up;
use crate::state::ProbeState;
use crate::transform::Transformer;

/// Measurements from one validated canary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanaryResult {
    pub elapsed_millis: u64,
    pub target_size: u64,
}

/// Everything a canary run needs to borrow from the controller.
pub struct Canary<'a, T, A> {
    pub state: &'a ProbeState,
    pub config: &'a ProbeConfig,
    pub transformer: &'a T,
    pub artifacts: &'a A,
    pub clock: &'a dyn Clock,
}

impl<T: Transformer, A: ArtifactProvider> Canary<'_, T, A> {
    /// Run one canary transform and validate its output.
    ///
    /// Only the transform call itself is timed, and no lock on the probe
    /// state is held while it runs. A canary whose output validates marks
    /// the controller initialised, whatever the timing checks decide later.
    pub async fn execute(&self) -> ProbeResult<CanaryResult> {
        let start = self.clock.now_millis();
        self.reschedule(start);

        self.state.record_transform();
        let source = self.artifacts.source_file(self.config.source_artifact())?;
        let target = self.artifacts.target_file(self.config.target_artifact())?;
        let source_size = std::fs::metadata(&source).map(|m| m.len()).unwrap_or_default();

        self.transformer.transform(&source, &target).await?;
        let elapsed_millis = self.clock.now_millis().saturating_sub(start);

        let target_size = validate_output(&target, self.config)?;
        self.state.initialized().set();

        debug!(
            source = self.config.source_artifact(),
            source_size,
            target = self.config.target_artifact(),
            target_size,
            elapsed_ms = elapsed_millis,
            "canary transform validated"
        );
        Ok(CanaryResult {
            elapsed_millis,
            target_size,
        })
    }

    fn reschedule(&self, now_millis: u64) {
        let mut baseline = self.state.baseline();
        baseline.next_canary_at_millis = catch_up(
            baseline.next_canary_at_millis,
            self.config.liveness_period_millis(),
            now_millis,
        );
    }
}

/// Check the canary output exists and is within the expected size window.
///
/// Returns the output size.
pub fn validate_output(target: &Path, config: &ProbeConfig) -> ProbeResult<u64> {
    let metadata = match std::fs::metadata(target) {
        Ok(m) if m.is_file() => m,
        _ => {
            warn!(target = %target.display(), "canary output missing");
            return Err(ProbeError::OutputMissing {
                path: target.to_path_buf(),
            });
        }
    };

    let size = metadata.len();
    let (min, max) = (config.min_expected_size(), config.max_expected_size());
    if size < min || size > max {
        warn!(target = %target.display(), size, min, max, "canary output size out of range");
        return Err(ProbeError::OutputSizeOutOfRange {
            path: target.to_path_buf(),
            size,
            min,
            max,
        });
    }
    Ok(size)
}
