//! Probe controller: the boundary the HTTP layer calls.
//!
//! ```text
//! probe(kind)
//!   ├── schedule::decide ─── NoOp ──> latch check ──> "Success - No transform."
//!   └── RunCanary
//!       ├── guard::pre_check
//!       ├── Canary::execute (transform timed, output validated)
//!       ├── timing::observe (warm-up baseline, reschedule)
//!       └── guard::post_check (ceilings, latch, degraded)
//! ```
//!
//! Every error is caught here and becomes a status code and a message
//! prefixed with the probe sequence number and kind.

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactProvider;
use crate::canary::Canary;
use crate::clock::{Clock, SystemClock};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::guard;
use crate::schedule::{self, Decision, ScheduledProbe};
use crate::state::{ProbeKind, ProbeSnapshot, ProbeState};
use crate::timing;
use crate::transform::Transformer;

const NO_TRANSFORM: &str = "Success - No transform.";

/// What the caller should answer the orchestrator with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResponse {
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    pub message: String,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

/// Self-tuning liveness/readiness probe controller.
pub struct ProbeController<T, A> {
    config: ProbeConfig,
    state: ProbeState,
    transformer: T,
    artifacts: A,
    clock: Arc<dyn Clock>,
}

impl<T: Transformer, A: ArtifactProvider> ProbeController<T, A> {
    pub fn new(config: ProbeConfig, transformer: T, artifacts: A) -> Self {
        Self {
            config,
            state: ProbeState::new(),
            transformer,
            artifacts,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Replace the monotonic clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn state(&self) -> &ProbeState {
        &self.state
    }

    pub fn snapshot(&self) -> ProbeSnapshot {
        self.state.snapshot()
    }

    /// Handle one live or ready probe.
    pub async fn probe(&self, kind: ProbeKind) -> ProbeResponse {
        let probe = schedule::decide(&self.state, &self.config, kind, self.clock.now_millis());
        let prefix = probe.prefix();

        match self.run(&probe).await {
            Ok(message) => {
                let message = format!("{prefix}{message}");
                debug!(sequence = probe.sequence, %kind, status = %StatusCode::OK, "{message}");
                ProbeResponse {
                    status: StatusCode::OK,
                    message,
                }
            }
            Err(e) => {
                let message = format!("{prefix}{e}");
                match &e {
                    ProbeError::Storage(_) | ProbeError::Transform(_) => {
                        error!(sequence = probe.sequence, %kind, error = %e, "probe failed")
                    }
                    _ => warn!(sequence = probe.sequence, %kind, status = %e.status(), "{message}"),
                }
                ProbeResponse {
                    status: e.status(),
                    message,
                }
            }
        }
    }

    pub async fn live(&self) -> ProbeResponse {
        self.probe(ProbeKind::Live).await
    }

    pub async fn ready(&self) -> ProbeResponse {
        self.probe(ProbeKind::Ready).await
    }

    /// Count a real (non-canary) transform performed by the service.
    pub fn record_transform(&self) -> u64 {
        self.state.record_transform()
    }

    /// Hard-ceiling check for real transform requests.
    pub fn check_limits(&self) -> ProbeResult<()> {
        guard::check_ceilings(&self.state, &self.config)
    }

    /// Report the duration of a real transform, latching permanent failure
    /// if it breached the ceiling.
    pub fn record_duration(&self, elapsed_millis: u64) -> bool {
        guard::record_duration(&self.state, &self.config, elapsed_millis)
    }

    async fn run(&self, probe: &ScheduledProbe) -> ProbeResult<String> {
        match probe.decision {
            Decision::RunCanary => self.run_canary(probe.kind).await,
            Decision::NoOp => self.no_op(probe),
        }
    }

    fn no_op(&self, probe: &ScheduledProbe) -> ProbeResult<String> {
        guard::check_latch(&self.state, &self.config)?;
        if !probe.kind.is_live() && self.state.ready_reported().set() {
            info!(sequence = probe.sequence, "{}{NO_TRANSFORM}", probe.kind.label());
        }
        Ok(NO_TRANSFORM.to_string())
    }

    async fn run_canary(&self, kind: ProbeKind) -> ProbeResult<String> {
        guard::pre_check(&self.state, &self.config)?;

        let canary = Canary {
            state: &self.state,
            config: &self.config,
            transformer: &self.transformer,
            artifacts: &self.artifacts,
            clock: self.clock.as_ref(),
        };
        let result = canary.execute().await?;

        let elapsed = result.elapsed_millis;
        let observation =
            timing::observe(&self.state, &self.config, elapsed, kind, self.clock.now_millis());
        guard::post_check(&self.state, &self.config, elapsed, &observation)?;

        debug!(
            elapsed_ms = elapsed,
            target_size = result.target_size,
            baseline_sample = observation.counted,
            "canary passed"
        );
        Ok(format!("Success - Transform {elapsed}ms"))
    }
}
