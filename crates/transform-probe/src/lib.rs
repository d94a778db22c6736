//! transform-probe: self-tuning liveness and readiness probes for
//! transformation services.
//!
//! Orchestrator probes are answered by occasionally running a small canary
//! transform, learning how long a healthy canary takes, and asking for a
//! restart when the service gets too slow or has done too much work.
//!
//! # Architecture
//!
//! ```text
//! ProbeController
//!   ├── schedule   canary or no-op, catch-up rescheduling
//!   ├── canary     fixture in, Transformer, output validated
//!   ├── timing     warm-up baseline (first canary discarded), frozen after
//!   ├── guard      transform-count and duration ceilings, permanent latch
//!   └── state      atomics, latches, Mutex<Baseline>
//! ```
//!
//! # Lifecycle
//!
//! `Uninitialized → WarmingUp → SteadyState → PermanentlyFailing`. The last
//! transition happens only when a transform breaches the duration ceiling,
//! and nothing leaves it: every later probe answers 429 until the process is
//! restarted.

pub mod artifacts;
pub mod canary;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod latch;
pub mod schedule;
pub mod state;
pub mod timing;
pub mod transform;

pub use artifacts::{ArtifactProvider, FixtureProvider};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EnvOverrides, OverrideSource, ProbeConfig, ProbeSettings};
pub use controller::{ProbeController, ProbeResponse};
pub use error::{ProbeError, ProbeResult, StorageError, TransformError};
pub use schedule::Decision;
pub use state::{Phase, ProbeKind, ProbeSnapshot, ProbeState, AVERAGE_OVER_TRANSFORMS};
pub use transform::{CommandTransformer, Transformer};
