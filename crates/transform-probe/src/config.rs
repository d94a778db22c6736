//! Probe configuration.
//!
//! Defaults come from a [`ProbeSettings`] (usually a `probe.toml`), and four
//! of them can be overridden at deploy time through an [`OverrideSource`],
//! normally the process environment:
//!
//! | override name                    | setting                              |
//! |----------------------------------|--------------------------------------|
//! | `livenessPercent`                | allowed slowdown over the baseline   |
//! | `maxTransforms`                  | transforms before a restart          |
//! | `maxTransformSeconds`            | longest acceptable single transform  |
//! | `livenessTransformPeriodSeconds` | gap between canaries on live probes  |
//!
//! An override that is absent, unparsable or not positive falls back to the
//! default. Resolution never fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

pub const LIVENESS_PERCENT: &str = "livenessPercent";
pub const MAX_TRANSFORMS: &str = "maxTransforms";
pub const MAX_TRANSFORM_SECONDS: &str = "maxTransformSeconds";
pub const LIVENESS_TRANSFORM_PERIOD_SECONDS: &str = "livenessTransformPeriodSeconds";

/// A source of named configuration overrides.
pub trait OverrideSource {
    /// The raw override value, if one is set.
    fn get(&self, name: &str) -> Option<String>;
}

/// Overrides read from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvOverrides;

impl OverrideSource for EnvOverrides {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl OverrideSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Resolve a positive integer override, falling back to `default`.
///
/// Logs the resolved value so operators can see which one won.
pub fn resolve_positive_integer(source: &dyn OverrideSource, name: &str, default: u64) -> u64 {
    let value = source
        .get(name)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|v| *v > 0)
        .map(|v| v as u64)
        .unwrap_or(default);
    info!(name, value, "probe setting resolved");
    value
}

/// Constructor-supplied defaults for a probe controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Name of the bundled fixture used as canary input.
    pub source_artifact: String,
    /// File name for the canary output.
    pub target_artifact: String,
    /// Size of the canary output observed during testing.
    pub expected_size: u64,
    /// Allowed variation either side of `expected_size`.
    pub tolerance: u64,
    #[serde(default = "default_liveness_percent")]
    pub liveness_percent: u64,
    #[serde(default = "default_max_transforms")]
    pub max_transforms: u64,
    #[serde(default = "default_max_transform_seconds")]
    pub max_transform_seconds: u64,
    #[serde(default = "default_liveness_transform_period_seconds")]
    pub liveness_transform_period_seconds: u64,
    /// Directory holding the bundled fixtures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixtures_dir: Option<PathBuf>,
}

fn default_liveness_percent() -> u64 {
    150
}

fn default_max_transforms() -> u64 {
    10_000
}

fn default_max_transform_seconds() -> u64 {
    900
}

fn default_liveness_transform_period_seconds() -> u64 {
    60
}

impl ProbeSettings {
    /// Settings for a canary with the stock ceilings and period.
    pub fn new(
        source_artifact: impl Into<String>,
        target_artifact: impl Into<String>,
        expected_size: u64,
        tolerance: u64,
    ) -> Self {
        Self {
            source_artifact: source_artifact.into(),
            target_artifact: target_artifact.into(),
            expected_size,
            tolerance,
            liveness_percent: default_liveness_percent(),
            max_transforms: default_max_transforms(),
            max_transform_seconds: default_max_transform_seconds(),
            liveness_transform_period_seconds: default_liveness_transform_period_seconds(),
            fixtures_dir: None,
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Resolved, immutable probe configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    source_artifact: String,
    target_artifact: String,
    min_expected_size: u64,
    max_expected_size: u64,
    liveness_percent: u64,
    liveness_period_millis: u64,
    max_transform_count: u64,
    max_transform_seconds: u64,
}

impl ProbeConfig {
    /// Apply deploy-time overrides on top of `settings`.
    pub fn resolve(settings: &ProbeSettings, source: &dyn OverrideSource) -> Self {
        let liveness_percent =
            resolve_positive_integer(source, LIVENESS_PERCENT, settings.liveness_percent);
        let max_transform_count =
            resolve_positive_integer(source, MAX_TRANSFORMS, settings.max_transforms);
        let max_transform_seconds =
            resolve_positive_integer(source, MAX_TRANSFORM_SECONDS, settings.max_transform_seconds);
        let period_seconds = resolve_positive_integer(
            source,
            LIVENESS_TRANSFORM_PERIOD_SECONDS,
            settings.liveness_transform_period_seconds,
        );

        Self {
            source_artifact: settings.source_artifact.clone(),
            target_artifact: settings.target_artifact.clone(),
            min_expected_size: settings.expected_size.saturating_sub(settings.tolerance),
            max_expected_size: settings.expected_size.saturating_add(settings.tolerance),
            liveness_percent,
            liveness_period_millis: period_seconds.saturating_mul(1000),
            max_transform_count,
            max_transform_seconds,
        }
    }

    /// Resolve against the process environment.
    pub fn from_env(settings: &ProbeSettings) -> Self {
        Self::resolve(settings, &EnvOverrides)
    }

    pub fn source_artifact(&self) -> &str {
        &self.source_artifact
    }

    pub fn target_artifact(&self) -> &str {
        &self.target_artifact
    }

    pub fn min_expected_size(&self) -> u64 {
        self.min_expected_size
    }

    pub fn max_expected_size(&self) -> u64 {
        self.max_expected_size
    }

    pub fn liveness_percent(&self) -> u64 {
        self.liveness_percent
    }

    /// Gap between canaries on live probes. Zero disables periodic canaries.
    pub fn liveness_period_millis(&self) -> u64 {
        self.liveness_period_millis
    }

    /// Transforms allowed before a restart. Zero means unlimited.
    pub fn max_transform_count(&self) -> u64 {
        self.max_transform_count
    }

    /// Longest acceptable transform, as configured.
    pub fn max_transform_seconds(&self) -> u64 {
        self.max_transform_seconds
    }

    /// Longest acceptable transform. Zero means unlimited.
    pub fn max_transform_millis(&self) -> u64 {
        self.max_transform_seconds.saturating_mul(1000)
    }
}
