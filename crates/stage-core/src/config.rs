//! Controller configuration using Figment.
//!
//! A controller is described by a small TOML document:
//!
//! ```toml
//! family = "shrc203"
//! resource = "ASRL3::INSTR"
//! default_unit = "um"
//! io_timeout_ms = 1000
//!
//! [poll]
//! interval_ms = 200
//! timeout_ms = 60000
//!
//! [axis_names]
//! X = 1
//! Focus = 3
//! ```
//!
//! Values are loaded from the file and then overridden by environment variables prefixed
//! with `STAGECTL_`, with `__` separating nested keys
//! (e.g. `STAGECTL_POLL__TIMEOUT_MS=120000`).

use crate::axis::{AxisNames, Family};
use crate::error::{StageError, StageResult};
use crate::motion::Unit;
use crate::poller::PollSettings;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "STAGECTL_";

/// Configuration of one controller session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller family.
    pub family: Family,
    /// Resource identifier (`ASRL3::INSTR`, `/dev/ttyUSB0`, `COM3`).
    pub resource: String,
    /// Unit designated on every axis at connect time.
    #[serde(default)]
    pub default_unit: Unit,
    /// Per-line serial I/O timeout in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Ready-poll settings.
    #[serde(default)]
    pub poll: PollConfig,
    /// Symbolic axis names; family defaults when empty.
    #[serde(default)]
    pub axis_names: BTreeMap<String, u8>,
}

/// Ready-poll configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between status queries in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Poll budget in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl From<PollConfig> for PollSettings {
    fn from(config: PollConfig) -> Self {
        PollSettings {
            interval: Duration::from_millis(config.interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

fn default_io_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_poll_timeout_ms() -> u64 {
    60_000
}

impl ControllerConfig {
    /// Minimal configuration with defaults for everything but family and resource.
    pub fn new(family: Family, resource: impl Into<String>) -> Self {
        Self {
            family,
            resource: resource.into(),
            default_unit: Unit::default(),
            io_timeout_ms: default_io_timeout_ms(),
            poll: PollConfig::default(),
            axis_names: BTreeMap::new(),
        }
    }

    /// Figment with the optional TOML file and `STAGECTL_` environment overrides.
    ///
    /// Callers may merge further providers (e.g. command-line overrides) before
    /// extracting.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from a specific file path and validate it.
    pub fn load_from<P: AsRef<Path>>(path: P) -> StageResult<Self> {
        Self::from_figment(Self::figment(Some(path.as_ref())))
    }

    /// Extract and validate a configuration from a prepared figment.
    pub fn from_figment(figment: Figment) -> StageResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> StageResult<()> {
        if self.resource.trim().is_empty() {
            return Err(StageError::Configuration("resource must not be empty".into()));
        }

        if self.io_timeout_ms == 0 {
            return Err(StageError::Configuration(
                "io_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.poll.interval_ms == 0 {
            return Err(StageError::Configuration(
                "poll.interval_ms must be greater than zero".into(),
            ));
        }

        if self.poll.timeout_ms < self.poll.interval_ms {
            return Err(StageError::Configuration(format!(
                "poll.timeout_ms ({}) must not be shorter than poll.interval_ms ({})",
                self.poll.timeout_ms, self.poll.interval_ms
            )));
        }

        if self.family != Family::Shrc203 && self.default_unit != Unit::Pulse {
            return Err(StageError::Configuration(format!(
                "{} only supports pulse units (default_unit = '{}')",
                self.family, self.default_unit
            )));
        }

        self.axis_names().map_err(|e| StageError::Configuration(e.to_string()))?;
        Ok(())
    }

    /// Poll settings derived from the `[poll]` table.
    pub fn poll_settings(&self) -> PollSettings {
        self.poll.into()
    }

    /// Per-line serial I/O timeout.
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Axis name mapping (configured names, or family defaults).
    pub fn axis_names(&self) -> StageResult<AxisNames> {
        AxisNames::with_overrides(self.family, &self.axis_names)
    }
}
