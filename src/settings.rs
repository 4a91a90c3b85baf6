//! Engine settings with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. Built-in defaults
//! 2. TOML file: the `--config` path, or `graphlens.toml` in the working
//!    directory when present
//! 3. Environment variables: `GRAPHLENS_*`, with `__` separating nested keys
//!    (`GRAPHLENS_SIMULATION__BROADCAST_EVERY=4`)
//!
//! ```toml
//! padding_px = 120.0
//! tick_interval_ms = 16
//!
//! [lod]
//! full_px = 10.0
//! reduced_px = 4.0
//!
//! [bundling]
//! enabled = true
//! min_bundle_size = 3
//!
//! [simulation]
//! broadcast_every = 2
//! charge = -30.0
//! ```
//!
//! `simulation.broadcast_every` has no default. It must come from one of the
//! layers above or from the command line.

use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::bundle::BundlingSettings;
use crate::cull::DEFAULT_PADDING_PX;
use crate::error::{ConfigError, SettingsError};
use crate::lod::LodThresholds;
use crate::render::RenderSettings;
use crate::sim::{ConfigPatch, SimulationConfig, WorkerOptions};

pub const DEFAULT_CONFIG_FILE: &str = "graphlens.toml";
pub const ENV_PREFIX: &str = "GRAPHLENS_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Screen pixels added around the viewport before culling.
    pub padding_px: f32,
    pub lod: LodThresholds,
    pub bundling: BundlingSettings,
    pub render: RenderSettings,
    /// Minimum time between automatic simulation ticks.
    pub tick_interval_ms: u64,
    pub simulation: ConfigPatch,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            padding_px: DEFAULT_PADDING_PX,
            lod: LodThresholds::default(),
            bundling: BundlingSettings::default(),
            render: RenderSettings::default(),
            tick_interval_ms: 16,
            simulation: ConfigPatch::default(),
        }
    }
}

impl EngineSettings {
    /// The provider stack without extracting; `path` overrides the default
    /// file name. A missing file is not an error.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let settings: Self = Self::figment(path).extract()?;
        settings.validate()?;
        tracing::debug!(?settings, "resolved engine settings");
        Ok(settings)
    }

    /// Checks everything except the simulation parameters, which are
    /// validated by [`simulation_config`](Self::simulation_config).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.padding_px.is_finite() {
            return Err(ConfigError::NotFinite {
                field: "padding_px",
                value: self.padding_px.into(),
            });
        }
        if self.padding_px < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "padding_px",
                value: self.padding_px.into(),
                min: 0.0,
                max: f64::MAX,
            });
        }
        self.lod.validate()?;
        for (field, value) in [
            ("bundling.threshold", self.bundling.threshold),
            ("bundling.strength", self.bundling.strength),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite {
                    field,
                    value: value.into(),
                });
            }
        }
        Ok(())
    }

    /// Command-line value for `broadcast_every`, which wins over every other
    /// layer.
    pub fn with_broadcast_every(mut self, broadcast_every: Option<u32>) -> Self {
        if broadcast_every.is_some() {
            self.simulation.broadcast_every = broadcast_every;
        }
        self
    }

    /// The fully resolved simulation configuration. Fails when
    /// `broadcast_every` was never provided.
    pub fn simulation_config(&self) -> Result<SimulationConfig, ConfigError> {
        SimulationConfig::from_patch(&self.simulation)
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
        }
    }
}
