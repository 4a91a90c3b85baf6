use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Force-layout parameters. `broadcast_every` has no default: how often
/// positions cross the worker boundary depends on the workload, so the caller
/// must choose.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Many-body strength; negative repels.
    pub charge: f32,
    pub link_distance: f32,
    /// Multiplier on the degree-normalized link strength.
    pub link_strength: f32,
    pub center_strength: f32,
    /// Minimum collision radius; zero disables collision.
    pub collide_radius: f32,
    pub alpha_decay: f32,
    pub velocity_decay: f32,
    pub alpha_min: f32,
    /// Ticks between position broadcasts.
    pub broadcast_every: u32,
    /// Seed for random initial placement.
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub const DEFAULT_CHARGE: f32 = -30.0;
    pub const DEFAULT_LINK_DISTANCE: f32 = 30.0;
    pub const DEFAULT_LINK_STRENGTH: f32 = 1.0;
    pub const DEFAULT_CENTER_STRENGTH: f32 = 1.0;
    pub const DEFAULT_COLLIDE_RADIUS: f32 = 8.0;
    pub const DEFAULT_VELOCITY_DECAY: f32 = 0.4;
    pub const DEFAULT_ALPHA_MIN: f32 = 0.001;

    /// Decay that takes alpha from 1 to `alpha_min` in 300 ticks.
    pub fn default_alpha_decay() -> f32 {
        1.0 - Self::DEFAULT_ALPHA_MIN.powf(1.0 / 300.0)
    }

    pub fn new(broadcast_every: u32) -> Self {
        Self {
            charge: Self::DEFAULT_CHARGE,
            link_distance: Self::DEFAULT_LINK_DISTANCE,
            link_strength: Self::DEFAULT_LINK_STRENGTH,
            center_strength: Self::DEFAULT_CENTER_STRENGTH,
            collide_radius: Self::DEFAULT_COLLIDE_RADIUS,
            alpha_decay: Self::default_alpha_decay(),
            velocity_decay: Self::DEFAULT_VELOCITY_DECAY,
            alpha_min: Self::DEFAULT_ALPHA_MIN,
            broadcast_every,
            seed: None,
        }
    }

    /// Builds a full configuration from a patch over the defaults.
    /// `broadcastEvery` must be present.
    pub fn from_patch(patch: &ConfigPatch) -> Result<Self, ConfigError> {
        let broadcast_every = patch.broadcast_every.ok_or(ConfigError::Missing {
            field: "broadcastEvery",
        })?;
        let mut config = Self::new(broadcast_every);
        config.apply(patch)?;
        Ok(config)
    }

    /// Merges `patch` into a copy and validates it; `self` is untouched on error.
    pub fn apply(&mut self, patch: &ConfigPatch) -> Result<(), ConfigError> {
        let mut next = *self;
        if let Some(value) = patch.charge {
            next.charge = value;
        }
        if let Some(value) = patch.link_distance {
            next.link_distance = value;
        }
        if let Some(value) = patch.link_strength {
            next.link_strength = value;
        }
        if let Some(value) = patch.center_strength {
            next.center_strength = value;
        }
        if let Some(value) = patch.collide_radius {
            next.collide_radius = value;
        }
        if let Some(value) = patch.alpha_decay {
            next.alpha_decay = value;
        }
        if let Some(value) = patch.velocity_decay {
            next.velocity_decay = value;
        }
        if let Some(value) = patch.alpha_min {
            next.alpha_min = value;
        }
        if let Some(value) = patch.broadcast_every {
            next.broadcast_every = value;
        }
        if patch.seed.is_some() {
            next.seed = patch.seed;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("charge", self.charge),
            ("linkDistance", self.link_distance),
            ("linkStrength", self.link_strength),
            ("centerStrength", self.center_strength),
            ("collideRadius", self.collide_radius),
            ("alphaDecay", self.alpha_decay),
            ("velocityDecay", self.velocity_decay),
            ("alphaMin", self.alpha_min),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite {
                    field,
                    value: value.into(),
                });
            }
        }

        check_range("linkDistance", self.link_distance, 0.0, f32::MAX)?;
        check_range("linkStrength", self.link_strength, 0.0, f32::MAX)?;
        check_range("centerStrength", self.center_strength, 0.0, 1.0)?;
        check_range("collideRadius", self.collide_radius, 0.0, f32::MAX)?;
        check_range("alphaDecay", self.alpha_decay, 0.0, 0.999_999)?;
        check_range("velocityDecay", self.velocity_decay, 0.0, 1.0)?;
        check_range("alphaMin", self.alpha_min, 0.0, 0.999_999)?;
        if self.broadcast_every == 0 {
            return Err(ConfigError::OutOfRange {
                field: "broadcastEvery",
                value: 0.0,
                min: 1.0,
                max: u32::MAX.into(),
            });
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(())
}

/// Partial configuration carried by `init` and `configure`. Keys are
/// camelCase on the wire; snake_case aliases let the same struct come from
/// TOML files and environment variables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge: Option<f32>,
    #[serde(default, alias = "link_distance", skip_serializing_if = "Option::is_none")]
    pub link_distance: Option<f32>,
    #[serde(default, alias = "link_strength", skip_serializing_if = "Option::is_none")]
    pub link_strength: Option<f32>,
    #[serde(default, alias = "center_strength", skip_serializing_if = "Option::is_none")]
    pub center_strength: Option<f32>,
    #[serde(default, alias = "collide_radius", skip_serializing_if = "Option::is_none")]
    pub collide_radius: Option<f32>,
    #[serde(default, alias = "alpha_decay", skip_serializing_if = "Option::is_none")]
    pub alpha_decay: Option<f32>,
    #[serde(default, alias = "velocity_decay", skip_serializing_if = "Option::is_none")]
    pub velocity_decay: Option<f32>,
    #[serde(default, alias = "alpha_min", skip_serializing_if = "Option::is_none")]
    pub alpha_min: Option<f32>,
    #[serde(default, alias = "broadcast_every", skip_serializing_if = "Option::is_none")]
    pub broadcast_every: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ConfigPatch {
    /// Fields set in `other` win.
    pub fn merged(self, other: &ConfigPatch) -> Self {
        Self {
            charge: other.charge.or(self.charge),
            link_distance: other.link_distance.or(self.link_distance),
            link_strength: other.link_strength.or(self.link_strength),
            center_strength: other.center_strength.or(self.center_strength),
            collide_radius: other.collide_radius.or(self.collide_radius),
            alpha_decay: other.alpha_decay.or(self.alpha_decay),
            velocity_decay: other.velocity_decay.or(self.velocity_decay),
            alpha_min: other.alpha_min.or(self.alpha_min),
            broadcast_every: other.broadcast_every.or(self.broadcast_every),
            seed: other.seed.or(self.seed),
        }
    }
}

impl From<SimulationConfig> for ConfigPatch {
    fn from(config: SimulationConfig) -> Self {
        Self {
            charge: Some(config.charge),
            link_distance: Some(config.link_distance),
            link_strength: Some(config.link_strength),
            center_strength: Some(config.center_strength),
            collide_radius: Some(config.collide_radius),
            alpha_decay: Some(config.alpha_decay),
            velocity_decay: Some(config.velocity_decay),
            alpha_min: Some(config.alpha_min),
            broadcast_every: Some(config.broadcast_every),
            seed: config.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_decay_reaches_alpha_min_in_300_ticks() {
        let decay = SimulationConfig::default_alpha_decay();
        let alpha = (1.0 - decay).powi(300);
        assert!((alpha - SimulationConfig::DEFAULT_ALPHA_MIN).abs() < 1e-5);
    }

    #[test]
    fn broadcast_interval_is_required() {
        assert_eq!(
            SimulationConfig::from_patch(&ConfigPatch::default()),
            Err(ConfigError::Missing {
                field: "broadcastEvery"
            })
        );
        let zero = ConfigPatch {
            broadcast_every: Some(0),
            ..ConfigPatch::default()
        };
        assert!(matches!(
            SimulationConfig::from_patch(&zero),
            Err(ConfigError::OutOfRange {
                field: "broadcastEvery",
                ..
            })
        ));
    }

    #[test]
    fn negative_alpha_min_is_rejected_and_config_unchanged() {
        let mut config = SimulationConfig::new(5);
        let patch = ConfigPatch {
            alpha_min: Some(-0.1),
            link_distance: Some(200.0),
            ..ConfigPatch::default()
        };
        assert!(matches!(
            config.apply(&patch),
            Err(ConfigError::OutOfRange {
                field: "alphaMin",
                ..
            })
        ));
        assert_eq!(config, SimulationConfig::new(5));
    }

    #[test]
    fn nan_is_rejected() {
        let mut config = SimulationConfig::new(1);
        let patch = ConfigPatch {
            charge: Some(f32::NAN),
            ..ConfigPatch::default()
        };
        assert!(matches!(
            config.apply(&patch),
            Err(ConfigError::NotFinite {
                field: "charge",
                ..
            })
        ));
    }

    #[test]
    fn patch_accepts_camel_and_snake_case() {
        let camel: ConfigPatch =
            serde_json::from_str(r#"{"linkDistance":80,"broadcastEvery":3}"#).expect("camelCase");
        let snake: ConfigPatch =
            serde_json::from_str(r#"{"link_distance":80,"broadcast_every":3}"#).expect("snake_case");
        assert_eq!(camel, snake);
        assert_eq!(camel.link_distance, Some(80.0));
    }

    #[test]
    fn merged_prefers_the_newer_patch() {
        let base = ConfigPatch {
            charge: Some(-10.0),
            broadcast_every: Some(4),
            ..ConfigPatch::default()
        };
        let newer = ConfigPatch {
            charge: Some(-50.0),
            ..ConfigPatch::default()
        };
        let merged = base.merged(&newer);
        assert_eq!(merged.charge, Some(-50.0));
        assert_eq!(merged.broadcast_every, Some(4));
    }
}
