//! Error types for the engine.

use thiserror::Error;

use crate::sim::SimulationStatus;

/// Rejected simulation or engine configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("LOD thresholds must satisfy full_px >= reduced_px >= minimal_px >= 0")]
    UnorderedLodThresholds,
}

/// Simulation protocol and runtime failures.
///
/// Never crosses the worker boundary as a panic; the worker turns every variant
/// into an outbound `error` message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("`{message}` message requires `{field}`")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    #[error("`{message}` is not valid while the simulation is {status:?}")]
    InvalidState {
        message: &'static str,
        status: SimulationStatus,
    },

    #[error("node {id} has a non-finite position after tick {iteration}")]
    Diverged { id: String, iteration: u64 },

    #[error("simulation tick panicked: {0}")]
    Panicked(String),

    #[error("failed to spawn simulation worker: {0}")]
    Spawn(String),

    #[error("simulation worker is no longer running")]
    Disconnected,
}

/// Snapshot intake failures at the data-load boundary.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("edge {edge} references missing node {node}")]
    DanglingEdge { edge: String, node: String },
}

/// Failure to resolve [`EngineSettings`](crate::settings::EngineSettings).
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Boxed to keep `Result<EngineSettings, _>` small.
    #[error(transparent)]
    Load(Box<figment::Error>),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

impl From<figment::Error> for SettingsError {
    fn from(error: figment::Error) -> Self {
        Self::Load(Box::new(error))
    }
}
