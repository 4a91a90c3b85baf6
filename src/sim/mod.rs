//! Force-directed layout.
//!
//! [`Simulation`] is the synchronous core: a d3-style velocity Verlet
//! integrator with many-body charge (Barnes–Hut), degree-weighted links,
//! centering and collision, cooled by `alpha`. [`SimulationHandle`] runs it on
//! a worker thread and speaks the [`protocol`] over channels.

mod config;
mod forces;
pub mod protocol;
mod quadtree;
pub mod worker;

use std::collections::HashMap;

use eframe::egui::{Pos2, Vec2, pos2, vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub use config::{ConfigPatch, SimulationConfig};
use forces::Link;
pub use protocol::{Envelope, Inbound, LinkInput, NodeInput, NodePosition, Outbound};
use quadtree::BodyNode;
pub use worker::{SimulationHandle, WorkerOptions};

use crate::error::{ConfigError, SimulationError};
use crate::model::{DEFAULT_NODE_RADIUS, NodeId};

/// Radius of the initial placement disc per √(n + 1).
const INITIAL_SPREAD: f32 = 10.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    #[default]
    Uninitialized,
    Running,
    Paused,
    /// Alpha fell below `alpha_min`; `reheat` resumes.
    Settled,
    Stopped,
    Failed,
}

impl SimulationStatus {
    /// Accepts `update`, `configure`, `reheat` and manual ticks.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Settled)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    pub alpha: f32,
    pub is_running: bool,
    pub iterations: u64,
    pub status: SimulationStatus,
}

/// What an automatic tick produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Advanced without reaching a broadcast boundary.
    Quiet,
    /// `broadcast_every` ticks have passed since the last batch.
    Broadcast,
    /// Alpha dropped below `alpha_min`. Reported once per heating.
    Ended,
}

#[derive(Debug, Default)]
pub struct Simulation {
    config: Option<SimulationConfig>,
    status: SimulationStatus,
    alpha: f32,
    iterations: u64,
    ticks_since_broadcast: u32,
    ids: Vec<NodeId>,
    index_by_id: HashMap<NodeId, usize>,
    positions: Vec<Pos2>,
    velocities: Vec<Vec2>,
    pins: Vec<Option<Pos2>>,
    radii: Vec<f32>,
    links: Vec<Link>,
    #[cfg(test)]
    panic_on_next_step: bool,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    pub fn config(&self) -> Option<&SimulationConfig> {
        self.config.as_ref()
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn state(&self) -> SimulationState {
        SimulationState {
            alpha: self.alpha,
            is_running: self.status == SimulationStatus::Running,
            iterations: self.iterations,
            status: self.status,
        }
    }

    pub fn position(&self, id: &str) -> Option<Pos2> {
        self.index_by_id.get(id).map(|&index| self.positions[index])
    }

    pub fn velocity(&self, id: &str) -> Option<Vec2> {
        self.index_by_id.get(id).map(|&index| self.velocities[index])
    }

    /// Current positions for a broadcast, in node order.
    pub fn positions(&self) -> Vec<NodePosition> {
        self.ids
            .iter()
            .zip(&self.positions)
            .zip(&self.velocities)
            .map(|((id, position), velocity)| NodePosition {
                id: id.clone(),
                x: position.x,
                y: position.y,
                vx: velocity.x,
                vy: velocity.y,
            })
            .collect()
    }

    /// Replaces the node and link sets and starts a fresh run at alpha 1.
    /// Nodes without a position are scattered in a disc that grows with √n.
    pub fn initialize(
        &mut self,
        nodes: Vec<NodeInput>,
        links: Vec<LinkInput>,
        patch: &ConfigPatch,
    ) -> Result<(), SimulationError> {
        let config = SimulationConfig::from_patch(patch)?;

        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        let spread = INITIAL_SPREAD * ((nodes.len() + 1) as f32).sqrt();

        let mut ids = Vec::with_capacity(nodes.len());
        let mut index_by_id = HashMap::with_capacity(nodes.len());
        let mut positions = Vec::with_capacity(nodes.len());
        let mut velocities = Vec::with_capacity(nodes.len());
        let mut pins = Vec::with_capacity(nodes.len());
        let mut radii = Vec::with_capacity(nodes.len());

        for node in nodes {
            if index_by_id.contains_key(&node.id) {
                tracing::warn!(id = %node.id, "ignoring duplicate simulation node");
                continue;
            }
            let pin = node
                .pin()
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|(x, y)| pos2(x, y));
            let position = match (pin, node.position()) {
                (Some(pin), _) => pin,
                (None, Some((x, y))) if x.is_finite() && y.is_finite() => pos2(x, y),
                _ => {
                    let angle = rng.random_range(0.0..std::f32::consts::TAU);
                    let radius = spread * rng.random::<f32>().sqrt();
                    pos2(angle.cos() * radius, angle.sin() * radius)
                }
            };

            index_by_id.insert(node.id.clone(), ids.len());
            ids.push(node.id);
            positions.push(position);
            velocities.push(vec2(
                node.vx.filter(|vx| vx.is_finite()).unwrap_or(0.0),
                node.vy.filter(|vy| vy.is_finite()).unwrap_or(0.0),
            ));
            pins.push(pin);
            radii.push(
                node.radius
                    .filter(|radius| radius.is_finite() && *radius >= 0.0)
                    .unwrap_or(DEFAULT_NODE_RADIUS),
            );
        }

        let mut endpoints = Vec::with_capacity(links.len());
        let mut degrees = vec![0_u32; ids.len()];
        for link in &links {
            let (Some(&source), Some(&target)) = (
                index_by_id.get(&link.source),
                index_by_id.get(&link.target),
            ) else {
                tracing::warn!(
                    source = %link.source,
                    target = %link.target,
                    "skipping link with a missing endpoint"
                );
                continue;
            };
            if source == target {
                continue;
            }
            degrees[source] += 1;
            degrees[target] += 1;
            endpoints.push((source, target));
        }

        self.links = endpoints
            .into_iter()
            .map(|(source, target)| Link::weighted(source, target, &degrees))
            .collect();
        self.ids = ids;
        self.index_by_id = index_by_id;
        self.positions = positions;
        self.velocities = velocities;
        self.pins = pins;
        self.radii = radii;
        self.config = Some(config);
        self.alpha = 1.0;
        self.iterations = 0;
        self.ticks_since_broadcast = 0;
        self.status = SimulationStatus::Running;

        tracing::info!(
            nodes = self.ids.len(),
            links = self.links.len(),
            "simulation initialized"
        );
        Ok(())
    }

    /// Automatic tick while running.
    pub fn tick(&mut self) -> Result<TickOutcome, SimulationError> {
        if self.status != SimulationStatus::Running {
            return Err(self.invalid("tick"));
        }
        let config = self.step()?;

        if self.alpha < config.alpha_min {
            self.status = SimulationStatus::Settled;
            self.ticks_since_broadcast = 0;
            tracing::info!(iterations = self.iterations, "simulation settled");
            return Ok(TickOutcome::Ended);
        }

        self.ticks_since_broadcast += 1;
        if self.ticks_since_broadcast >= config.broadcast_every {
            self.ticks_since_broadcast = 0;
            return Ok(TickOutcome::Broadcast);
        }
        Ok(TickOutcome::Quiet)
    }

    /// Advances exactly one step regardless of pause or settling. Never ends
    /// the run.
    pub fn step_manual(&mut self) -> Result<(), SimulationError> {
        if !self.status.is_live() {
            return Err(self.invalid("tick"));
        }
        self.step().map(|_| ())
    }

    /// Makes the next step panic once.
    #[cfg(test)]
    pub(crate) fn panic_on_next_step(&mut self) {
        self.panic_on_next_step = true;
    }

    fn step(&mut self) -> Result<SimulationConfig, SimulationError> {
        let Some(config) = self.config else {
            return Err(self.invalid("tick"));
        };
        #[cfg(test)]
        if std::mem::take(&mut self.panic_on_next_step) {
            panic!("forced step failure");
        }

        self.alpha *= 1.0 - config.alpha_decay;

        if let Some(tree) = BodyNode::build(&self.positions, &self.radii) {
            forces::apply_charge(
                &tree,
                &self.positions,
                &mut self.velocities,
                config.charge,
                self.alpha,
            );
        }
        forces::apply_links(
            &self.links,
            &self.positions,
            &mut self.velocities,
            config.link_distance,
            config.link_strength,
            self.alpha,
        );
        if config.collide_radius > 0.0 {
            let radii = self
                .radii
                .iter()
                .map(|radius| radius.max(config.collide_radius))
                .collect::<Vec<_>>();
            forces::apply_collisions(&self.positions, &mut self.velocities, &radii);
        }
        forces::apply_center(&mut self.positions, config.center_strength);

        let retain = 1.0 - config.velocity_decay;
        for ((position, velocity), pin) in self
            .positions
            .iter_mut()
            .zip(self.velocities.iter_mut())
            .zip(&self.pins)
        {
            match pin {
                Some(pin) => {
                    *position = *pin;
                    *velocity = Vec2::ZERO;
                }
                None => {
                    *velocity *= retain;
                    *position += *velocity;
                }
            }
        }

        self.iterations += 1;

        if let Some(index) = self
            .positions
            .iter()
            .position(|position| !position.x.is_finite() || !position.y.is_finite())
        {
            let error = SimulationError::Diverged {
                id: self.ids[index].to_string(),
                iteration: self.iterations,
            };
            self.fail(&error);
            return Err(error);
        }
        Ok(config)
    }

    pub fn pause(&mut self) -> Result<(), SimulationError> {
        match self.status {
            SimulationStatus::Running => {
                self.status = SimulationStatus::Paused;
                Ok(())
            }
            SimulationStatus::Paused | SimulationStatus::Settled => Ok(()),
            _ => Err(self.invalid("pause")),
        }
    }

    pub fn resume(&mut self) -> Result<(), SimulationError> {
        match self.status {
            SimulationStatus::Paused => {
                self.status = SimulationStatus::Running;
                Ok(())
            }
            SimulationStatus::Running | SimulationStatus::Settled => Ok(()),
            _ => Err(self.invalid("resume")),
        }
    }

    /// Terminal until the next `initialize`. Positions are kept for a final
    /// broadcast.
    pub fn stop(&mut self) -> Result<(), SimulationError> {
        match self.status {
            SimulationStatus::Uninitialized => Err(self.invalid("stop")),
            SimulationStatus::Stopped => Ok(()),
            _ => {
                self.status = SimulationStatus::Stopped;
                tracing::info!(iterations = self.iterations, "simulation stopped");
                Ok(())
            }
        }
    }

    /// Raises alpha without touching positions. A settled run starts again;
    /// a paused one stays paused.
    pub fn reheat(&mut self, alpha: Option<f32>) -> Result<(), SimulationError> {
        if !self.status.is_live() {
            return Err(self.invalid("reheat"));
        }
        let alpha = alpha.unwrap_or(1.0);
        if !alpha.is_finite() {
            return Err(ConfigError::NotFinite {
                field: "alpha",
                value: alpha.into(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::OutOfRange {
                field: "alpha",
                value: alpha.into(),
                min: 0.0,
                max: 1.0,
            }
            .into());
        }

        self.alpha = alpha;
        self.ticks_since_broadcast = 0;
        if self.status == SimulationStatus::Settled {
            self.status = SimulationStatus::Running;
        }
        tracing::debug!(alpha, "simulation reheated");
        Ok(())
    }

    /// Merges `patch` into the live configuration. Positions are untouched.
    pub fn configure(&mut self, patch: &ConfigPatch) -> Result<(), SimulationError> {
        if !self.status.is_live() {
            return Err(self.invalid("configure"));
        }
        let status = self.status;
        let config = self.config.as_mut().ok_or(SimulationError::InvalidState {
            message: "configure",
            status,
        })?;
        config.apply(patch)?;
        tracing::debug!(?patch, "simulation reconfigured");
        Ok(())
    }

    /// Applies externally set positions, velocities and pins. Unknown ids are
    /// skipped. Returns how many nodes changed.
    pub fn update(&mut self, nodes: &[NodeInput]) -> Result<usize, SimulationError> {
        if !self.status.is_live() {
            return Err(self.invalid("update"));
        }

        let mut applied = 0;
        for node in nodes {
            let Some(&index) = self.index_by_id.get(&node.id) else {
                tracing::warn!(id = %node.id, "update for unknown node");
                continue;
            };

            if let Some((x, y)) = node.position().filter(|(x, y)| x.is_finite() && y.is_finite()) {
                self.positions[index] = pos2(x, y);
            }
            if let Some(vx) = node.vx.filter(|vx| vx.is_finite()) {
                self.velocities[index].x = vx;
            }
            if let Some(vy) = node.vy.filter(|vy| vy.is_finite()) {
                self.velocities[index].y = vy;
            }
            if let Some(radius) = node.radius.filter(|radius| radius.is_finite() && *radius >= 0.0) {
                self.radii[index] = radius;
            }
            if node.unpin {
                self.pins[index] = None;
            }
            if let Some((x, y)) = node.pin().filter(|(x, y)| x.is_finite() && y.is_finite()) {
                let pin = pos2(x, y);
                self.pins[index] = Some(pin);
                self.positions[index] = pin;
                self.velocities[index] = Vec2::ZERO;
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Moves the run to `Failed`. Only a new `initialize` leaves that state.
    pub fn fail(&mut self, error: &SimulationError) {
        tracing::error!(%error, iterations = self.iterations, "simulation failed");
        self.status = SimulationStatus::Failed;
    }

    /// Applies one inbound message and returns the replies in send order.
    pub fn handle(&mut self, message: Inbound) -> Vec<Outbound> {
        let kind = message.kind();
        let result = match message {
            Inbound::Init {
                nodes,
                edges,
                config,
            } => match (nodes, edges) {
                (None, _) => Err(SimulationError::MissingField {
                    message: "init",
                    field: "nodes",
                }),
                (_, None) => Err(SimulationError::MissingField {
                    message: "init",
                    field: "edges",
                }),
                (Some(nodes), Some(edges)) => self
                    .initialize(nodes, edges, &config.unwrap_or_default())
                    .map(|()| self.batch(BatchKind::Ready)),
            },
            Inbound::Update { nodes } => match nodes {
                Some(nodes) => self.update(&nodes).map(|_| self.state_message()),
                None => Err(SimulationError::MissingField {
                    message: "update",
                    field: "nodes",
                }),
            },
            Inbound::Tick => self.step_manual().map(|()| self.batch(BatchKind::Tick)),
            Inbound::Pause => self.pause().map(|()| self.state_message()),
            Inbound::Resume => self.resume().map(|()| self.state_message()),
            Inbound::Stop => self.stop().map(|()| self.batch(BatchKind::Tick)),
            Inbound::Configure { config } => match config {
                Some(patch) => self.configure(&patch).map(|()| self.state_message()),
                None => Err(SimulationError::MissingField {
                    message: "configure",
                    field: "config",
                }),
            },
            Inbound::Reheat { alpha } => self.reheat(alpha).map(|()| self.state_message()),
        };

        match result {
            Ok(reply) => vec![reply],
            Err(error) => {
                tracing::warn!(message = kind, %error, "rejected simulation message");
                vec![self.error_message(&error)]
            }
        }
    }

    pub fn batch(&self, kind: BatchKind) -> Outbound {
        let nodes = self.positions();
        let state = self.state();
        match kind {
            BatchKind::Ready => Outbound::Ready { nodes, state },
            BatchKind::Tick => Outbound::Tick { nodes, state },
            BatchKind::End => Outbound::End { nodes, state },
        }
    }

    pub fn state_message(&self) -> Outbound {
        Outbound::State {
            state: self.state(),
        }
    }

    pub fn error_message(&self, error: &SimulationError) -> Outbound {
        Outbound::Error {
            error: error.to_string(),
            state: self.state(),
        }
    }

    fn invalid(&self, message: &'static str) -> SimulationError {
        SimulationError::InvalidState {
            message,
            status: self.status,
        }
    }
}

/// Which position-carrying message to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchKind {
    Ready,
    Tick,
    End,
}
