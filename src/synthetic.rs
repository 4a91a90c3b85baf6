//! Seeded synthetic graphs for the demo viewer and for load testing.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{GraphSnapshot, SnapshotEdge, SnapshotNode};
use crate::render::variants::PALETTE;

/// Share of edges that stay inside their source node's cluster.
const INTRA_CLUSTER: f64 = 0.8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyntheticGraph {
    pub nodes: usize,
    pub edges: usize,
    pub clusters: usize,
    pub seed: u64,
    /// Emit initial positions; without them the simulation places nodes.
    pub positioned: bool,
}

impl SyntheticGraph {
    pub fn new(nodes: usize, edges: usize) -> Self {
        Self {
            nodes,
            edges,
            clusters: ((nodes as f32).sqrt() / 4.0).ceil().max(1.0) as usize,
            seed: 0x5eed,
            positioned: true,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn positioned(mut self, positioned: bool) -> Self {
        self.positioned = positioned;
        self
    }

    /// Clustered graph with ids `n000000…`. Nodes of a cluster sit around a
    /// point on a ring and share a palette slot; most edges stay inside a
    /// cluster. Self-loops are never generated.
    pub fn generate(&self) -> GraphSnapshot {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let clusters = self.clusters.clamp(1, self.nodes.max(1));
        let ring = 15.0 * (self.nodes as f32).sqrt();
        let spread = ring / clusters as f32 * 1.5 + 30.0;

        let nodes = (0..self.nodes)
            .map(|index| {
                let cluster = index % clusters;
                let (x, y) = if self.positioned {
                    let angle = cluster as f32 / clusters as f32 * std::f32::consts::TAU;
                    let radius = spread * rng.random::<f32>().sqrt();
                    let theta = rng.random_range(0.0..std::f32::consts::TAU);
                    (
                        Some(ring * angle.cos() + radius * theta.cos()),
                        Some(ring * angle.sin() + radius * theta.sin()),
                    )
                } else {
                    (None, None)
                };
                SnapshotNode {
                    id: node_id(index),
                    x,
                    y,
                    radius: Some(rng.random_range(3.0..9.0)),
                    group: Some((cluster % PALETTE.len()) as u8),
                }
            })
            .collect();

        let mut edges = Vec::with_capacity(self.edges);
        if self.nodes >= 2 {
            for index in 0..self.edges {
                let source = rng.random_range(0..self.nodes);
                let target = if rng.random_bool(INTRA_CLUSTER) && self.nodes > clusters {
                    let cluster = source % clusters;
                    let members = (self.nodes - cluster).div_ceil(clusters);
                    cluster + rng.random_range(0..members) * clusters
                } else {
                    rng.random_range(0..self.nodes)
                };
                let target = if target == source {
                    (source + 1) % self.nodes
                } else {
                    target
                };
                edges.push(SnapshotEdge {
                    id: Some(format!("e{index}")),
                    source: node_id(source),
                    target: node_id(target),
                    weight: Some(rng.random_range(1.0..100.0)),
                });
            }
        }

        GraphSnapshot { nodes, edges }
    }
}

fn node_id(index: usize) -> String {
    format!("n{index:06}")
}
