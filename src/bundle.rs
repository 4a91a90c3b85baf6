//! Edge bundling.
//!
//! Edges leaving the same hub in roughly the same direction share one
//! quadratic control point, so the renderer draws them as a fanned bundle.
//! Control points only change when the edge set changes or the layout moved
//! noticeably since the last pass.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use eframe::egui::{Pos2, Vec2};
use serde::{Deserialize, Serialize};

use crate::model::{GraphEdge, GraphNode};

pub const SECTORS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlingSettings {
    pub enabled: bool,
    /// World-space movement that triggers a recomputation.
    pub threshold: f32,
    pub min_bundle_size: usize,
    /// Control point distance as a fraction of the bundle's mean length.
    pub strength: f32,
}

impl Default for BundlingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 25.0,
            min_bundle_size: 3,
            strength: 0.35,
        }
    }
}

#[derive(Debug, Default)]
struct Group {
    edges: Vec<usize>,
    direction: Vec2,
    length: f32,
}

#[derive(Debug, Default)]
pub struct EdgeBundler {
    settings: BundlingSettings,
    /// Node positions at the last recomputation.
    anchors: Vec<Pos2>,
    edge_count: usize,
    dirty: bool,
    bundles: usize,
    recomputations: u64,
}

impl EdgeBundler {
    pub fn new(settings: BundlingSettings) -> Self {
        Self {
            settings,
            dirty: true,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> BundlingSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: BundlingSettings) {
        if self.settings != settings {
            self.settings = settings;
            self.dirty = true;
        }
    }

    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    /// Number of bundles formed by the last pass.
    pub fn bundle_count(&self) -> usize {
        self.bundles
    }

    /// Whether the next [`update`](Self::update) would recompute.
    pub fn is_stale(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> bool {
        if self.dirty || edges.len() != self.edge_count || nodes.len() != self.anchors.len() {
            return true;
        }
        let threshold_sq = self.settings.threshold.max(0.0).powi(2);
        nodes
            .iter()
            .zip(&self.anchors)
            .any(|(node, anchor)| node.position.distance_sq(*anchor) > threshold_sq)
    }

    /// Assigns control points to `edges` when stale. Returns whether a
    /// recomputation happened.
    pub fn update(&mut self, nodes: &[GraphNode], edges: &mut [GraphEdge]) -> bool {
        if !self.is_stale(nodes, edges) {
            return false;
        }

        for edge in edges.iter_mut() {
            edge.control = None;
        }
        self.bundles = if self.settings.enabled {
            self.assign(nodes, edges)
        } else {
            0
        };

        self.anchors.clear();
        self.anchors.extend(nodes.iter().map(|node| node.position));
        self.edge_count = edges.len();
        self.dirty = false;
        self.recomputations += 1;
        tracing::debug!(
            bundles = self.bundles,
            edges = edges.len(),
            "recomputed edge bundles"
        );
        true
    }

    fn assign(&self, nodes: &[GraphNode], edges: &mut [GraphEdge]) -> usize {
        let mut groups: BTreeMap<(usize, usize), Group> = BTreeMap::new();
        for (index, edge) in edges.iter().enumerate() {
            let (Some(source), Some(target)) = (nodes.get(edge.source), nodes.get(edge.target))
            else {
                continue;
            };
            if edge.source == edge.target {
                continue;
            }
            let (hub, hub_node, spoke) = if hub_is_source(edge.source, source, edge.target, target) {
                (edge.source, source, target)
            } else {
                (edge.target, target, source)
            };
            let offset = spoke.position - hub_node.position;
            let length = offset.length();
            if length <= f32::EPSILON {
                continue;
            }

            let group = groups.entry((hub, sector(offset))).or_default();
            group.edges.push(index);
            group.direction += offset / length;
            group.length += length;
        }

        let min_size = self.settings.min_bundle_size.max(2);
        let mut bundles = 0;
        for ((hub, _), group) in groups {
            if group.edges.len() < min_size {
                continue;
            }
            let direction = group.direction.normalized();
            if !direction.is_finite() || direction == Vec2::ZERO {
                continue;
            }
            let mean_length = group.length / group.edges.len() as f32;
            let control = nodes[hub].position + direction * (self.settings.strength * mean_length);
            for index in group.edges {
                edges[index].control = Some(control);
            }
            bundles += 1;
        }
        bundles
    }
}

/// The higher-degree endpoint is the hub; ties go to the lower arena index.
fn hub_is_source(source_index: usize, source: &GraphNode, target_index: usize, target: &GraphNode) -> bool {
    (source.degree, std::cmp::Reverse(source_index)) >= (target.degree, std::cmp::Reverse(target_index))
}

/// Sector of a direction; sector 0 is centred on the positive x axis.
fn sector(direction: Vec2) -> usize {
    let width = TAU / SECTORS as f32;
    let angle = (direction.y.atan2(direction.x) + width * 0.5).rem_euclid(TAU);
    (angle / width) as usize % SECTORS
}

#[cfg(test)]
mod tests {
    use eframe::egui::{Color32, pos2, vec2};

    use super::*;
    use crate::lod::LodLevel;
    use crate::model::{NodeFlags, NodeId};

    fn node(id: &str, x: f32, y: f32, degree: u32) -> GraphNode {
        GraphNode {
            id: NodeId::from(id),
            position: pos2(x, y),
            velocity: Vec2::ZERO,
            pinned: None,
            radius: 4.0,
            degree,
            group: 0,
            flags: NodeFlags::default(),
            lod: LodLevel::Full,
        }
    }

    fn edge(source: usize, target: usize) -> GraphEdge {
        GraphEdge {
            id: format!("{source}-{target}"),
            source,
            target,
            weight: 1.0,
            thickness: 1.0,
            color: Color32::GRAY,
            opacity: 1.0,
            control: None,
        }
    }

    /// A hub with three spokes to the east and one to the west.
    fn star() -> (Vec<GraphNode>, Vec<GraphEdge>) {
        let nodes = vec![
            node("hub", 0.0, 0.0, 4),
            node("e1", 100.0, -5.0, 1),
            node("e2", 100.0, 0.0, 1),
            node("e3", 100.0, 5.0, 1),
            node("w", -100.0, 0.0, 1),
        ];
        let edges = vec![edge(0, 1), edge(2, 0), edge(0, 3), edge(0, 4)];
        (nodes, edges)
    }

    #[test]
    fn groups_edges_by_hub_and_direction() {
        let (nodes, mut edges) = star();
        let mut bundler = EdgeBundler::new(BundlingSettings::default());
        assert!(bundler.update(&nodes, &mut edges));

        assert_eq!(bundler.bundle_count(), 1);
        let control = edges[0].control.expect("bundled edge");
        assert_eq!(edges[1].control, Some(control));
        assert_eq!(edges[2].control, Some(control));
        assert_eq!(edges[3].control, None);
        assert!(control.x > 30.0 && control.x < 40.0);
        assert!(control.y.abs() < 1e-3);
    }

    #[test]
    fn recomputes_only_when_stale() {
        let (mut nodes, mut edges) = star();
        let mut bundler = EdgeBundler::new(BundlingSettings::default());
        bundler.update(&nodes, &mut edges);
        assert!(!bundler.update(&nodes, &mut edges));

        nodes[1].position += vec2(5.0, 5.0);
        assert!(!bundler.update(&nodes, &mut edges));

        nodes[1].position += vec2(30.0, 0.0);
        assert!(bundler.update(&nodes, &mut edges));

        edges.push(edge(1, 4));
        assert!(bundler.update(&nodes, &mut edges));

        bundler.invalidate();
        assert!(bundler.update(&nodes, &mut edges));
        assert_eq!(bundler.recomputations(), 4);
    }

    #[test]
    fn disabling_clears_control_points() {
        let (nodes, mut edges) = star();
        let mut bundler = EdgeBundler::new(BundlingSettings::default());
        bundler.update(&nodes, &mut edges);
        bundler.set_settings(BundlingSettings {
            enabled: false,
            ..BundlingSettings::default()
        });
        assert!(bundler.update(&nodes, &mut edges));
        assert!(edges.iter().all(|edge| edge.control.is_none()));
    }

    #[test]
    fn sectors_cover_the_circle() {
        assert_eq!(sector(vec2(1.0, 0.0)), 0);
        assert_eq!(sector(vec2(0.0, 1.0)), 4);
        assert_eq!(sector(vec2(-1.0, 0.0)), 8);
        assert_eq!(sector(vec2(0.0, -1.0)), 12);
        assert_eq!(sector(vec2(1.0, -0.05)), 0);
        assert_eq!(sector(vec2(1.0, -0.5)), SECTORS - 1);
    }
}
