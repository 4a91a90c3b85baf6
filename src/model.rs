//! Graph data model shared by the simulation and the render path.
//!
//! Nodes live in an arena ([`Graph::nodes`]) ordered by id, so an arena index
//! doubles as a deterministic tie-breaker wherever results must be ordered by
//! id. Nothing outside this module holds references into the arena across the
//! simulation boundary; only [`NodeId`]s and plain numbers travel.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use eframe::egui::{Color32, Pos2, Rect, Vec2, pos2, vec2};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::lod::LodLevel;

pub const DEFAULT_NODE_RADIUS: f32 = 6.0;

/// Opaque node identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Interaction state set by the UI layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeFlags {
    pub selected: bool,
    pub hovered: bool,
    pub playing: bool,
    pub on_path: bool,
}

impl NodeFlags {
    /// Any flag that pins the node to full detail.
    pub fn is_emphasized(self) -> bool {
        self.selected || self.hovered || self.playing || self.on_path
    }
}

#[derive(Clone, Debug)]
pub struct GraphNode {
    pub id: NodeId,
    pub position: Pos2,
    pub velocity: Vec2,
    /// Fixed position overriding the simulation output.
    pub pinned: Option<Pos2>,
    /// World-space radius; the on-screen radius is `radius * zoom`.
    pub radius: f32,
    pub degree: u32,
    /// Palette slot for colour variants.
    pub group: u8,
    pub flags: NodeFlags,
    pub lod: LodLevel,
}

#[derive(Clone, Debug)]
pub struct GraphEdge {
    pub id: String,
    /// Arena index of the source node.
    pub source: usize,
    /// Arena index of the target node.
    pub target: usize,
    pub weight: f32,
    pub thickness: f32,
    pub color: Color32,
    pub opacity: f32,
    /// Shared quadratic control point assigned by the bundler.
    pub control: Option<Pos2>,
}

/// Node record handed over by the data-fetch layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: String,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default)]
    pub group: Option<u8>,
}

/// Edge record handed over by the data-fetch layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotEdge {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub weight: Option<f32>,
}

/// A validated, normalized node/edge set. Replaces the whole graph on load.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

impl GraphSnapshot {
    pub fn from_json(raw: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(raw)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Rejects duplicate ids and dangling edges.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(SnapshotError::DuplicateNode(node.id.clone()));
            }
        }

        for (index, edge) in self.edges.iter().enumerate() {
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(SnapshotError::DanglingEdge {
                        edge: edge_id(edge, index),
                        node: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn edge_id(edge: &SnapshotEdge, index: usize) -> String {
    edge.id
        .clone()
        .unwrap_or_else(|| format!("{}->{}#{index}", edge.source, edge.target))
}

/// Arena of nodes and edges for the render path.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    index_by_id: HashMap<NodeId, usize>,
}

impl Graph {
    /// Builds the arena. Nodes are sorted by id; edges whose endpoints are
    /// missing are dropped with a warning.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        let mut records = snapshot.nodes.iter().collect::<Vec<_>>();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records.dedup_by(|a, b| a.id == b.id);

        let mut index_by_id = HashMap::with_capacity(records.len());
        let mut nodes = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let id = NodeId::new(record.id.clone());
            index_by_id.insert(id.clone(), index);
            nodes.push(GraphNode {
                id,
                position: pos2(record.x.unwrap_or(0.0), record.y.unwrap_or(0.0)),
                velocity: Vec2::ZERO,
                pinned: None,
                radius: record
                    .radius
                    .filter(|radius| radius.is_finite() && *radius > 0.0)
                    .unwrap_or(DEFAULT_NODE_RADIUS),
                degree: 0,
                group: record.group.unwrap_or(0),
                flags: NodeFlags::default(),
                lod: LodLevel::Full,
            });
        }

        let mut edges = Vec::with_capacity(snapshot.edges.len());
        for (index, record) in snapshot.edges.iter().enumerate() {
            let source = index_by_id.get(record.source.as_str());
            let target = index_by_id.get(record.target.as_str());
            let (Some(&source), Some(&target)) = (source, target) else {
                tracing::warn!(
                    source = %record.source,
                    target = %record.target,
                    "dropping edge with a missing endpoint"
                );
                continue;
            };

            nodes[source].degree += 1;
            nodes[target].degree += 1;
            edges.push(GraphEdge {
                id: edge_id(record, index),
                source,
                target,
                weight: record.weight.unwrap_or(1.0),
                thickness: 1.0,
                color: Color32::GRAY,
                opacity: 1.0,
                control: None,
            });
        }

        Self {
            nodes,
            edges,
            index_by_id,
        }
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.index_of(id).map(|index| &mut self.nodes[index])
    }

    pub fn positions(&self) -> Vec<Pos2> {
        self.nodes.iter().map(|node| node.position).collect()
    }

    /// Bounding box of all node positions, padded by node radii.
    pub fn content_bounds(&self) -> Option<Rect> {
        let mut bounds = Rect::NOTHING;
        for node in &self.nodes {
            bounds = bounds.union(Rect::from_center_size(
                node.position,
                Vec2::splat(node.radius * 2.0),
            ));
        }
        bounds.is_positive().then_some(bounds)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// World-space window onto the graph, owned by the camera layer and passed
/// read-only to the culler and LOD manager each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// World x of the top-left corner.
    pub x: f32,
    /// World y of the top-left corner.
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Screen pixels per world unit.
    pub zoom: f32,
    pub world_bounds: Rect,
}

impl Viewport {
    /// Viewport of a `screen` sized canvas centred on `center`.
    pub fn centered(center: Pos2, screen: Vec2, zoom: f32, world_bounds: Rect) -> Self {
        let zoom = zoom.max(f32::EPSILON);
        let size = screen / zoom;
        Self {
            x: center.x - size.x * 0.5,
            y: center.y - size.y * 0.5,
            width: size.x,
            height: size.y,
            zoom,
            world_bounds,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::from_min_size(pos2(self.x, self.y), vec2(self.width, self.height))
    }

    pub fn center(&self) -> Pos2 {
        pos2(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn screen_size(&self) -> Vec2 {
        vec2(self.width, self.height) * self.zoom
    }

    /// The viewport grown by `padding_px` screen pixels on every side.
    pub fn padded(&self, padding_px: f32) -> Rect {
        self.rect().expand(padding_px.max(0.0) / self.zoom)
    }

    pub fn world_to_screen(&self, world: Pos2) -> Pos2 {
        pos2((world.x - self.x) * self.zoom, (world.y - self.y) * self.zoom)
    }

    pub fn screen_to_world(&self, screen: Pos2) -> Pos2 {
        pos2(screen.x / self.zoom + self.x, screen.y / self.zoom + self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(raw: &str) -> Result<GraphSnapshot, SnapshotError> {
        GraphSnapshot::from_json(raw)
    }

    #[test]
    fn rejects_dangling_edges() {
        let result = snapshot(
            r#"{"nodes":[{"id":"a"}],"edges":[{"source":"a","target":"b"}]}"#,
        );
        assert!(matches!(
            result,
            Err(SnapshotError::DanglingEdge { ref node, .. }) if node == "b"
        ));
    }

    #[test]
    fn rejects_duplicate_nodes() {
        let result = snapshot(r#"{"nodes":[{"id":"a"},{"id":"a"}],"edges":[]}"#);
        assert!(matches!(result, Err(SnapshotError::DuplicateNode(ref id)) if id == "a"));
    }

    #[test]
    fn arena_is_sorted_by_id_and_counts_degree() {
        let snapshot = snapshot(
            r#"{
                "nodes":[{"id":"c"},{"id":"a","x":3.0,"y":4.0},{"id":"b","radius":9.0}],
                "edges":[{"source":"a","target":"b"},{"source":"c","target":"b","weight":2.5}]
            }"#,
        )
        .expect("valid snapshot");
        let graph = Graph::from_snapshot(&snapshot);

        let ids = graph
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(graph.node("a").map(|node| node.position), Some(pos2(3.0, 4.0)));
        assert_eq!(graph.node("b").map(|node| node.degree), Some(2));
        assert_eq!(graph.node("b").map(|node| node.radius), Some(9.0));
        assert_eq!(graph.edges[1].source, 2);
        assert_eq!(graph.edges[1].target, 1);
        assert_eq!(graph.edges[1].weight, 2.5);
    }

    #[test]
    fn viewport_round_trips_screen_coordinates() {
        let viewport = Viewport::centered(pos2(10.0, -20.0), vec2(800.0, 600.0), 2.0, Rect::EVERYTHING);
        assert_eq!(viewport.width, 400.0);
        assert_eq!(viewport.center(), pos2(10.0, -20.0));
        let screen = viewport.world_to_screen(pos2(10.0, -20.0));
        assert_eq!(screen, pos2(400.0, 300.0));
        assert_eq!(viewport.screen_to_world(screen), pos2(10.0, -20.0));
        assert_eq!(viewport.padded(100.0).width(), 500.0);
    }
}
