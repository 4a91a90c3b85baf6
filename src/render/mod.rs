//! Batched rendering.
//!
//! Nodes and edges are tessellated into a handful of [`Mesh`]es per frame.
//! The resulting [`DrawList`] holds at most [`MAX_DRAW_CALLS`] calls however
//! large the graph is.

mod edges;
mod nodes;
pub mod style;
pub mod variants;

use std::sync::Arc;

use eframe::egui::{Align2, Color32, FontId, Mesh, Painter, Pos2, Shape, Vec2};
use serde::{Deserialize, Serialize};

pub use edges::EdgeRenderer;
pub use nodes::NodeRenderer;
pub use variants::{NodeState, NodeVariant, VariantAtlas};

use crate::cull::VisibleSet;
use crate::lod::LodMap;
use crate::model::{Graph, Viewport};

pub const MAX_DRAW_CALLS: usize = 5;

/// Screen-space sizing knobs for the renderers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub min_node_px: f32,
    pub max_node_px: f32,
    /// Full-detail nodes at least this large get a label.
    pub label_min_px: f32,
    pub label_size: f32,
    /// Glow radius as a multiple of the node radius.
    pub glow_scale: f32,
    pub max_edge_px: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            min_node_px: 1.0,
            max_node_px: 48.0,
            label_min_px: 14.0,
            label_size: 12.0,
            glow_scale: 1.9,
            max_edge_px: 6.0,
        }
    }
}

/// World-to-screen mapping for one frame. `origin` is the canvas's top-left
/// corner in absolute screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub viewport: Viewport,
    pub origin: Vec2,
}

impl Projection {
    pub fn new(viewport: Viewport, origin: Vec2) -> Self {
        Self { viewport, origin }
    }

    pub fn to_screen(&self, world: Pos2) -> Pos2 {
        self.viewport.world_to_screen(world) + self.origin
    }

    pub fn zoom(&self) -> f32 {
        self.viewport.zoom
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub text: String,
    pub position: Pos2,
    pub color: Color32,
    pub size: f32,
}

#[derive(Clone, Debug)]
pub enum DrawCall {
    EdgeLines(Arc<Mesh>),
    EdgeCurves(Arc<Mesh>),
    NodeGlow(Arc<Mesh>),
    Nodes(Arc<Mesh>),
    Labels(Vec<Label>),
}

impl DrawCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EdgeLines(_) => "edge-lines",
            Self::EdgeCurves(_) => "edge-curves",
            Self::NodeGlow(_) => "node-glow",
            Self::Nodes(_) => "nodes",
            Self::Labels(_) => "labels",
        }
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        match self {
            Self::EdgeLines(mesh)
            | Self::EdgeCurves(mesh)
            | Self::NodeGlow(mesh)
            | Self::Nodes(mesh) => Some(mesh),
            Self::Labels(_) => None,
        }
    }
}

/// Ordered draw calls for one frame, back to front.
#[derive(Clone, Debug, Default)]
pub struct DrawList {
    calls: Vec<DrawCall>,
}

impl DrawList {
    /// Assembles the list; empty batches are left out.
    pub fn from_batches(edges: edges::EdgeBatches, nodes: nodes::NodeBatches) -> Self {
        let mut calls = Vec::with_capacity(MAX_DRAW_CALLS);
        let meshes = [
            (edges.lines, DrawCall::EdgeLines as fn(Arc<Mesh>) -> DrawCall),
            (edges.curves, DrawCall::EdgeCurves),
            (nodes.glows, DrawCall::NodeGlow),
            (nodes.bodies, DrawCall::Nodes),
        ];
        for (mesh, wrap) in meshes {
            if !mesh.is_empty() {
                calls.push(wrap(Arc::new(mesh)));
            }
        }
        if !nodes.labels.is_empty() {
            calls.push(DrawCall::Labels(nodes.labels));
        }
        Self { calls }
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.calls
            .iter()
            .filter_map(DrawCall::mesh)
            .map(|mesh| mesh.vertices.len())
            .sum()
    }

    pub fn label_count(&self) -> usize {
        self.calls
            .iter()
            .map(|call| match call {
                DrawCall::Labels(labels) => labels.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn paint(&self, painter: &Painter) {
        for call in &self.calls {
            match call {
                DrawCall::EdgeLines(mesh)
                | DrawCall::EdgeCurves(mesh)
                | DrawCall::NodeGlow(mesh)
                | DrawCall::Nodes(mesh) => {
                    painter.add(Shape::mesh(Arc::clone(mesh)));
                }
                DrawCall::Labels(labels) => {
                    for label in labels {
                        painter.text(
                            label.position,
                            Align2::LEFT_CENTER,
                            &label.text,
                            FontId::proportional(label.size),
                            label.color,
                        );
                    }
                }
            }
        }
    }
}

/// Turns the culled, LOD-tagged graph into a [`DrawList`].
#[derive(Debug, Default)]
pub struct FrameRenderer {
    atlas: VariantAtlas,
    nodes: NodeRenderer,
    edges: EdgeRenderer,
}

impl FrameRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            atlas: VariantAtlas::generate(),
            nodes: NodeRenderer::new(settings),
            edges: EdgeRenderer::new(settings),
        }
    }

    pub fn atlas(&self) -> &VariantAtlas {
        &self.atlas
    }

    /// `dim_unrelated` fades nodes that carry no interaction flag, used while
    /// something is selected.
    pub fn render(
        &self,
        projection: &Projection,
        graph: &Graph,
        visible: &VisibleSet,
        lod: &LodMap,
        dim_unrelated: bool,
    ) -> DrawList {
        let edges = self
            .edges
            .build(projection, &graph.nodes, &graph.edges, &visible.edges, lod);
        let nodes = self.nodes.build(
            &self.atlas,
            projection,
            &graph.nodes,
            &visible.nodes,
            lod,
            dim_unrelated,
        );
        DrawList::from_batches(edges, nodes)
    }
}

/// Filled polygon around `center` from a unit ring.
fn push_fan(mesh: &mut Mesh, center: Pos2, radius: f32, ring: &[Vec2], color: Color32) {
    if ring.len() < 3 {
        return;
    }
    let base = mesh.vertices.len() as u32;
    mesh.colored_vertex(center, color);
    for &point in ring {
        mesh.colored_vertex(center + point * radius, color);
    }
    let count = ring.len() as u32;
    for segment in 0..count {
        mesh.add_triangle(base, base + 1 + segment, base + 1 + (segment + 1) % count);
    }
}

/// Annulus between `inner` and `outer`, each edge with its own colour.
fn push_band(
    mesh: &mut Mesh,
    center: Pos2,
    (inner, inner_color): (f32, Color32),
    (outer, outer_color): (f32, Color32),
    ring: &[Vec2],
) {
    if ring.len() < 3 {
        return;
    }
    let base = mesh.vertices.len() as u32;
    for &point in ring {
        mesh.colored_vertex(center + point * inner, inner_color);
        mesh.colored_vertex(center + point * outer, outer_color);
    }
    let count = ring.len() as u32;
    for segment in 0..count {
        let next = (segment + 1) % count;
        let (a, b) = (base + segment * 2, base + segment * 2 + 1);
        let (c, d) = (base + next * 2, base + next * 2 + 1);
        mesh.add_triangle(a, b, d);
        mesh.add_triangle(a, d, c);
    }
}

/// Quad of `width` pixels from `start` to `end`.
fn push_segment(mesh: &mut Mesh, start: Pos2, end: Pos2, width: f32, color: Color32) {
    let direction = end - start;
    let length = direction.length();
    if length <= f32::EPSILON {
        return;
    }
    let normal = Vec2::new(-direction.y, direction.x) / length * (width * 0.5);
    let base = mesh.vertices.len() as u32;
    mesh.colored_vertex(start + normal, color);
    mesh.colored_vertex(start - normal, color);
    mesh.colored_vertex(end + normal, color);
    mesh.colored_vertex(end - normal, color);
    mesh.add_triangle(base, base + 1, base + 2);
    mesh.add_triangle(base + 1, base + 3, base + 2);
}

#[cfg(test)]
mod tests {
    use eframe::egui::{pos2, vec2};

    use super::*;

    #[test]
    fn fan_and_band_index_within_bounds() {
        let ring = [vec2(1.0, 0.0), vec2(0.0, 1.0), vec2(-1.0, 0.0), vec2(0.0, -1.0)];
        let mut mesh = Mesh::default();
        push_fan(&mut mesh, pos2(10.0, 10.0), 5.0, &ring, Color32::RED);
        push_band(
            &mut mesh,
            pos2(10.0, 10.0),
            (5.0, Color32::RED),
            (8.0, Color32::TRANSPARENT),
            &ring,
        );
        push_segment(&mut mesh, pos2(0.0, 0.0), pos2(10.0, 0.0), 2.0, Color32::GRAY);
        push_segment(&mut mesh, pos2(3.0, 3.0), pos2(3.0, 3.0), 2.0, Color32::GRAY);

        assert_eq!(mesh.vertices.len(), 5 + 8 + 4);
        assert_eq!(mesh.indices.len(), (4 + 8 + 2) * 3);
        assert!(mesh.indices.iter().all(|&index| (index as usize) < mesh.vertices.len()));
    }

    #[test]
    fn empty_batches_are_omitted() {
        let list = DrawList::from_batches(edges::EdgeBatches::default(), nodes::NodeBatches::default());
        assert!(list.is_empty());
        assert_eq!(list.vertex_count(), 0);
    }
}
