//! View-frustum culling on top of the spatial index.

use eframe::egui::{Pos2, Rect};

use crate::model::{GraphEdge, Viewport};
use crate::spatial::SpatialIndex;

pub const DEFAULT_PADDING_PX: f32 = 120.0;

/// Nodes and edges worth handing to the LOD manager this frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleSet {
    /// Arena indices, ascending.
    pub nodes: Vec<usize>,
    /// Edge indices, ascending.
    pub edges: Vec<usize>,
    /// Per-node visibility, indexed by arena index.
    pub node_mask: Vec<bool>,
}

impl VisibleSet {
    pub fn is_node_visible(&self, index: usize) -> bool {
        self.node_mask.get(index).copied().unwrap_or(false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CullKey {
    viewport: Viewport,
    revision: u64,
    edge_count: usize,
    padding_px: f32,
}

#[derive(Debug)]
pub struct FrustumCuller {
    padding_px: f32,
    key: Option<CullKey>,
    visible: VisibleSet,
    recomputations: u64,
}

impl Default for FrustumCuller {
    fn default() -> Self {
        Self::new(DEFAULT_PADDING_PX)
    }
}

impl FrustumCuller {
    pub fn new(padding_px: f32) -> Self {
        Self {
            padding_px: padding_px.max(0.0),
            key: None,
            visible: VisibleSet::default(),
            recomputations: 0,
        }
    }

    pub fn padding_px(&self) -> f32 {
        self.padding_px
    }

    pub fn set_padding_px(&mut self, padding_px: f32) {
        self.padding_px = padding_px.max(0.0);
    }

    /// How many times the visible set was actually recomputed.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// Last result, without recomputing.
    pub fn visible(&self) -> &VisibleSet {
        &self.visible
    }

    /// Visible set for `viewport`. Reuses the previous frame's result while the
    /// viewport, the index contents and the edge set are unchanged.
    pub fn cull(
        &mut self,
        viewport: &Viewport,
        index: &SpatialIndex<usize>,
        edges: &[GraphEdge],
        positions: &[Pos2],
    ) -> &VisibleSet {
        let key = CullKey {
            viewport: *viewport,
            revision: index.revision(),
            edge_count: edges.len(),
            padding_px: self.padding_px,
        };
        if self.key == Some(key) {
            return &self.visible;
        }

        let padded = viewport.padded(self.padding_px);
        let nodes = index.query_rectangle(padded);

        let mut node_mask = std::mem::take(&mut self.visible.node_mask);
        node_mask.clear();
        node_mask.resize(positions.len(), false);
        for &node in &nodes {
            if let Some(entry) = node_mask.get_mut(node) {
                *entry = true;
            }
        }

        let mut visible_edges = std::mem::take(&mut self.visible.edges);
        visible_edges.clear();
        for (edge_index, edge) in edges.iter().enumerate() {
            let (Some(&start), Some(&end)) = (positions.get(edge.source), positions.get(edge.target))
            else {
                continue;
            };
            if node_mask[edge.source]
                || node_mask[edge.target]
                || edge_bounds_visible(padded, start, end)
            {
                visible_edges.push(edge_index);
            }
        }

        self.visible = VisibleSet {
            nodes,
            edges: visible_edges,
            node_mask,
        };
        self.key = Some(key);
        self.recomputations += 1;
        tracing::trace!(
            nodes = self.visible.nodes.len(),
            edges = self.visible.edges.len(),
            "recomputed visible set"
        );
        &self.visible
    }
}

/// Whether the bounding box of segment `start`–`end` overlaps `rect`.
pub fn edge_bounds_visible(rect: Rect, start: Pos2, end: Pos2) -> bool {
    let min_x = start.x.min(end.x);
    let max_x = start.x.max(end.x);
    let min_y = start.y.min(end.y);
    let max_y = start.y.max(end.y);

    !(max_x < rect.left() || min_x > rect.right() || max_y < rect.top() || min_y > rect.bottom())
}
