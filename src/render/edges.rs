use eframe::egui::{Color32, Mesh, Pos2};

use super::style::{EDGE_HIGHLIGHT, PATH_HIGHLIGHT, with_opacity};
use super::{Projection, RenderSettings, push_segment};
use crate::lod::{LodLevel, LodMap};
use crate::model::{GraphEdge, GraphNode};

const MIN_EDGE_PX: f32 = 0.5;
const EMPHASIS_WIDTH: f32 = 1.8;

/// Meshes for one frame of edges.
#[derive(Debug, Default)]
pub struct EdgeBatches {
    pub lines: Mesh,
    pub curves: Mesh,
}

#[derive(Debug, Default)]
pub struct EdgeRenderer {
    settings: RenderSettings,
}

impl EdgeRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    /// Straight edges go to `lines`; edges with a bundling control point are
    /// flattened into `curves`.
    pub fn build(
        &self,
        projection: &Projection,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        visible: &[usize],
        lod: &LodMap,
    ) -> EdgeBatches {
        let mut batches = EdgeBatches::default();
        let zoom_scale = projection.zoom().sqrt();

        for &edge_index in visible {
            let Some(edge) = edges.get(edge_index) else {
                continue;
            };
            let (Some(source), Some(target)) = (nodes.get(edge.source), nodes.get(edge.target))
            else {
                continue;
            };
            let level = lod.edge(edge.source, edge.target);
            if !level.is_rendered() {
                continue;
            }

            let on_path = source.flags.on_path && target.flags.on_path;
            let touches_selection = source.flags.selected || target.flags.selected;
            let emphasized = on_path || touches_selection;

            let mut width = (edge.thickness * zoom_scale).clamp(MIN_EDGE_PX, self.settings.max_edge_px);
            let color = if emphasized {
                width = (width * EMPHASIS_WIDTH).min(self.settings.max_edge_px);
                if on_path { PATH_HIGHLIGHT } else { EDGE_HIGHLIGHT }
            } else {
                with_opacity(edge.color, edge.opacity * level_alpha(level))
            };
            if level == LodLevel::Minimal && !emphasized {
                width = MIN_EDGE_PX.max(width * 0.5);
            }

            let start = projection.to_screen(source.position);
            let end = projection.to_screen(target.position);
            match edge.control {
                Some(control) => push_curve(
                    &mut batches.curves,
                    [start, projection.to_screen(control), end],
                    curve_segments(level),
                    width,
                    color,
                ),
                None => push_segment(&mut batches.lines, start, end, width, color),
            }
        }

        batches
    }
}

fn level_alpha(level: LodLevel) -> f32 {
    match level {
        LodLevel::Full => 1.0,
        LodLevel::Reduced => 0.8,
        LodLevel::Minimal | LodLevel::Hidden => 0.5,
    }
}

fn curve_segments(level: LodLevel) -> usize {
    match level {
        LodLevel::Full => 12,
        LodLevel::Reduced => 6,
        LodLevel::Minimal | LodLevel::Hidden => 3,
    }
}

/// Point on a quadratic Bézier at `t`.
fn quadratic_point([start, control, end]: [Pos2; 3], t: f32) -> Pos2 {
    let inverse = 1.0 - t;
    let weights = [inverse * inverse, 2.0 * inverse * t, t * t];
    Pos2::new(
        weights[0] * start.x + weights[1] * control.x + weights[2] * end.x,
        weights[0] * start.y + weights[1] * control.y + weights[2] * end.y,
    )
}

fn push_curve(mesh: &mut Mesh, points: [Pos2; 3], segments: usize, width: f32, color: Color32) {
    let mut previous = points[0];
    for step in 1..=segments {
        let next = quadratic_point(points, step as f32 / segments as f32);
        push_segment(mesh, previous, next, width, color);
        previous = next;
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::{Rect, Vec2, pos2, vec2};

    use super::*;
    use crate::lod::LodManager;
    use crate::model::{NodeFlags, NodeId, Viewport};

    fn node(id: &str, x: f32, y: f32) -> GraphNode {
        GraphNode {
            id: NodeId::from(id),
            position: pos2(x, y),
            velocity: Vec2::ZERO,
            pinned: None,
            radius: 12.0,
            degree: 1,
            group: 0,
            flags: NodeFlags::default(),
            lod: LodLevel::Full,
        }
    }

    fn edge(source: usize, target: usize, control: Option<Pos2>) -> GraphEdge {
        GraphEdge {
            id: format!("{source}-{target}"),
            source,
            target,
            weight: 1.0,
            thickness: 1.0,
            color: Color32::GRAY,
            opacity: 1.0,
            control,
        }
    }

    fn render(nodes: &mut [GraphNode], edges: &[GraphEdge]) -> EdgeBatches {
        let viewport = Viewport::centered(pos2(0.0, 0.0), vec2(800.0, 600.0), 1.0, Rect::EVERYTHING);
        let visible_nodes = (0..nodes.len()).collect::<Vec<_>>();
        let lod = LodManager::default()
            .compute(&viewport, &visible_nodes, nodes)
            .clone();
        let visible_edges = (0..edges.len()).collect::<Vec<_>>();
        EdgeRenderer::default().build(
            &Projection::new(viewport, Vec2::ZERO),
            nodes,
            edges,
            &visible_edges,
            &lod,
        )
    }

    #[test]
    fn straight_and_bundled_edges_split_into_two_meshes() {
        let mut nodes = vec![node("a", 0.0, 0.0), node("b", 100.0, 0.0), node("c", 0.0, 100.0)];
        let edges = [edge(0, 1, None), edge(0, 2, Some(pos2(40.0, 40.0)))];
        let batches = render(&mut nodes, &edges);

        assert_eq!(batches.lines.vertices.len(), 4);
        assert_eq!(batches.curves.vertices.len(), 4 * curve_segments(LodLevel::Full));
    }

    #[test]
    fn selected_endpoints_highlight_the_edge() {
        let mut nodes = vec![node("a", 0.0, 0.0), node("b", 100.0, 0.0)];
        nodes[0].flags.selected = true;
        let batches = render(&mut nodes, &[edge(0, 1, None)]);

        assert!(batches.lines.vertices.iter().all(|vertex| vertex.color == EDGE_HIGHLIGHT));
    }

    #[test]
    fn curve_passes_through_its_endpoints() {
        let points = [pos2(0.0, 0.0), pos2(5.0, 10.0), pos2(10.0, 0.0)];
        assert_eq!(quadratic_point(points, 0.0), points[0]);
        assert_eq!(quadratic_point(points, 1.0), points[2]);
        assert_eq!(quadratic_point(points, 0.5), pos2(5.0, 5.0));
    }
}
