//! The render-side owner of a loaded graph.
//!
//! [`GraphEngine`] holds the node arena and everything derived from it: the
//! spatial index, culler, LOD manager, bundler and renderer. Simulation output
//! reaches it only through [`GraphEngine::pump`], which is also the single
//! writer of the spatial index.

mod camera;
mod interaction;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use eframe::egui::{Pos2, Rect, Vec2, pos2};

pub use camera::{Camera, FOCUS_ZOOM, MAX_ZOOM, MIN_ZOOM};

use crate::bundle::EdgeBundler;
use crate::cull::FrustumCuller;
use crate::error::{ConfigError, SimulationError};
use crate::lod::{LodManager, LodThresholds};
use crate::model::{Graph, GraphSnapshot, Viewport};
use crate::render::style::derive_edge_visuals;
use crate::render::{DrawList, FrameRenderer, Projection};
use crate::settings::EngineSettings;
use crate::sim::{
    ConfigPatch, LinkInput, NodeInput, NodePosition, Outbound, SimulationHandle, SimulationState,
};
use crate::spatial::SpatialIndex;

/// Margin left around the content by [`GraphEngine::fit_to_content`].
const FIT_MARGIN_PX: f32 = 40.0;

/// Proof that a frame is in flight. Dropping it lets the next frame start.
#[derive(Debug)]
pub struct FrameTicket {
    gate: Arc<AtomicBool>,
}

impl Drop for FrameTicket {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}

/// Counters from the last rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub visible_nodes: usize,
    pub visible_edges: usize,
    pub draw_calls: usize,
    pub vertices: usize,
    pub labels: usize,
    /// Visible nodes per LOD level.
    pub lod_histogram: [usize; 4],
    pub bundles: usize,
}

pub struct GraphEngine {
    graph: Graph,
    /// Whether each node has a position worth handing to the simulation.
    placed: Vec<bool>,
    positions: Vec<Pos2>,
    index: SpatialIndex<usize>,
    culler: FrustumCuller,
    lod: LodManager,
    bundler: EdgeBundler,
    renderer: FrameRenderer,
    camera: Camera,
    simulation: ConfigPatch,
    simulation_state: Option<SimulationState>,
    last_error: Option<String>,
    selected: Option<usize>,
    hovered: Option<usize>,
    playing: Option<usize>,
    path: Vec<usize>,
    frame_gate: Arc<AtomicBool>,
    skipped_frames: AtomicU64,
    stats: FrameStats,
}

impl GraphEngine {
    pub fn new(settings: &EngineSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            graph: Graph::default(),
            placed: Vec::new(),
            positions: Vec::new(),
            index: SpatialIndex::new(),
            culler: FrustumCuller::new(settings.padding_px),
            lod: LodManager::new(settings.lod)?,
            bundler: EdgeBundler::new(settings.bundling),
            renderer: FrameRenderer::new(settings.render),
            camera: Camera::default(),
            simulation: settings.simulation,
            simulation_state: None,
            last_error: None,
            selected: None,
            hovered: None,
            playing: None,
            path: Vec::new(),
            frame_gate: Arc::new(AtomicBool::new(false)),
            skipped_frames: AtomicU64::new(0),
            stats: FrameStats::default(),
        })
    }

    /// Replaces the whole graph. Interaction state is cleared and the spatial
    /// index rebuilt from the snapshot's positions.
    pub fn load(&mut self, snapshot: &GraphSnapshot) {
        let mut graph = Graph::from_snapshot(snapshot);
        derive_edge_visuals(&mut graph.edges);

        let placed = snapshot
            .nodes
            .iter()
            .filter(|record| record.x.is_some() && record.y.is_some())
            .map(|record| record.id.as_str())
            .collect::<HashSet<_>>();
        self.placed = graph
            .nodes
            .iter()
            .map(|node| placed.contains(node.id.as_str()))
            .collect();
        self.positions = graph.positions();
        self.index
            .build(self.positions.iter().copied().enumerate());
        self.graph = graph;

        self.selected = None;
        self.hovered = None;
        self.playing = None;
        self.path.clear();
        self.simulation_state = None;
        self.last_error = None;
        self.culler.invalidate();
        self.bundler.invalidate();
        tracing::info!(
            nodes = self.graph.nodes.len(),
            edges = self.graph.edges.len(),
            "loaded graph snapshot"
        );
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn index(&self) -> &SpatialIndex<usize> {
        &self.index
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn simulation_state(&self) -> Option<SimulationState> {
        self.simulation_state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames.load(Ordering::Relaxed)
    }

    pub fn lod_thresholds(&self) -> LodThresholds {
        self.lod.thresholds()
    }

    pub fn bundle_recomputations(&self) -> u64 {
        self.bundler.recomputations()
    }

    pub fn cull_recomputations(&self) -> u64 {
        self.culler.recomputations()
    }

    /// Simulation parameters sent with the next `init`.
    pub fn simulation_patch(&self) -> ConfigPatch {
        self.simulation
    }

    /// Starts a new simulation run over the current graph. Nodes loaded
    /// without a position are placed by the simulation.
    pub fn start_simulation(&mut self, handle: &mut SimulationHandle) -> Result<u64, SimulationError> {
        let nodes = self
            .graph
            .nodes
            .iter()
            .zip(&self.placed)
            .map(|(node, &placed)| {
                let input = NodeInput::new(node.id.clone()).with_radius(node.radius);
                let input = if placed {
                    input.at(node.position.x, node.position.y)
                } else {
                    input
                };
                match node.pinned {
                    Some(pin) => input.pinned(pin.x, pin.y),
                    None => input,
                }
            })
            .collect();
        let edges = self
            .graph
            .edges
            .iter()
            .map(|edge| LinkInput {
                id: Some(edge.id.clone()),
                source: self.graph.nodes[edge.source].id.clone(),
                target: self.graph.nodes[edge.target].id.clone(),
            })
            .collect();

        self.simulation_state = None;
        self.last_error = None;
        let epoch = handle.init(nodes, edges, self.simulation)?;
        tracing::info!(epoch, nodes = self.graph.nodes.len(), "started simulation");
        Ok(epoch)
    }

    /// Sends a parameter change to the running simulation and remembers it
    /// for the next run.
    pub fn configure(
        &mut self,
        handle: &mut SimulationHandle,
        patch: ConfigPatch,
    ) -> Result<(), SimulationError> {
        self.simulation = self.simulation.merged(&patch);
        handle.configure(patch)
    }

    /// Applies every current-epoch message waiting on `handle`, in order.
    /// Returns how many messages were consumed.
    pub fn pump(&mut self, handle: &mut SimulationHandle) -> usize {
        let messages = handle.drain();
        let count = messages.len();
        for message in messages {
            self.apply(message);
        }
        count
    }

    /// Applies one outbound simulation message.
    pub fn apply(&mut self, message: Outbound) {
        if let Some(batch) = message.positions() {
            let moved = self.apply_positions(batch);
            tracing::trace!(kind = message.kind(), moved, "applied position batch");
        }
        if let Outbound::Error { error, .. } = &message {
            tracing::error!(%error, "simulation reported an error");
            self.last_error = Some(error.clone());
        }
        self.simulation_state = Some(*message.state());
    }

    /// Commits positions to the arena and the spatial index. Unknown ids and
    /// non-finite values are ignored, leaving the last good position.
    pub fn apply_positions(&mut self, batch: &[NodePosition]) -> usize {
        let mut moves = Vec::with_capacity(batch.len());
        for entry in batch {
            let Some(index) = self.graph.index_of(entry.id.as_str()) else {
                continue;
            };
            let position = pos2(entry.x, entry.y);
            if !position.is_finite() {
                continue;
            }
            let node = &mut self.graph.nodes[index];
            node.position = position;
            node.velocity = Vec2::new(entry.vx, entry.vy);
            if !node.velocity.is_finite() {
                node.velocity = Vec2::ZERO;
            }
            self.positions[index] = position;
            self.placed[index] = true;
            moves.push((index, position));
        }
        self.index
            .update_nodes(moves.iter().map(|(index, position)| (index, *position)))
    }

    /// Claims the frame slot, or returns `None` (and counts a skipped frame)
    /// while the previous frame's ticket is still alive.
    pub fn begin_frame(&self) -> Option<FrameTicket> {
        if self
            .frame_gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(FrameTicket {
                gate: Arc::clone(&self.frame_gate),
            })
        } else {
            let skipped = self.skipped_frames.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(skipped, "skipping frame while the previous one is in flight");
            None
        }
    }

    pub fn viewport(&self) -> Viewport {
        let world_bounds = self
            .index
            .bounds()
            .or_else(|| self.graph.content_bounds())
            .unwrap_or(Rect::NOTHING);
        self.camera.viewport(world_bounds)
    }

    /// Cull, pick LOD levels, refresh bundles and batch everything into a
    /// draw list for the current camera.
    pub fn render_frame(&mut self, _ticket: &FrameTicket) -> DrawList {
        let viewport = self.viewport();
        let visible = self
            .culler
            .cull(&viewport, &self.index, &self.graph.edges, &self.positions);
        let lod = self.lod.compute(&viewport, &visible.nodes, &mut self.graph.nodes);
        self.bundler.update(&self.graph.nodes, &mut self.graph.edges);

        let projection = Projection::new(viewport, self.camera.origin());
        let draw_list = self.renderer.render(
            &projection,
            &self.graph,
            visible,
            lod,
            self.selected.is_some(),
        );

        self.stats = FrameStats {
            visible_nodes: visible.nodes.len(),
            visible_edges: visible.edges.len(),
            draw_calls: draw_list.len(),
            vertices: draw_list.vertex_count(),
            labels: draw_list.label_count(),
            lod_histogram: lod.histogram(),
            bundles: self.bundler.bundle_count(),
        };
        draw_list
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.camera.pan_by(delta);
    }

    pub fn zoom_at(&mut self, anchor: Pos2, factor: f32) {
        self.camera.zoom_at(anchor, factor);
    }

    pub fn fit_to_content(&mut self) {
        if let Some(bounds) = self.graph.content_bounds() {
            self.camera.fit(bounds, FIT_MARGIN_PX);
        }
    }

    pub fn reset_view(&mut self) {
        self.camera.reset();
    }

    /// Centres the camera on a node. Returns false for unknown ids.
    pub fn zoom_to_node(&mut self, id: &str) -> bool {
        let Some(node) = self.graph.node(id) else {
            return false;
        };
        self.camera.zoom_to(node.position);
        true
    }

    pub fn set_screen_size(&mut self, size: Vec2) {
        self.camera.set_screen_size(size);
    }

    /// Canvas rectangle in absolute screen coordinates; draw lists are
    /// produced in the same space.
    pub fn set_screen_rect(&mut self, rect: Rect) {
        self.camera.set_screen_rect(rect);
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;
    use crate::model::NodeId;
    use crate::render::MAX_DRAW_CALLS;
    use crate::sim::SimulationStatus;

    fn snapshot() -> GraphSnapshot {
        GraphSnapshot::from_json(
            r#"{
                "nodes": [
                    {"id": "a", "x": 0.0, "y": 0.0, "radius": 10.0},
                    {"id": "b", "x": 100.0, "y": 0.0},
                    {"id": "c"}
                ],
                "edges": [
                    {"source": "a", "target": "b", "weight": 3.0},
                    {"source": "b", "target": "c"}
                ]
            }"#,
        )
        .expect("valid snapshot")
    }

    fn engine() -> GraphEngine {
        let mut engine = GraphEngine::new(&EngineSettings::default()).expect("default settings");
        engine.load(&snapshot());
        engine.set_screen_size(vec2(800.0, 600.0));
        engine
    }

    fn position(id: &str, x: f32, y: f32) -> NodePosition {
        NodePosition {
            id: NodeId::from(id),
            x,
            y,
            vx: 0.0,
            vy: 0.0,
        }
    }

    #[test]
    fn frame_gate_skips_while_a_ticket_is_alive() {
        let engine = engine();
        let ticket = engine.begin_frame().expect("first frame");
        assert!(engine.begin_frame().is_none());
        assert!(engine.begin_frame().is_none());
        assert_eq!(engine.skipped_frames(), 2);
        drop(ticket);
        assert!(engine.begin_frame().is_some());
    }

    #[test]
    fn renders_the_loaded_graph() {
        let mut engine = engine();
        let ticket = engine.begin_frame().expect("frame");
        let draw_list = engine.render_frame(&ticket);

        assert!(!draw_list.is_empty());
        assert!(draw_list.len() <= MAX_DRAW_CALLS);
        assert_eq!(engine.stats().visible_nodes, 3);
        assert_eq!(engine.stats().visible_edges, 2);
        assert_eq!(engine.stats().draw_calls, draw_list.len());
    }

    #[test]
    fn position_batches_move_nodes_and_the_index() {
        let mut engine = engine();
        let revision = engine.index().revision();
        let moved = engine.apply_positions(&[
            position("c", 40.0, 40.0),
            position("missing", 1.0, 1.0),
            position("a", f32::NAN, 0.0),
        ]);

        assert_eq!(moved, 1);
        assert_eq!(engine.graph().node("c").map(|node| node.position), Some(pos2(40.0, 40.0)));
        assert_eq!(engine.graph().node("a").map(|node| node.position), Some(Pos2::ZERO));
        assert_eq!(engine.index().query_point(pos2(40.0, 40.0), 0.0), vec![2]);
        assert!(engine.index().revision() > revision);
    }

    #[test]
    fn error_messages_are_kept_and_state_recorded() {
        let mut engine = engine();
        let state = SimulationState {
            alpha: 0.5,
            is_running: false,
            iterations: 7,
            status: SimulationStatus::Failed,
        };
        engine.apply(Outbound::Error {
            error: "node x has a non-finite position".to_owned(),
            state,
        });
        assert_eq!(engine.last_error(), Some("node x has a non-finite position"));
        assert_eq!(engine.simulation_state(), Some(state));
    }

    #[test]
    fn fit_to_content_frames_every_node() {
        let mut engine = engine();
        engine.zoom_at(pos2(0.0, 0.0), 0.1);
        engine.fit_to_content();
        let viewport = engine.viewport();
        for node in &engine.graph().nodes {
            assert!(viewport.rect().contains(node.position));
        }
        assert!(engine.zoom_to_node("b"));
        assert_eq!(engine.camera().center(), pos2(100.0, 0.0));
        assert!(!engine.zoom_to_node("zzz"));
    }
}
