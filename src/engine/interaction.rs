use eframe::egui::Pos2;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use super::GraphEngine;
use crate::error::SimulationError;
use crate::model::NodeFlags;
use crate::sim::{NodeInput, SimulationHandle, SimulationStatus};

/// Alpha a drag or pin change reheats the layout to.
pub const INTERACTION_ALPHA: f32 = 0.3;
/// Minimum pick radius in screen pixels, so tiny nodes stay clickable.
const MIN_PICK_PX: f32 = 6.0;

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

impl GraphEngine {
    pub fn selected(&self) -> Option<&str> {
        self.selected.map(|index| self.graph.nodes[index].id.as_str())
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.map(|index| self.graph.nodes[index].id.as_str())
    }

    /// Selects a node, or clears the selection with `None`. Returns false when
    /// the id is unknown; the selection is cleared in that case too.
    pub fn select(&mut self, id: Option<&str>) -> bool {
        let index = id.and_then(|id| self.graph.index_of(id));
        self.selected = self.move_flag(self.selected, index, |flags, on| flags.selected = on);
        id.is_none() || index.is_some()
    }

    pub fn hover(&mut self, id: Option<&str>) -> bool {
        let index = id.and_then(|id| self.graph.index_of(id));
        self.hovered = self.move_flag(self.hovered, index, |flags, on| flags.hovered = on);
        id.is_none() || index.is_some()
    }

    pub fn set_playing(&mut self, id: Option<&str>) -> bool {
        let index = id.and_then(|id| self.graph.index_of(id));
        self.playing = self.move_flag(self.playing, index, |flags, on| flags.playing = on);
        id.is_none() || index.is_some()
    }

    /// Marks the nodes of a highlighted path. Unknown ids are skipped; the
    /// number of matched nodes is returned.
    pub fn set_path<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        for index in self.path.drain(..) {
            self.graph.nodes[index].flags.on_path = false;
        }
        for id in ids {
            if let Some(index) = self.graph.index_of(id) {
                self.graph.nodes[index].flags.on_path = true;
                self.path.push(index);
            }
        }
        self.path.len()
    }

    fn move_flag(
        &mut self,
        previous: Option<usize>,
        next: Option<usize>,
        set: impl Fn(&mut NodeFlags, bool),
    ) -> Option<usize> {
        if let Some(index) = previous {
            set(&mut self.graph.nodes[index].flags, false);
        }
        if let Some(index) = next {
            set(&mut self.graph.nodes[index].flags, true);
        }
        next
    }

    /// Nearest node whose disc covers a canvas-relative screen point.
    pub fn node_at(&self, screen: Pos2) -> Option<&str> {
        let world = self.camera.screen_to_world(screen);
        let min_radius = MIN_PICK_PX / self.camera.zoom();
        let reach = self
            .graph
            .nodes
            .iter()
            .map(|node| node.radius)
            .fold(min_radius, f32::max);
        self.index
            .query_point(world, reach)
            .into_iter()
            .find(|&index| {
                let node = &self.graph.nodes[index];
                node.position.distance(world) <= node.radius.max(min_radius)
            })
            .map(|index| self.graph.nodes[index].id.as_str())
    }

    /// Node ids matching `query`, best first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&str> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let matcher = SkimMatcherV2::default();
        let mut matches = self
            .graph
            .nodes
            .iter()
            .filter_map(|node| {
                fuzzy_match_score(&matcher, node.id.as_str(), query)
                    .map(|score| (score, node.id.as_str()))
            })
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        matches.into_iter().take(limit).map(|(_, id)| id).collect()
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.graph.node(id).is_some_and(|node| node.pinned.is_some())
    }

    /// Fixes a node at `position`, or where it currently is. Returns false
    /// for unknown ids.
    pub fn pin(
        &mut self,
        handle: &mut SimulationHandle,
        id: &str,
        position: Option<Pos2>,
    ) -> Result<bool, SimulationError> {
        let Some(index) = self.graph.index_of(id) else {
            return Ok(false);
        };
        let position = position
            .filter(|position| position.is_finite())
            .unwrap_or(self.graph.nodes[index].position);
        self.graph.nodes[index].pinned = Some(position);
        self.commit_local_move(index, position);
        handle.update(vec![NodeInput::new(id).pinned(position.x, position.y)])?;
        self.reheat_for_interaction(handle)?;
        Ok(true)
    }

    pub fn unpin(&mut self, handle: &mut SimulationHandle, id: &str) -> Result<bool, SimulationError> {
        let Some(index) = self.graph.index_of(id) else {
            return Ok(false);
        };
        self.graph.nodes[index].pinned = None;
        handle.update(vec![NodeInput::new(id).unpinned()])?;
        self.reheat_for_interaction(handle)?;
        Ok(true)
    }

    /// Moves a node to a world position and holds it there until it is
    /// unpinned, the way a pointer drag does.
    pub fn drag_node(
        &mut self,
        handle: &mut SimulationHandle,
        id: &str,
        world: Pos2,
    ) -> Result<bool, SimulationError> {
        if !world.is_finite() {
            return Ok(false);
        }
        self.pin(handle, id, Some(world))
    }

    fn commit_local_move(&mut self, index: usize, position: Pos2) {
        self.graph.nodes[index].position = position;
        self.positions[index] = position;
        self.placed[index] = true;
        self.index.update_node(&index, position);
    }

    /// Raises alpha to [`INTERACTION_ALPHA`] unless the layout is already
    /// hotter than that. Does nothing before the first message of a run.
    pub fn reheat_for_interaction(&mut self, handle: &mut SimulationHandle) -> Result<(), SimulationError> {
        let needs_heat = self.simulation_state.is_some_and(|state| {
            state.status == SimulationStatus::Settled || state.alpha < INTERACTION_ALPHA
        });
        if needs_heat {
            handle.reheat(Some(INTERACTION_ALPHA))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use eframe::egui::{pos2, vec2};

    use super::*;
    use crate::model::GraphSnapshot;
    use crate::settings::EngineSettings;
    use crate::sim::{ConfigPatch, WorkerOptions};

    fn engine() -> GraphEngine {
        let snapshot = GraphSnapshot::from_json(
            r#"{
                "nodes": [
                    {"id": "alpha", "x": 0.0, "y": 0.0, "radius": 8.0},
                    {"id": "beta", "x": 50.0, "y": 0.0, "radius": 8.0},
                    {"id": "gamma", "x": 0.0, "y": 50.0, "radius": 8.0}
                ],
                "edges": [{"source": "alpha", "target": "beta"}]
            }"#,
        )
        .expect("valid snapshot");
        let settings = EngineSettings {
            simulation: ConfigPatch {
                broadcast_every: Some(1),
                seed: Some(11),
                ..ConfigPatch::default()
            },
            ..EngineSettings::default()
        };
        let mut engine = GraphEngine::new(&settings).expect("valid settings");
        engine.load(&snapshot);
        engine.set_screen_size(vec2(400.0, 400.0));
        engine
    }

    #[test]
    fn flags_move_with_selection() {
        let mut engine = engine();
        assert!(engine.select(Some("alpha")));
        assert!(engine.select(Some("beta")));
        assert_eq!(engine.selected(), Some("beta"));
        assert!(!engine.graph().node("alpha").is_some_and(|node| node.flags.selected));
        assert!(engine.graph().node("beta").is_some_and(|node| node.flags.selected));

        assert!(!engine.select(Some("nope")));
        assert_eq!(engine.selected(), None);

        assert_eq!(engine.set_path(["alpha", "gamma", "nope"]), 2);
        assert_eq!(engine.set_path(["beta"]), 1);
        assert!(!engine.graph().node("alpha").is_some_and(|node| node.flags.on_path));
    }

    #[test]
    fn picks_the_node_under_the_pointer() {
        let engine = engine();
        let screen = engine.camera().world_to_screen(pos2(52.0, 1.0));
        assert_eq!(engine.node_at(screen), Some("beta"));
        let empty = engine.camera().world_to_screen(pos2(25.0, 25.0));
        assert_eq!(engine.node_at(empty), None);
    }

    #[test]
    fn large_node_is_picked_behind_closer_small_ones() {
        let cursor = pos2(40.0, 0.0);
        let mut nodes = vec![r#"{"id": "hub", "x": 0.0, "y": 0.0, "radius": 80.0}"#.to_owned()];
        for step in 0..12 {
            let angle = step as f32 * std::f32::consts::TAU / 12.0;
            nodes.push(format!(
                r#"{{"id": "leaf{step}", "x": {}, "y": {}, "radius": 1.0}}"#,
                cursor.x + 20.0 * angle.cos(),
                cursor.y + 20.0 * angle.sin()
            ));
        }
        let snapshot = GraphSnapshot::from_json(&format!(
            r#"{{"nodes": [{}], "edges": []}}"#,
            nodes.join(",")
        ))
        .expect("valid snapshot");
        let mut engine = GraphEngine::new(&EngineSettings::default()).expect("valid settings");
        engine.load(&snapshot);
        engine.set_screen_size(vec2(400.0, 400.0));

        let screen = engine.camera().world_to_screen(cursor);
        assert_eq!(engine.node_at(screen), Some("hub"));
        let leaf = engine.camera().world_to_screen(pos2(cursor.x + 20.0, cursor.y));
        assert_eq!(engine.node_at(leaf), Some("leaf0"));
    }

    #[test]
    fn fuzzy_search_ranks_matches() {
        let engine = engine();
        assert_eq!(engine.search("gam", 5), vec!["gamma"]);
        assert_eq!(engine.search("  ", 5), Vec::<&str>::new());
        assert!(engine.search("a", 2).len() <= 2);
    }

    #[test]
    fn dragging_pins_locally_and_in_the_simulation() {
        let mut engine = engine();
        let mut handle = SimulationHandle::spawn(WorkerOptions::default()).expect("spawn");
        engine.start_simulation(&mut handle).expect("worker alive");

        let target = pos2(100.0, 100.0);
        assert!(engine.drag_node(&mut handle, "gamma", target).expect("worker alive"));
        assert!(engine.is_pinned("gamma"));
        assert_eq!(engine.graph().node("gamma").map(|node| node.position), Some(target));
        assert_eq!(engine.index().query_point(target, 0.0), vec![2]);

        // Let the worker run; the pinned node must come back exactly where it was dropped.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            engine.pump(&mut handle);
            if engine.simulation_state().is_some_and(|state| state.iterations > 20) {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(engine.graph().node("gamma").map(|node| node.position), Some(target));

        assert!(engine.unpin(&mut handle, "gamma").expect("worker alive"));
        assert!(!engine.is_pinned("gamma"));
        assert!(!engine.unpin(&mut handle, "missing").expect("worker alive"));
    }
}
