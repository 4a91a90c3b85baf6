use eframe::egui::{self, Align, Color32, Layout, Ui};
use graphlens::sim::{ConfigPatch, SimulationStatus};

use super::{GraphSource, ViewModel};

const SEARCH_RESULTS: usize = 12;
const ERROR_TEXT: Color32 = Color32::from_rgb(240, 110, 96);

fn status_label(status: Option<SimulationStatus>) -> &'static str {
    match status {
        None => "starting",
        Some(SimulationStatus::Uninitialized) => "uninitialized",
        Some(SimulationStatus::Running) => "running",
        Some(SimulationStatus::Paused) => "paused",
        Some(SimulationStatus::Settled) => "settled",
        Some(SimulationStatus::Stopped) => "stopped",
        Some(SimulationStatus::Failed) => "failed",
    }
}

impl ViewModel {
    pub(super) fn draw_top_bar(
        &mut self,
        ui: &mut Ui,
        source: &GraphSource,
        reload_requested: &mut bool,
    ) {
        ui.horizontal(|ui| {
            ui.heading("graphlens");
            ui.separator();
            ui.label(source.describe());
            ui.label(format!("nodes: {}", self.engine.graph().nodes.len()));
            ui.label(format!("edges: {}", self.engine.graph().edges.len()));
            if ui.button("Reload").clicked() {
                *reload_requested = true;
            }

            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                let stats = self.engine.stats();
                ui.label(format!(
                    "visible: {} nodes / {} edges | {} draw calls | {} vertices",
                    stats.visible_nodes, stats.visible_edges, stats.draw_calls, stats.vertices
                ));
                if let Some(fps_text) = self.fps.display_text() {
                    ui.label(fps_text);
                }
            });
        });
    }

    pub(super) fn draw_controls(&mut self, ui: &mut Ui) {
        egui::ScrollArea::vertical().show(ui, |ui| {
            self.draw_simulation_controls(ui);
            ui.separator();
            self.draw_physics_sliders(ui);
            ui.separator();
            self.draw_view_controls(ui);
            ui.separator();
            self.draw_search(ui);
            ui.separator();
            self.draw_selection(ui);
        });
    }

    fn draw_simulation_controls(&mut self, ui: &mut Ui) {
        ui.heading("Simulation");
        let state = self.engine.simulation_state();
        let status = state.map(|state| state.status);
        ui.label(format!(
            "status: {} | alpha {:.3} | {} iterations",
            status_label(status),
            state.map_or(0.0, |state| state.alpha),
            state.map_or(0, |state| state.iterations),
        ));

        ui.horizontal_wrapped(|ui| {
            if status == Some(SimulationStatus::Paused) {
                if ui.button("Resume").clicked() {
                    let result = self.simulation.resume();
                    self.report(result);
                }
            } else if ui
                .add_enabled(status == Some(SimulationStatus::Running), egui::Button::new("Pause"))
                .clicked()
            {
                let result = self.simulation.pause();
                self.report(result);
            }

            let live = status.is_some_and(SimulationStatus::is_live);
            if ui
                .add_enabled(live, egui::Button::new("Step"))
                .on_hover_text("Advance one tick, even while paused.")
                .clicked()
            {
                let result = self.simulation.tick();
                self.report(result);
            }
            if ui
                .add_enabled(live, egui::Button::new("Reheat"))
                .on_hover_text("Raise alpha back to 1 and keep the current layout.")
                .clicked()
            {
                let result = self.simulation.reheat(None);
                self.report(result);
            }
            if ui.add_enabled(live, egui::Button::new("Stop")).clicked() {
                let result = self.simulation.stop();
                self.report(result);
            }
            if ui
                .button("Restart")
                .on_hover_text("Start a new run from the current positions.")
                .clicked()
            {
                self.restart_simulation();
            }
        });

        if let Some(error) = self.engine.last_error() {
            ui.colored_label(ERROR_TEXT, format!("simulation error: {error}"));
        }
        if let Some(error) = &self.command_error {
            ui.colored_label(ERROR_TEXT, error.as_str());
        }
        if self.simulation.discarded() > 0 {
            ui.weak(format!("stale messages dropped: {}", self.simulation.discarded()));
        }
    }

    fn draw_physics_sliders(&mut self, ui: &mut Ui) {
        let mut patch = ConfigPatch::default();

        ui.collapsing("Physics tuning", |ui| {
            let physics = &mut self.physics;
            if ui
                .add(
                    egui::Slider::new(&mut physics.charge, -300.0..=0.0)
                        .text("Charge")
                        .clamping(egui::SliderClamping::Always),
                )
                .on_hover_text("Many-body strength; more negative pushes nodes apart harder.")
                .changed()
            {
                patch.charge = Some(physics.charge);
            }
            if ui
                .add(
                    egui::Slider::new(&mut physics.link_distance, 5.0..=300.0)
                        .text("Link distance")
                        .clamping(egui::SliderClamping::Always),
                )
                .on_hover_text("Rest length of every edge.")
                .changed()
            {
                patch.link_distance = Some(physics.link_distance);
            }
            if ui
                .add(
                    egui::Slider::new(&mut physics.link_strength, 0.0..=2.0)
                        .text("Link strength")
                        .clamping(egui::SliderClamping::Always),
                )
                .changed()
            {
                patch.link_strength = Some(physics.link_strength);
            }
            if ui
                .add(
                    egui::Slider::new(&mut physics.center_strength, 0.0..=1.0)
                        .text("Centering")
                        .clamping(egui::SliderClamping::Always),
                )
                .on_hover_text("How strongly the layout is pulled back to the origin.")
                .changed()
            {
                patch.center_strength = Some(physics.center_strength);
            }
            if ui
                .add(
                    egui::Slider::new(&mut physics.collide_radius, 0.0..=40.0)
                        .text("Collision radius")
                        .clamping(egui::SliderClamping::Always),
                )
                .on_hover_text("Minimum spacing between node centres; zero disables collision.")
                .changed()
            {
                patch.collide_radius = Some(physics.collide_radius);
            }
            if ui
                .add(
                    egui::Slider::new(&mut physics.velocity_decay, 0.05..=0.95)
                        .text("Velocity decay")
                        .clamping(egui::SliderClamping::Always),
                )
                .on_hover_text("Friction applied to node velocities each tick.")
                .changed()
            {
                patch.velocity_decay = Some(physics.velocity_decay);
            }
        });

        if patch != ConfigPatch::default() {
            let result = self.engine.configure(&mut self.simulation, patch);
            if self.report(result).is_some() {
                let result = self.engine.reheat_for_interaction(&mut self.simulation);
                self.report(result);
            }
        }
    }

    fn draw_view_controls(&mut self, ui: &mut Ui) {
        ui.heading("View");
        ui.horizontal(|ui| {
            if ui.button("Fit").clicked() {
                self.engine.fit_to_content();
            }
            if ui.button("Reset").clicked() {
                self.engine.reset_view();
            }
        });
        ui.checkbox(&mut self.show_quadtree_overlay, "Show quadtree overlay")
            .on_hover_text("Draw the spatial index partitions over the graph canvas.");

        let stats = self.engine.stats();
        let [full, reduced, minimal, hidden] = stats.lod_histogram;
        ui.label(format!(
            "detail: {full} full / {reduced} reduced / {minimal} minimal / {hidden} hidden"
        ));
        ui.label(format!(
            "bundles: {} | labels: {} | skipped frames: {}",
            stats.bundles,
            stats.labels,
            self.engine.skipped_frames()
        ));
    }

    fn draw_search(&mut self, ui: &mut Ui) {
        ui.label("Search nodes");
        ui.text_edit_singleline(&mut self.search)
            .on_hover_text("Fuzzy match on node ids; click a result to jump to it.");

        let mut chosen = None;
        for id in self.engine.search(&self.search, SEARCH_RESULTS) {
            let selected = self.engine.selected() == Some(id);
            if ui.selectable_label(selected, id).clicked() {
                chosen = Some(id.to_owned());
            }
        }

        if let Some(id) = chosen {
            self.engine.select(Some(&id));
            self.engine.zoom_to_node(&id);
        }
    }

    fn draw_selection(&mut self, ui: &mut Ui) {
        ui.heading("Selection");
        let Some(node) = self
            .engine
            .selected()
            .and_then(|id| self.engine.graph().node(id))
        else {
            ui.weak("Click a node to select it. Drag to move it, P to pin.");
            return;
        };

        ui.label(format!("id: {}", node.id));
        ui.label(format!("degree: {}", node.degree));
        ui.label(format!(
            "position: ({:.1}, {:.1})",
            node.position.x, node.position.y
        ));
        let pinned = node.pinned.is_some();

        ui.horizontal(|ui| {
            if ui.button(if pinned { "Unpin" } else { "Pin" }).clicked() {
                self.toggle_pin_selected();
            }
            if ui.button("Clear").clicked() {
                self.engine.select(None);
            }
        });
    }
}
