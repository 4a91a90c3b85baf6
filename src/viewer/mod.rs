use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use anyhow::{Context as _, Result};
use eframe::egui::{self, Context};
use graphlens::engine::GraphEngine;
use graphlens::error::SimulationError;
use graphlens::model::GraphSnapshot;
use graphlens::settings::EngineSettings;
use graphlens::sim::{SimulationConfig, SimulationHandle};
use graphlens::synthetic::SyntheticGraph;

mod canvas;
mod fps;
mod panels;

use fps::FpsCounter;

/// Poll interval for worker messages while nothing else asks for a repaint.
const IDLE_REPAINT: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub enum GraphSource {
    Snapshot(PathBuf),
    Synthetic(SyntheticGraph),
}

impl GraphSource {
    fn load(&self) -> Result<GraphSnapshot> {
        match self {
            Self::Snapshot(path) => GraphSnapshot::load(path)
                .with_context(|| format!("failed to load snapshot {}", path.display())),
            Self::Synthetic(synthetic) => Ok(synthetic.generate()),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Snapshot(path) => path.display().to_string(),
            Self::Synthetic(synthetic) => format!(
                "synthetic {} nodes / {} edges (seed {})",
                synthetic.nodes, synthetic.edges, synthetic.seed
            ),
        }
    }
}

pub struct GraphLensApp {
    source: GraphSource,
    settings: EngineSettings,
    state: AppState,
}

enum AppState {
    Loading {
        rx: Receiver<Result<GraphSnapshot, String>>,
    },
    Ready(Box<ViewModel>),
    Error(String),
}

/// Physics parameters exposed as sliders.
#[derive(Clone, Copy, Debug)]
struct PhysicsSliders {
    charge: f32,
    link_distance: f32,
    link_strength: f32,
    center_strength: f32,
    collide_radius: f32,
    velocity_decay: f32,
}

impl From<SimulationConfig> for PhysicsSliders {
    fn from(config: SimulationConfig) -> Self {
        Self {
            charge: config.charge,
            link_distance: config.link_distance,
            link_strength: config.link_strength,
            center_strength: config.center_strength,
            collide_radius: config.collide_radius,
            velocity_decay: config.velocity_decay,
        }
    }
}

/// A node held by the primary pointer button.
struct DragState {
    id: String,
    was_pinned: bool,
}

struct ViewModel {
    engine: GraphEngine,
    simulation: SimulationHandle,
    physics: PhysicsSliders,
    show_quadtree_overlay: bool,
    search: String,
    drag: Option<DragState>,
    fps: FpsCounter,
    fit_pending: bool,
    /// Last failed command sent to the worker.
    command_error: Option<String>,
}

impl GraphLensApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, source: GraphSource, settings: EngineSettings) -> Self {
        let state = Self::start_load(source.clone());
        Self {
            source,
            settings,
            state,
        }
    }

    fn spawn_load(source: GraphSource) -> Receiver<Result<GraphSnapshot, String>> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = source.load().map_err(|error| format!("{error:#}"));
            let _ = tx.send(result);
        });

        rx
    }

    fn start_load(source: GraphSource) -> AppState {
        AppState::Loading {
            rx: Self::spawn_load(source),
        }
    }
}

impl eframe::App for GraphLensApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                if let Ok(result) = rx.try_recv() {
                    transition = Some(match result.and_then(|snapshot| {
                        ViewModel::new(&snapshot, &self.settings).map_err(|error| format!("{error:#}"))
                    }) {
                        Ok(model) => AppState::Ready(Box::new(model)),
                        Err(error) => {
                            tracing::error!(%error, "failed to open graph");
                            AppState::Error(error)
                        }
                    });
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading(format!("Loading {}...", self.source.describe()));
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
                ctx.request_repaint_after(IDLE_REPAINT);
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to open graph");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start_load(self.source.clone()));
                    }
                });
            }
            AppState::Ready(model) => {
                let mut reload_requested = false;
                model.show(ctx, &self.source, &mut reload_requested);
                if reload_requested {
                    transition = Some(Self::start_load(self.source.clone()));
                }
            }
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
    }
}

impl ViewModel {
    fn new(snapshot: &GraphSnapshot, settings: &EngineSettings) -> Result<Self> {
        let config = settings
            .simulation_config()
            .context("invalid simulation settings")?;
        let mut engine = GraphEngine::new(settings).context("invalid engine settings")?;
        engine.load(snapshot);

        let mut simulation = SimulationHandle::spawn(settings.worker_options())
            .context("failed to start the simulation worker")?;
        engine
            .start_simulation(&mut simulation)
            .context("failed to start the simulation")?;

        Ok(Self {
            engine,
            simulation,
            physics: PhysicsSliders::from(config),
            show_quadtree_overlay: false,
            search: String::new(),
            drag: None,
            fps: FpsCounter::default(),
            fit_pending: true,
            command_error: None,
        })
    }

    fn show(&mut self, ctx: &Context, source: &GraphSource, reload_requested: &mut bool) {
        self.fps.update(ctx);
        self.engine.pump(&mut self.simulation);

        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| self.draw_top_bar(ui, source, reload_requested));

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| self.draw_controls(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| self.draw_canvas(ui));

        let running = self
            .engine
            .simulation_state()
            .is_some_and(|state| state.is_running);
        if running || self.drag.is_some() {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(IDLE_REPAINT);
        }
    }

    /// Records a failed worker command; successes clear the last error.
    fn report<T>(&mut self, result: Result<T, SimulationError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.command_error = None;
                Some(value)
            }
            Err(error) => {
                tracing::warn!(%error, "simulation command failed");
                self.command_error = Some(error.to_string());
                None
            }
        }
    }

    fn restart_simulation(&mut self) {
        let result = self.engine.start_simulation(&mut self.simulation);
        self.report(result);
    }
}
