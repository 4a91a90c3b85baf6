use eframe::egui::{
    self, Color32, Key, Painter, PointerButton, Pos2, Rect, Sense, Stroke, Ui, Vec2, pos2,
};
use graphlens::engine::Camera;
use graphlens::render::style::BACKGROUND;

use super::{DragState, ViewModel};

const GRID_STEP: f32 = 56.0;
const OVERLAY_COLOR: (u8, u8, u8) = (106, 198, 255);

fn draw_background(painter: &Painter, rect: Rect, camera: &Camera) {
    painter.rect_filled(rect, 0.0, BACKGROUND);

    let step = (GRID_STEP * camera.zoom().clamp(0.6, 1.8)).max(20.0);
    let origin = rect.min + camera.world_to_screen(Pos2::ZERO).to_vec2();
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 80, 70));

    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.line_segment([pos2(x, rect.top()), pos2(x, rect.bottom())], stroke);
        x += step;
    }

    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment([pos2(rect.left(), y), pos2(rect.right(), y)], stroke);
        y += step;
    }
}

impl ViewModel {
    pub(super) fn draw_canvas(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        self.engine.set_screen_rect(rect);
        if self.fit_pending {
            self.engine.fit_to_content();
            self.fit_pending = false;
        }

        let painter = ui.painter_at(rect);
        draw_background(&painter, rect, self.engine.camera());

        self.handle_zoom(ui, rect, &response);
        self.handle_pan(&response);
        self.handle_pointer(ui, rect, &response);
        self.handle_keys(ui, &response);

        let Some(ticket) = self.engine.begin_frame() else {
            return;
        };
        let draw_list = self.engine.render_frame(&ticket);
        draw_list.paint(&painter);
        drop(ticket);

        if self.show_quadtree_overlay {
            self.draw_quadtree_overlay(&painter, rect);
        }
    }

    fn handle_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.engine.zoom_at(pointer - rect.min.to_vec2(), zoom_factor);
    }

    fn handle_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(PointerButton::Secondary)
            || response.dragged_by(PointerButton::Middle)
        {
            self.engine.pan_by(response.drag_delta());
        }
    }

    /// Hover, click-to-select and dragging nodes with the primary button.
    fn handle_pointer(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        let to_canvas = |screen: Pos2| screen - rect.min.to_vec2();

        let hovered = response
            .hover_pos()
            .and_then(|pointer| self.engine.node_at(to_canvas(pointer)))
            .map(str::to_owned);
        if hovered.is_some() || self.drag.is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
        self.engine.hover(hovered.as_deref());

        if response.drag_started_by(PointerButton::Primary) {
            let origin = ui.input(|input| input.pointer.press_origin());
            let grabbed = origin
                .and_then(|origin| self.engine.node_at(to_canvas(origin)))
                .map(str::to_owned);
            if let Some(id) = grabbed {
                self.engine.select(Some(&id));
                self.drag = Some(DragState {
                    was_pinned: self.engine.is_pinned(&id),
                    id,
                });
            }
        }

        let dragging = response.dragged_by(PointerButton::Primary);
        match self.drag.as_ref().map(|drag| drag.id.clone()) {
            Some(id) if dragging => {
                if let Some(pointer) = response.interact_pointer_pos() {
                    let world = self.engine.camera().screen_to_world(to_canvas(pointer));
                    let result = self.engine.drag_node(&mut self.simulation, &id, world);
                    self.report(result);
                }
            }
            Some(id) => {
                let was_pinned = self.drag.take().is_some_and(|drag| drag.was_pinned);
                if !was_pinned {
                    let result = self.engine.unpin(&mut self.simulation, &id);
                    self.report(result);
                }
            }
            None => {}
        }

        if response.clicked_by(PointerButton::Primary) {
            self.engine.select(hovered.as_deref());
        }
    }

    /// `P` pins or releases the selected node.
    fn handle_keys(&mut self, ui: &Ui, response: &egui::Response) {
        if !response.hovered() || ui.ctx().wants_keyboard_input() {
            return;
        }
        if !ui.input(|input| input.key_pressed(Key::P)) {
            return;
        }
        self.toggle_pin_selected();
    }

    pub(super) fn toggle_pin_selected(&mut self) {
        let Some(id) = self.engine.selected().map(str::to_owned) else {
            return;
        };
        let result = if self.engine.is_pinned(&id) {
            self.engine.unpin(&mut self.simulation, &id)
        } else {
            self.engine.pin(&mut self.simulation, &id, None)
        };
        self.report(result);
    }

    fn draw_quadtree_overlay(&self, painter: &Painter, rect: Rect) {
        let camera = self.engine.camera();
        let offset = rect.min.to_vec2();
        let (red, green, blue) = OVERLAY_COLOR;

        for cell in self.engine.index().cells() {
            let half = Vec2::splat(cell.half_extent);
            let min = cell.center - half;
            let max = cell.center + half;
            let corners = [
                pos2(min.x, min.y),
                pos2(max.x, min.y),
                pos2(max.x, max.y),
                pos2(min.x, max.y),
            ]
            .map(|corner| camera.world_to_screen(corner) + offset);

            let screen_bounds = Rect::from_min_max(corners[0], corners[2]);
            if !screen_bounds.intersects(rect) {
                continue;
            }

            let alpha = if cell.is_leaf { 110 } else { 55 };
            let line_width = (1.4_f32 - (cell.depth as f32 * 0.09)).clamp(0.45, 1.4);
            let stroke = Stroke::new(
                line_width,
                Color32::from_rgba_unmultiplied(red, green, blue, alpha),
            );

            for side in 0..4 {
                painter.line_segment([corners[side], corners[(side + 1) % 4]], stroke);
            }
        }
    }
}
