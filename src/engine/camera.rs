use eframe::egui::{Pos2, Rect, Vec2, pos2, vec2};

use crate::model::Viewport;

pub const MIN_ZOOM: f32 = 0.02;
pub const MAX_ZOOM: f32 = 8.0;
/// Zoom used by [`Camera::zoom_to`] when the camera is further out.
pub const FOCUS_ZOOM: f32 = 1.6;

/// Pan/zoom state. Screen coordinates are relative to the canvas origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// World point at the centre of the canvas.
    center: Pos2,
    zoom: f32,
    screen_size: Vec2,
    origin: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            center: Pos2::ZERO,
            zoom: 1.0,
            screen_size: vec2(1280.0, 720.0),
            origin: Vec2::ZERO,
        }
    }
}

impl Camera {
    pub fn center(&self) -> Pos2 {
        self.center
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn screen_size(&self) -> Vec2 {
        self.screen_size
    }

    /// Absolute screen position of the canvas's top-left corner.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn set_screen_size(&mut self, size: Vec2) {
        if size.x.is_finite() && size.y.is_finite() {
            self.screen_size = size.max(Vec2::splat(1.0));
        }
    }

    pub fn set_screen_rect(&mut self, rect: Rect) {
        self.set_screen_size(rect.size());
        self.origin = rect.min.to_vec2();
    }

    pub fn viewport(&self, world_bounds: Rect) -> Viewport {
        Viewport::centered(self.center, self.screen_size, self.zoom, world_bounds)
    }

    pub fn screen_to_world(&self, screen: Pos2) -> Pos2 {
        self.center + (screen - self.screen_center()) / self.zoom
    }

    pub fn world_to_screen(&self, world: Pos2) -> Pos2 {
        self.screen_center() + (world - self.center) * self.zoom
    }

    fn screen_center(&self) -> Pos2 {
        pos2(self.screen_size.x * 0.5, self.screen_size.y * 0.5)
    }

    /// Moves the view by a screen-space drag delta.
    pub fn pan_by(&mut self, delta: Vec2) {
        if delta.is_finite() {
            self.center -= delta / self.zoom;
        }
    }

    /// Multiplies the zoom by `factor`, keeping the world point under
    /// `anchor` fixed on screen.
    pub fn zoom_at(&mut self, anchor: Pos2, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 || !anchor.is_finite() {
            return;
        }
        let world_before = self.screen_to_world(anchor);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.center = world_before - (anchor - self.screen_center()) / self.zoom;
    }

    /// Fits `bounds` inside the canvas with `margin_px` to spare on each side.
    pub fn fit(&mut self, bounds: Rect, margin_px: f32) {
        if !bounds.is_finite() || bounds.is_negative() {
            return;
        }
        let available = (self.screen_size - Vec2::splat(margin_px * 2.0)).max(Vec2::splat(1.0));
        let size = bounds.size().max(Vec2::splat(1.0));
        self.zoom = (available.x / size.x)
            .min(available.y / size.y)
            .clamp(MIN_ZOOM, MAX_ZOOM);
        self.center = bounds.center();
    }

    pub fn reset(&mut self) {
        self.center = Pos2::ZERO;
        self.zoom = 1.0;
    }

    /// Centres on `world` and zooms in to at least [`FOCUS_ZOOM`].
    pub fn zoom_to(&mut self, world: Pos2) {
        if world.is_finite() {
            self.center = world;
            self.zoom = self.zoom.max(FOCUS_ZOOM);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Pos2, b: Pos2) -> bool {
        (a - b).length() < 1e-3
    }

    #[test]
    fn zoom_keeps_the_anchor_fixed() {
        let mut camera = Camera::default();
        camera.pan_by(vec2(-120.0, 40.0));
        let anchor = pos2(200.0, 150.0);
        let world = camera.screen_to_world(anchor);

        camera.zoom_at(anchor, 2.5);
        assert_eq!(camera.zoom(), 2.5);
        assert!(close(camera.world_to_screen(world), anchor));

        camera.zoom_at(anchor, 1e6);
        assert_eq!(camera.zoom(), MAX_ZOOM);
        assert!(close(camera.world_to_screen(world), anchor));
    }

    #[test]
    fn viewport_matches_camera_projection() {
        let mut camera = Camera::default();
        camera.zoom_at(pos2(10.0, 10.0), 0.5);
        let viewport = camera.viewport(Rect::EVERYTHING);
        let world = pos2(33.0, -71.0);
        assert!(close(viewport.world_to_screen(world), camera.world_to_screen(world)));
    }

    #[test]
    fn fit_frames_the_content() {
        let mut camera = Camera::default();
        camera.set_screen_size(vec2(1000.0, 500.0));
        let bounds = Rect::from_min_max(pos2(-200.0, -100.0), pos2(1800.0, 300.0));
        camera.fit(bounds, 0.0);

        assert_eq!(camera.zoom(), 0.5);
        let viewport = camera.viewport(bounds);
        assert!(viewport.rect().contains_rect(bounds));
    }

    #[test]
    fn reset_and_focus() {
        let mut camera = Camera::default();
        camera.zoom_to(pos2(50.0, 60.0));
        assert_eq!(camera.center(), pos2(50.0, 60.0));
        assert_eq!(camera.zoom(), FOCUS_ZOOM);
        camera.reset();
        assert_eq!(camera.center(), Pos2::ZERO);
        assert_eq!(camera.zoom(), 1.0);
    }
}
