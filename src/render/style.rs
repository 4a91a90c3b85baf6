use eframe::egui::Color32;

use crate::model::GraphEdge;

pub const BACKGROUND: Color32 = Color32::from_rgb(19, 23, 29);
pub const EDGE_BASE: Color32 = Color32::from_rgb(96, 104, 116);
pub const EDGE_HIGHLIGHT: Color32 = Color32::from_rgb(241, 146, 94);
pub const PATH_HIGHLIGHT: Color32 = Color32::from_rgb(246, 206, 104);
pub const SELECTED: Color32 = Color32::from_rgb(245, 206, 93);
pub const HOVERED: Color32 = Color32::from_rgb(255, 164, 101);
pub const PLAYING: Color32 = Color32::from_rgb(103, 196, 255);
pub const LABEL: Color32 = Color32::from_gray(238);

pub const MIN_EDGE_THICKNESS: f32 = 0.6;
pub const MAX_EDGE_THICKNESS: f32 = 3.2;

pub fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

pub fn with_opacity(color: Color32, opacity: f32) -> Color32 {
    let [r, g, b, a] = color.to_srgba_unmultiplied();
    Color32::from_rgba_unmultiplied(r, g, b, (a as f32 * opacity.clamp(0.0, 1.0)) as u8)
}

/// Position of `value` between `min` and `max` on a log scale, in `0..=1`.
pub fn normalize_log(value: f32, min: f32, max: f32) -> f32 {
    let min = min.max(f32::MIN_POSITIVE);
    let max = max.max(min);
    let value = value.clamp(min, max);

    let denominator = max.ln() - min.ln();
    if denominator.abs() < f32::EPSILON {
        return 0.5;
    }

    ((value.ln() - min.ln()) / denominator).clamp(0.0, 1.0)
}

/// Derives thickness, colour and opacity from edge weights. Heavier edges
/// are thicker and more opaque; non-positive or non-finite weights count as
/// the lightest edge.
pub fn derive_edge_visuals(edges: &mut [GraphEdge]) {
    let weights = || {
        edges
            .iter()
            .map(|edge| edge.weight)
            .filter(|weight| weight.is_finite() && *weight > 0.0)
    };
    let min = weights().fold(f32::INFINITY, f32::min);
    let max = weights().fold(f32::NEG_INFINITY, f32::max);
    let (min, max) = if min.is_finite() { (min, max) } else { (1.0, 1.0) };

    for edge in edges.iter_mut() {
        let weight = if edge.weight.is_finite() && edge.weight > 0.0 {
            edge.weight
        } else {
            min
        };
        let t = normalize_log(weight, min, max);
        edge.thickness = MIN_EDGE_THICKNESS + (MAX_EDGE_THICKNESS - MIN_EDGE_THICKNESS) * t;
        edge.opacity = 0.45 + 0.45 * t;
        edge.color = EDGE_BASE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(weight: f32) -> GraphEdge {
        GraphEdge {
            id: String::new(),
            source: 0,
            target: 1,
            weight,
            thickness: 0.0,
            color: Color32::BLACK,
            opacity: 0.0,
            control: None,
        }
    }

    #[test]
    fn heavier_edges_are_thicker_and_clamped() {
        let mut edges = vec![edge(1.0), edge(10.0), edge(100.0), edge(f32::NAN), edge(-3.0)];
        derive_edge_visuals(&mut edges);

        assert_eq!(edges[0].thickness, MIN_EDGE_THICKNESS);
        assert!(edges[1].thickness > edges[0].thickness);
        assert!((edges[2].thickness - MAX_EDGE_THICKNESS).abs() < 1e-5);
        assert_eq!(edges[3].thickness, MIN_EDGE_THICKNESS);
        assert_eq!(edges[4].thickness, MIN_EDGE_THICKNESS);
        assert!(edges.iter().all(|edge| (0.0..=1.0).contains(&edge.opacity)));
    }

    #[test]
    fn uniform_weights_use_the_midpoint() {
        let mut edges = vec![edge(2.0), edge(2.0)];
        derive_edge_visuals(&mut edges);
        let mid = MIN_EDGE_THICKNESS + (MAX_EDGE_THICKNESS - MIN_EDGE_THICKNESS) * 0.5;
        assert!((edges[0].thickness - mid).abs() < 1e-6);
    }

    #[test]
    fn blending_hits_both_ends() {
        assert_eq!(blend_color(Color32::BLACK, Color32::WHITE, 0.0), Color32::BLACK);
        assert_eq!(blend_color(Color32::BLACK, Color32::WHITE, 1.0), Color32::WHITE);
        assert_eq!(with_opacity(Color32::WHITE, 0.0).a(), 0);
    }
}
