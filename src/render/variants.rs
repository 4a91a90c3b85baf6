//! Pre-generated node appearances.
//!
//! Every combination of size bucket, palette slot and interaction state is
//! built once at start-up. Per-frame rendering only looks variants up; it
//! never derives colours or tessellates circles.

use std::sync::Arc;

use eframe::egui::{Color32, Vec2, vec2};

use super::style::{HOVERED, PATH_HIGHLIGHT, PLAYING, SELECTED, blend_color, dim_color};
use crate::model::NodeFlags;

/// Upper screen-radius bound, in pixels, of each size bucket.
pub const SIZE_BUCKETS: [f32; 8] = [2.0, 4.0, 7.0, 11.0, 16.0, 24.0, 36.0, f32::INFINITY];

/// Segment count of the unit ring per size bucket.
const RING_SEGMENTS: [usize; 8] = [4, 6, 10, 14, 18, 24, 32, 40];

pub const PALETTE: [Color32; 8] = [
    Color32::from_rgb(55, 150, 215),
    Color32::from_rgb(232, 116, 86),
    Color32::from_rgb(120, 196, 122),
    Color32::from_rgb(184, 132, 222),
    Color32::from_rgb(236, 188, 78),
    Color32::from_rgb(94, 200, 196),
    Color32::from_rgb(218, 108, 160),
    Color32::from_rgb(160, 160, 170),
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NodeState {
    #[default]
    Normal,
    Hovered,
    Selected,
    Playing,
    OnPath,
    /// Something else is selected and this node is unrelated.
    Dimmed,
}

impl NodeState {
    pub const ALL: [NodeState; 6] = [
        NodeState::Normal,
        NodeState::Hovered,
        NodeState::Selected,
        NodeState::Playing,
        NodeState::OnPath,
        NodeState::Dimmed,
    ];

    /// Out-of-range values clamp to the last state.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Selection wins over playback, playback over path, path over hover.
    pub fn from_flags(flags: NodeFlags, dim_unrelated: bool) -> Self {
        if flags.selected {
            Self::Selected
        } else if flags.playing {
            Self::Playing
        } else if flags.on_path {
            Self::OnPath
        } else if flags.hovered {
            Self::Hovered
        } else if dim_unrelated {
            Self::Dimmed
        } else {
            Self::Normal
        }
    }

    fn has_glow(self) -> bool {
        matches!(self, Self::Selected | Self::Playing | Self::OnPath | Self::Hovered)
    }
}

#[derive(Clone, Debug)]
pub struct NodeVariant {
    pub fill: Color32,
    pub stroke: Color32,
    /// Outline width in pixels; zero draws no outline.
    pub stroke_width: f32,
    pub glow: Option<Color32>,
    /// Unit-circle points, shared by every variant of the same bucket.
    pub ring: Arc<[Vec2]>,
}

#[derive(Clone, Debug)]
pub struct VariantAtlas {
    variants: Vec<NodeVariant>,
}

impl Default for VariantAtlas {
    fn default() -> Self {
        Self::generate()
    }
}

impl VariantAtlas {
    pub const LEN: usize = SIZE_BUCKETS.len() * PALETTE.len() * NodeState::ALL.len();

    pub fn generate() -> Self {
        let rings = RING_SEGMENTS.map(unit_ring);
        let mut variants = Vec::with_capacity(Self::LEN);
        for (bucket, ring) in rings.iter().enumerate() {
            for &base in &PALETTE {
                for state in NodeState::ALL {
                    variants.push(make_variant(bucket, base, state, Arc::clone(ring)));
                }
            }
        }
        tracing::debug!(variants = variants.len(), "generated node variant atlas");
        Self { variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Bucket for an on-screen radius. Non-finite or negative radii land in
    /// the smallest bucket.
    pub fn size_bucket(screen_radius: f32) -> usize {
        if screen_radius.is_nan() || screen_radius <= 0.0 {
            return 0;
        }
        SIZE_BUCKETS
            .iter()
            .position(|&bound| screen_radius <= bound)
            .unwrap_or(SIZE_BUCKETS.len() - 1)
    }

    /// Variant for a bucket, palette slot and state; indices past the end
    /// clamp to the last valid one.
    pub fn lookup(&self, size_bucket: usize, color: usize, state: NodeState) -> &NodeVariant {
        let size_bucket = size_bucket.min(SIZE_BUCKETS.len() - 1);
        let color = color.min(PALETTE.len() - 1);
        let index = (size_bucket * PALETTE.len() + color) * NodeState::ALL.len() + state.index();
        &self.variants[index]
    }
}

fn unit_ring(segments: usize) -> Arc<[Vec2]> {
    (0..segments)
        .map(|segment| {
            let angle = segment as f32 / segments as f32 * std::f32::consts::TAU;
            vec2(angle.cos(), angle.sin())
        })
        .collect()
}

fn make_variant(bucket: usize, base: Color32, state: NodeState, ring: Arc<[Vec2]>) -> NodeVariant {
    let fill = match state {
        NodeState::Normal => base,
        NodeState::Hovered => blend_color(base, HOVERED, 0.7),
        NodeState::Selected => blend_color(base, SELECTED, 0.85),
        NodeState::Playing => blend_color(base, PLAYING, 0.65),
        NodeState::OnPath => blend_color(base, PATH_HIGHLIGHT, 0.72),
        NodeState::Dimmed => dim_color(base, 0.45),
    };
    let stroke_width = match (bucket, state) {
        (0 | 1, _) => 0.0,
        (_, NodeState::Selected | NodeState::OnPath) => 1.8,
        _ => 1.0,
    };
    NodeVariant {
        fill,
        stroke: Color32::from_rgba_unmultiplied(15, 15, 15, 190),
        stroke_width,
        glow: state
            .has_glow()
            .then(|| Color32::from_rgba_unmultiplied(fill.r(), fill.g(), fill.b(), 90)),
        ring,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atlas_has_every_combination() {
        let atlas = VariantAtlas::generate();
        assert_eq!(atlas.len(), VariantAtlas::LEN);
        assert_eq!(atlas.len(), 8 * 8 * 6);
    }

    #[test]
    fn lookups_clamp_out_of_range_inputs() {
        let atlas = VariantAtlas::generate();
        let last = atlas.lookup(SIZE_BUCKETS.len() - 1, PALETTE.len() - 1, NodeState::Normal);
        let clamped = atlas.lookup(99, 1_000, NodeState::Normal);
        assert_eq!(clamped.fill, last.fill);
        assert_eq!(clamped.ring.len(), last.ring.len());
        assert_eq!(NodeState::from_index(42), NodeState::Dimmed);
    }

    #[test]
    fn size_buckets_are_monotone() {
        assert_eq!(VariantAtlas::size_bucket(-1.0), 0);
        assert_eq!(VariantAtlas::size_bucket(f32::NAN), 0);
        assert_eq!(VariantAtlas::size_bucket(1.0), 0);
        assert_eq!(VariantAtlas::size_bucket(5.0), 2);
        assert_eq!(VariantAtlas::size_bucket(1e9), SIZE_BUCKETS.len() - 1);

        let atlas = VariantAtlas::generate();
        let mut previous = 0;
        for bucket in 0..SIZE_BUCKETS.len() {
            let segments = atlas.lookup(bucket, 0, NodeState::Normal).ring.len();
            assert!(segments >= previous);
            previous = segments;
        }
    }

    #[test]
    fn interaction_states_glow() {
        let atlas = VariantAtlas::generate();
        assert!(atlas.lookup(4, 0, NodeState::Selected).glow.is_some());
        assert!(atlas.lookup(4, 0, NodeState::Normal).glow.is_none());
        assert!(atlas.lookup(4, 0, NodeState::Dimmed).glow.is_none());
    }

    #[test]
    fn flags_map_to_states_by_priority() {
        let flags = NodeFlags {
            selected: true,
            hovered: true,
            ..NodeFlags::default()
        };
        assert_eq!(NodeState::from_flags(flags, true), NodeState::Selected);
        assert_eq!(NodeState::from_flags(NodeFlags::default(), true), NodeState::Dimmed);
        assert_eq!(NodeState::from_flags(NodeFlags::default(), false), NodeState::Normal);
    }
}
