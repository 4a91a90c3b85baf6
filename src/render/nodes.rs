use eframe::egui::{Color32, Mesh, vec2};

use super::style::LABEL;
use super::variants::{NodeState, VariantAtlas};
use super::{Label, Projection, RenderSettings, push_band, push_fan};
use crate::lod::{LodLevel, LodMap};
use crate::model::GraphNode;

/// Meshes for one frame of nodes.
#[derive(Debug, Default)]
pub struct NodeBatches {
    pub glows: Mesh,
    pub bodies: Mesh,
    pub labels: Vec<Label>,
}

#[derive(Debug, Default)]
pub struct NodeRenderer {
    settings: RenderSettings,
}

impl NodeRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    /// Tessellates every visible node into the shared batches. Emphasized
    /// nodes are appended last so they sit above their neighbours.
    pub fn build(
        &self,
        atlas: &VariantAtlas,
        projection: &Projection,
        nodes: &[GraphNode],
        visible: &[usize],
        lod: &LodMap,
        dim_unrelated: bool,
    ) -> NodeBatches {
        let mut batches = NodeBatches::default();
        let mut emphasized = Vec::new();

        for &index in visible {
            let Some(node) = nodes.get(index) else {
                continue;
            };
            if node.flags.is_emphasized() {
                emphasized.push(index);
                continue;
            }
            self.push_node(atlas, projection, node, lod.get(index), dim_unrelated, &mut batches);
        }
        for index in emphasized {
            self.push_node(
                atlas,
                projection,
                &nodes[index],
                lod.get(index),
                dim_unrelated,
                &mut batches,
            );
        }

        batches
    }

    fn push_node(
        &self,
        atlas: &VariantAtlas,
        projection: &Projection,
        node: &GraphNode,
        level: Option<LodLevel>,
        dim_unrelated: bool,
        batches: &mut NodeBatches,
    ) {
        let Some(level) = level.filter(|level| level.is_rendered()) else {
            return;
        };

        let center = projection.to_screen(node.position);
        let radius = (node.radius * projection.zoom())
            .clamp(self.settings.min_node_px, self.settings.max_node_px);
        let state = NodeState::from_flags(node.flags, dim_unrelated);
        let bucket = match level {
            LodLevel::Full => VariantAtlas::size_bucket(radius),
            LodLevel::Reduced => VariantAtlas::size_bucket(radius).saturating_sub(2),
            LodLevel::Minimal | LodLevel::Hidden => 0,
        };
        let variant = atlas.lookup(bucket, usize::from(node.group), state);

        if level == LodLevel::Full && variant.stroke_width > 0.0 {
            push_fan(
                &mut batches.bodies,
                center,
                radius + variant.stroke_width,
                &variant.ring,
                variant.stroke,
            );
        }
        push_fan(&mut batches.bodies, center, radius, &variant.ring, variant.fill);

        if level != LodLevel::Full {
            return;
        }

        if let Some(glow) = variant.glow {
            push_band(
                &mut batches.glows,
                center,
                (radius, glow),
                (radius * self.settings.glow_scale, Color32::TRANSPARENT),
                &variant.ring,
            );
        }

        if node.flags.is_emphasized() || radius >= self.settings.label_min_px {
            batches.labels.push(Label {
                text: node.id.to_string(),
                position: center + vec2(radius + 5.0, 0.0),
                color: LABEL,
                size: self.settings.label_size,
            });
        }
    }
}
