use eframe::egui::{Pos2, Vec2};

use crate::spatial::QuadBounds;

const LEAF_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 16;

/// Barnes–Hut tree rebuilt from scratch every tick. Inner nodes carry the
/// aggregate mass and centre of mass of their subtree, plus the largest body
/// radius below them for collision pruning.
pub(super) struct BodyNode {
    pub(super) bounds: QuadBounds,
    pub(super) center_of_mass: Pos2,
    pub(super) mass: f32,
    pub(super) max_radius: f32,
    pub(super) indices: Vec<usize>,
    pub(super) children: [Option<Box<BodyNode>>; 4],
}

impl BodyNode {
    pub(super) fn build(positions: &[Pos2], radii: &[f32]) -> Option<Self> {
        let bounds = QuadBounds::from_points(positions)?;
        let indices = (0..positions.len()).collect::<Vec<_>>();
        Some(Self::build_node(bounds, indices, positions, radii, 0))
    }

    fn build_node(
        bounds: QuadBounds,
        indices: Vec<usize>,
        positions: &[Pos2],
        radii: &[f32],
        depth: usize,
    ) -> Self {
        let mut sum = Vec2::ZERO;
        let mut max_radius = 0.0_f32;
        for &index in &indices {
            sum += positions[index].to_vec2();
            max_radius = max_radius.max(radii.get(index).copied().unwrap_or(0.0));
        }

        let mass = indices.len() as f32;
        let center_of_mass = if mass > 0.0 {
            (sum / mass).to_pos2()
        } else {
            bounds.center
        };

        let mut node = Self {
            bounds,
            center_of_mass,
            mass,
            max_radius,
            indices,
            children: std::array::from_fn(|_| None),
        };

        if depth >= MAX_DEPTH || node.indices.len() <= LEAF_CAPACITY {
            return node;
        }

        let mut buckets = std::array::from_fn::<_, 4, _>(|_| Vec::new());
        for &index in &node.indices {
            buckets[bounds.quadrant_for(positions[index])].push(index);
        }

        if buckets.iter().filter(|bucket| !bucket.is_empty()).count() <= 1 {
            // All bodies share a quadrant; descend without splitting the rest.
            let quadrant = bounds.quadrant_for(positions[node.indices[0]]);
            let child = Self::build_node(
                bounds.child(quadrant),
                std::mem::take(&mut node.indices),
                positions,
                radii,
                depth + 1,
            );
            node.children[quadrant] = Some(Box::new(child));
            return node;
        }

        for (quadrant, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            node.children[quadrant] = Some(Box::new(Self::build_node(
                bounds.child(quadrant),
                bucket,
                positions,
                radii,
                depth + 1,
            )));
        }
        node.indices.clear();
        node
    }

    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(|child| child.is_none())
    }

    pub(super) fn children(&self) -> impl Iterator<Item = &BodyNode> {
        self.children.iter().filter_map(|child| child.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::pos2;

    use super::*;

    fn count_bodies(node: &BodyNode) -> usize {
        node.indices.len() + node.children().map(count_bodies).sum::<usize>()
    }

    #[test]
    fn aggregates_mass_and_radius() {
        let positions = (0..40)
            .map(|index| pos2((index % 8) as f32 * 5.0, (index / 8) as f32 * 5.0))
            .collect::<Vec<_>>();
        let radii = (0..40).map(|index| index as f32 * 0.1).collect::<Vec<_>>();
        let tree = BodyNode::build(&positions, &radii).expect("finite positions");

        assert_eq!(tree.mass, 40.0);
        assert_eq!(count_bodies(&tree), 40);
        assert!((tree.max_radius - 3.9).abs() < 1e-5);
        assert!(!tree.is_leaf());
        assert!((tree.center_of_mass.x - 17.5).abs() < 1e-4);
        assert!((tree.center_of_mass.y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn coincident_bodies_terminate() {
        let positions = vec![pos2(3.0, 3.0); 50];
        let radii = vec![1.0; 50];
        let tree = BodyNode::build(&positions, &radii).expect("finite positions");
        assert_eq!(count_bodies(&tree), 50);
    }
}
