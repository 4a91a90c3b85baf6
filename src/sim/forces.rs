use eframe::egui::{Pos2, Vec2, vec2};

use super::quadtree::BodyNode;

pub(super) const BARNES_HUT_THETA: f32 = 0.9;
const DISTANCE_MIN_SQ: f32 = 1.0;
const JIGGLE: f32 = 1e-3;

/// Link between two arena indices with its precomputed degree weighting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Link {
    pub(super) source: usize,
    pub(super) target: usize,
    /// `1 / min(degree(source), degree(target))`.
    pub(super) strength: f32,
    /// Share of the correction taken by the target.
    pub(super) bias: f32,
}

impl Link {
    pub(super) fn weighted(source: usize, target: usize, degrees: &[u32]) -> Self {
        let source_degree = degrees[source].max(1) as f32;
        let target_degree = degrees[target].max(1) as f32;
        Self {
            source,
            target,
            strength: 1.0 / source_degree.min(target_degree),
            bias: source_degree / (source_degree + target_degree),
        }
    }
}

/// Deterministic tiny offset for coincident bodies.
fn jiggle(a: usize, b: usize) -> Vec2 {
    let angle = ((a as f32) * 0.618_034 + (b as f32) * 0.414_214) * std::f32::consts::TAU;
    vec2(angle.cos(), angle.sin()) * JIGGLE
}

fn charge_impulse(delta: Vec2, weight: f32) -> Vec2 {
    let mut distance_sq = delta.length_sq();
    if distance_sq < DISTANCE_MIN_SQ {
        distance_sq = (DISTANCE_MIN_SQ * distance_sq).sqrt();
    }
    delta * (weight / distance_sq)
}

/// Adds the many-body impulse on `index` to `velocity`. `weight` is
/// `charge × alpha` per unit mass.
pub(super) fn accumulate_charge_for_node(
    node: &BodyNode,
    index: usize,
    positions: &[Pos2],
    weight: f32,
    theta: f32,
    velocity: &mut Vec2,
) {
    if node.mass <= 0.0 {
        return;
    }

    let point = positions[index];

    if node.is_leaf() {
        for &other in &node.indices {
            if other == index {
                continue;
            }
            let mut delta = positions[other] - point;
            if delta == Vec2::ZERO {
                delta = jiggle(index, other);
            }
            *velocity += charge_impulse(delta, weight);
        }
        return;
    }

    let delta = node.center_of_mass - point;
    let distance = delta.length();
    let can_approximate = !node.bounds.contains(point)
        && distance > 0.0
        && (node.bounds.side_length() / distance) < theta;

    if can_approximate {
        *velocity += charge_impulse(delta, weight * node.mass);
        return;
    }

    for child in node.children() {
        accumulate_charge_for_node(child, index, positions, weight, theta, velocity);
    }
}

pub(super) fn apply_charge(
    tree: &BodyNode,
    positions: &[Pos2],
    velocities: &mut [Vec2],
    charge: f32,
    alpha: f32,
) {
    let weight = charge * alpha;
    if weight == 0.0 {
        return;
    }
    for (index, velocity) in velocities.iter_mut().enumerate() {
        accumulate_charge_for_node(tree, index, positions, weight, BARNES_HUT_THETA, velocity);
    }
}

/// Spring toward `distance`, evaluated on positions predicted one step ahead.
pub(super) fn apply_links(
    links: &[Link],
    positions: &[Pos2],
    velocities: &mut [Vec2],
    distance: f32,
    strength: f32,
    alpha: f32,
) {
    if strength == 0.0 {
        return;
    }
    for link in links {
        let (source, target) = (link.source, link.target);
        let mut delta = (positions[target] + velocities[target])
            - (positions[source] + velocities[source]);
        if delta == Vec2::ZERO {
            delta = jiggle(source, target);
        }
        let length = delta.length();
        let correction = delta * ((length - distance) / length * alpha * strength * link.strength);
        velocities[target] -= correction * link.bias;
        velocities[source] += correction * (1.0 - link.bias);
    }
}

/// Shifts every position so the centroid moves toward the origin.
pub(super) fn apply_center(positions: &mut [Pos2], strength: f32) {
    if positions.is_empty() || strength == 0.0 {
        return;
    }
    let sum = positions
        .iter()
        .fold(Vec2::ZERO, |sum, position| sum + position.to_vec2());
    let shift = sum / positions.len() as f32 * strength;
    for position in positions {
        *position -= shift;
    }
}

/// Collects every pair whose cells are close enough for their largest bodies
/// to touch. Pairs come out as `(low, high)` index order.
pub(super) fn collect_collision_pairs(
    node_a: &BodyNode,
    node_b: &BodyNode,
    same_node: bool,
    pairs: &mut Vec<(usize, usize)>,
) {
    let reach = node_a.max_radius + node_b.max_radius;
    if node_a.bounds.distance_sq_to(node_b.bounds) > reach * reach {
        return;
    }

    if node_a.is_leaf() && node_b.is_leaf() {
        if same_node {
            for (offset, &from) in node_a.indices.iter().enumerate() {
                for &to in &node_a.indices[offset + 1..] {
                    pairs.push((from.min(to), from.max(to)));
                }
            }
        } else {
            for &from in &node_a.indices {
                for &to in &node_b.indices {
                    pairs.push((from.min(to), from.max(to)));
                }
            }
        }
        return;
    }

    if same_node {
        for first in 0..4 {
            let Some(child_a) = node_a.children[first].as_deref() else {
                continue;
            };
            collect_collision_pairs(child_a, child_a, true, pairs);
            for second in (first + 1)..4 {
                let Some(child_b) = node_a.children[second].as_deref() else {
                    continue;
                };
                collect_collision_pairs(child_a, child_b, false, pairs);
            }
        }
        return;
    }

    let split_a = if node_a.is_leaf() {
        false
    } else if node_b.is_leaf() {
        true
    } else {
        node_a.bounds.half_extent >= node_b.bounds.half_extent
    };

    if split_a {
        for child in node_a.children() {
            collect_collision_pairs(child, node_b, false, pairs);
        }
    } else {
        for child in node_b.children() {
            collect_collision_pairs(node_a, child, false, pairs);
        }
    }
}

/// Pushes overlapping bodies apart through their velocities. Overlap is
/// measured on predicted positions and split by squared radius.
pub(super) fn apply_collisions(positions: &[Pos2], velocities: &mut [Vec2], radii: &[f32]) {
    let predicted = positions
        .iter()
        .zip(velocities.iter())
        .map(|(&position, &velocity)| position + velocity)
        .collect::<Vec<_>>();
    let Some(tree) = BodyNode::build(&predicted, radii) else {
        return;
    };
    if tree.max_radius <= 0.0 {
        return;
    }

    let mut pairs = Vec::new();
    collect_collision_pairs(&tree, &tree, true, &mut pairs);
    pairs.sort_unstable();
    pairs.dedup();

    for (a, b) in pairs {
        let (radius_a, radius_b) = (radii[a], radii[b]);
        let reach = radius_a + radius_b;
        let mut delta = (positions[a] + velocities[a]) - (positions[b] + velocities[b]);
        let mut distance_sq = delta.length_sq();
        if distance_sq >= reach * reach {
            continue;
        }
        if distance_sq == 0.0 {
            delta = jiggle(a, b);
            distance_sq = delta.length_sq();
        }
        let distance = distance_sq.sqrt();
        let push = delta * ((reach - distance) / distance);
        let share = (radius_b * radius_b) / (radius_a * radius_a + radius_b * radius_b);
        velocities[a] += push * share;
        velocities[b] -= push * (1.0 - share);
    }
}
