//! Quadtree spatial index over node positions.
//!
//! The index has one writer (the engine, when it commits a position batch) and
//! any number of readers within a frame. Every query is a pure function of the
//! current contents: results are exact (no false positives or negatives) and
//! ordered deterministically, with ties broken by key.

mod quadtree;

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

use eframe::egui::{Pos2, Rect};

pub(crate) use quadtree::QuadBounds;
use quadtree::Quadtree;

/// Bound growth applied when a point lands outside the root cell, so a slowly
/// expanding layout does not rebuild on every tick.
const REBUILD_GROWTH: f32 = 1.5;

/// One cell of the tree, for debug overlays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadtreeCell {
    pub center: Pos2,
    pub half_extent: f32,
    pub depth: u8,
    pub is_leaf: bool,
}

#[derive(Clone, Debug)]
pub struct SpatialIndex<K> {
    keys: Vec<K>,
    positions: Vec<Pos2>,
    leaf_of: Vec<usize>,
    slot_by_key: HashMap<K, usize>,
    tree: Option<Quadtree>,
    revision: u64,
}

impl<K> Default for SpatialIndex<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            positions: Vec::new(),
            leaf_of: Vec::new(),
            slot_by_key: HashMap::new(),
            tree: None,
            revision: 0,
        }
    }
}

impl<K: Clone + Ord + Hash> SpatialIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole index. Entries with non-finite positions are skipped;
    /// a repeated key keeps its last position.
    pub fn build(&mut self, entries: impl IntoIterator<Item = (K, Pos2)>) {
        self.keys.clear();
        self.positions.clear();
        self.slot_by_key.clear();

        for (key, position) in entries {
            if !position.x.is_finite() || !position.y.is_finite() {
                tracing::warn!("skipping spatial entry with a non-finite position");
                continue;
            }
            match self.slot_by_key.get(&key) {
                Some(&slot) => self.positions[slot] = position,
                None => {
                    self.slot_by_key.insert(key.clone(), self.keys.len());
                    self.keys.push(key);
                    self.positions.push(position);
                }
            }
        }

        self.rebuild_tree(None);
    }

    fn rebuild_tree(&mut self, growth: Option<f32>) {
        self.revision = self.revision.wrapping_add(1);
        self.leaf_of.clear();
        self.leaf_of.resize(self.positions.len(), 0);

        let Some(mut bounds) = QuadBounds::from_points(&self.positions) else {
            self.tree = None;
            return;
        };
        if let Some(factor) = growth {
            bounds = bounds.grown(factor);
        }

        let mut tree = Quadtree::new(bounds);
        for slot in 0..self.positions.len() {
            tree.insert(slot, &self.positions, &mut self.leaf_of);
        }
        tracing::debug!(
            entries = self.positions.len(),
            cells = tree.cells.len(),
            "rebuilt spatial index"
        );
        self.tree = Some(tree);
    }

    /// Moves one entry. Unknown keys and non-finite positions are ignored.
    pub fn update_node(&mut self, key: &K, position: Pos2) -> bool {
        let Some(&slot) = self.slot_by_key.get(key) else {
            return false;
        };
        if !position.x.is_finite() || !position.y.is_finite() {
            return false;
        }

        self.revision = self.revision.wrapping_add(1);
        if self.positions[slot] == position {
            return true;
        }
        self.positions[slot] = position;

        let in_bounds = self
            .tree
            .as_ref()
            .is_some_and(|tree| tree.bounds().contains(position));
        if !in_bounds {
            self.rebuild_tree(Some(REBUILD_GROWTH));
            return true;
        }

        let mut overgrown = false;
        if let Some(tree) = self.tree.as_mut() {
            tree.remove(self.leaf_of[slot], slot);
            tree.insert(slot, &self.positions, &mut self.leaf_of);
            overgrown = tree.cells.len() > (self.positions.len() * 4).max(256);
        }
        if overgrown {
            self.rebuild_tree(None);
        }
        true
    }

    /// Applies a batch of moves in order and returns how many keys matched.
    pub fn update_nodes<'a>(&mut self, batch: impl IntoIterator<Item = (&'a K, Pos2)>) -> usize
    where
        K: 'a,
    {
        let mut applied = 0;
        for (key, position) in batch {
            if self.update_node(key, position) {
                applied += 1;
            }
        }
        applied
    }

    /// Inserts or moves one entry.
    pub fn insert(&mut self, key: K, position: Pos2) {
        if self.slot_by_key.contains_key(&key) {
            self.update_node(&key, position);
            return;
        }
        if !position.x.is_finite() || !position.y.is_finite() {
            return;
        }

        let slot = self.keys.len();
        self.slot_by_key.insert(key.clone(), slot);
        self.keys.push(key);
        self.positions.push(position);
        self.leaf_of.push(0);

        let in_bounds = self
            .tree
            .as_ref()
            .is_some_and(|tree| tree.bounds().contains(position));
        if in_bounds {
            self.revision = self.revision.wrapping_add(1);
            if let Some(tree) = self.tree.as_mut() {
                tree.insert(slot, &self.positions, &mut self.leaf_of);
            }
        } else {
            self.rebuild_tree(Some(REBUILD_GROWTH));
        }
    }

    pub fn remove(&mut self, key: &K) -> bool {
        let Some(slot) = self.slot_by_key.remove(key) else {
            return false;
        };
        self.revision = self.revision.wrapping_add(1);

        let last = self.keys.len() - 1;
        if let Some(tree) = self.tree.as_mut() {
            tree.remove(self.leaf_of[slot], slot);
            if slot != last {
                tree.relabel(self.leaf_of[last], last, slot);
            }
        }

        self.keys.swap_remove(slot);
        self.positions.swap_remove(slot);
        self.leaf_of.swap_remove(slot);
        if slot != last {
            self.slot_by_key.insert(self.keys[slot].clone(), slot);
        }
        if self.keys.is_empty() {
            self.tree = None;
        }
        true
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.positions.clear();
        self.leaf_of.clear();
        self.slot_by_key.clear();
        self.tree = None;
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Bumped on every mutation; caches key on it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn position(&self, key: &K) -> Option<Pos2> {
        self.slot_by_key.get(key).map(|&slot| self.positions[slot])
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.tree.as_ref().map(|tree| tree.bounds().rect())
    }

    /// Keys within `radius` of `point` (inclusive), nearest first.
    pub fn query_point(&self, point: Pos2, radius: f32) -> Vec<K> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        if !radius.is_finite() || radius < 0.0 {
            return Vec::new();
        }

        let radius_sq = radius * radius;
        let mut hits = Vec::new();
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let cell = &tree.cells[index];
            if cell.bounds.distance_sq_to_point(point) > radius_sq {
                continue;
            }
            match cell.children {
                Some(children) => stack.extend(children),
                None => {
                    for &slot in &cell.items {
                        let distance_sq = (self.positions[slot] - point).length_sq();
                        if distance_sq <= radius_sq {
                            hits.push((distance_sq, slot));
                        }
                    }
                }
            }
        }

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| self.keys[a.1].cmp(&self.keys[b.1])));
        hits.into_iter()
            .map(|(_, slot)| self.keys[slot].clone())
            .collect()
    }

    /// Keys whose position lies inside `rect` (edges inclusive), ordered by key.
    pub fn query_rectangle(&self, rect: Rect) -> Vec<K> {
        let mut keys = self
            .rectangle_slots(rect)
            .into_iter()
            .map(|slot| self.keys[slot].clone())
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    fn rectangle_slots(&self, rect: Rect) -> Vec<usize> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        if rect.min.x > rect.max.x || rect.min.y > rect.max.y {
            return Vec::new();
        }

        let mut slots = Vec::new();
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let cell = &tree.cells[index];
            if !cell.bounds.intersects(rect) {
                continue;
            }
            match cell.children {
                Some(children) => stack.extend(children),
                None => slots.extend(
                    cell.items
                        .iter()
                        .copied()
                        .filter(|&slot| rect.contains(self.positions[slot])),
                ),
            }
        }
        slots
    }

    /// The `k` entries closest to `point`, nearest first, ties by key.
    pub fn query_k_nearest(&self, point: Pos2, k: usize) -> Vec<K> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        if k == 0 || !point.x.is_finite() || !point.y.is_finite() {
            return Vec::new();
        }

        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse(CellDistance {
            distance_sq: tree.cells[0].bounds.distance_sq_to_point(point),
            cell: 0,
        }));
        let mut best: BinaryHeap<Candidate<'_, K>> = BinaryHeap::with_capacity(k + 1);

        while let Some(Reverse(next)) = frontier.pop() {
            if best.len() == k
                && best
                    .peek()
                    .is_some_and(|worst| next.distance_sq > worst.distance_sq)
            {
                break;
            }

            let cell = &tree.cells[next.cell];
            match cell.children {
                Some(children) => {
                    for child in children {
                        frontier.push(Reverse(CellDistance {
                            distance_sq: tree.cells[child].bounds.distance_sq_to_point(point),
                            cell: child,
                        }));
                    }
                }
                None => {
                    for &slot in &cell.items {
                        best.push(Candidate {
                            distance_sq: (self.positions[slot] - point).length_sq(),
                            key: &self.keys[slot],
                        });
                        if best.len() > k {
                            best.pop();
                        }
                    }
                }
            }
        }

        best.into_sorted_vec()
            .into_iter()
            .map(|candidate| candidate.key.clone())
            .collect()
    }

    pub fn cells(&self) -> Vec<QuadtreeCell> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        tree.cells
            .iter()
            .map(|cell| QuadtreeCell {
                center: cell.bounds.center,
                half_extent: cell.bounds.half_extent,
                depth: cell.depth,
                is_leaf: cell.is_leaf(),
            })
            .collect()
    }
}

struct CellDistance {
    distance_sq: f32,
    cell: usize,
}

impl PartialEq for CellDistance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellDistance {}

impl PartialOrd for CellDistance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellDistance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then_with(|| self.cell.cmp(&other.cell))
    }
}

struct Candidate<'a, K> {
    distance_sq: f32,
    key: &'a K,
}

impl<K: Ord> PartialEq for Candidate<'_, K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Candidate<'_, K> {}

impl<K: Ord> PartialOrd for Candidate<'_, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for Candidate<'_, K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_sq
            .total_cmp(&other.distance_sq)
            .then_with(|| self.key.cmp(other.key))
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::{pos2, vec2};

    use super::*;

    fn grid_index() -> SpatialIndex<u32> {
        let mut index = SpatialIndex::new();
        index.build((0..400u32).map(|key| {
            let x = (key % 20) as f32 * 5.0;
            let y = (key / 20) as f32 * 5.0;
            (key, pos2(x, y))
        }));
        index
    }

    fn brute_rect(index: &SpatialIndex<u32>, rect: Rect) -> Vec<u32> {
        let mut keys = (0..400u32)
            .filter(|key| index.position(key).is_some_and(|pos| rect.contains(pos)))
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    #[test]
    fn empty_index_answers_empty() {
        let index: SpatialIndex<u32> = SpatialIndex::new();
        assert!(index.query_point(pos2(0.0, 0.0), 10.0).is_empty());
        assert!(index.query_rectangle(Rect::EVERYTHING).is_empty());
        assert!(index.query_k_nearest(pos2(0.0, 0.0), 3).is_empty());
        assert!(index.cells().is_empty());
    }

    #[test]
    fn point_query_with_zero_radius_is_exact() {
        let mut index = grid_index();
        index.insert(999, pos2(10.0, 10.0));
        assert_eq!(index.query_point(pos2(10.0, 10.0), 0.0), vec![42, 999]);
        assert!(index.query_point(pos2(10.5, 10.0), 0.0).is_empty());
    }

    #[test]
    fn rectangle_is_inclusive_on_edges() {
        let index = grid_index();
        let rect = Rect::from_min_max(pos2(5.0, 5.0), pos2(10.0, 10.0));
        assert_eq!(index.query_rectangle(rect), vec![21, 22, 41, 42]);
    }

    #[test]
    fn updates_move_entries_between_leaves() {
        let mut index = grid_index();
        let rect = Rect::from_min_max(pos2(40.0, 40.0), pos2(45.0, 45.0));
        let before = index.query_rectangle(rect);
        assert!(before.contains(&168));

        assert!(index.update_node(&168, pos2(2.0, 2.0)));
        assert!(!index.query_rectangle(rect).contains(&168));
        assert_eq!(index.query_point(pos2(2.0, 2.0), 0.1), vec![168]);
        assert_eq!(index.query_rectangle(rect), brute_rect(&index, rect));
    }

    #[test]
    fn updates_outside_bounds_grow_the_tree() {
        let mut index = grid_index();
        assert!(index.update_node(&0, pos2(5_000.0, -5_000.0)));
        assert_eq!(index.query_k_nearest(pos2(4_999.0, -4_999.0), 1), vec![0]);
        assert!(index.bounds().is_some_and(|bounds| bounds.contains(pos2(5_000.0, -5_000.0))));
        assert!(!index.update_node(&12_345, pos2(0.0, 0.0)));
    }

    #[test]
    fn batch_updates_count_known_keys() {
        let mut index = grid_index();
        let moves = [(1u32, pos2(1.0, 1.0)), (7_000, pos2(0.0, 0.0)), (2, pos2(2.0, 2.0))];
        let applied = index.update_nodes(moves.iter().map(|(key, pos)| (key, *pos)));
        assert_eq!(applied, 2);
        assert_eq!(index.position(&2), Some(pos2(2.0, 2.0)));
    }

    #[test]
    fn remove_keeps_remaining_entries_queryable() {
        let mut index = grid_index();
        assert!(index.remove(&0));
        assert!(index.remove(&399));
        assert!(!index.remove(&0));
        assert_eq!(index.len(), 398);
        let everything = index.query_rectangle(Rect::EVERYTHING);
        assert_eq!(everything.len(), 398);
        assert!(!everything.contains(&0));
        assert_eq!(index.query_point(pos2(95.0, 95.0), 0.0), Vec::<u32>::new());
        assert_eq!(index.query_point(pos2(90.0, 95.0), 0.0), vec![398]);
    }

    #[test]
    fn k_nearest_breaks_ties_by_key() {
        let mut index = SpatialIndex::new();
        index.build([
            (5u32, pos2(1.0, 0.0)),
            (3, pos2(-1.0, 0.0)),
            (9, pos2(0.0, 1.0)),
            (1, pos2(0.0, -1.0)),
            (7, pos2(3.0, 3.0)),
        ]);
        assert_eq!(index.query_k_nearest(pos2(0.0, 0.0), 3), vec![1, 3, 5]);
        assert_eq!(index.query_k_nearest(pos2(0.0, 0.0), 10), vec![1, 3, 5, 9, 7]);
    }

    #[test]
    fn k_nearest_matches_sorted_distances() {
        let index = grid_index();
        let probe = pos2(33.3, 61.7);
        let mut expected = (0..400u32)
            .map(|key| {
                let position = index.position(&key).unwrap_or(Pos2::ZERO);
                ((position - probe).length_sq(), key)
            })
            .collect::<Vec<_>>();
        expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let expected = expected.into_iter().take(17).map(|(_, key)| key).collect::<Vec<_>>();
        assert_eq!(index.query_k_nearest(probe, 17), expected);
    }

    #[test]
    fn revision_tracks_mutations() {
        let mut index = grid_index();
        let start = index.revision();
        index.update_node(&3, pos2(3.0, 3.0) + vec2(0.5, 0.0));
        assert!(index.revision() > start);
        let after_update = index.revision();
        let _ = index.query_rectangle(Rect::EVERYTHING);
        assert_eq!(index.revision(), after_update);
    }
}
