use eframe::egui::{Pos2, Rect, Vec2, pos2, vec2};

pub(super) const LEAF_CAPACITY: usize = 12;
pub(super) const MAX_DEPTH: u8 = 12;
const PRUNE_SLACK: f32 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct QuadBounds {
    pub(crate) center: Pos2,
    pub(crate) half_extent: f32,
}

impl QuadBounds {
    pub(crate) fn from_points<'a>(points: impl IntoIterator<Item = &'a Pos2>) -> Option<Self> {
        let mut min = pos2(f32::INFINITY, f32::INFINITY);
        let mut max = pos2(f32::NEG_INFINITY, f32::NEG_INFINITY);

        for point in points {
            min.x = min.x.min(point.x);
            min.y = min.y.min(point.y);
            max.x = max.x.max(point.x);
            max.y = max.y.max(point.y);
        }

        if !min.x.is_finite() || !min.y.is_finite() || !max.x.is_finite() || !max.y.is_finite() {
            return None;
        }

        let center = min + (max - min) * 0.5;
        let span_x = (max.x - min.x).max(1.0);
        let span_y = (max.y - min.y).max(1.0);
        let half_extent = (span_x.max(span_y) * 0.5) + 1.0;

        Some(Self {
            center,
            half_extent,
        })
    }

    pub(crate) fn grown(self, factor: f32) -> Self {
        Self {
            center: self.center,
            half_extent: self.half_extent * factor.max(1.0),
        }
    }

    pub(crate) fn contains(self, point: Pos2) -> bool {
        let min = self.center - Vec2::splat(self.half_extent);
        let max = self.center + Vec2::splat(self.half_extent);
        point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
    }

    pub(crate) fn rect(self) -> Rect {
        Rect::from_center_size(self.center, Vec2::splat(self.half_extent * 2.0))
    }

    pub(crate) fn side_length(self) -> f32 {
        self.half_extent * 2.0
    }

    pub(crate) fn child(self, quadrant: usize) -> Self {
        let quarter = self.half_extent * 0.5;
        let offset = match quadrant {
            0 => vec2(-quarter, -quarter),
            1 => vec2(quarter, -quarter),
            2 => vec2(-quarter, quarter),
            _ => vec2(quarter, quarter),
        };

        Self {
            center: self.center + offset,
            half_extent: quarter,
        }
    }

    pub(crate) fn quadrant_for(self, point: Pos2) -> usize {
        let right = point.x >= self.center.x;
        let lower = point.y >= self.center.y;
        match (right, lower) {
            (false, false) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (true, true) => 3,
        }
    }

    /// Half extent widened by a few ulps of the cell's coordinates. Child
    /// centres are rounded, so a point placed by `quadrant_for` on a split line
    /// can sit a hair outside its leaf's nominal square. Pruning uses this
    /// extent; exact filtering happens per item.
    fn pruning_extent(self) -> f32 {
        let magnitude = self.center.x.abs().max(self.center.y.abs()) + self.half_extent;
        self.half_extent + magnitude * PRUNE_SLACK
    }

    /// Squared distance from `point` to the closest point of the cell; zero
    /// inside.
    pub(crate) fn distance_sq_to_point(self, point: Pos2) -> f32 {
        let extent = self.pruning_extent();
        let dx = ((point.x - self.center.x).abs() - extent).max(0.0);
        let dy = ((point.y - self.center.y).abs() - extent).max(0.0);
        (dx * dx) + (dy * dy)
    }

    /// Squared gap between two cells; zero when they touch or overlap.
    pub(crate) fn distance_sq_to(self, other: Self) -> f32 {
        let reach = self.pruning_extent() + other.pruning_extent();
        let dx = (self.center.x - other.center.x).abs() - reach;
        let dy = (self.center.y - other.center.y).abs() - reach;
        let clamped_dx = dx.max(0.0);
        let clamped_dy = dy.max(0.0);
        (clamped_dx * clamped_dx) + (clamped_dy * clamped_dy)
    }

    pub(crate) fn intersects(self, rect: Rect) -> bool {
        let own = Rect::from_center_size(self.center, Vec2::splat(self.pruning_extent() * 2.0));
        own.min.x <= rect.max.x
            && own.max.x >= rect.min.x
            && own.min.y <= rect.max.y
            && own.max.y >= rect.min.y
    }
}

#[derive(Clone, Debug)]
pub(super) struct Cell {
    pub(super) bounds: QuadBounds,
    pub(super) depth: u8,
    pub(super) children: Option<[usize; 4]>,
    /// Slots stored in this cell; always empty for inner cells.
    pub(super) items: Vec<usize>,
}

impl Cell {
    fn leaf(bounds: QuadBounds, depth: u8) -> Self {
        Self {
            bounds,
            depth,
            children: None,
            items: Vec::new(),
        }
    }

    pub(super) fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Region quadtree over slot indices. Cells live in a flat arena; cell 0 is the
/// root. Positions are owned by the caller and passed in on every mutation.
#[derive(Clone, Debug)]
pub(super) struct Quadtree {
    pub(super) cells: Vec<Cell>,
}

impl Quadtree {
    pub(super) fn new(bounds: QuadBounds) -> Self {
        Self {
            cells: vec![Cell::leaf(bounds, 0)],
        }
    }

    pub(super) fn bounds(&self) -> QuadBounds {
        self.cells[0].bounds
    }

    /// Inserts `slot` and returns the leaf that now holds it. Splitting a leaf
    /// moves its items, so `leaf_of` is updated for every relocated slot.
    pub(super) fn insert(&mut self, slot: usize, positions: &[Pos2], leaf_of: &mut [usize]) {
        let point = positions[slot];
        let mut cell = 0;
        loop {
            match self.cells[cell].children {
                Some(children) => {
                    cell = children[self.cells[cell].bounds.quadrant_for(point)];
                }
                None => break,
            }
        }

        self.cells[cell].items.push(slot);
        leaf_of[slot] = cell;

        if self.cells[cell].items.len() > LEAF_CAPACITY && self.cells[cell].depth < MAX_DEPTH {
            self.split(cell, positions, leaf_of);
        }
    }

    fn split(&mut self, cell: usize, positions: &[Pos2], leaf_of: &mut [usize]) {
        let bounds = self.cells[cell].bounds;
        let depth = self.cells[cell].depth;

        let items = std::mem::take(&mut self.cells[cell].items);
        let first_quadrant = items
            .first()
            .map(|&slot| bounds.quadrant_for(positions[slot]));
        if items
            .iter()
            .all(|&slot| Some(bounds.quadrant_for(positions[slot])) == first_quadrant)
            && depth + 1 >= MAX_DEPTH
        {
            self.cells[cell].items = items;
            return;
        }

        let base = self.cells.len();
        for quadrant in 0..4 {
            self.cells.push(Cell::leaf(bounds.child(quadrant), depth + 1));
        }
        self.cells[cell].children = Some([base, base + 1, base + 2, base + 3]);

        for slot in items {
            let child = base + bounds.quadrant_for(positions[slot]);
            self.cells[child].items.push(slot);
            leaf_of[slot] = child;
        }

        for child in base..base + 4 {
            if self.cells[child].items.len() > LEAF_CAPACITY && depth + 1 < MAX_DEPTH {
                self.split(child, positions, leaf_of);
            }
        }
    }

    pub(super) fn remove(&mut self, leaf: usize, slot: usize) -> bool {
        let Some(cell) = self.cells.get_mut(leaf) else {
            return false;
        };
        match cell.items.iter().position(|&item| item == slot) {
            Some(position) => {
                cell.items.swap_remove(position);
                true
            }
            None => false,
        }
    }

    /// Renames `from` to `to` inside `leaf` after a slot swap.
    pub(super) fn relabel(&mut self, leaf: usize, from: usize, to: usize) {
        if let Some(item) = self.cells[leaf].items.iter_mut().find(|item| **item == from) {
            *item = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_cover_points_and_pick_quadrants() {
        let points = [pos2(-10.0, -10.0), pos2(30.0, 10.0)];
        let bounds = QuadBounds::from_points(&points).expect("finite points");
        assert!(points.iter().all(|&point| bounds.contains(point)));
        assert_eq!(bounds.quadrant_for(pos2(-5.0, -5.0)), 0);
        assert_eq!(bounds.quadrant_for(pos2(25.0, 5.0)), 3);
        assert_eq!(bounds.distance_sq_to_point(bounds.center), 0.0);
    }

    #[test]
    fn split_line_points_survive_pruning() {
        let root = QuadBounds {
            center: pos2(-0.05, 0.3),
            half_extent: 2.1,
        };
        for parent in (0..4).map(|quadrant| root.child(quadrant)) {
            let on_line = parent.center;
            let leaf = parent.child(parent.quadrant_for(on_line));
            assert_eq!(leaf.distance_sq_to_point(on_line), 0.0);
            assert!(leaf.intersects(Rect::from_min_max(on_line, on_line)));
        }
    }

    #[test]
    fn nan_points_produce_no_bounds() {
        assert!(QuadBounds::from_points(&[pos2(f32::NAN, 0.0)]).is_none());
        assert!(QuadBounds::from_points(&[]).is_none());
    }

    #[test]
    fn split_keeps_leaf_bookkeeping_consistent() {
        let positions = (0..100)
            .map(|index| pos2((index % 10) as f32 * 10.0, (index / 10) as f32 * 10.0))
            .collect::<Vec<_>>();
        let bounds = QuadBounds::from_points(&positions).expect("finite points");
        let mut tree = Quadtree::new(bounds);
        let mut leaf_of = vec![usize::MAX; positions.len()];
        for slot in 0..positions.len() {
            tree.insert(slot, &positions, &mut leaf_of);
        }

        for (slot, &leaf) in leaf_of.iter().enumerate() {
            assert!(tree.cells[leaf].is_leaf());
            assert!(tree.cells[leaf].items.contains(&slot));
            assert!(tree.cells[leaf].bounds.contains(positions[slot]));
        }
    }

    #[test]
    fn coincident_points_stop_at_max_depth() {
        let positions = vec![pos2(5.0, 5.0); 64];
        let bounds = QuadBounds::from_points(&positions).expect("finite points");
        let mut tree = Quadtree::new(bounds);
        let mut leaf_of = vec![0; positions.len()];
        for slot in 0..positions.len() {
            tree.insert(slot, &positions, &mut leaf_of);
        }
        assert!(tree.cells.iter().all(|cell| cell.depth <= MAX_DEPTH));
        let leaf = leaf_of[0];
        assert_eq!(tree.cells[leaf].items.len(), 64);
    }
}
