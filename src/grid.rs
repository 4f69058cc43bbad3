//! Voxel occupancy grid: which piece, if any, owns each cell of the arena.

use crate::geom::Vec3i;

/// Identifier stamped into the grid by a live piece. Equals the piece's index
/// in the world's live-piece list.
pub type PieceId = usize;

/// Fixed-size `width × height × width` grid. x and z share `width`; y is up,
/// layer 0 sits on the floor.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    width: usize,
    height: usize,
    cells: Vec<Option<PieceId>>,
}

impl VoxelGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width * height * width],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn in_bounds(&self, p: Vec3i) -> bool {
        let (w, h) = (self.width as i32, self.height as i32);
        p.x >= 0 && p.x < w && p.y >= 0 && p.y < h && p.z >= 0 && p.z < w
    }

    #[inline]
    fn idx(&self, p: Vec3i) -> usize {
        let (x, y, z) = (p.x as usize, p.y as usize, p.z as usize);
        (y * self.width + z) * self.width + x
    }

    /// Occupant of `p`. Anything outside the arena reads as empty.
    #[inline]
    pub fn get(&self, p: Vec3i) -> Option<PieceId> {
        if !self.in_bounds(p) {
            return None;
        }
        self.cells[self.idx(p)]
    }

    /// Stamp `p`. Pieces only hold in-bounds cells, so this is not range-checked
    /// beyond a debug assertion.
    #[inline]
    pub fn set(&mut self, p: Vec3i, id: Option<PieceId>) {
        debug_assert!(self.in_bounds(p), "set out of bounds: {p:?}");
        let i = self.idx(p);
        self.cells[i] = id;
    }

    pub fn clear(&mut self) {
        self.cells.fill(None);
    }

    /// Distinct ids with at least one cell on layer `y`, ascending.
    pub fn layer_ids(&self, y: i32) -> Vec<PieceId> {
        let w = self.width as i32;
        let mut ids: Vec<PieceId> = (0..w)
            .flat_map(|z| (0..w).map(move |x| Vec3i::new(x, y, z)))
            .filter_map(|p| self.get(p))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Every occupied cell with its occupant, in storage order.
    pub fn occupied(&self) -> impl Iterator<Item = (Vec3i, PieceId)> + '_ {
        let w = self.width;
        self.cells.iter().enumerate().filter_map(move |(i, c)| {
            c.map(|id| {
                let x = i % w;
                let z = (i / w) % w;
                let y = i / (w * w);
                (Vec3i::new(x as i32, y as i32, z as i32), id)
            })
        })
    }

    /// Highest occupied layer in column `(x, z)`, with its occupant.
    pub fn column_top(&self, x: i32, z: i32) -> Option<(i32, PieceId)> {
        (0..self.height as i32)
            .rev()
            .find_map(|y| self.get(Vec3i::new(x, y, z)).map(|id| (y, id)))
    }
}

impl Default for VoxelGrid {
    fn default() -> Self {
        Self::new(16, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_reads_empty() {
        let g = VoxelGrid::new(4, 6);
        assert_eq!(g.get(Vec3i::new(-1, 0, 0)), None);
        assert_eq!(g.get(Vec3i::new(0, 6, 0)), None);
        assert_eq!(g.get(Vec3i::new(0, 0, 4)), None);
        assert!(!g.in_bounds(Vec3i::new(4, 0, 0)));
        assert!(g.in_bounds(Vec3i::new(3, 5, 3)));
    }

    #[test]
    fn set_get_and_clear() {
        let mut g = VoxelGrid::default();
        let p = Vec3i::new(3, 7, 11);
        g.set(p, Some(5));
        assert_eq!(g.get(p), Some(5));
        assert_eq!(g.get(Vec3i::new(11, 7, 3)), None);
        assert_eq!(g.occupied_count(), 1);
        g.clear();
        assert_eq!(g.get(p), None);
        assert_eq!(g.occupied_count(), 0);
    }

    #[test]
    fn occupied_reports_coordinates() {
        let mut g = VoxelGrid::new(5, 3);
        g.set(Vec3i::new(4, 2, 1), Some(0));
        g.set(Vec3i::new(0, 0, 3), Some(1));
        let mut got: Vec<_> = g.occupied().collect();
        got.sort();
        assert_eq!(got, vec![(Vec3i::new(0, 0, 3), 1), (Vec3i::new(4, 2, 1), 0)]);
    }

    #[test]
    fn layer_ids_are_distinct_and_sorted() {
        let mut g = VoxelGrid::new(4, 4);
        g.set(Vec3i::new(0, 0, 0), Some(3));
        g.set(Vec3i::new(1, 0, 0), Some(3));
        g.set(Vec3i::new(2, 0, 2), Some(1));
        g.set(Vec3i::new(2, 1, 2), Some(7));
        assert_eq!(g.layer_ids(0), vec![1, 3]);
        assert_eq!(g.layer_ids(1), vec![7]);
        assert!(g.layer_ids(2).is_empty());
    }

    #[test]
    fn column_top_finds_highest() {
        let mut g = VoxelGrid::new(4, 8);
        g.set(Vec3i::new(1, 2, 1), Some(0));
        g.set(Vec3i::new(1, 5, 1), Some(2));
        assert_eq!(g.column_top(1, 1), Some((5, 2)));
        assert_eq!(g.column_top(0, 0), None);
    }
}
