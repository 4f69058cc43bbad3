//! Tetromino: a polycube piece living in the voxel grid, with support, fall,
//! transform and layer-removal logic.

use crate::geom::{Axis, Vec3, Vec3i, rotate_point_90};
use crate::grid::{PieceId, VoxelGrid};
use crate::player::{Player, Seat};

/// Largest visual mismatch (in layers) a move may snap away when it settles a
/// falling piece onto the nearer integer layer.
pub const MISALIGN_THRESHOLD: f32 = 0.3;

/// Fixed preset shapes: the seven flat tetrominoes and the three non-planar
/// tetracubes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
    Branch,
    ScrewLeft,
    ScrewRight,
}

impl Preset {
    pub const ALL: [Self; 10] = [
        Self::I,
        Self::O,
        Self::T,
        Self::S,
        Self::Z,
        Self::J,
        Self::L,
        Self::Branch,
        Self::ScrewLeft,
        Self::ScrewRight,
    ];

    /// 4 cells in local space; every axis starts at 0.
    pub fn cells(&self) -> [(i32, i32, i32); 4] {
        match self {
            Self::I => [(0, 0, 0), (1, 0, 0), (2, 0, 0), (3, 0, 0)],
            Self::O => [(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0)],
            Self::T => [(0, 0, 0), (1, 0, 0), (2, 0, 0), (1, 1, 0)],
            Self::S => [(1, 0, 0), (2, 0, 0), (0, 1, 0), (1, 1, 0)],
            Self::Z => [(0, 1, 0), (1, 1, 0), (1, 0, 0), (2, 0, 0)],
            Self::J => [(0, 0, 0), (0, 1, 0), (1, 0, 0), (2, 0, 0)],
            Self::L => [(2, 1, 0), (0, 0, 0), (1, 0, 0), (2, 0, 0)],
            Self::Branch => [(0, 0, 0), (1, 0, 0), (0, 1, 0), (0, 0, 1)],
            Self::ScrewLeft => [(0, 0, 0), (1, 0, 0), (1, 1, 0), (1, 1, 1)],
            Self::ScrewRight => [(0, 0, 1), (1, 0, 1), (1, 1, 1), (1, 1, 0)],
        }
    }

    /// Rotation centre in local space. Components are all integers or all
    /// half-integers so quarter turns map lattice cells onto lattice cells.
    pub fn pivot(&self) -> Vec3 {
        match self {
            Self::I => Vec3::new(1.0, 0.0, 0.0),
            Self::O => Vec3::new(0.5, 0.5, 0.5),
            Self::T | Self::S | Self::Z | Self::J | Self::L => Vec3::new(1.0, 0.0, 0.0),
            Self::Branch => Vec3::new(0.0, 0.0, 0.0),
            Self::ScrewLeft => Vec3::new(1.0, 1.0, 0.0),
            Self::ScrewRight => Vec3::new(1.0, 1.0, 1.0),
        }
    }

    /// Colour slot 0..6 for theme.block_color().
    pub fn color_index(&self) -> u8 {
        match self {
            Self::S => 0,
            Self::O | Self::Branch => 1,
            Self::Z | Self::L => 2,
            Self::J => 3,
            Self::T | Self::ScrewLeft => 4,
            Self::I | Self::ScrewRight => 5,
        }
    }
}

/// What a transform needs to know about everything outside the piece.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// Falling flag per live piece, indexed by id.
    pub falling: &'a [bool],
    pub players: &'a [Player],
    /// How far a falling piece is still drawn above its stored layer, in [0, 1].
    pub fall_progress: f32,
    pub misalign_threshold: f32,
}

impl TransformContext<'_> {
    #[inline]
    fn is_falling(&self, id: PieceId) -> bool {
        self.falling.get(id).copied().unwrap_or(false)
    }

    #[inline]
    fn player_at(&self, cell: Vec3i) -> bool {
        self.players
            .iter()
            .any(|p| p.alive && p.position_occupied(cell))
    }
}

/// A live piece. Its cells are stamped into the grid with its id; the grid is
/// the only shared record of occupancy.
#[derive(Debug, Clone)]
pub struct Tetromino {
    positions: Vec<Vec3i>,
    pivot: Vec3,
    /// Unsupported and descending one layer per tick.
    pub falling: bool,
    /// Dead player steering this piece.
    pub owner: Option<Seat>,
    pub preset: Preset,
    id: PieceId,
}

impl Tetromino {
    pub fn new(preset: Preset, positions: Vec<Vec3i>, pivot: Vec3, id: PieceId) -> Self {
        Self {
            positions,
            pivot,
            falling: false,
            owner: None,
            preset,
            id,
        }
    }

    /// Piece in the preset's local orientation, unplaced.
    pub fn from_preset(preset: Preset, id: PieceId) -> Self {
        let positions = preset
            .cells()
            .iter()
            .map(|&(x, y, z)| Vec3i::new(x, y, z))
            .collect();
        Self::new(preset, positions, preset.pivot(), id)
    }

    #[inline]
    pub fn id(&self) -> PieceId {
        self.id
    }

    /// Only changes the stored id; the caller re-stamps the grid.
    #[inline]
    pub fn set_id(&mut self, id: PieceId) {
        self.id = id;
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3i] {
        &self.positions
    }

    #[inline]
    pub fn pivot(&self) -> Vec3 {
        self.pivot
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, cell: Vec3i) -> bool {
        self.positions.contains(&cell)
    }

    pub fn lowest_y(&self) -> Option<i32> {
        self.positions.iter().map(|p| p.y).min()
    }

    pub fn write(&self, grid: &mut VoxelGrid) {
        for &p in &self.positions {
            grid.set(p, Some(self.id));
        }
    }

    pub fn clear(&self, grid: &mut VoxelGrid) {
        for &p in &self.positions {
            grid.set(p, None);
        }
    }

    /// Support test against the grid. `falling` holds every piece's current
    /// flag by id; two falling pieces never hold each other up.
    pub fn should_fall(&self, grid: &VoxelGrid, falling: &[bool]) -> bool {
        for p in &self.positions {
            if p.y == 0 {
                return false;
            }
            if let Some(below) = grid.get(p.offset(0, -1, 0)) {
                let below_falling = falling.get(below).copied().unwrap_or(false);
                if below != self.id && !(self.falling && below_falling) {
                    return false;
                }
            }
        }
        true
    }

    pub fn update_falling(&mut self, grid: &VoxelGrid, falling: &[bool]) {
        self.falling = self.should_fall(grid, falling);
    }

    /// Move one layer down without touching the grid.
    pub fn descend(&mut self) {
        for p in &mut self.positions {
            p.y -= 1;
        }
        self.pivot.y -= 1.0;
    }

    /// Drop every cell on layer 0. Returns how many were removed.
    pub fn remove_bottom_layer(&mut self, grid: &mut VoxelGrid) -> usize {
        self.remove_blocks_if(grid, |p| p.y == 0)
    }

    /// Drop cells matching `pred`, clearing their grid entries and keeping the
    /// survivors in their original order.
    pub fn remove_blocks_if(
        &mut self,
        grid: &mut VoxelGrid,
        mut pred: impl FnMut(Vec3i) -> bool,
    ) -> usize {
        let before = self.positions.len();
        self.positions.retain(|&p| {
            if pred(p) {
                grid.set(p, None);
                false
            } else {
                true
            }
        });
        before - self.positions.len()
    }

    /// True when every proposed cell (lifted one layer if `lift`) is inside the
    /// arena, free of other pieces and free of live players. The piece's own
    /// cells never block it; with `ignore_falling` other falling pieces don't
    /// either.
    fn positions_legal(
        &self,
        grid: &VoxelGrid,
        cells: &[Vec3i],
        lift: bool,
        ignore_falling: bool,
        ctx: &TransformContext<'_>,
    ) -> bool {
        cells.iter().all(|&cell| {
            let p = if lift { cell.offset(0, 1, 0) } else { cell };
            if !grid.in_bounds(p) {
                return false;
            }
            if let Some(other) = grid.get(p) {
                if other != self.id && !(ignore_falling && ctx.is_falling(other)) {
                    return false;
                }
            }
            !ctx.player_at(p)
        })
    }

    fn apply_transform(&mut self, grid: &mut VoxelGrid, cells: Vec<Vec3i>, pivot: Vec3) {
        self.clear(grid);
        self.positions = cells;
        self.pivot = pivot;
        self.write(grid);
    }

    /// Commit `cells`/`pivot` if legal at the piece's stored layer and, while
    /// falling, at the layer above it that it is still drawn easing out of.
    ///
    /// A move legal at only one of the two layers may settle the piece onto
    /// that layer when `allow_settle` is set and the current fall progress is
    /// within the misalignment threshold of it.
    pub fn try_transform(
        &mut self,
        grid: &mut VoxelGrid,
        mut cells: Vec<Vec3i>,
        mut pivot: Vec3,
        allow_settle: bool,
        ctx: &TransformContext<'_>,
    ) -> bool {
        let lower_legal = self.positions_legal(grid, &cells, false, false, ctx);
        if !self.falling {
            if lower_legal {
                self.apply_transform(grid, cells, pivot);
            }
            return lower_legal;
        }

        // Settling up must not land on a falling piece's stored cells, so other
        // falling pieces only get ignored when the lower layer is fine.
        let upper_legal = self.positions_legal(grid, &cells, true, lower_legal, ctx);

        if !lower_legal && !upper_legal {
            return false;
        }
        if !allow_settle && !(lower_legal && upper_legal) {
            return false;
        }

        if !upper_legal {
            if ctx.fall_progress > ctx.misalign_threshold {
                return false;
            }
            self.falling = false;
        }
        if !lower_legal {
            if 1.0 - ctx.fall_progress > ctx.misalign_threshold {
                return false;
            }
            for p in &mut cells {
                p.y += 1;
            }
            pivot.y += 1.0;
            self.falling = false;
        }

        self.apply_transform(grid, cells, pivot);
        true
    }

    pub fn xz_move(
        &mut self,
        grid: &mut VoxelGrid,
        dx: i32,
        dz: i32,
        ctx: &TransformContext<'_>,
    ) -> bool {
        let cells = self.positions.iter().map(|p| p.offset(dx, 0, dz)).collect();
        let pivot = self.pivot + Vec3::new(dx as f32, 0.0, dz as f32);
        self.try_transform(grid, cells, pivot, true, ctx)
    }

    /// Quarter turn about `axis` through the pivot. Rotation is gated exactly
    /// like translation, settling included.
    pub fn rotate(
        &mut self,
        grid: &mut VoxelGrid,
        axis: Axis,
        clockwise: bool,
        ctx: &TransformContext<'_>,
    ) -> bool {
        let cells = self
            .positions
            .iter()
            .map(|p| {
                let local = p.to_vec3() - self.pivot;
                (rotate_point_90(local, axis, clockwise) + self.pivot).round_to_lattice()
            })
            .collect();
        self.try_transform(grid, cells, self.pivot, true, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx<'a>(falling: &'a [bool], players: &'a [Player], fall_progress: f32) -> TransformContext<'a> {
        TransformContext {
            falling,
            players,
            fall_progress,
            misalign_threshold: MISALIGN_THRESHOLD,
        }
    }

    fn placed(preset: Preset, id: PieceId, at: Vec3i, grid: &mut VoxelGrid) -> Tetromino {
        let mut t = Tetromino::from_preset(preset, id);
        let cells = t.positions.iter().map(|&p| p + at).collect();
        t.positions = cells;
        t.pivot = t.pivot + at.to_vec3();
        t.write(grid);
        t
    }

    fn sorted(cells: &[Vec3i]) -> Vec<Vec3i> {
        let mut v = cells.to_vec();
        v.sort();
        v
    }

    #[test]
    fn presets_are_normalized_tetracubes() {
        for preset in Preset::ALL {
            let cells = preset.cells();
            for axis in 0..3 {
                let min = cells
                    .iter()
                    .map(|c| [c.0, c.1, c.2][axis])
                    .min()
                    .unwrap();
                assert_eq!(min, 0, "{preset:?} axis {axis}");
            }
            let mut unique = cells.to_vec();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), 4, "{preset:?}");
        }
    }

    #[test]
    fn write_then_clear_round_trips_grid() {
        let mut grid = VoxelGrid::default();
        let t = placed(Preset::T, 3, Vec3i::new(4, 5, 6), &mut grid);
        for &p in t.positions() {
            assert_eq!(grid.get(p), Some(3));
        }
        t.clear(&mut grid);
        for &p in t.positions() {
            assert_eq!(grid.get(p), None);
        }
        assert_eq!(grid.occupied_count(), 0);
    }

    #[test]
    fn resting_on_floor_never_falls() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::L, 0, Vec3i::new(2, 0, 2), &mut grid);
        t.falling = true;
        t.update_falling(&grid, &[true]);
        assert!(!t.falling);
    }

    #[test]
    fn unsupported_piece_falls_one_layer() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::I, 0, Vec3i::new(0, 7, 0), &mut grid);
        t.update_falling(&grid, &[false]);
        assert!(t.falling);
        let before = t.positions().to_vec();
        let pivot_before = t.pivot();
        t.clear(&mut grid);
        t.descend();
        t.write(&mut grid);
        for (a, b) in before.iter().zip(t.positions()) {
            assert_eq!(a.y - 1, b.y);
            assert_eq!(grid.get(*a), None);
            assert_eq!(grid.get(*b), Some(0));
        }
        assert_eq!(t.pivot().y, pivot_before.y - 1.0);
    }

    #[test]
    fn settled_piece_supports_falling_piece() {
        let mut grid = VoxelGrid::default();
        let lower = placed(Preset::O, 0, Vec3i::new(3, 0, 3), &mut grid);
        let mut upper = placed(Preset::O, 1, Vec3i::new(3, 2, 3), &mut grid);
        upper.falling = true;
        upper.update_falling(&grid, &[lower.falling, true]);
        assert!(!upper.falling);
    }

    #[test]
    fn two_falling_pieces_do_not_block_each_other() {
        let mut grid = VoxelGrid::default();
        let _lower = placed(Preset::O, 0, Vec3i::new(3, 4, 3), &mut grid);
        let mut upper = placed(Preset::O, 1, Vec3i::new(3, 6, 3), &mut grid);
        upper.falling = true;
        upper.update_falling(&grid, &[true, true]);
        assert!(upper.falling);
        // A resting piece stays on a piece that is leaving.
        upper.falling = false;
        upper.update_falling(&grid, &[true, false]);
        assert!(!upper.falling);
    }

    #[test]
    fn remove_bottom_layer_compacts_in_order() {
        let mut grid = VoxelGrid::default();
        // J lying on the floor with its hook up: 3 cells on y=0, 1 on y=1.
        let mut t = placed(Preset::J, 0, Vec3i::new(5, 0, 5), &mut grid);
        assert_eq!(t.positions().iter().filter(|p| p.y == 0).count(), 3);
        let removed = t.remove_bottom_layer(&mut grid);
        assert_eq!(removed, 3);
        assert_eq!(t.len(), 1);
        assert_eq!(t.positions(), &[Vec3i::new(5, 1, 5)]);
        assert_eq!(grid.occupied_count(), 1);
        assert_eq!(grid.get(Vec3i::new(5, 1, 5)), Some(0));
    }

    #[test]
    fn xz_move_is_blocked_by_walls_and_pieces() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::I, 0, Vec3i::new(0, 0, 0), &mut grid);
        let _other = placed(Preset::O, 1, Vec3i::new(0, 0, 2), &mut grid);
        let c = ctx(&[false, false], &[], 0.0);
        assert!(!t.xz_move(&mut grid, -1, 0, &c), "wall");
        assert!(!t.xz_move(&mut grid, 0, 2, &c), "piece");
        assert!(t.xz_move(&mut grid, 0, 1, &c));
        assert_eq!(t.positions()[0], Vec3i::new(0, 0, 1));
        assert_eq!(grid.get(Vec3i::new(0, 0, 0)), None);
        assert_eq!(grid.get(Vec3i::new(3, 0, 1)), Some(0));
        assert_eq!(t.pivot(), Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn live_player_blocks_move() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::O, 0, Vec3i::new(4, 0, 4), &mut grid);
        let player = Player::new(0, Vec3::new(6.0, 0.5, 4.0));
        let c = ctx(&[false], std::slice::from_ref(&player), 0.0);
        assert!(!t.xz_move(&mut grid, 1, 0, &c));

        let mut ghost = player.clone();
        ghost.alive = false;
        let c = ctx(&[false], std::slice::from_ref(&ghost), 0.0);
        assert!(t.xz_move(&mut grid, 1, 0, &c));
    }

    #[test]
    fn four_rotations_restore_piece() {
        for preset in Preset::ALL {
            for axis in Axis::ALL {
                let mut grid = VoxelGrid::default();
                let mut t = placed(preset, 0, Vec3i::new(7, 7, 7), &mut grid);
                let cells = sorted(t.positions());
                let pivot = t.pivot();
                let c = ctx(&[false], &[], 0.0);
                for _ in 0..4 {
                    assert!(t.rotate(&mut grid, axis, true, &c), "{preset:?} {axis:?}");
                }
                assert_eq!(sorted(t.positions()), cells, "{preset:?} {axis:?}");
                assert_eq!(t.pivot(), pivot);
                assert_eq!(grid.occupied_count(), 4);
            }
        }
    }

    proptest! {
        #[test]
        fn rotations_undo_in_reverse(
            preset in proptest::sample::select(Preset::ALL.to_vec()),
            turns in proptest::collection::vec((0usize..3, any::<bool>()), 1..12),
        ) {
            let mut grid = VoxelGrid::default();
            let mut t = placed(preset, 0, Vec3i::new(7, 7, 7), &mut grid);
            let cells = sorted(t.positions());
            let pivot = t.pivot();
            let c = ctx(&[false], &[], 0.0);
            for &(axis, cw) in &turns {
                prop_assert!(t.rotate(&mut grid, Axis::from_index(axis), cw, &c));
                prop_assert_eq!(grid.occupied_count(), 4);
            }
            for &(axis, cw) in turns.iter().rev() {
                prop_assert!(t.rotate(&mut grid, Axis::from_index(axis), !cw, &c));
            }
            prop_assert_eq!(sorted(t.positions()), cells);
            prop_assert_eq!(t.pivot(), pivot);
        }
    }

    #[test]
    fn rotation_stays_on_lattice_and_keeps_shape_size() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::T, 0, Vec3i::new(6, 6, 6), &mut grid);
        let c = ctx(&[false], &[], 0.0);
        assert!(t.rotate(&mut grid, Axis::Z, true, &c));
        // T about its stem: (-1,0)->(0,1), (1,0)->(0,-1), (0,1)->(1,0)
        assert_eq!(
            sorted(t.positions()),
            sorted(&[
                Vec3i::new(7, 5, 6),
                Vec3i::new(7, 6, 6),
                Vec3i::new(7, 7, 6),
                Vec3i::new(8, 6, 6),
            ])
        );
    }

    #[test]
    fn falling_move_needs_both_layers_free() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::O, 0, Vec3i::new(4, 5, 4), &mut grid);
        t.falling = true;
        let c = ctx(&[true], &[], 0.5);
        assert!(t.xz_move(&mut grid, 1, 0, &c));
        assert!(t.falling);
    }

    #[test]
    fn blocked_above_settles_down_when_nearly_landed() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::I, 0, Vec3i::new(2, 5, 2), &mut grid);
        t.falling = true;
        // Settled wall one layer up on the target row.
        let _wall = placed(Preset::I, 1, Vec3i::new(2, 6, 3), &mut grid);
        let flags = [true, false];

        let late = ctx(&flags, &[], 0.6);
        assert!(!t.xz_move(&mut grid, 0, 1, &late));
        assert!(t.falling);

        let near = ctx(&flags, &[], 0.2);
        assert!(t.xz_move(&mut grid, 0, 1, &near));
        assert!(!t.falling);
        assert!(t.positions().iter().all(|p| p.y == 5 && p.z == 3));
    }

    #[test]
    fn blocked_below_settles_up_when_barely_left() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::I, 0, Vec3i::new(2, 5, 2), &mut grid);
        t.falling = true;
        let _floor = placed(Preset::I, 1, Vec3i::new(2, 5, 3), &mut grid);
        let flags = [true, false];

        let early = ctx(&flags, &[], 0.5);
        assert!(!t.xz_move(&mut grid, 0, 1, &early));

        let fresh = ctx(&flags, &[], 0.9);
        assert!(t.xz_move(&mut grid, 0, 1, &fresh));
        assert!(!t.falling);
        assert!(t.positions().iter().all(|p| p.y == 6 && p.z == 3));
        assert_eq!(t.pivot().y, 6.0);
        assert_eq!(grid.get(Vec3i::new(2, 6, 3)), Some(0));
        assert_eq!(grid.get(Vec3i::new(2, 5, 3)), Some(1));
    }

    #[test]
    fn settle_is_refused_without_allow_settle() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::I, 0, Vec3i::new(2, 5, 2), &mut grid);
        t.falling = true;
        let _wall = placed(Preset::I, 1, Vec3i::new(2, 6, 3), &mut grid);
        let c = ctx(&[true, false], &[], 0.0);
        let cells: Vec<_> = t.positions().iter().map(|p| p.offset(0, 0, 1)).collect();
        let pivot = t.pivot() + Vec3::new(0.0, 0.0, 1.0);
        assert!(!t.try_transform(&mut grid, cells, pivot, false, &c));
        assert!(t.falling);
    }

    #[test]
    fn settle_up_never_lands_on_falling_piece() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::I, 0, Vec3i::new(2, 5, 2), &mut grid);
        t.falling = true;
        let _below = placed(Preset::I, 1, Vec3i::new(2, 5, 3), &mut grid);
        let _above = placed(Preset::I, 2, Vec3i::new(2, 6, 3), &mut grid);
        // The upper neighbour is falling, but its stored cells are real.
        let c = ctx(&[true, false, true], &[], 0.95);
        assert!(!t.xz_move(&mut grid, 0, 1, &c));
    }

    #[test]
    fn resting_piece_only_checks_its_layer() {
        let mut grid = VoxelGrid::default();
        let mut t = placed(Preset::I, 0, Vec3i::new(2, 0, 2), &mut grid);
        let _above = placed(Preset::I, 1, Vec3i::new(2, 1, 3), &mut grid);
        let c = ctx(&[false, false], &[], 0.5);
        assert!(t.xz_move(&mut grid, 0, 1, &c));
        assert!(!t.falling);
    }
}
