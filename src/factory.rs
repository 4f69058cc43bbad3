//! Random piece generation: picks a preset, scrambles its orientation and
//! drops it somewhere along the arena ceiling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{Axis, Vec3i};
use crate::grid::PieceId;
use crate::tetromino::{Preset, Tetromino};

#[derive(Debug, Clone)]
pub struct TetrominoFactory {
    rng: StdRng,
}

impl TetrominoFactory {
    /// Seeded factories replay the same piece sequence.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn random_preset(&mut self) -> Preset {
        Preset::ALL[self.rng.gen_range(0..Preset::ALL.len())]
    }

    pub fn spawn_random(&mut self, id: PieceId, width: usize, height: usize) -> Tetromino {
        let preset = self.random_preset();
        self.spawn(preset, id, width, height)
    }

    /// Build `preset` in a random orientation with its top layer on the
    /// ceiling (`height - 1`) and its footprint inside the arena.
    ///
    /// Shuffling axes and mirroring keep the pivot's integer/half-integer
    /// parity, so the piece still rotates on the lattice.
    pub fn spawn(&mut self, preset: Preset, id: PieceId, width: usize, height: usize) -> Tetromino {
        let mut cells: Vec<Vec3i> = preset
            .cells()
            .iter()
            .map(|&(x, y, z)| Vec3i::new(x, y, z))
            .collect();
        let mut pivot = preset.pivot();

        for i in 0..2 {
            let j = self.rng.gen_range(i..3);
            if i == j {
                continue;
            }
            let (a, b) = (Axis::from_index(i), Axis::from_index(j));
            for c in &mut cells {
                let t = c[a];
                c[a] = c[b];
                c[b] = t;
            }
            let t = pivot[a];
            pivot[a] = pivot[b];
            pivot[b] = t;
        }

        let max = extents(&cells);

        for axis in Axis::ALL {
            if !self.rng.gen_bool(0.5) {
                continue;
            }
            for c in &mut cells {
                c[axis] = max[axis] - c[axis];
            }
            pivot[axis] = max[axis] as f32 - pivot[axis];
        }

        let span_x = (width as i32 - max.x).max(1);
        let span_z = (width as i32 - max.z).max(1);
        let offset = Vec3i::new(
            self.rng.gen_range(0..span_x),
            height as i32 - max.y - 1,
            self.rng.gen_range(0..span_z),
        );
        for c in &mut cells {
            *c = *c + offset;
        }
        pivot = pivot + offset.to_vec3();

        log::trace!(target: "terrain", "built {preset:?} #{id} at {offset:?}");
        Tetromino::new(preset, cells, pivot, id)
    }
}

/// Per-axis maximum of a normalized cell set.
fn extents(cells: &[Vec3i]) -> Vec3i {
    cells.iter().fold(Vec3i::default(), |m, c| {
        Vec3i::new(m.x.max(c.x), m.y.max(c.y), m.z.max(c.z))
    })
}

impl Default for TetrominoFactory {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::VoxelGrid;
    use crate::tetromino::{MISALIGN_THRESHOLD, TransformContext};

    #[test]
    fn same_seed_same_pieces() {
        let mut a = TetrominoFactory::new(Some(7));
        let mut b = TetrominoFactory::new(Some(7));
        for id in 0..20 {
            let ta = a.spawn_random(id, 16, 16);
            let tb = b.spawn_random(id, 16, 16);
            assert_eq!(ta.preset, tb.preset);
            assert_eq!(ta.positions(), tb.positions());
            assert_eq!(ta.pivot(), tb.pivot());
        }
    }

    #[test]
    fn spawned_piece_hugs_ceiling_inside_arena() {
        let mut f = TetrominoFactory::new(Some(42));
        let grid = VoxelGrid::new(6, 10);
        for id in 0..200 {
            let t = f.spawn_random(id, 6, 10);
            assert_eq!(t.id(), id);
            assert!(!t.falling);
            assert_eq!(t.owner, None);
            assert!(t.positions().iter().all(|&p| grid.in_bounds(p)));
            let top = t.positions().iter().map(|p| p.y).max().unwrap();
            assert_eq!(top, 9);
            let mut unique = t.positions().to_vec();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 4);
        }
    }

    #[test]
    fn scrambled_pieces_still_rotate_on_lattice() {
        let mut f = TetrominoFactory::new(Some(3));
        for id in 0..50 {
            let mut grid = VoxelGrid::new(16, 16);
            let spawned = f.spawn_random(0, 16, 16);
            // recentre on the arena so every rotation stays in bounds
            let shift = Vec3i::new(8, 8, 8) - spawned.pivot().floor_to_lattice();
            let cells = spawned.positions().iter().map(|&p| p + shift).collect();
            let mut t = Tetromino::new(
                spawned.preset,
                cells,
                spawned.pivot() + shift.to_vec3(),
                0,
            );
            t.write(&mut grid);
            let mut before = t.positions().to_vec();
            before.sort();
            let ctx = TransformContext {
                falling: &[false],
                players: &[],
                fall_progress: 0.0,
                misalign_threshold: MISALIGN_THRESHOLD,
            };
            for axis in Axis::ALL {
                for _ in 0..4 {
                    assert!(t.rotate(&mut grid, axis, false, &ctx), "piece {id} {axis:?}");
                }
            }
            let mut after = t.positions().to_vec();
            after.sort();
            assert_eq!(before, after);
            assert_eq!(grid.occupied_count(), 4);
        }
    }

    #[test]
    fn every_preset_can_come_up() {
        let mut f = TetrominoFactory::new(Some(11));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(f.random_preset());
        }
        assert_eq!(seen.len(), Preset::ALL.len());
    }
}
