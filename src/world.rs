//! The match simulation: owns the voxel grid, live pieces, players and lava,
//! and runs the per-tick terrain passes.
//!
//! A piece's id is its index in `pieces`. Removing pieces renumbers every
//! survivor and re-stamps the grid, and players holding an id are remapped.

use std::time::Duration;

use thiserror::Error;

use crate::config::SimConfig;
use crate::factory::TetrominoFactory;
use crate::geom::{Axis, Vec3, Vec3i};
use crate::grid::{PieceId, VoxelGrid};
use crate::lava::Lava;
use crate::player::{MoveIntent, Player, Seat};
use crate::tetromino::{Preset, Tetromino, TransformContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Spawned(PieceId),
    /// A live player stands in the footprint; retried next tick.
    Deferred,
    /// Terrain already fills the footprint.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Crushed,
    Lava,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Died { seat: Seat, cause: DeathCause },
    Possessed { seat: Seat, piece: PieceId },
}

/// What happened during one logic tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Index of this tick, counting from 0.
    pub tick: u64,
    pub spawned: Option<PieceId>,
    pub spawn_deferred: bool,
    /// The spawn footprint overlapped terrain: the arena is full.
    pub spawn_blocked: bool,
    /// Cells removed from layer 0.
    pub destroyed: Vec<Vec3i>,
    /// Pieces dropped because they ran out of cells.
    pub removed_pieces: usize,
    pub landed: Vec<PieceId>,
    pub possessed: Vec<(Seat, PieceId)>,
}

/// One occupied cell as the renderer sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderBlock {
    pub cell: Vec3i,
    /// Upward draw offset: the fall progress for falling pieces, else 0.
    pub fall_offset: f32,
    pub piece: PieceId,
    pub preset: Preset,
    pub owner: Option<Seat>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("piece at index {index} carries id {id}")]
    IdMismatch { index: usize, id: PieceId },

    #[error("piece {0} has no cells")]
    EmptyPiece(PieceId),

    #[error("piece {id} holds out-of-bounds cell {cell:?}")]
    OutOfBounds { id: PieceId, cell: Vec3i },

    #[error("piece {id} lists {cell:?} but the grid holds {found:?}")]
    CellMismatch {
        id: PieceId,
        cell: Vec3i,
        found: Option<PieceId>,
    },

    #[error("grid cell {cell:?} holds {id}, which no live piece lists")]
    StaleCell { cell: Vec3i, id: PieceId },
}

#[derive(Debug, Clone)]
pub struct SimulationWorld {
    config: SimConfig,
    grid: VoxelGrid,
    pieces: Vec<Tetromino>,
    players: Vec<Player>,
    lava: Lava,
    factory: TetrominoFactory,
    tick_count: u64,
    fall_progress: f32,
    spawn_pending: bool,
}

impl SimulationWorld {
    /// Fresh arena with `seats` players standing in its corners.
    pub fn new(config: SimConfig, seats: usize) -> Self {
        let grid = VoxelGrid::new(config.width, config.height);
        let players = (0..seats)
            .map(|seat| Player::new(seat, spawn_point(seat, config.width)))
            .collect();
        let lava = Lava::new(&config.lava);
        let factory = TetrominoFactory::new(config.seed);
        log::info!(
            target: "terrain",
            "new arena {w}x{h}x{w}, {seats} players, seed {:?}",
            config.seed,
            w = config.width,
            h = config.height,
        );
        Self {
            config,
            grid,
            pieces: Vec::new(),
            players,
            lava,
            factory,
            tick_count: 0,
            fall_progress: 0.0,
            spawn_pending: false,
        }
    }

    /// Start a new match in the same arena: empty grid, fresh players, lava
    /// and piece sequence.
    pub fn reset(&mut self) {
        self.grid.clear();
        self.pieces.clear();
        let width = self.config.width;
        for player in &mut self.players {
            *player = Player::new(player.seat, spawn_point(player.seat, width));
        }
        self.lava = Lava::new(&self.config.lava);
        self.factory = TetrominoFactory::new(self.config.seed);
        self.tick_count = 0;
        self.fall_progress = 0.0;
        self.spawn_pending = false;
        log::info!(target: "terrain", "arena reset");
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    pub fn pieces(&self) -> &[Tetromino] {
        &self.pieces
    }

    pub fn piece(&self, id: PieceId) -> Option<&Tetromino> {
        self.pieces.get(id)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, seat: Seat) -> Option<&Player> {
        self.players.get(seat)
    }

    pub fn lava(&self) -> &Lava {
        &self.lava
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|p| p.alive).count()
    }

    #[inline]
    pub fn fall_progress(&self) -> f32 {
        self.fall_progress
    }

    /// Published by the tick driver every frame.
    pub fn set_fall_progress(&mut self, progress: f32) {
        self.fall_progress = progress.clamp(0.0, 1.0);
    }

    pub fn falling_flags(&self) -> Vec<bool> {
        self.pieces.iter().map(|p| p.falling).collect()
    }

    /// True when any live player's body overlaps `cell`.
    pub fn position_occupied(&self, cell: Vec3i) -> bool {
        self.players
            .iter()
            .any(|p| p.alive && p.position_occupied(cell))
    }

    /// Stamp a prebuilt piece into the grid, giving it the next id. The caller
    /// guarantees its cells are free and in bounds.
    pub fn insert_piece(&mut self, mut piece: Tetromino) -> PieceId {
        let id = self.pieces.len();
        piece.set_id(id);
        piece.write(&mut self.grid);
        self.pieces.push(piece);
        id
    }

    /// Run one logic tick: spawn, destroy, eligibility, fall, possession.
    pub fn tick(&mut self) -> TickReport {
        let tick = self.tick_count;
        self.tick_count += 1;
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        let spawn_due = self.config.spawn_every > 0
            && (tick % u64::from(self.config.spawn_every) == 0 || self.spawn_pending);
        if spawn_due {
            match self.spawn_piece() {
                SpawnOutcome::Spawned(id) => report.spawned = Some(id),
                SpawnOutcome::Deferred => report.spawn_deferred = true,
                SpawnOutcome::Blocked => report.spawn_blocked = true,
            }
        }

        let destroy_due = self.config.destroy_every > 0
            && tick > 0
            && tick % u64::from(self.config.destroy_every) == 0;
        if destroy_due {
            let (cells, removed) = self.destroy_bottom_layer();
            report.destroyed = cells;
            report.removed_pieces = removed;
        }

        let was_falling = self.falling_flags();
        self.update_falling();
        report.landed = was_falling
            .iter()
            .zip(&self.pieces)
            .filter(|&(&before, piece)| before && !piece.falling)
            .map(|(_, piece)| piece.id())
            .collect();

        self.fall_pieces();
        report.possessed = self.hand_off_pieces();

        log::trace!(
            target: "terrain",
            "tick {tick}: {} pieces, {} falling",
            self.pieces.len(),
            self.pieces.iter().filter(|p| p.falling).count()
        );
        report
    }

    /// Build a random piece against the ceiling and stamp it if its footprint
    /// is clear.
    pub fn spawn_piece(&mut self) -> SpawnOutcome {
        let id = self.pieces.len();
        let mut piece = self
            .factory
            .spawn_random(id, self.config.width, self.config.height);

        let overlapped: Vec<PieceId> = piece
            .positions()
            .iter()
            .filter_map(|&c| self.grid.get(c))
            .collect();
        let settled = overlapped
            .iter()
            .any(|&other| self.pieces.get(other).is_some_and(|p| !p.falling));
        if settled {
            log::info!(target: "terrain", "spawn of {:?} blocked: arena full", piece.preset);
            self.spawn_pending = false;
            return SpawnOutcome::Blocked;
        }
        if !overlapped.is_empty() {
            log::debug!(target: "terrain", "spawn deferred: falling piece in footprint");
            self.spawn_pending = true;
            return SpawnOutcome::Deferred;
        }
        if piece.positions().iter().any(|&c| self.position_occupied(c)) {
            log::debug!(target: "terrain", "spawn deferred: player in footprint");
            self.spawn_pending = true;
            return SpawnOutcome::Deferred;
        }

        self.spawn_pending = false;
        log::debug!(target: "terrain", "spawned {:?} as #{id}", piece.preset);
        // unsupported until the next eligibility pass
        piece.falling = true;
        SpawnOutcome::Spawned(self.insert_piece(piece))
    }

    /// Remove every cell on layer 0, drop emptied pieces and renumber the
    /// survivors. Returns the removed cells and how many pieces vanished.
    pub fn destroy_bottom_layer(&mut self) -> (Vec<Vec3i>, usize) {
        let ids = self.grid.layer_ids(0);
        let mut destroyed = Vec::new();
        for &id in &ids {
            destroyed.extend(self.pieces[id].positions().iter().filter(|p| p.y == 0));
            self.pieces[id].remove_bottom_layer(&mut self.grid);
        }
        if ids.is_empty() {
            return (destroyed, 0);
        }

        let before = self.pieces.len();
        let mut remap: Vec<Option<PieceId>> = vec![None; before];
        let mut survivors = Vec::with_capacity(before);
        for piece in self.pieces.drain(..) {
            if piece.is_empty() {
                continue;
            }
            remap[piece.id()] = Some(survivors.len());
            survivors.push(piece);
        }
        for (new_id, piece) in survivors.iter_mut().enumerate() {
            if piece.id() != new_id {
                piece.set_id(new_id);
                piece.write(&mut self.grid);
            }
        }
        self.pieces = survivors;

        for player in &mut self.players {
            if let Some(old) = player.controlled {
                player.controlled = remap.get(old).copied().flatten();
            }
        }

        let removed = before - self.pieces.len();
        log::info!(
            target: "terrain",
            "destroyed {} cells on layer 0, {removed} pieces gone, {} remain",
            destroyed.len(),
            self.pieces.len()
        );
        (destroyed, removed)
    }

    /// Recompute every falling flag. Each round reads the previous round's
    /// flags for all pieces; rounds repeat until nothing changes, so a piece
    /// stays falling only if every other piece right under it is falling too.
    fn update_falling(&mut self) {
        loop {
            let flags = self.falling_flags();
            for piece in &mut self.pieces {
                piece.update_falling(&self.grid, &flags);
            }
            if self.pieces.iter().map(|p| p.falling).eq(flags.iter().copied()) {
                break;
            }
        }
    }

    /// Lower every falling piece one layer. All falling footprints are
    /// cleared before any is re-stamped so pieces moving in lockstep never
    /// erase each other.
    fn fall_pieces(&mut self) {
        for piece in self.pieces.iter().filter(|p| p.falling) {
            piece.clear(&mut self.grid);
        }
        for piece in self.pieces.iter_mut().filter(|p| p.falling) {
            piece.descend();
            piece.write(&mut self.grid);
        }
    }

    /// Dead players whose piece is gone or has landed take the newest free
    /// falling piece.
    fn hand_off_pieces(&mut self) -> Vec<(Seat, PieceId)> {
        let mut claimed = Vec::new();
        for seat in 0..self.players.len() {
            if self.players[seat].alive {
                continue;
            }
            let keep = self.players[seat]
                .controlled
                .and_then(|id| self.pieces.get(id))
                .is_some_and(|p| p.falling);
            if keep {
                continue;
            }
            self.release_piece(seat);
            if let Some(id) = self.claim_piece(seat) {
                claimed.push((seat, id));
            }
        }
        claimed
    }

    /// Most recently spawned piece that is falling and nobody steers.
    pub fn available_piece(&self) -> Option<PieceId> {
        self.pieces
            .iter()
            .rev()
            .find(|p| p.falling && p.owner.is_none())
            .map(Tetromino::id)
    }

    /// Hand the available piece to a dead player.
    pub fn claim_piece(&mut self, seat: Seat) -> Option<PieceId> {
        if self.players.get(seat).is_none_or(|p| p.alive) {
            return None;
        }
        let id = self.available_piece()?;
        self.pieces[id].owner = Some(seat);
        self.players[seat].controlled = Some(id);
        log::info!(target: "players", "seat {seat} possesses piece #{id}");
        Some(id)
    }

    pub fn release_piece(&mut self, seat: Seat) {
        let Some(player) = self.players.get_mut(seat) else {
            return;
        };
        if let Some(id) = player.controlled.take() {
            if let Some(piece) = self.pieces.get_mut(id) {
                if piece.owner == Some(seat) {
                    piece.owner = None;
                }
            }
            log::debug!(target: "players", "seat {seat} releases piece #{id}");
        }
    }

    pub fn xz_move(&mut self, id: PieceId, dx: i32, dz: i32) -> bool {
        if id >= self.pieces.len() {
            return false;
        }
        let flags = self.falling_flags();
        let ctx = TransformContext {
            falling: &flags,
            players: &self.players,
            fall_progress: self.fall_progress,
            misalign_threshold: self.config.misalign_threshold,
        };
        self.pieces[id].xz_move(&mut self.grid, dx, dz, &ctx)
    }

    pub fn rotate(&mut self, id: PieceId, axis: Axis, clockwise: bool) -> bool {
        if id >= self.pieces.len() {
            return false;
        }
        let flags = self.falling_flags();
        let ctx = TransformContext {
            falling: &flags,
            players: &self.players,
            fall_progress: self.fall_progress,
            misalign_threshold: self.config.misalign_threshold,
        };
        self.pieces[id].rotate(&mut self.grid, axis, clockwise, &ctx)
    }

    /// Steer the piece a dead seat possesses.
    pub fn move_controlled(&mut self, seat: Seat, dx: i32, dz: i32) -> bool {
        match self.controlled_by(seat) {
            Some(id) => self.xz_move(id, dx, dz),
            None => false,
        }
    }

    pub fn rotate_controlled(&mut self, seat: Seat, axis: Axis, clockwise: bool) -> bool {
        match self.controlled_by(seat) {
            Some(id) => self.rotate(id, axis, clockwise),
            None => false,
        }
    }

    fn controlled_by(&self, seat: Seat) -> Option<PieceId> {
        self.players
            .get(seat)
            .filter(|p| !p.alive)
            .and_then(|p| p.controlled)
    }

    /// Per-frame player update: advance the lava, move live players, push
    /// them out of terrain and resolve deaths. `intents` is indexed by seat.
    pub fn update_players(&mut self, intents: &[MoveIntent], dt: Duration) -> Vec<PlayerEvent> {
        self.lava.update(dt);

        let (width, height) = (self.config.width, self.config.height);
        let speed = self.config.player_speed;
        let progress = self.fall_progress;
        let pieces = &self.pieces;
        let offset = |id: PieceId| {
            if pieces.get(id).is_some_and(|p| p.falling) {
                progress
            } else {
                0.0
            }
        };

        let mut events = Vec::new();
        for player in self.players.iter_mut().filter(|p| p.alive) {
            let intent = intents.get(player.seat).copied().unwrap_or_default();
            player.step(intent, dt.as_secs_f32(), speed, width, height);
            let crushed = player.resolve_collisions(&self.grid, &offset);
            let cause = if crushed {
                Some(DeathCause::Crushed)
            } else if self.lava.submerges(player) {
                Some(DeathCause::Lava)
            } else {
                None
            };
            if let Some(cause) = cause {
                player.alive = false;
                player.velocity = Vec3::ZERO;
                log::info!(target: "players", "seat {} died: {cause:?}", player.seat);
                events.push(PlayerEvent::Died {
                    seat: player.seat,
                    cause,
                });
            }
        }

        let died: Vec<Seat> = events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::Died { seat, .. } => Some(*seat),
                PlayerEvent::Possessed { .. } => None,
            })
            .collect();
        for seat in died {
            if let Some(piece) = self.claim_piece(seat) {
                events.push(PlayerEvent::Possessed { seat, piece });
            }
        }
        events
    }

    /// Every occupied cell with its draw offset.
    pub fn render_blocks(&self) -> Vec<RenderBlock> {
        self.pieces
            .iter()
            .flat_map(|piece| {
                let fall_offset = if piece.falling { self.fall_progress() } else { 0.0 };
                piece.positions().iter().map(move |&cell| RenderBlock {
                    cell,
                    fall_offset,
                    piece: piece.id(),
                    preset: piece.preset,
                    owner: piece.owner,
                })
            })
            .collect()
    }

    /// Verify that pieces and grid agree cell for cell and that ids match
    /// list positions.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut listed = 0;
        for (index, piece) in self.pieces.iter().enumerate() {
            let id = piece.id();
            if id != index {
                return Err(InvariantViolation::IdMismatch { index, id });
            }
            if piece.is_empty() {
                return Err(InvariantViolation::EmptyPiece(id));
            }
            for &cell in piece.positions() {
                if !self.grid.in_bounds(cell) {
                    return Err(InvariantViolation::OutOfBounds { id, cell });
                }
                let found = self.grid.get(cell);
                if found != Some(id) {
                    return Err(InvariantViolation::CellMismatch { id, cell, found });
                }
            }
            listed += piece.len();
        }
        if self.grid.occupied_count() != listed {
            for (cell, id) in self.grid.occupied() {
                if !self.pieces.get(id).is_some_and(|p| p.contains(cell)) {
                    return Err(InvariantViolation::StaleCell { cell, id });
                }
            }
        }
        Ok(())
    }
}

/// Corner start positions, standing on the floor.
fn spawn_point(seat: Seat, width: usize) -> Vec3 {
    let far = width as f32 - 2.0;
    let (x, z) = match seat % 4 {
        0 => (1.0, 1.0),
        1 => (far, far),
        2 => (far, 1.0),
        _ => (1.0, far),
    };
    Vec3::new(x, Player::floor_y(), z)
}
