//! Player bodies: locomotion, occupancy probes and push-out collision against
//! the voxel terrain.

use crate::geom::{Vec3, Vec3i};
use crate::grid::{PieceId, VoxelGrid};

/// Seat index assigned by the host's input layer.
pub type Seat = usize;

/// Body box height.
pub const BOX_HEIGHT: f32 = 1.5;
/// Body box width and depth.
pub const BOX_WIDTH: f32 = 0.5;
/// Contact skin around the box.
pub const RADIUS: f32 = 0.25;

/// Per-frame movement request for one seat. `x`/`z` are raw axis values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveIntent {
    pub x: f32,
    pub z: f32,
    pub jump: bool,
}

/// Push-out direction and penetration depth of a player/cube contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub normal: Vec3,
    pub depth: f32,
}

/// Contact between a player box centred at `player` (rounded by `RADIUS`) and
/// the unit cube centred at `cube`.
///
/// A zero normal means the box centre segment is inside the cube: there is no
/// direction to push out along.
pub fn collides(player: Vec3, cube: Vec3) -> Option<Contact> {
    let hw = BOX_WIDTH * 0.5;
    let hh = BOX_HEIGHT * 0.5;
    // nearest point in the player box to the cube centre
    let p1 = Vec3::new(
        cube.x.clamp(player.x - hw, player.x + hw),
        cube.y.clamp(player.y - hh, player.y + hh),
        cube.z.clamp(player.z - hw, player.z + hw),
    );
    // nearest point in the cube to p1
    let p2 = Vec3::new(
        p1.x.clamp(cube.x - 0.5, cube.x + 0.5),
        p1.y.clamp(cube.y - 0.5, cube.y + 0.5),
        p1.z.clamp(cube.z - 0.5, cube.z + 0.5),
    );
    let delta = p1 - p2;
    let depth = RADIUS - delta.length();
    (depth > 0.0).then(|| Contact {
        normal: delta.normalized(),
        depth,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub seat: Seat,
    /// Box centre.
    pub position: Vec3,
    pub velocity: Vec3,
    pub alive: bool,
    /// Piece this player steers once dead.
    pub controlled: Option<PieceId>,
}

impl Player {
    pub fn new(seat: Seat, position: Vec3) -> Self {
        Self {
            seat,
            position,
            velocity: Vec3::ZERO,
            alive: true,
            controlled: None,
        }
    }

    /// Lowest centre height: the skin resting on the floor plane at y = -0.5.
    #[inline]
    pub fn floor_y() -> f32 {
        RADIUS + BOX_HEIGHT * 0.5 - 0.5
    }

    #[inline]
    pub fn feet_y(&self) -> f32 {
        self.position.y - BOX_HEIGHT * 0.5
    }

    /// Integrate one frame of movement. Without a jump held the player sinks
    /// at full speed; there is no separate gravity.
    pub fn step(&mut self, intent: MoveIntent, dt: f32, speed: f32, width: usize, height: usize) {
        let planar = Vec3::new(intent.x, 0.0, intent.z).normalized();
        let vertical = if intent.jump { 1.0 } else { -1.0 };
        self.velocity = (planar + Vec3::UP * vertical) * speed;
        self.position += self.velocity * dt;

        let hw = BOX_WIDTH * 0.5;
        let max_xz = width as f32 - 0.5 - hw;
        let max_y = height as f32 - 0.5 - BOX_HEIGHT * 0.5;
        self.position.x = self.position.x.clamp(hw - 0.5, max_xz);
        self.position.z = self.position.z.clamp(hw - 0.5, max_xz);
        self.position.y = self.position.y.clamp(Self::floor_y(), max_y.max(Self::floor_y()));
    }

    /// True when the body box overlaps the unit cube at `cell`.
    pub fn position_occupied(&self, cell: Vec3i) -> bool {
        const EPS: f32 = 1e-4;
        let hw = BOX_WIDTH * 0.5;
        let hh = BOX_HEIGHT * 0.5;
        let c = cell.to_vec3();
        let overlap = |centre: f32, half: f32, cube: f32| {
            (centre - cube).abs() < half + 0.5 - EPS
        };
        overlap(self.position.x, hw, c.x)
            && overlap(self.position.y, hh, c.y)
            && overlap(self.position.z, hw, c.z)
    }

    /// Push the player out of every nearby occupied cell. `visual_offset`
    /// gives the upward draw offset of a piece (its fall fraction when falling).
    /// Returns true if the player was crushed.
    pub fn resolve_collisions(
        &mut self,
        grid: &VoxelGrid,
        visual_offset: impl Fn(PieceId) -> f32,
    ) -> bool {
        let reach_xz = BOX_WIDTH * 0.5 + RADIUS + 0.5;
        let reach_y = BOX_HEIGHT * 0.5 + RADIUS + 0.5;
        let lo = Vec3::new(
            self.position.x - reach_xz,
            // falling cells are drawn up to one layer above their stored row
            self.position.y - reach_y - 1.0,
            self.position.z - reach_xz,
        )
        .floor_to_lattice();
        let hi = Vec3::new(
            self.position.x + reach_xz,
            self.position.y + reach_y,
            self.position.z + reach_xz,
        )
        .floor_to_lattice();

        let mut crushed = false;
        for y in lo.y..=hi.y + 1 {
            for z in lo.z..=hi.z + 1 {
                for x in lo.x..=hi.x + 1 {
                    let cell = Vec3i::new(x, y, z);
                    let Some(id) = grid.get(cell) else {
                        continue;
                    };
                    let mut block = cell.to_vec3();
                    block.y += visual_offset(id);
                    if let Some(contact) = collides(self.position, block) {
                        self.position += contact.normal * contact.depth;
                        if contact.normal == Vec3::ZERO {
                            crushed = true;
                        }
                    }
                }
            }
        }
        crushed
    }
}
