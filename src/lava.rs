//! Rising lava: after a grace delay the surface climbs at a fixed rate up to a
//! ceiling, killing any player whose feet drop below it.

use std::time::Duration;

use crate::config::LavaConfig;
use crate::player::Player;

#[derive(Debug, Clone, PartialEq)]
pub struct Lava {
    /// Surface height in world units (floor plane is -0.5).
    pub height: f32,
    /// Seconds left before the lava starts rising.
    pub rise_delay: f32,
    /// World units per second.
    pub rise_speed: f32,
    pub max_height: f32,
}

impl Lava {
    pub fn new(config: &LavaConfig) -> Self {
        Self {
            height: config.start_height,
            rise_delay: config.rise_delay_secs,
            rise_speed: config.rise_speed,
            max_height: config.max_height,
        }
    }

    pub fn update(&mut self, dt: Duration) {
        if self.height >= self.max_height {
            return;
        }
        let dt = dt.as_secs_f32();
        if self.rise_delay > 0.0 {
            self.rise_delay -= dt;
            return;
        }
        self.height = (self.height + self.rise_speed * dt).min(self.max_height);
    }

    #[inline]
    pub fn is_rising(&self) -> bool {
        self.rise_delay <= 0.0 && self.height < self.max_height
    }

    pub fn submerges(&self, player: &Player) -> bool {
        player.alive && player.feet_y() < self.height
    }
}
