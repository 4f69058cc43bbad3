//! Fixed-step tick driver: turns frame deltas into whole logic ticks and a
//! fractional fall progress for interpolation.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TickClock {
    tick: Duration,
    since_last_tick: Duration,
}

impl TickClock {
    pub fn new(tick: Duration) -> Self {
        debug_assert!(!tick.is_zero(), "tick length must be positive");
        Self {
            tick,
            since_last_tick: Duration::ZERO,
        }
    }

    /// Accumulate `dt` and return how many ticks are now due.
    pub fn advance(&mut self, dt: Duration) -> u32 {
        if self.tick.is_zero() {
            return 0;
        }
        self.since_last_tick += dt;
        let mut due = 0;
        while self.since_last_tick > self.tick {
            self.since_last_tick -= self.tick;
            due += 1;
        }
        due
    }

    /// How far a falling piece is still drawn above its stored layer: 1 right
    /// after a tick, easing to 0 as the next tick approaches.
    pub fn fall_progress(&self) -> f32 {
        let t = self.since_last_tick.as_secs_f32() / self.tick.as_secs_f32();
        (1.0 - t).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.since_last_tick = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_partial_frames() {
        let mut c = TickClock::new(Duration::from_millis(500));
        assert_eq!(c.advance(Duration::from_millis(200)), 0);
        assert_eq!(c.advance(Duration::from_millis(200)), 0);
        assert_eq!(c.advance(Duration::from_millis(200)), 1);
        assert_eq!(c.advance(Duration::from_millis(1250)), 2);
    }

    #[test]
    fn exact_tick_boundary_is_not_yet_due() {
        let mut c = TickClock::new(Duration::from_millis(100));
        assert_eq!(c.advance(Duration::from_millis(100)), 0);
        assert_eq!(c.fall_progress(), 0.0);
        assert_eq!(c.advance(Duration::from_millis(1)), 1);
    }

    #[test]
    fn fall_progress_decays_between_ticks() {
        let mut c = TickClock::new(Duration::from_millis(400));
        assert_eq!(c.fall_progress(), 1.0);
        c.advance(Duration::from_millis(100));
        assert!((c.fall_progress() - 0.75).abs() < 1e-5);
        c.advance(Duration::from_millis(200));
        assert!((c.fall_progress() - 0.25).abs() < 1e-5);
        c.reset();
        assert_eq!(c.fall_progress(), 1.0);
    }
}
