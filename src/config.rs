//! Simulation tuning: defaults, optional TOML file, validation.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LavaConfig {
    /// Initial surface height; -0.5 is the arena floor.
    pub start_height: f32,
    pub rise_delay_secs: f32,
    /// World units per second.
    pub rise_speed: f32,
    pub max_height: f32,
}

impl Default for LavaConfig {
    fn default() -> Self {
        Self {
            start_height: -0.5,
            rise_delay_secs: 30.0,
            rise_speed: 0.05,
            max_height: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Arena extent along x and z.
    pub width: usize,
    pub height: usize,
    pub tick_ms: u64,
    /// Ticks between spawns; 0 disables spawning.
    pub spawn_every: u32,
    /// Ticks between bottom-layer destruction; 0 disables it.
    pub destroy_every: u32,
    pub misalign_threshold: f32,
    /// Player speed in world units per second.
    pub player_speed: f32,
    pub lava: LavaConfig,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            tick_ms: 500,
            spawn_every: 2,
            destroy_every: 12,
            misalign_threshold: crate::tetromino::MISALIGN_THRESHOLD,
            player_speed: 4.0,
            lava: LavaConfig::default(),
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // the widest preset spans 4 cells on one axis
        if self.width < 4 || self.height < 4 {
            return Err(ConfigError::Invalid(format!(
                "arena must be at least 4x4, got {}x{}",
                self.width, self.height
            )));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        if !(0.0..=0.5).contains(&self.misalign_threshold) {
            return Err(ConfigError::Invalid(format!(
                "misalign_threshold must be within [0, 0.5], got {}",
                self.misalign_threshold
            )));
        }
        if self.player_speed <= 0.0 {
            return Err(ConfigError::Invalid("player_speed must be positive".into()));
        }
        if self.lava.rise_speed < 0.0 {
            return Err(ConfigError::Invalid("lava.rise_speed must not be negative".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SimConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tick(), Duration::from_millis(500));
        assert_eq!((cfg.width, cfg.height), (16, 16));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = SimConfig::from_toml_str(
            r#"
            width = 10
            seed = 99

            [lava]
            rise_speed = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.width, 10);
        assert_eq!(cfg.height, 16);
        assert_eq!(cfg.seed, Some(99));
        assert_eq!(cfg.lava.rise_speed, 0.5);
        assert_eq!(cfg.lava.max_height, LavaConfig::default().max_height);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SimConfig::from_toml_str("width = 2"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SimConfig::from_toml_str("tick_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SimConfig::from_toml_str("misalign_threshold = 0.8"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            SimConfig::from_toml_str("width = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = SimConfig::load(Path::new("/nonexistent/voxtris.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
