//! Voxtris: a local multiplayer voxel arena in the terminal. Tetrominoes rain
//! into a 3D pit, the bottom layer crumbles away, lava creeps up, and dead
//! players keep playing by steering the falling blocks.

mod app;
mod clock;
mod config;
mod factory;
mod geom;
mod grid;
mod input;
mod lava;
mod player;
mod tetromino;
mod theme;
mod ui;
mod world;

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use app::App;
use clap::{Parser, ValueEnum};
use config::SimConfig;
use log::LevelFilter;
use simplelog::WriteLogger;

fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = File::create(&args.log_file)
        .with_context(|| format!("cannot create log file {}", args.log_file.display()))?;
    WriteLogger::init(args.log_level, simplelog::Config::default(), log_file)?;

    let config = args.sim_config()?;
    log::info!("starting with {config:?}");
    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_else(|err| {
        log::warn!("theme not loaded, using defaults: {err}");
        let mut theme = theme::Theme::default();
        theme.apply_palette(args.palette);
        theme
    });

    let mut app = App::new(config, theme, usize::from(args.players), args.no_animation);
    app.run()?;
    Ok(())
}

/// Local multiplayer voxel arena in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "voxtris",
    version,
    about = "Local multiplayer voxel arena: dodge falling tetrominoes and rising lava.",
    long_about = "Voxtris drops 3D tetrominoes into a square pit. Pieces stack, the \
        bottom layer crumbles away every few ticks, and lava starts rising after a \
        grace period. Survive longer than the other player. Once you die you haunt \
        the newest falling piece and can move and spin it.\n\n\
        CONTROLS:\n  P1  WASD move   Space up   Q/E R/F Z/C rotate (ghost)\n  \
        P2  Arrows move Enter up   ,/. [/] ;/' rotate (ghost)\n  \
        P pause   Esc quit   R restart after game over\n\n\
        Settings come from --config (TOML) and are overridden by flags."
)]
pub struct Args {
    /// TOML file with simulation settings.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Arena extent along x and z, in cells.
    #[arg(long, value_name = "CELLS")]
    pub width: Option<usize>,

    /// Arena height in layers.
    #[arg(long, value_name = "LAYERS")]
    pub height: Option<usize>,

    /// Logic tick length in milliseconds.
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,

    /// Ticks between spawns (0 disables spawning).
    #[arg(long, value_name = "N")]
    pub spawn_every: Option<u32>,

    /// Ticks between bottom-layer destruction (0 disables it).
    #[arg(long, value_name = "N")]
    pub destroy_every: Option<u32>,

    /// Seed for piece generation; random when unset.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of players sharing the keyboard.
    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=input::SEATS as i64))]
    pub players: u8,

    /// Path to theme file (btop-style theme[key]=\"value\"). Uses One Dark if not set.
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Disable the layer-destroy fade.
    #[arg(long)]
    pub no_animation: bool,

    /// Where log output goes; the terminal belongs to the game.
    #[arg(long, default_value = "voxtris.log", value_name = "FILE")]
    pub log_file: PathBuf,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(long, default_value = "info", value_name = "LEVEL")]
    pub log_level: LevelFilter,
}

impl Args {
    /// File settings (or defaults) with flag overrides applied, validated.
    fn sim_config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SimConfig::default(),
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_ms = tick_ms;
        }
        if let Some(n) = self.spawn_every {
            config.spawn_every = n;
        }
        if let Some(n) = self.destroy_every {
            config.destroy_every = n;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "voxtris",
            "--width",
            "8",
            "--seed",
            "42",
            "--spawn-every",
            "0",
            "--players",
            "1",
        ]);
        let cfg = args.sim_config().unwrap();
        assert_eq!(cfg.width, 8);
        assert_eq!(cfg.height, SimConfig::default().height);
        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.spawn_every, 0);
        assert_eq!(args.players, 1);
        assert_eq!(args.log_level, LevelFilter::Info);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let args = Args::parse_from(["voxtris", "--height", "2"]);
        assert!(args.sim_config().is_err());
    }

    #[test]
    fn seat_count_is_bounded() {
        assert!(Args::try_parse_from(["voxtris", "--players", "3"]).is_err());
        assert!(Args::try_parse_from(["voxtris", "--players", "0"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
