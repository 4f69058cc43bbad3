//! Theme loading: btop-style `theme[key]="value"` files mapped onto arena
//! colours (piece blocks, lava, player seats, floor and chrome).

use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::Palette;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    /// Block colours by preset colour slot (0..6).
    pub blocks: [Color; 6],
    /// Seat colours; seats past the end wrap around.
    pub players: [Color; 4],
    pub lava: Color,
    /// Lava surface row, drawn brighter than the body.
    pub lava_crest: Color,
    /// Empty arena cells.
    pub bg: Color,
    /// Floor strip under layer 0.
    pub floor: Color,
    pub div_line: Color,
    pub main_fg: Color,
    pub title: Color,
    /// Dead seats and other secondary text.
    pub inactive_fg: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

const fn rgb(hex: u32) -> Color {
    Color::Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

impl Default for Theme {
    fn default() -> Self {
        Self::onedark()
    }
}

impl Theme {
    /// One Dark values, as in `onedark.theme`.
    pub const fn onedark() -> Self {
        Self {
            blocks: [
                rgb(0x98C379),
                rgb(0xE5C07B),
                rgb(0xE06C75),
                rgb(0x61AFEF),
                rgb(0xC678DD),
                rgb(0x56B6C2),
            ],
            players: [rgb(0xFFFFFF), rgb(0xD19A66), rgb(0x7FDBCA), rgb(0xF78C6C)],
            lava: rgb(0xBE5046),
            lava_crest: rgb(0xFF8C42),
            bg: rgb(0x31353F),
            floor: rgb(0x4B5263),
            div_line: rgb(0x3F444F),
            main_fg: rgb(0xABB2BF),
            title: rgb(0xE5C07B),
            inactive_fg: rgb(0x5C6370),
        }
    }

    /// Load a btop-style theme file. A missing path falls back to One Dark;
    /// unknown or malformed keys keep their One Dark value.
    pub fn load(path: Option<&Path>, palette: Palette) -> Result<Self, ThemeError> {
        let mut theme = match path {
            Some(p) if p.exists() => {
                let s = std::fs::read_to_string(p)?;
                Self::from_map(&parse_theme_file(&s))
            }
            _ => Self::onedark(),
        };
        theme.apply_palette(palette);
        Ok(theme)
    }

    pub fn apply_palette(&mut self, palette: Palette) {
        match palette {
            Palette::Normal => {}
            Palette::HighContrast => {
                self.blocks = [
                    rgb(0x00FF00),
                    rgb(0xFFFF00),
                    rgb(0xFF0000),
                    rgb(0x0088FF),
                    rgb(0xFF00FF),
                    rgb(0x00FFFF),
                ];
                self.players = [rgb(0xFFFFFF), rgb(0xFF8800), rgb(0x88FF88), rgb(0xFF88FF)];
                self.lava = rgb(0xFF3300);
                self.lava_crest = rgb(0xFFAA00);
            }
            Palette::Colorblind => {
                // Paul Tol's bright scheme; lava stays clear of the block hues
                self.blocks = [
                    rgb(0x0077BB),
                    rgb(0xEE7733),
                    rgb(0x009988),
                    rgb(0x33BBEE),
                    rgb(0xEE3377),
                    rgb(0xBBBB00),
                ];
                self.players = [rgb(0xFFFFFF), rgb(0xBBBBBB), rgb(0x66CCEE), rgb(0xCCBB44)];
                self.lava = rgb(0xCC3311);
                self.lava_crest = rgb(0xFFAA77);
            }
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).and_then(|v| parse_hex(v).ok());
        let base = Self::onedark();
        let pick = |keys: &[&str], fallback: Color| {
            keys.iter().find_map(|&k| get(k)).unwrap_or(fallback)
        };
        Self {
            blocks: [
                pick(&["mem_box", "cpu_start"], base.blocks[0]),
                pick(&["title", "cpu_mid"], base.blocks[1]),
                pick(&["cpu_end", "temp_end"], base.blocks[2]),
                pick(&["cpu_box"], base.blocks[3]),
                pick(&["net_box"], base.blocks[4]),
                pick(&["hi_fg", "proc_misc"], base.blocks[5]),
            ],
            players: [
                pick(&["selected_fg", "main_fg"], base.players[0]),
                pick(&["temp_mid"], base.players[1]),
                pick(&["free_start"], base.players[2]),
                pick(&["used_mid"], base.players[3]),
            ],
            lava: pick(&["temp_end", "cpu_end"], base.lava),
            lava_crest: pick(&["temp_mid", "cpu_mid"], base.lava_crest),
            bg: pick(&["meter_bg"], base.bg),
            floor: pick(&["inactive_fg"], base.floor),
            div_line: pick(&["div_line"], base.div_line),
            main_fg: pick(&["main_fg"], base.main_fg),
            title: pick(&["title"], base.title),
            inactive_fg: pick(&["inactive_fg"], base.inactive_fg),
        }
    }

    #[inline]
    pub fn block_color(&self, slot: u8) -> Color {
        self.blocks[slot as usize % self.blocks.len()]
    }

    #[inline]
    pub fn player_color(&self, seat: usize) -> Color {
        self.players[seat % self.players.len()]
    }
}

/// Parse a btop-style theme file into key -> value.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    s.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let rest = line.strip_prefix("theme[")?;
            let (key, rest) = rest.split_once(']')?;
            let (_, value) = rest.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (!value.is_empty()).then(|| (key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Parse "#RRGGBB" or "#RGB".
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_matches('"').trim_matches('\'').trim_start_matches('#');
    let invalid = || ThemeError::InvalidHex(s.to_string());
    let channel = |range: std::ops::Range<usize>| {
        s.get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .ok_or_else(invalid)
    };
    match s.len() {
        6 => Ok(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
        3 => Ok(Color::Rgb(
            channel(0..1)? * 17,
            channel(1..2)? * 17,
            channel(2..3)? * 17,
        )),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!(parse_hex("#98C379").unwrap(), Color::Rgb(0x98, 0xC3, 0x79));
        assert_eq!(parse_hex("#FFF").unwrap(), Color::Rgb(255, 255, 255));
        assert!(parse_hex("#12345").is_err());
        assert!(parse_hex("#GG0000").is_err());
    }

    #[test]
    fn rgb_const_matches_parser() {
        assert_eq!(rgb(0x31353F), parse_hex("#31353F").unwrap());
    }

    #[test]
    fn theme_file_lines() {
        let map = parse_theme_file(
            "# comment\ntheme[meter_bg]=\"#31353F\"\ntheme[title]='#FFF'\nnot a theme line\n",
        );
        assert_eq!(map.get("meter_bg").map(String::as_str), Some("#31353F"));
        assert_eq!(map.get("title").map(String::as_str), Some("#FFF"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn file_keys_override_defaults() {
        let map = parse_theme_file("theme[temp_end]=\"#112233\"\ntheme[main_fg]=\"#000\"");
        let theme = Theme::from_map(&map);
        assert_eq!(theme.lava, Color::Rgb(0x11, 0x22, 0x33));
        assert_eq!(theme.main_fg, Color::Rgb(0, 0, 0));
        assert_eq!(theme.bg, Theme::onedark().bg);
    }

    #[test]
    fn missing_file_uses_palette_defaults() {
        let theme = Theme::load(Some(Path::new("/no/such.theme")), Palette::HighContrast).unwrap();
        assert_eq!(theme.block_color(2), Color::Rgb(255, 0, 0));
        assert_eq!(theme.player_color(5), theme.players[1]);
    }
}
