//! Layout and drawing: front elevation, top-down height map, sidebar, pause
//! and game-over overlays, and the layer-destroy fade.
//!
//! Both arena views use half-blocks (▀): every terminal cell holds two
//! vertical sub-pixels, so a layer is one terminal row in the front view and
//! a falling block can sit half a layer off the grid while it eases down.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Widget};
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

use crate::app::{GameOverReason, Screen};
use crate::geom::Vec3i;
use crate::player::{BOX_HEIGHT, BOX_WIDTH, Player};
use crate::theme::Theme;
use crate::world::SimulationWorld;

/// Terminal columns per arena cell, so cells look roughly square.
const CELL_COLS: u16 = 2;
const SIDEBAR_WIDTH: u16 = 28;
const LAYER_FADE_MS: u32 = 450;

/// Everything the frame needs besides the world itself.
pub struct View<'a> {
    pub world: &'a SimulationWorld,
    pub theme: &'a Theme,
    pub screen: Screen,
    pub game_over: Option<GameOverReason>,
    pub elapsed: Duration,
    pub now: Instant,
}

/// Fade-out of the cells removed by the last layer destruction.
#[derive(Default)]
pub struct LayerFade {
    cells: Vec<Vec3i>,
    effect: Option<Effect>,
    last_process: Option<Instant>,
}

impl LayerFade {
    pub fn start(&mut self, cells: &[Vec3i]) {
        self.cells = cells.to_vec();
        self.effect = None;
        self.last_process = None;
    }

    pub fn is_active(&self) -> bool {
        !self.cells.is_empty()
    }

    /// Drop the effect once it has run its course.
    pub fn finish_if_done(&mut self) {
        if self.effect.as_ref().is_some_and(Effect::done) {
            *self = Self::default();
        }
    }
}

/// Inner rects of the three panels.
struct ArenaLayout {
    front: Rect,
    top: Rect,
}

/// Sub-pixel canvas, rows counted from the bottom.
struct Canvas {
    width: usize,
    height: usize,
    px: Vec<Option<Color>>,
}

impl Canvas {
    fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            px: vec![None; width * height],
        }
    }

    fn get(&self, x: usize, y: usize) -> Option<Color> {
        (x < self.width && y < self.height)
            .then(|| self.px[y * self.width + x])
            .flatten()
    }

    fn set(&mut self, x: i32, y: i32, color: Color) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.px[y as usize * self.width + x as usize] = Some(color);
        }
    }

    fn fill_empty(&mut self, x: usize, y: usize, color: Color) {
        if x < self.width && y < self.height && self.px[y * self.width + x].is_none() {
            self.px[y * self.width + x] = Some(color);
        }
    }
}

/// Terminal size (w, h) the whole layout needs for an arena.
pub fn required_size(width: usize, height: usize) -> (u16, u16) {
    let front_w = width as u16 * CELL_COLS + 2;
    let front_h = height as u16 + 1 + 2;
    (front_w * 2 + SIDEBAR_WIDTH, front_h)
}

pub fn draw(frame: &mut Frame, view: &View<'_>, fade: &mut LayerFade) {
    let area = frame.area();
    let layout = draw_game(frame, view, area);
    if fade.is_active() {
        apply_layer_fade(frame, view, &layout, fade);
    }
    match view.screen {
        Screen::Playing => {}
        Screen::Paused => draw_pause_overlay(frame, view.theme, area),
        Screen::GameOver => draw_game_over(frame, view, area),
    }
}

fn panel_block<'a>(theme: &Theme, title: &'a str) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(title, Style::default().fg(theme.title)))
}

fn draw_game(frame: &mut Frame, view: &View<'_>, area: Rect) -> ArenaLayout {
    let cfg = view.world.config();
    let front_w = cfg.width as u16 * CELL_COLS + 2;
    let front_h = cfg.height as u16 + 1 + 2;
    let top_h = (cfg.width as u16).div_ceil(2) + 2;
    let total_w = front_w * 2 + SIDEBAR_WIDTH;

    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(front_h),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(front_w),
            Constraint::Length(front_w),
            Constraint::Length(SIDEBAR_WIDTH),
        ])
        .split(vert[1]);
    let top_outer = Rect {
        height: top_h.min(panels[1].height),
        ..panels[1]
    };

    let front_block = panel_block(view.theme, " Front ");
    let front = front_block.inner(panels[0]);
    front_block.render(panels[0], frame.buffer_mut());
    let top_block = panel_block(view.theme, " Top ");
    let top = top_block.inner(top_outer);
    top_block.render(top_outer, frame.buffer_mut());

    draw_front(frame, view, front);
    draw_top(frame, view, top);
    draw_sidebar(frame, view, panels[2]);
    ArenaLayout { front, top }
}

fn scale_channel(c: u8, factor: f32) -> u8 {
    (f32::from(c) * factor).clamp(0.0, 255.0) as u8
}

fn shade(color: Color, factor: f32) -> Color {
    match color {
        Color::Rgb(r, g, b) => Color::Rgb(
            scale_channel(r, factor),
            scale_channel(g, factor),
            scale_channel(b, factor),
        ),
        other => other,
    }
}

fn blend(a: Color, b: Color, t: f32) -> Color {
    match (a, b) {
        (Color::Rgb(r1, g1, b1), Color::Rgb(r2, g2, b2)) => {
            let mix = |x: u8, y: u8| (f32::from(x) * (1.0 - t) + f32::from(y) * t) as u8;
            Color::Rgb(mix(r1, r2), mix(g1, g2), mix(b1, b2))
        }
        _ => a,
    }
}

/// Sub-row (half-layer) containing world height `y`; layer 0 spans rows 0 and 1.
fn sub_row(y: f32) -> i32 {
    ((y + 0.5) * 2.0).floor() as i32
}

fn player_columns(x: f32) -> std::ops::RangeInclusive<i32> {
    let cols = f32::from(CELL_COLS);
    let half = BOX_WIDTH * 0.5;
    let lo = ((x - half + 0.5) * cols).floor() as i32;
    let hi = ((x + half + 0.5) * cols).ceil() as i32 - 1;
    lo..=hi.max(lo)
}

/// Front elevation: x across, y up, nearest block along z wins.
fn draw_front(frame: &mut Frame, view: &View<'_>, inner: Rect) {
    let world = view.world;
    let theme = view.theme;
    let (w, h) = (world.config().width, world.config().height);
    let cols = CELL_COLS as i32;
    let mut canvas = Canvas::new(w * CELL_COLS as usize, h * 2);

    let mut blocks = world.render_blocks();
    // far to near so nearer blocks overwrite
    blocks.sort_by(|a, b| b.cell.z.cmp(&a.cell.z));
    for block in &blocks {
        let depth = 1.0 - 0.5 * block.cell.z as f32 / w.max(1) as f32;
        let mut color = shade(theme.block_color(block.preset.color_index()), depth);
        if let Some(owner) = block.owner {
            color = blend(color, theme.player_color(owner), 0.35);
        }
        let base = block.cell.y * 2 + (block.fall_offset * 2.0).round() as i32;
        for sy in base..base + 2 {
            for sx in block.cell.x * cols..(block.cell.x + 1) * cols {
                canvas.set(sx, sy, color);
            }
        }
    }

    for player in world.players().iter().filter(|p| p.alive) {
        let color = theme.player_color(player.seat);
        let feet = sub_row(player.feet_y());
        let head = sub_row(player.position.y + BOX_HEIGHT * 0.5 - 1e-3);
        for sy in feet..=head {
            for sx in player_columns(player.position.x) {
                canvas.set(sx, sy, color);
            }
        }
    }

    let lava = world.lava().height;
    let surface = sub_row(lava);
    if lava > -0.5 {
        for sy in 0..=surface.min(canvas.height as i32 - 1) {
            let color = if sy == surface { theme.lava_crest } else { theme.lava };
            for sx in 0..canvas.width {
                canvas.fill_empty(sx, sy as usize, color);
            }
        }
    }

    let buf = frame.buffer_mut();
    for row in 0..h {
        let ry = inner.y + row as u16;
        if ry >= inner.y + inner.height {
            break;
        }
        let layer = h - 1 - row;
        for sx in 0..canvas.width {
            let rx = inner.x + sx as u16;
            if rx >= inner.x + inner.width {
                break;
            }
            let top = canvas.get(sx, layer * 2 + 1).unwrap_or(theme.bg);
            let bot = canvas.get(sx, layer * 2).unwrap_or(theme.bg);
            buf[(rx, ry)]
                .set_symbol("▀")
                .set_style(Style::default().fg(top).bg(bot));
        }
    }
    let floor_y = inner.y + h as u16;
    if floor_y < inner.y + inner.height {
        for rx in inner.x..inner.x + (canvas.width as u16).min(inner.width) {
            buf[(rx, floor_y)]
                .set_symbol("▀")
                .set_style(Style::default().fg(theme.floor).bg(theme.bg));
        }
    }
}

/// Top-down height map: x across, z down, brighter means taller.
fn draw_top(frame: &mut Frame, view: &View<'_>, inner: Rect) {
    let world = view.world;
    let theme = view.theme;
    let grid = world.grid();
    let (w, h) = (grid.width(), grid.height());
    let cols = CELL_COLS as i32;
    let mut canvas = Canvas::new(w * CELL_COLS as usize, w);
    let lava = world.lava().height;

    for z in 0..w as i32 {
        for x in 0..w as i32 {
            let color = match grid.column_top(x, z) {
                Some((y, _)) if (y as f32 + 0.5) < lava => theme.lava,
                Some((y, id)) => {
                    let Some(piece) = world.piece(id) else { continue };
                    let lift = 0.45 + 0.55 * (y + 1) as f32 / h as f32;
                    let color = shade(theme.block_color(piece.preset.color_index()), lift);
                    match piece.owner {
                        Some(owner) => blend(color, theme.player_color(owner), 0.35),
                        None => color,
                    }
                }
                None if lava > -0.5 => theme.lava,
                None => continue,
            };
            for sx in x * cols..(x + 1) * cols {
                canvas.set(sx, z, color);
            }
        }
    }

    for player in world.players().iter().filter(|p| p.alive) {
        let z = player.position.z.round() as i32;
        for sx in player_columns(player.position.x) {
            canvas.set(sx, z, theme.player_color(player.seat));
        }
    }

    let buf = frame.buffer_mut();
    for row in 0..w.div_ceil(2) {
        let ry = inner.y + row as u16;
        if ry >= inner.y + inner.height {
            break;
        }
        for sx in 0..canvas.width {
            let rx = inner.x + sx as u16;
            if rx >= inner.x + inner.width {
                break;
            }
            let top = canvas.get(sx, row * 2).unwrap_or(theme.bg);
            let bot = canvas.get(sx, row * 2 + 1).unwrap_or(theme.bg);
            buf[(rx, ry)]
                .set_symbol("▀")
                .set_style(Style::default().fg(top).bg(bot));
        }
    }
}

fn seat_line<'a>(player: &Player, world: &SimulationWorld, theme: &Theme) -> Line<'a> {
    let name = Span::styled(
        format!("P{} ", player.seat + 1),
        Style::default()
            .fg(theme.player_color(player.seat))
            .add_modifier(Modifier::BOLD),
    );
    let status = if player.alive {
        Span::styled(
            format!(
                "x{:>4.1} y{:>4.1} z{:>4.1}",
                player.position.x, player.position.y, player.position.z
            ),
            Style::default().fg(theme.main_fg),
        )
    } else {
        let text = match player.controlled.and_then(|id| world.piece(id)) {
            Some(piece) => format!("ghost, steering {:?}", piece.preset),
            None => "ghost, waiting".to_string(),
        };
        Span::styled(text, Style::default().fg(theme.inactive_fg))
    };
    Line::from(vec![name, status])
}

fn draw_sidebar(frame: &mut Frame, view: &View<'_>, area: Rect) {
    let world = view.world;
    let theme = view.theme;
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let seats = world.players().len().max(1) as u16;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(4),
            Constraint::Length(seats + 2),
            Constraint::Fill(1),
        ])
        .split(area);

    let stat = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(label, title_style),
            Span::styled(value, fg_style),
        ])
    };
    let falling = world.pieces().iter().filter(|p| p.falling).count();
    let secs = view.elapsed.as_secs();
    let stats = vec![
        stat("Tick:    ", world.tick_count().to_string()),
        stat("Pieces:  ", world.pieces().len().to_string()),
        stat("Falling: ", falling.to_string()),
        stat(
            "Alive:   ",
            format!("{}/{}", world.alive_count(), world.players().len()),
        ),
        stat("Time:    ", format!("{:02}:{:02}", secs / 60, secs % 60)),
    ];
    Paragraph::new(Text::from(stats))
        .block(panel_block(theme, " Voxtris "))
        .render(chunks[0], frame.buffer_mut());

    let lava = world.lava();
    let lava_block = panel_block(theme, " Lava ");
    let lava_inner = lava_block.inner(chunks[1]);
    lava_block.render(chunks[1], frame.buffer_mut());
    let lava_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(lava_inner);
    let label = if lava.is_rising() {
        format!("rising, {:.2}", lava.height)
    } else if lava.rise_delay > 0.0 {
        format!("in {:.0}s", lava.rise_delay.ceil())
    } else {
        format!("still, {:.2}", lava.height)
    };
    Paragraph::new(Line::from(Span::styled(label, fg_style)))
        .render(lava_rows[0], frame.buffer_mut());
    let ratio = ((lava.height + 0.5) / (lava.max_height + 0.5)).clamp(0.0, 1.0);
    Gauge::default()
        .ratio(f64::from(ratio))
        .label("")
        .gauge_style(Style::default().fg(theme.lava).bg(theme.bg))
        .render(lava_rows[1], frame.buffer_mut());

    let seats: Vec<Line> = world
        .players()
        .iter()
        .map(|p| seat_line(p, world, theme))
        .collect();
    Paragraph::new(Text::from(seats))
        .block(panel_block(theme, " Seats "))
        .render(chunks[2], frame.buffer_mut());

    let help = vec![
        Line::from(Span::styled("P1  WASD  Space", fg_style)),
        Line::from(Span::styled("    Q/E R/F Z/C", fg_style)),
        Line::from(Span::styled("P2  Arrows Enter", fg_style)),
        Line::from(Span::styled("    ,/. [/] ;/'", fg_style)),
        Line::from(""),
        Line::from(Span::styled("P pause   Esc quit", fg_style)),
    ];
    Paragraph::new(Text::from(help))
        .block(panel_block(theme, " Keys "))
        .render(chunks[3], frame.buffer_mut());
}

/// Buffer positions showing the removed cells in both views.
fn fade_positions(view: &View<'_>, layout: &ArenaLayout, cells: &[Vec3i]) -> HashSet<(u16, u16)> {
    let h = view.world.config().height as u16;
    let mut set = HashSet::new();
    for cell in cells {
        let x0 = cell.x as u16 * CELL_COLS;
        for dx in 0..CELL_COLS {
            let front = (layout.front.x + x0 + dx, layout.front.y + h - 1);
            if layout.front.contains(Position::new(front.0, front.1)) {
                set.insert(front);
            }
            let top = (layout.top.x + x0 + dx, layout.top.y + cell.z as u16 / 2);
            if layout.top.contains(Position::new(top.0, top.1)) {
                set.insert(top);
            }
        }
    }
    set
}

/// Flash the removed cells and fade them into the background.
fn apply_layer_fade(frame: &mut Frame, view: &View<'_>, layout: &ArenaLayout, fade: &mut LayerFade) {
    let positions = fade_positions(view, layout, &fade.cells);
    let buf = frame.buffer_mut();
    for &(x, y) in &positions {
        buf[(x, y)]
            .set_symbol("▀")
            .set_style(Style::default().fg(Color::White).bg(Color::White));
    }

    let delta = fade
        .last_process
        .map_or(Duration::ZERO, |t| view.now.saturating_duration_since(t));
    let delta_ms = delta.as_millis().min(u128::from(u32::MAX)) as u32;
    fade.last_process = Some(view.now);

    let area = layout.front.union(layout.top);
    if fade.effect.is_none() {
        let filter = CellFilter::PositionFn(ref_count(move |pos: Position| {
            positions.contains(&(pos.x, pos.y))
        }));
        let bg = view.theme.bg;
        fade.effect = Some(
            fx::fade_to(bg, bg, (LAYER_FADE_MS, Interpolation::Linear))
                .with_filter(filter)
                .with_area(area),
        );
    }
    if let Some(effect) = fade.effect.as_mut() {
        frame.render_effect(effect, area, TfxDuration::from_millis(delta_ms));
    }
}

fn centered(area: Rect, w: u16, h: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(w) / 2,
        y: area.y + area.height.saturating_sub(h) / 2,
        width: w.min(area.width),
        height: h.min(area.height),
    }
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P resume    Esc quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
        )
        .render(centered(area, 28, 6), frame.buffer_mut());
}

fn draw_game_over(frame: &mut Frame, view: &View<'_>, area: Rect) {
    let theme = view.theme;
    let (title, detail) = match view.game_over {
        Some(GameOverReason::Winner(seat)) => (" Winner! ".to_string(), format!(" P{} survived ", seat + 1)),
        Some(GameOverReason::ArenaFull) => (" Arena full ".to_string(), " no room to spawn ".to_string()),
        Some(GameOverReason::AllDead) | None => (" Game Over ".to_string(), " nobody survived ".to_string()),
    };
    let secs = view.elapsed.as_secs();
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(title, Style::default().fg(Color::White).bg(Color::Red))),
        Line::from(""),
        Line::from(Span::styled(detail, Style::default().fg(theme.main_fg))),
        Line::from(Span::styled(
            format!(" {:02}:{:02}, {} ticks ", secs / 60, secs % 60, view.world.tick_count()),
            Style::default().fg(theme.main_fg),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " R restart    Esc quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(panel_block(theme, " Voxtris "))
        .render(centered(area, 32, 9), frame.buffer_mut());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_rows_split_layers_in_half() {
        assert_eq!(sub_row(-0.5), 0);
        assert_eq!(sub_row(-0.01), 0);
        assert_eq!(sub_row(0.0), 1);
        assert_eq!(sub_row(0.5), 2);
        assert_eq!(sub_row(3.2), 7);
    }

    #[test]
    fn player_spans_one_or_two_columns() {
        assert_eq!(player_columns(0.0), 0..=1);
        assert_eq!(player_columns(3.0), 6..=7);
    }

    #[test]
    fn shading_scales_rgb_only() {
        assert_eq!(shade(Color::Rgb(200, 100, 50), 0.5), Color::Rgb(100, 50, 25));
        assert_eq!(shade(Color::Red, 0.5), Color::Red);
        assert_eq!(
            blend(Color::Rgb(0, 0, 0), Color::Rgb(200, 200, 200), 0.5),
            Color::Rgb(100, 100, 100)
        );
    }

    #[test]
    fn canvas_ignores_out_of_range_writes() {
        let mut c = Canvas::new(4, 4);
        c.set(-1, 0, Color::Red);
        c.set(4, 0, Color::Red);
        c.set(1, 2, Color::Blue);
        c.fill_empty(1, 2, Color::Green);
        c.fill_empty(0, 0, Color::Green);
        assert_eq!(c.get(1, 2), Some(Color::Blue));
        assert_eq!(c.get(0, 0), Some(Color::Green));
        assert_eq!(c.get(9, 9), None);
    }

    #[test]
    fn layout_fits_default_arena() {
        let (w, h) = required_size(16, 16);
        assert_eq!(w, (16 * 2 + 2) * 2 + SIDEBAR_WIDTH);
        assert_eq!(h, 19);
    }
}
