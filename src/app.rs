//! App: terminal init, main loop, tick scheduling and seat input.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;

use crate::clock::TickClock;
use crate::config::SimConfig;
use crate::input::{Action, SeatAction, key_to_action};
use crate::player::{MoveIntent, Seat};
use crate::theme::Theme;
use crate::ui::{self, LayerFade, View};
use crate::world::{PlayerEvent, SimulationWorld, TickReport};

/// How long a first press keeps a key held without a release event. Covers
/// the OS key-repeat delay on terminals that never report releases.
const HOLD_FIRST_MS: u64 = 550;
/// Hold extension per OS repeat.
const HOLD_REPEAT_MS: u64 = 120;
/// Longest frame step fed to the simulation, so a stalled terminal does not
/// teleport players through terrain.
const MAX_FRAME_DT: Duration = Duration::from_millis(100);
const FRAME: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Playing,
    Paused,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOverReason {
    /// Sole survivor of a multi-seat match.
    Winner(Seat),
    AllDead,
    /// A spawn hit terrain.
    ArenaFull,
}

pub struct App {
    config: SimConfig,
    theme: Theme,
    seats: usize,
    no_animation: bool,
    world: SimulationWorld,
    clock: TickClock,
    screen: Screen,
    game_over: Option<GameOverReason>,
    /// Held movement and jump keys, with the instant each hold lapses.
    held: HashMap<(Seat, SeatAction), Instant>,
    fade: LayerFade,
    /// Match time, paused time excluded.
    elapsed: Duration,
    last_frame: Instant,
}

impl App {
    pub fn new(config: SimConfig, theme: Theme, seats: usize, no_animation: bool) -> Self {
        let world = SimulationWorld::new(config.clone(), seats);
        let clock = TickClock::new(config.tick());
        Self {
            config,
            theme,
            seats,
            no_animation,
            world,
            clock,
            screen: Screen::Playing,
            game_over: None,
            held: HashMap::new(),
            fade: LayerFade::default(),
            elapsed: Duration::ZERO,
            last_frame: Instant::now(),
        }
    }

    fn reset(&mut self, now: Instant) {
        log::info!("restarting match");
        self.world.reset();
        self.clock.reset();
        self.screen = Screen::Playing;
        self.game_over = None;
        self.held.clear();
        self.fade = LayerFade::default();
        self.elapsed = Duration::ZERO;
        self.last_frame = now;
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags},
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode, size},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        // release events let held keys stop promptly; not every terminal has them
        if execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )
        .is_err()
        {
            log::warn!("keyboard enhancement unavailable, falling back to hold windows");
        }

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let (cols, rows) = size()?;
        let (need_w, need_h) = ui::required_size(self.config.width, self.config.height);
        if cols < need_w || rows < need_h {
            log::warn!("terminal {cols}x{rows} is smaller than the {need_w}x{need_h} layout");
        }

        self.last_frame = Instant::now();
        let result = self.run_loop(&mut terminal);

        let _ = execute!(std::io::stdout(), PopKeyboardEnhancementFlags);
        execute!(std::io::stdout(), LeaveAlternateScreen)?;
        disable_raw_mode()?;

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        loop {
            let now = Instant::now();
            terminal.draw(|f| {
                let view = View {
                    world: &self.world,
                    theme: &self.theme,
                    screen: self.screen,
                    game_over: self.game_over,
                    elapsed: self.elapsed,
                    now,
                };
                ui::draw(f, &view, &mut self.fade);
            })?;
            self.fade.finish_if_done();

            let timeout = FRAME.saturating_sub(now.elapsed());
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    if self.screen == Screen::GameOver
                        && key.kind == KeyEventKind::Press
                        && matches!(key.code, KeyCode::Char('r' | 'R'))
                    {
                        self.reset(Instant::now());
                        continue;
                    }
                    if !self.handle_action(key_to_action(key), key.kind, Instant::now()) {
                        return Ok(());
                    }
                }
            }

            self.step(Instant::now());
        }
    }

    /// Apply one key action. Returns false when the app should exit.
    fn handle_action(&mut self, action: Action, kind: KeyEventKind, now: Instant) -> bool {
        match action {
            Action::Quit if kind == KeyEventKind::Press => return false,
            Action::Pause if kind == KeyEventKind::Press => self.toggle_pause(now),
            Action::Seat(seat, seat_action) if self.screen == Screen::Playing => {
                self.seat_action(seat, seat_action, kind, now);
            }
            _ => {}
        }
        true
    }

    fn toggle_pause(&mut self, now: Instant) {
        self.screen = match self.screen {
            Screen::Playing => Screen::Paused,
            Screen::Paused => {
                // paused time must not reach the simulation
                self.last_frame = now;
                Screen::Playing
            }
            Screen::GameOver => return,
        };
        self.held.clear();
        log::debug!("screen -> {:?}", self.screen);
    }

    fn seat_action(&mut self, seat: Seat, action: SeatAction, kind: KeyEventKind, now: Instant) {
        let Some(alive) = self.world.player(seat).map(|p| p.alive) else {
            return;
        };
        if alive {
            if matches!(action, SeatAction::Rotate { .. }) {
                return;
            }
            match kind {
                KeyEventKind::Press => {
                    self.held
                        .insert((seat, action), now + Duration::from_millis(HOLD_FIRST_MS));
                }
                KeyEventKind::Repeat => {
                    self.held
                        .insert((seat, action), now + Duration::from_millis(HOLD_REPEAT_MS));
                }
                KeyEventKind::Release => {
                    self.held.remove(&(seat, action));
                }
            }
            return;
        }

        if kind != KeyEventKind::Press {
            return;
        }
        match action {
            SeatAction::Move(dir) => {
                let (dx, dz) = dir.delta();
                self.world.move_controlled(seat, dx, dz);
            }
            SeatAction::Rotate { axis, clockwise } => {
                self.world.rotate_controlled(seat, axis, clockwise);
            }
            SeatAction::Jump => {}
        }
    }

    /// Movement intents per seat from the keys still held at `now`.
    fn intents(&mut self, now: Instant) -> Vec<MoveIntent> {
        self.held.retain(|_, until| *until > now);
        let mut intents = vec![MoveIntent::default(); self.seats];
        for &(seat, action) in self.held.keys() {
            let Some(intent) = intents.get_mut(seat) else {
                continue;
            };
            match action {
                SeatAction::Move(dir) => {
                    let (dx, dz) = dir.delta();
                    intent.x += dx as f32;
                    intent.z += dz as f32;
                }
                SeatAction::Jump => intent.jump = true,
                SeatAction::Rotate { .. } => {}
            }
        }
        intents
    }

    /// Advance the match by the wall time since the previous frame.
    fn step(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_frame).min(MAX_FRAME_DT);
        self.last_frame = now;
        if self.screen != Screen::Playing {
            return;
        }
        self.elapsed += dt;

        for _ in 0..self.clock.advance(dt) {
            let report = self.world.tick();
            self.on_tick(&report);
            if self.screen == Screen::GameOver {
                return;
            }
        }
        self.world.set_fall_progress(self.clock.fall_progress());

        let intents = self.intents(now);
        let events = self.world.update_players(&intents, dt);
        for event in &events {
            if let PlayerEvent::Died { seat, cause } = event {
                self.held.retain(|(s, _), _| s != seat);
                log::debug!("seat {seat} out ({cause:?}) at {:.1}s", self.elapsed.as_secs_f32());
            }
        }
        self.check_match_over();
    }

    fn on_tick(&mut self, report: &TickReport) {
        if !report.destroyed.is_empty() && !self.no_animation {
            self.fade.start(&report.destroyed);
        }
        if cfg!(debug_assertions) {
            if let Err(err) = self.world.check_invariants() {
                log::error!(target: "terrain", "tick {}: {err}", report.tick);
            }
        }
        if report.spawn_blocked {
            self.end_match(GameOverReason::ArenaFull);
        }
    }

    fn check_match_over(&mut self) {
        let alive: Vec<Seat> = self
            .world
            .players()
            .iter()
            .filter(|p| p.alive)
            .map(|p| p.seat)
            .collect();
        if let Some(reason) = match_outcome(&alive, self.seats) {
            self.end_match(reason);
        }
    }

    fn end_match(&mut self, reason: GameOverReason) {
        log::info!(
            "match over after {} ticks, {:.1}s: {reason:?}",
            self.world.tick_count(),
            self.elapsed.as_secs_f32()
        );
        self.screen = Screen::GameOver;
        self.game_over = Some(reason);
        self.held.clear();
    }
}

/// Whether the match is decided given the seats still alive.
fn match_outcome(alive: &[Seat], seats: usize) -> Option<GameOverReason> {
    match alive {
        [] => Some(GameOverReason::AllDead),
        [seat] if seats > 1 => Some(GameOverReason::Winner(*seat)),
        _ => None,
    }
}
