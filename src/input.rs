//! Key bindings: two keyboard seats sharing one terminal.
//!
//! Seat 0: WASD move, Space jump, Q/E spin about Y, R/F about X, Z/C about Z.
//! Seat 1: arrows move, Enter jump, `,`/`.` about Y, `[`/`]` about X,
//! `;`/`'` about Z.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::geom::Axis;
use crate::player::Seat;

/// Number of seats with key bindings.
pub const SEATS: usize = 2;

/// Planar direction as seen in the top-down view: forward is -z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dir {
    Left,
    Right,
    Forward,
    Back,
}

impl Dir {
    /// Lattice step `(dx, dz)`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
            Self::Forward => (0, -1),
            Self::Back => (0, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeatAction {
    Move(Dir),
    Jump,
    Rotate { axis: Axis, clockwise: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Seat(Seat, SeatAction),
    Pause,
    Quit,
    None,
}

pub fn key_to_action(key: KeyEvent) -> Action {
    let KeyEvent { code, modifiers, .. } = key;
    if !(modifiers.is_empty() || modifiers == KeyModifiers::SHIFT) {
        return Action::None;
    }
    let code = match code {
        KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
        other => other,
    };
    let rot = |axis, clockwise| SeatAction::Rotate { axis, clockwise };
    let (seat, action) = match code {
        KeyCode::Esc => return Action::Quit,
        KeyCode::Char('p') => return Action::Pause,

        KeyCode::Char('a') => (0, SeatAction::Move(Dir::Left)),
        KeyCode::Char('d') => (0, SeatAction::Move(Dir::Right)),
        KeyCode::Char('w') => (0, SeatAction::Move(Dir::Forward)),
        KeyCode::Char('s') => (0, SeatAction::Move(Dir::Back)),
        KeyCode::Char(' ') => (0, SeatAction::Jump),
        KeyCode::Char('q') => (0, rot(Axis::Y, false)),
        KeyCode::Char('e') => (0, rot(Axis::Y, true)),
        KeyCode::Char('r') => (0, rot(Axis::X, true)),
        KeyCode::Char('f') => (0, rot(Axis::X, false)),
        KeyCode::Char('z') => (0, rot(Axis::Z, false)),
        KeyCode::Char('c') => (0, rot(Axis::Z, true)),

        KeyCode::Left => (1, SeatAction::Move(Dir::Left)),
        KeyCode::Right => (1, SeatAction::Move(Dir::Right)),
        KeyCode::Up => (1, SeatAction::Move(Dir::Forward)),
        KeyCode::Down => (1, SeatAction::Move(Dir::Back)),
        KeyCode::Enter => (1, SeatAction::Jump),
        KeyCode::Char(',') => (1, rot(Axis::Y, false)),
        KeyCode::Char('.') => (1, rot(Axis::Y, true)),
        KeyCode::Char('[') => (1, rot(Axis::X, true)),
        KeyCode::Char(']') => (1, rot(Axis::X, false)),
        KeyCode::Char(';') => (1, rot(Axis::Z, false)),
        KeyCode::Char('\'') => (1, rot(Axis::Z, true)),

        _ => return Action::None,
    };
    Action::Seat(seat, action)
}
