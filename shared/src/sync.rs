//! Authoritative vs. visual position for replicated entities
//!
//! Every actor carries a [`SyncedEntity`]. Its `x`/`y` are the gameplay
//! position used for collision; `visual_x`/`visual_y` are only for drawing.
//! The process that controls an entity moves it with
//! [`SyncedEntity::update_local`]; everyone else receives positions from the
//! network through [`SyncedEntity::set_authoritative`] and eases toward them
//! with [`SyncedEntity::update_remote`].

use crate::SMOOTHING_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn to_i32(self) -> i32 {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Direction::Up),
            1 => Some(Direction::Down),
            2 => Some(Direction::Left),
            3 => Some(Direction::Right),
            _ => None,
        }
    }

    /// Unit vector in screen coordinates (y grows downward)
    pub fn to_vector(self) -> (f32, f32) {
        match self {
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }

    /// Facing implied by a movement vector
    ///
    /// The axis with the larger magnitude wins and its sign picks the
    /// direction; ties go to the vertical axis. A zero vector keeps `previous`.
    pub fn from_movement(move_x: f32, move_y: f32, previous: Direction) -> Direction {
        if move_x.abs() > move_y.abs() {
            if move_x > 0.0 {
                Direction::Right
            } else {
                Direction::Left
            }
        } else if move_y > 0.0 {
            Direction::Down
        } else if move_y < 0.0 {
            Direction::Up
        } else {
            previous
        }
    }
}

/// Movement and smoothing state shared by players, enemies and projectiles
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedEntity {
    pub x: f32,
    pub y: f32,
    pub visual_x: f32,
    pub visual_y: f32,
    pub direction: Direction,
    pub flash_amount: f32,
}

impl SyncedEntity {
    pub fn new(x: f32, y: f32, direction: Direction) -> Self {
        Self {
            x,
            y,
            visual_x: x,
            visual_y: y,
            direction,
            flash_amount: 0.0,
        }
    }

    /// Moves a locally controlled entity; the visual position follows at once
    pub fn update_local(&mut self, move_x: f32, move_y: f32, frame_time: f32) {
        self.x += move_x * frame_time;
        self.y += move_y * frame_time;

        self.visual_x = self.x;
        self.visual_y = self.y;

        self.direction = Direction::from_movement(move_x, move_y, self.direction);
        self.decay_flash(frame_time);
    }

    /// Eases the visual position of a remotely driven entity toward its
    /// authoritative position
    pub fn update_remote(&mut self, frame_time: f32) {
        self.direction = Direction::from_movement(
            self.x - self.visual_x,
            self.y - self.visual_y,
            self.direction,
        );

        let factor = (frame_time * SMOOTHING_RATE).clamp(0.0, 1.0);
        self.visual_x = lerp(self.visual_x, self.x, factor);
        self.visual_y = lerp(self.visual_y, self.y, factor);

        self.decay_flash(frame_time);
    }

    /// Applies a position received from the network
    pub fn set_authoritative(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    /// Snaps the visual position onto the authoritative one
    pub fn snap(&mut self) {
        self.visual_x = self.x;
        self.visual_y = self.y;
    }

    /// Starts the hit flash
    pub fn flash(&mut self) {
        self.flash_amount = 1.0;
    }

    fn decay_flash(&mut self, frame_time: f32) {
        self.flash_amount = (self.flash_amount - frame_time).max(0.0);
    }
}

pub fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}
