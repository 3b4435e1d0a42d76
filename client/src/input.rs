//! Input sources for the client
//!
//! The client never polls a keyboard directly. Each render frame it asks an
//! [`InputSource`] for an [`InputFrame`]; the shipped binary drives itself
//! with [`WanderInput`], and tests use [`ScriptedInput`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Movement intent for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputFrame {
    /// Horizontal intent in `[-1, 1]`
    pub move_x: f32,
    /// Vertical intent in `[-1, 1]`, positive is down
    pub move_y: f32,
    /// Inventory slot to drop this frame
    pub drop_slot: Option<usize>,
}

impl InputFrame {
    pub fn moving(move_x: f32, move_y: f32) -> Self {
        Self {
            move_x,
            move_y,
            drop_slot: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.move_x == 0.0 && self.move_y == 0.0 && self.drop_slot.is_none()
    }
}

pub trait InputSource {
    fn sample(&mut self, frame_time: f32) -> InputFrame;
}

/// Never moves
#[derive(Debug, Default)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn sample(&mut self, _frame_time: f32) -> InputFrame {
        InputFrame::default()
    }
}

/// Plays back fixed frames for a given duration each, then idles
#[derive(Debug, Default)]
pub struct ScriptedInput {
    steps: VecDeque<(f32, InputFrame)>,
}

impl ScriptedInput {
    pub fn new(steps: impl IntoIterator<Item = (f32, InputFrame)>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty()
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self, frame_time: f32) -> InputFrame {
        let Some((remaining, frame)) = self.steps.front_mut() else {
            return InputFrame::default();
        };
        let sampled = *frame;
        // A drop fires once, not every frame of the step
        frame.drop_slot = None;

        *remaining -= frame_time;
        if *remaining <= 0.0 {
            self.steps.pop_front();
        }
        sampled
    }
}

/// Headless bot: walks in a random direction, changes its mind now and then
/// and occasionally drops its first item
#[derive(Debug)]
pub struct WanderInput {
    rng: StdRng,
    heading: (f32, f32),
    remaining: f32,
    drop_every: f32,
    until_drop: f32,
}

const HEADINGS: [(f32, f32); 9] = [
    (0.0, 0.0),
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
    (0.7071, 0.7071),
    (-0.7071, 0.7071),
    (0.7071, -0.7071),
    (-0.7071, -0.7071),
];

impl WanderInput {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let drop_every = 30.0;
        Self {
            rng,
            heading: (0.0, 0.0),
            remaining: 0.0,
            drop_every,
            until_drop: drop_every,
        }
    }
}

impl InputSource for WanderInput {
    fn sample(&mut self, frame_time: f32) -> InputFrame {
        self.remaining -= frame_time;
        if self.remaining <= 0.0 {
            self.heading = HEADINGS[self.rng.gen_range(0..HEADINGS.len())];
            self.remaining = self.rng.gen_range(0.5..2.0);
        }

        self.until_drop -= frame_time;
        let drop_slot = if self.until_drop <= 0.0 {
            self.until_drop = self.drop_every;
            Some(0)
        } else {
            None
        };

        InputFrame {
            move_x: self.heading.0,
            move_y: self.heading.1,
            drop_slot,
        }
    }
}
