//! Discrete movement actions and per-tick legality masks

use serde::Serialize;

use crate::infra::Position;
use crate::state::Level;

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 4;

/// Step length of one move, in map units
pub const STEP_SIZE: f32 = 1.0;

/// One grid move. The discriminant is the index the policies speak in.
///
/// The sign convention is shared by the mask builder, the resolver and the
/// environment: West is -x, East is +x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    North = 0,
    South = 1,
    West = 2,
    East = 3,
}

impl Action {
    pub const ALL: [Action; NUM_ACTIONS] = [Action::North, Action::South, Action::West, Action::East];

    pub fn from_index(index: usize) -> Option<Action> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Unit grid delta `(dx, dy)`
    pub fn delta(self) -> (i32, i32) {
        match self {
            Action::North => (0, 1),
            Action::South => (0, -1),
            Action::West => (-1, 0),
            Action::East => (1, 0),
        }
    }

    /// Position after taking this action from `from`
    pub fn apply(self, from: Position) -> Position {
        let (dx, dy) = self.delta();
        from.offset(dx as f32 * STEP_SIZE, dy as f32 * STEP_SIZE)
    }

    pub fn arrow(self) -> char {
        match self {
            Action::North => '^',
            Action::South => 'v',
            Action::West => '<',
            Action::East => '>',
        }
    }
}

/// Which actions are legal this tick. Valid for one resolution cycle only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionMask([bool; NUM_ACTIONS]);

impl ActionMask {
    pub fn new(mask: [bool; NUM_ACTIONS]) -> Self {
        Self(mask)
    }

    pub fn all_valid() -> Self {
        Self([true; NUM_ACTIONS])
    }

    /// Query the level for the target cell of every action, in action order.
    /// The target is computed from the current position, never cached.
    pub fn build(level: &dyn Level, position: Position) -> Self {
        let mut mask = [false; NUM_ACTIONS];
        for action in Action::ALL {
            mask[action.index()] = level.is_accessible(action.apply(position).to_coordinate());
        }
        Self(mask)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        NUM_ACTIONS
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn num_valid(&self) -> usize {
        self.0.iter().filter(|&&v| v).count()
    }

    /// Indices of legal actions
    pub fn iter_valid(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().filter(|(_, v)| **v).map(|(i, _)| i)
    }

    /// Mask as floats (1.0 = valid, 0.0 = invalid)
    pub fn as_floats(&self) -> Vec<f32> {
        self.0.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect()
    }
}
