//! Episode environment - gym-like reset/step over a level with a goal tile

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use crate::infra::{Bounds, Coordinate, Position};
use crate::state::{Level, LevelError};

use super::action_space::{Action, ActionMask};
use super::resolver::resolve_move;

/// Environment configuration
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Maximum steps per episode
    pub max_steps: usize,
    /// Reward for reaching the goal
    pub goal_reward: f32,
    /// Reward for every other step
    pub step_reward: f32,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            goal_reward: 1.0,
            step_reward: 0.0,
        }
    }
}

/// Observation returned by the environment
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Actor position `[x, y]`
    pub state: [f32; 2],
    /// Legal actions from `state`
    pub action_mask: ActionMask,
}

/// Step result from the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    /// Goal reached
    pub done: bool,
    /// Hit max steps without reaching the goal
    pub truncated: bool,
    pub info: StepInfo,
}

#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Steps taken this episode
    pub steps: usize,
    /// The move was applied
    pub moved: bool,
}

/// Single-actor navigation episode
pub struct DungeonEnv<L: Level> {
    level: L,
    config: EnvConfig,
    goal: Option<Coordinate>,
    start_tiles: Vec<Coordinate>,
    position: Position,
    steps: usize,
    rng: StdRng,
}

impl<L: Level> DungeonEnv<L> {
    pub fn new(level: L, config: EnvConfig, seed: u64) -> Result<Self, LevelError> {
        let goal = level.goal();
        let start_tiles: Vec<Coordinate> = level
            .floor_tiles()
            .into_iter()
            .filter(|c| Some(*c) != goal)
            .collect();
        let first = *start_tiles.first().ok_or(LevelError::NoFloor)?;

        Ok(Self {
            level,
            config,
            goal,
            start_tiles,
            position: first.into(),
            steps: 0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Place the actor on a random accessible, non-goal tile
    pub fn reset(&mut self) -> Observation {
        if let Some(start) = self.start_tiles.choose(&mut self.rng) {
            self.position = (*start).into();
        }
        self.steps = 0;
        self.observation()
    }

    /// Move the actor to an arbitrary position, e.g. to probe a policy
    pub fn set_state(&mut self, position: Position) -> Observation {
        self.position = position;
        self.observation()
    }

    pub fn step(&mut self, action: Action) -> StepResult {
        self.steps += 1;

        let moved = match resolve_move(&self.level, self.position, action) {
            Some(next) => {
                self.position = next;
                true
            }
            None => false,
        };

        let done = self.goal == Some(self.position.to_coordinate());
        let reward = if done {
            self.config.goal_reward
        } else {
            self.config.step_reward
        };
        let truncated = !done && self.steps >= self.config.max_steps;

        StepResult {
            observation: self.observation(),
            reward,
            done,
            truncated,
            info: StepInfo {
                steps: self.steps,
                moved,
            },
        }
    }

    pub fn observation(&self) -> Observation {
        Observation {
            state: [self.position.x, self.position.y],
            action_mask: ActionMask::build(&self.level, self.position),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Bounds of the observation space
    pub fn state_bounds(&self) -> Option<Bounds> {
        self.level.state_bounds()
    }

    pub fn start_tiles(&self) -> &[Coordinate] {
        &self.start_tiles
    }

    pub fn level(&self) -> &L {
        &self.level
    }
}
