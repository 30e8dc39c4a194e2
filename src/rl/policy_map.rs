//! Policy map - the action a policy picks on every floor tile, drawn as arrows

use std::collections::BTreeMap;

use crate::infra::Coordinate;
use crate::state::Level;

use super::action_space::{Action, ActionMask};
use super::policy::Policy;

#[derive(Debug, Clone, Default)]
pub struct PolicyMap {
    /// `None` where the policy failed to decide
    entries: BTreeMap<Coordinate, Option<Action>>,
}

impl PolicyMap {
    /// Ask `policy` once per non-goal floor tile
    pub fn evaluate(level: &dyn Level, policy: &dyn Policy) -> Self {
        let goal = level.goal();
        let entries = level
            .floor_tiles()
            .into_iter()
            .filter(|c| Some(*c) != goal)
            .map(|coord| {
                let position = coord.into();
                let mask = ActionMask::build(level, position);
                let input = policy.observe(position);
                let action = policy
                    .select_action(&input, &mask)
                    .ok()
                    .and_then(Action::from_index);
                (coord, action)
            })
            .collect();

        Self { entries }
    }

    pub fn get(&self, coord: &Coordinate) -> Option<Option<Action>> {
        self.entries.get(coord).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arrow grid, top row first. Walls and void are blank, the goal is `G`,
    /// failed tiles are `?`.
    pub fn render(&self, level: &dyn Level) -> String {
        let Some(bounds) = level.state_bounds() else {
            return String::new();
        };
        let goal = level.goal();

        let mut output = String::new();
        for y in (bounds.min_y..=bounds.max_y).rev() {
            for x in bounds.min_x..=bounds.max_x {
                let coord = Coordinate::new(x, y);
                let ch = if Some(coord) == goal {
                    'G'
                } else {
                    match self.entries.get(&coord) {
                        Some(Some(action)) => action.arrow(),
                        Some(None) => '?',
                        None => ' ',
                    }
                };
                output.push(ch);
            }
            output.push('\n');
        }
        output
    }
}
