use crate::rl::TickOutcome;
use crate::state::Actor;

/// Trait for observing simulation events during execution
pub trait SimulationObserver {
    /// Called after every actor has been placed for a new episode
    fn on_episode_start(&mut self, episode: usize, actors: &[Actor]);

    /// Called after each actor's tick has been resolved
    fn on_tick(&mut self, episode: usize, tick: usize, actor: &Actor, outcome: &TickOutcome);

    /// Called when an actor steps onto the goal
    fn on_goal_reached(&mut self, _episode: usize, _tick: usize, _actor: &Actor) {
        // Default implementation does nothing
    }

    /// Called when the episode ends, by goal or by step limit
    fn on_episode_finished(&mut self, episode: usize, steps: usize, reached_goal: bool);
}
