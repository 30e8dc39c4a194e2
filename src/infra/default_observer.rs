use tracing::{debug, info};

use crate::infra::SimulationObserver;
use crate::rl::TickOutcome;
use crate::state::Actor;

pub struct DefaultObserver;

impl SimulationObserver for DefaultObserver {
    fn on_episode_start(&mut self, episode: usize, actors: &[Actor]) {
        info!("Episode {} started", episode);
        for actor in actors {
            let coord = actor.coordinate();
            info!(
                "- actor {} ({}) at ({}, {})",
                actor.id,
                actor.policy().name(),
                coord.x,
                coord.y
            );
        }
    }

    fn on_tick(&mut self, _episode: usize, tick: usize, actor: &Actor, outcome: &TickOutcome) {
        let pos = actor.position();
        debug!(
            "tick: {}, actor: {}, {} {:?}, pos: ({:.1}, {:.1})",
            tick,
            actor.id,
            outcome.kind(),
            outcome.action(),
            pos.x,
            pos.y
        );
    }

    fn on_goal_reached(&mut self, episode: usize, tick: usize, actor: &Actor) {
        info!("Actor {} reached the goal in episode {} at tick {}", actor.id, episode, tick);
    }

    fn on_episode_finished(&mut self, episode: usize, steps: usize, reached_goal: bool) {
        if reached_goal {
            info!("Episode {} finished after {} steps: goal reached", episode, steps);
        } else {
            info!("Episode {} truncated after {} steps", episode, steps);
        }
    }
}
