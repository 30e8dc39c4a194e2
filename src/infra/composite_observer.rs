use crate::infra::SimulationObserver;
use crate::rl::TickOutcome;
use crate::state::Actor;

pub struct CompositeObserver {
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Box<dyn SimulationObserver>>) -> Self {
        Self { observers }
    }
}

impl SimulationObserver for CompositeObserver {
    fn on_episode_start(&mut self, episode: usize, actors: &[Actor]) {
        for observer in &mut self.observers {
            observer.on_episode_start(episode, actors);
        }
    }

    fn on_tick(&mut self, episode: usize, tick: usize, actor: &Actor, outcome: &TickOutcome) {
        for observer in &mut self.observers {
            observer.on_tick(episode, tick, actor, outcome);
        }
    }

    fn on_goal_reached(&mut self, episode: usize, tick: usize, actor: &Actor) {
        for observer in &mut self.observers {
            observer.on_goal_reached(episode, tick, actor);
        }
    }

    fn on_episode_finished(&mut self, episode: usize, steps: usize, reached_goal: bool) {
        for observer in &mut self.observers {
            observer.on_episode_finished(episode, steps, reached_goal);
        }
    }
}
