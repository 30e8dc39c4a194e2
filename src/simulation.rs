//! Episode driver: places actors, resolves one tick per actor per step and
//! reports everything to a [`SimulationObserver`].

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use thiserror::Error;
use tracing::{debug, error};

use crate::infra::{Coordinate, SimulationObserver};
use crate::rl::{EvaluationMetrics, MovementResolver, Policy, PolicyError, TickOutcome};
use crate::state::{Actor, Level};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("no free floor tile left to place actor {0}")]
    NoStartTile(usize),
    #[error("policy can no longer act: {0}")]
    Fatal(#[source] PolicyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    GoalReached,
    Truncated,
}

impl StepStatus {
    pub fn is_done(self) -> bool {
        self != StepStatus::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeResult {
    pub steps: usize,
    pub reached_goal: bool,
}

/// Level view where cells held by other actors are blocked
struct Occupied<'a> {
    level: &'a dyn Level,
    others: &'a [Coordinate],
}

impl Level for Occupied<'_> {
    fn is_accessible(&self, coord: Coordinate) -> bool {
        self.level.is_accessible(coord) && !self.others.contains(&coord)
    }

    fn floor_tiles(&self) -> Vec<Coordinate> {
        self.level
            .floor_tiles()
            .into_iter()
            .filter(|c| !self.others.contains(c))
            .collect()
    }

    fn goal(&self) -> Option<Coordinate> {
        self.level.goal()
    }
}

pub struct Simulation<L: Level> {
    level: L,
    policy: Arc<dyn Policy>,
    num_actors: usize,
    actors: Vec<Actor>,
    start_tiles: Vec<Coordinate>,
    resolver: MovementResolver,
    observer: Box<dyn SimulationObserver>,
    metrics: EvaluationMetrics,
    rng: StdRng,
    max_steps: usize,
    episode: usize,
    tick: usize,
    active: bool,
}

impl<L: Level> Simulation<L> {
    /// `num_actors` actors sharing `policy`. They are placed when the first
    /// episode begins.
    pub fn new(
        level: L,
        policy: Arc<dyn Policy>,
        num_actors: usize,
        observer: impl SimulationObserver + 'static,
    ) -> Self {
        Self {
            level,
            policy,
            num_actors,
            actors: Vec::new(),
            start_tiles: Vec::new(),
            resolver: MovementResolver::new(),
            observer: Box::new(observer),
            metrics: EvaluationMetrics::default(),
            rng: StdRng::from_os_rng(),
            max_steps: 100,
            episode: 0,
            tick: 0,
            active: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Tiles used for placement before falling back to random floor tiles
    pub fn with_start_tiles(mut self, start_tiles: Vec<Coordinate>) -> Self {
        self.start_tiles = start_tiles;
        self
    }

    pub fn level(&self) -> &L {
        &self.level
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn metrics(&self) -> &EvaluationMetrics {
        &self.metrics
    }

    /// Index of the current (or next) episode
    pub fn episode(&self) -> usize {
        self.episode
    }

    pub fn tick(&self) -> usize {
        self.tick
    }

    /// Place every actor on a distinct free tile, never the goal
    pub fn begin_episode(&mut self) -> Result<(), SimulationError> {
        let goal = self.level.goal();
        let mut taken: Vec<Coordinate> = Vec::with_capacity(self.num_actors);

        for id in 0..self.num_actors {
            let preferred = self
                .start_tiles
                .iter()
                .copied()
                .find(|c| !taken.contains(c) && self.level.is_accessible(*c));

            let coord = match preferred {
                Some(coord) => coord,
                None => {
                    let free: Vec<Coordinate> = self
                        .level
                        .floor_tiles()
                        .into_iter()
                        .filter(|c| Some(*c) != goal && !taken.contains(c))
                        .collect();
                    *free
                        .choose(&mut self.rng)
                        .ok_or(SimulationError::NoStartTile(id))?
                }
            };
            taken.push(coord);
        }

        if self.actors.is_empty() {
            self.actors = taken
                .iter()
                .enumerate()
                .map(|(id, coord)| Actor::new(id, *coord, self.policy.clone()))
                .collect();
        } else {
            for (actor, coord) in self.actors.iter_mut().zip(&taken) {
                actor.place(*coord);
            }
        }

        self.tick = 0;
        self.active = true;
        self.observer.on_episode_start(self.episode, &self.actors);
        Ok(())
    }

    /// Resolve one tick for every actor, in id order. An episode is begun
    /// first if none is running.
    pub fn step(&mut self) -> Result<StepStatus, SimulationError> {
        if !self.active {
            self.begin_episode()?;
        }

        self.tick += 1;
        let goal = self.level.goal();
        let mut reached_goal = false;

        for index in 0..self.actors.len() {
            let others: Vec<Coordinate> = self
                .actors
                .iter()
                .filter(|a| a.id != self.actors[index].id)
                .map(|a| a.coordinate())
                .collect();
            let view = Occupied {
                level: &self.level,
                others: &others,
            };

            let outcome = self.resolver.tick(&mut self.actors[index], &view);
            let actor = &self.actors[index];
            self.metrics.record_tick(&outcome);
            self.observer.on_tick(self.episode, self.tick, actor, &outcome);

            match outcome {
                TickOutcome::Failed(err) if err.is_fatal() => {
                    error!("actor {}: stopping simulation", actor.id);
                    self.active = false;
                    return Err(SimulationError::Fatal(err));
                }
                TickOutcome::Committed { .. } if Some(actor.coordinate()) == goal => {
                    self.observer.on_goal_reached(self.episode, self.tick, actor);
                    reached_goal = true;
                    break;
                }
                _ => {}
            }
        }

        let status = if reached_goal {
            StepStatus::GoalReached
        } else if self.tick >= self.max_steps {
            StepStatus::Truncated
        } else {
            StepStatus::Running
        };

        if status.is_done() {
            self.finish_episode(reached_goal);
        }
        Ok(status)
    }

    /// Begin a fresh episode and step it to the end
    pub fn run_episode(&mut self) -> Result<EpisodeResult, SimulationError> {
        self.begin_episode()?;
        let steps = loop {
            let status = self.step()?;
            if status.is_done() {
                break EpisodeResult {
                    steps: self.tick,
                    reached_goal: status == StepStatus::GoalReached,
                };
            }
        };
        Ok(steps)
    }

    fn finish_episode(&mut self, reached_goal: bool) {
        debug!("episode {} done after {} ticks", self.episode, self.tick);
        self.metrics.record_episode(self.tick, reached_goal);
        self.observer
            .on_episode_finished(self.episode, self.tick, reached_goal);
        self.active = false;
        self.episode += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{Action, ActionMask, PolicyInput, SessionError};
    use crate::state::GridMap;
    use std::sync::Mutex;

    struct Always(Action);

    impl Policy for Always {
        fn name(&self) -> &str {
            "always"
        }

        fn select_action(
            &self,
            _input: &PolicyInput,
            _mask: &ActionMask,
        ) -> Result<usize, PolicyError> {
            Ok(self.0.index())
        }
    }

    struct Closed;

    impl Policy for Closed {
        fn name(&self) -> &str {
            "closed"
        }

        fn select_action(
            &self,
            _input: &PolicyInput,
            _mask: &ActionMask,
        ) -> Result<usize, PolicyError> {
            Err(PolicyError::Session(SessionError::ClosedSession))
        }
    }

    #[derive(Default, Clone)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl SimulationObserver for Recorder {
        fn on_episode_start(&mut self, episode: usize, actors: &[Actor]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {} {}", episode, actors.len()));
        }

        fn on_tick(&mut self, _episode: usize, tick: usize, actor: &Actor, outcome: &TickOutcome) {
            self.events
                .lock()
                .unwrap()
                .push(format!("tick {} {} {}", tick, actor.id, outcome.kind()));
        }

        fn on_goal_reached(&mut self, _episode: usize, tick: usize, actor: &Actor) {
            self.events
                .lock()
                .unwrap()
                .push(format!("goal {} {}", tick, actor.id));
        }

        fn on_episode_finished(&mut self, episode: usize, steps: usize, reached_goal: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finished {} {} {}", episode, steps, reached_goal));
        }
    }

    fn corridor() -> GridMap {
        GridMap::from_ascii("#S..G#").unwrap()
    }

    #[test]
    fn test_walks_to_goal() {
        let level = corridor();
        let starts = level.start_tiles().to_vec();
        let recorder = Recorder::default();
        let mut sim = Simulation::new(level, Arc::new(Always(Action::East)), 1, recorder.clone())
            .with_start_tiles(starts);

        let result = sim.run_episode().unwrap();

        assert_eq!(result, EpisodeResult { steps: 3, reached_goal: true });
        assert_eq!(sim.metrics().num_goals, 1);
        assert_eq!(sim.metrics().committed, 3);
        assert_eq!(sim.episode(), 1);

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.first().map(String::as_str), Some("start 0 1"));
        assert!(events.contains(&"goal 3 0".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("finished 0 3 true"));
    }

    #[test]
    fn test_truncates_at_max_steps() {
        let level = corridor();
        let starts = level.start_tiles().to_vec();
        let mut sim = Simulation::new(level, Arc::new(Always(Action::West)), 1, Recorder::default())
            .with_start_tiles(starts)
            .with_max_steps(5);

        let result = sim.run_episode().unwrap();

        assert_eq!(result, EpisodeResult { steps: 5, reached_goal: false });
        assert_eq!(sim.metrics().rejected, 5);
        assert_eq!(sim.actors()[0].coordinate(), Coordinate::new(1, 0));
    }

    #[test]
    fn test_actors_block_each_other() {
        let level = GridMap::from_ascii("#SS.#").unwrap();
        let starts = level.start_tiles().to_vec();
        let recorder = Recorder::default();
        let mut sim = Simulation::new(level, Arc::new(Always(Action::East)), 2, recorder.clone())
            .with_start_tiles(starts);

        assert_eq!(sim.step().unwrap(), StepStatus::Running);

        assert_eq!(sim.actors()[0].coordinate(), Coordinate::new(1, 0));
        assert_eq!(sim.actors()[1].coordinate(), Coordinate::new(3, 0));
        let events = recorder.events.lock().unwrap();
        assert!(events.contains(&"tick 1 0 rejected".to_string()));
        assert!(events.contains(&"tick 1 1 committed".to_string()));
    }

    #[test]
    fn test_random_placement_avoids_goal_and_overlap() {
        let level = GridMap::from_ascii("#...G#").unwrap();
        let mut sim = Simulation::new(level, Arc::new(Always(Action::North)), 3, Recorder::default())
            .with_seed(5);

        for _ in 0..10 {
            sim.begin_episode().unwrap();
            let mut coords: Vec<Coordinate> = sim.actors().iter().map(|a| a.coordinate()).collect();
            assert!(!coords.contains(&Coordinate::new(4, 0)));
            coords.sort();
            coords.dedup();
            assert_eq!(coords.len(), 3);
        }
    }

    #[test]
    fn test_not_enough_free_tiles() {
        let level = GridMap::from_ascii("#..G#").unwrap();
        let mut sim = Simulation::new(level, Arc::new(Always(Action::East)), 3, Recorder::default());

        assert!(matches!(sim.begin_episode(), Err(SimulationError::NoStartTile(2))));
    }

    #[test]
    fn test_closed_session_stops_simulation() {
        let mut sim = Simulation::new(corridor(), Arc::new(Closed), 1, Recorder::default());

        let err = sim.step().unwrap_err();

        assert!(matches!(
            err,
            SimulationError::Fatal(PolicyError::Session(SessionError::ClosedSession))
        ));
        assert_eq!(sim.metrics().failed, 1);
    }
}
