//! Evaluation metrics for simulation runs

use std::collections::VecDeque;

use super::resolver::TickOutcome;

/// Moving average over the last `window_size` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size
            && let Some(old) = self.values.pop_front()
        {
            self.sum -= old;
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Counters across every episode of a run
#[derive(Debug, Clone)]
pub struct EvaluationMetrics {
    pub num_episodes: usize,
    /// Episodes where an actor reached the goal
    pub num_goals: usize,
    pub total_steps: usize,
    pub committed: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Recent episode lengths
    pub episode_lengths: MovingAverage,
    /// Recent goal rate
    pub goal_rate: MovingAverage,
}

impl EvaluationMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            num_episodes: 0,
            num_goals: 0,
            total_steps: 0,
            committed: 0,
            rejected: 0,
            failed: 0,
            episode_lengths: MovingAverage::new(window_size),
            goal_rate: MovingAverage::new(window_size),
        }
    }

    pub fn record_tick(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Committed { .. } => self.committed += 1,
            TickOutcome::Rejected { .. } => self.rejected += 1,
            TickOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn record_episode(&mut self, steps: usize, reached_goal: bool) {
        self.num_episodes += 1;
        self.total_steps += steps;
        if reached_goal {
            self.num_goals += 1;
        }
        self.episode_lengths.push(steps as f32);
        self.goal_rate.push(if reached_goal { 1.0 } else { 0.0 });
    }

    pub fn goal_rate(&self) -> f32 {
        if self.num_episodes > 0 {
            self.num_goals as f32 / self.num_episodes as f32
        } else {
            0.0
        }
    }

    pub fn avg_steps(&self) -> f32 {
        if self.num_episodes > 0 {
            self.total_steps as f32 / self.num_episodes as f32
        } else {
            0.0
        }
    }

    /// Share of ticks where the chosen move was applied
    pub fn commit_rate(&self) -> f32 {
        let ticks = self.committed + self.rejected + self.failed;
        if ticks > 0 {
            self.committed as f32 / ticks as f32
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        tracing::info!("=== Evaluation Summary ===");
        tracing::info!("Episodes: {}", self.num_episodes);
        tracing::info!("Goal Rate: {:.1}%", self.goal_rate() * 100.0);
        tracing::info!("Avg Steps: {:.1}", self.avg_steps());
        tracing::info!(
            "Ticks: {} committed, {} rejected, {} failed ({:.1}% committed)",
            self.committed,
            self.rejected,
            self.failed,
            self.commit_rate() * 100.0
        );
        tracing::info!(
            "Last {} episodes: length={:.1}, goal={:.1}%",
            self.episode_lengths.len(),
            self.episode_lengths.average(),
            self.goal_rate.average() * 100.0
        );
    }
}

impl Default for EvaluationMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}
