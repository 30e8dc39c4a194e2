//! Decision policies: turn an observation and a legality mask into an action index

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::infra::Position;

use super::action_space::{ActionMask, NUM_ACTIONS};
use super::session::{InferenceSession, ModelStore, RawSession, SessionError};

/// Observation handed to a policy. What a policy needs is up to the policy;
/// callers must not assume one is present.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyInput {
    Absent,
    Position(Position),
    Features(Vec<f32>),
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("policy chose action {index}, outside the action space of {len}")]
    ActionOutOfRange { index: usize, len: usize },
}

impl PolicyError {
    /// A closed session means the policy was used after teardown, which is a
    /// lifecycle bug rather than a bad tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PolicyError::Session(SessionError::ClosedSession))
    }
}

/// A source of movement decisions
///
/// Returned indices must lie in `0..mask.len()`. Returning a masked-out index
/// is allowed; the resolver re-validates every move before applying it.
pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    /// Observation this policy wants for an actor at `position`
    fn observe(&self, _position: Position) -> PolicyInput {
        PolicyInput::Absent
    }

    fn select_action(&self, input: &PolicyInput, mask: &ActionMask) -> Result<usize, PolicyError>;

    /// Release whatever the policy holds. Policies without resources succeed.
    fn close(&self) -> Result<(), PolicyError> {
        Ok(())
    }
}

/// Uniform choice over the action space
///
/// By default the mask is ignored and every index is equally likely, so the
/// actor performs an unconstrained random walk and bumps into walls.
/// [`RandomPolicy::mask_aware`] restricts draws to legal actions instead.
pub struct RandomPolicy {
    rng: Mutex<StdRng>,
    num_actions: usize,
    respect_mask: bool,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            num_actions: NUM_ACTIONS,
            respect_mask: false,
        }
    }

    /// Draw only from legal actions; an all-false mask falls back to the full range.
    pub fn mask_aware(mut self) -> Self {
        self.respect_mask = true;
        self
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for RandomPolicy {
    fn name(&self) -> &str {
        if self.respect_mask {
            "random-masked"
        } else {
            "random"
        }
    }

    fn select_action(&self, _input: &PolicyInput, mask: &ActionMask) -> Result<usize, PolicyError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| PolicyError::Unavailable("random source lock poisoned".to_string()))?;

        if self.respect_mask
            && let Some(index) = mask.iter_valid().choose(&mut *rng)
        {
            return Ok(index);
        }

        Ok(rng.random_range(0..self.num_actions))
    }
}

/// Delegates every decision to a loaded model. The actor's own position is
/// the observation.
pub struct InferencePolicy<S: RawSession> {
    session: InferenceSession<S>,
}

impl<S: RawSession> InferencePolicy<S> {
    pub fn open<M>(store: &M, location: &str) -> Result<Self, SessionError>
    where
        M: ModelStore<Session = S>,
    {
        Ok(Self {
            session: InferenceSession::open(store, location)?,
        })
    }

    pub fn session(&self) -> &InferenceSession<S> {
        &self.session
    }
}

impl<S: RawSession> Policy for InferencePolicy<S> {
    fn name(&self) -> &str {
        "model"
    }

    fn observe(&self, position: Position) -> PolicyInput {
        PolicyInput::Position(position)
    }

    fn select_action(&self, input: &PolicyInput, mask: &ActionMask) -> Result<usize, PolicyError> {
        Ok(self.session.run(input, mask)?)
    }

    fn close(&self) -> Result<(), PolicyError> {
        Ok(self.session.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::session::tests::{StubBehavior, StubStore};
    use std::sync::atomic::Ordering;

    const TRIALS: usize = 40_000;

    fn histogram(policy: &RandomPolicy, mask: &ActionMask) -> [usize; NUM_ACTIONS] {
        let mut counts = [0; NUM_ACTIONS];
        for _ in 0..TRIALS {
            let index = policy.select_action(&PolicyInput::Absent, mask).unwrap();
            assert!(index < NUM_ACTIONS);
            counts[index] += 1;
        }
        counts
    }

    #[test]
    fn test_random_policy_is_uniform() {
        let policy = RandomPolicy::seeded(42);
        let counts = histogram(&policy, &ActionMask::all_valid());

        let expected = TRIALS as f64 / NUM_ACTIONS as f64;
        for count in counts {
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(deviation < 0.05, "counts {:?} are not uniform", counts);
        }
    }

    #[test]
    fn test_random_policy_ignores_mask() {
        // Documented behavior: masked-out actions are still drawn
        let policy = RandomPolicy::seeded(7);
        let mask = ActionMask::new([true, false, true, false]);
        let counts = histogram(&policy, &mask);

        assert!(counts[1] > 0);
        assert!(counts[3] > 0);
    }

    #[test]
    fn test_mask_aware_random_policy_stays_legal() {
        let policy = RandomPolicy::seeded(7).mask_aware();
        let mask = ActionMask::new([true, false, true, false]);
        let counts = histogram(&policy, &mask);

        assert_eq!(counts[1], 0);
        assert_eq!(counts[3], 0);
        assert!(counts[0] > 0 && counts[2] > 0);
        assert_eq!(policy.name(), "random-masked");
    }

    #[test]
    fn test_mask_aware_falls_back_when_nothing_is_legal() {
        let policy = RandomPolicy::seeded(3).mask_aware();
        let mask = ActionMask::new([false; NUM_ACTIONS]);
        let index = policy.select_action(&PolicyInput::Absent, &mask).unwrap();
        assert!(index < NUM_ACTIONS);
    }

    #[test]
    fn test_inference_policy_observes_position() {
        let store = StubStore::new(StubBehavior::Echo(2));
        let policy = InferencePolicy::open(&store, "models/ppo").unwrap();

        let input = policy.observe(Position::new(3.0, 4.0));
        assert_eq!(input, PolicyInput::Position(Position::new(3.0, 4.0)));
        assert_eq!(policy.select_action(&input, &ActionMask::all_valid()).unwrap(), 2);
    }

    #[test]
    fn test_inference_policy_close_is_fatal_after() {
        let store = StubStore::new(StubBehavior::Echo(0));
        let policy = InferencePolicy::open(&store, "models/ppo").unwrap();

        policy.close().unwrap();
        let err = policy.close().unwrap_err();
        assert!(err.is_fatal());

        let input = policy.observe(Position::new(1.0, 1.0));
        let err = policy.select_action(&input, &ActionMask::all_valid()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(store.counters.sessions_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inference_errors_are_recoverable() {
        let store = StubStore::new(StubBehavior::FailRun);
        let policy = InferencePolicy::open(&store, "models/ppo").unwrap();

        let input = policy.observe(Position::new(1.0, 1.0));
        let err = policy.select_action(&input, &ActionMask::all_valid()).unwrap_err();

        assert!(!err.is_fatal());
        assert!(matches!(err, PolicyError::Session(SessionError::Inference(_))));
    }
}
