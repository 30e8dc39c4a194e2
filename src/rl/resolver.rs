//! Movement resolver - one policy decision turned into a validated position update

use tracing::{debug, error, warn};

use crate::infra::Position;
use crate::state::{Actor, Level};

use super::action_space::{Action, ActionMask};
use super::policy::PolicyError;

/// Phase of the current resolution cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverPhase {
    Idle,
    MaskBuilt,
    ActionChosen,
    Committed,
    Rejected,
}

/// Result of one tick for one actor
#[derive(Debug)]
pub enum TickOutcome {
    /// The actor moved to `position`
    Committed { action: Action, position: Position },
    /// The chosen move targeted an inaccessible cell; the actor stayed put
    Rejected { action: Action, position: Position },
    /// The policy could not decide; the actor stayed put
    Failed(PolicyError),
}

impl TickOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            TickOutcome::Committed { .. } => "committed",
            TickOutcome::Rejected { .. } => "rejected",
            TickOutcome::Failed(_) => "failed",
        }
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            TickOutcome::Committed { action, .. } | TickOutcome::Rejected { action, .. } => {
                Some(*action)
            }
            TickOutcome::Failed(_) => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, TickOutcome::Committed { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TickOutcome::Failed(err) if err.is_fatal())
    }
}

/// Apply `action` from `from` if the target cell is accessible right now.
/// Every move goes through here, whatever the mask said.
pub fn resolve_move(level: &dyn Level, from: Position, action: Action) -> Option<Position> {
    let candidate = action.apply(from);
    level
        .is_accessible(candidate.to_coordinate())
        .then_some(candidate)
}

/// Drives build mask → ask policy → re-validate → commit/reject
#[derive(Debug)]
pub struct MovementResolver {
    phase: ResolverPhase,
}

impl MovementResolver {
    pub fn new() -> Self {
        Self {
            phase: ResolverPhase::Idle,
        }
    }

    /// Phase the last tick ended in
    pub fn phase(&self) -> ResolverPhase {
        self.phase
    }

    pub fn tick(&mut self, actor: &mut Actor, level: &dyn Level) -> TickOutcome {
        self.phase = ResolverPhase::Idle;
        let position = actor.position();

        let mask = ActionMask::build(level, position);
        self.phase = ResolverPhase::MaskBuilt;

        let policy = actor.policy();
        let input = policy.observe(position);
        let index = match policy.select_action(&input, &mask) {
            Ok(index) => index,
            Err(err) => {
                if err.is_fatal() {
                    error!("actor {}: policy {} failed: {}", actor.id, policy.name(), err);
                } else {
                    warn!("actor {}: policy {} failed: {}", actor.id, policy.name(), err);
                }
                self.phase = ResolverPhase::Rejected;
                return TickOutcome::Failed(err);
            }
        };

        let Some(action) = Action::from_index(index) else {
            let err = PolicyError::ActionOutOfRange {
                index,
                len: mask.len(),
            };
            warn!("actor {}: {}", actor.id, err);
            self.phase = ResolverPhase::Rejected;
            return TickOutcome::Failed(err);
        };
        self.phase = ResolverPhase::ActionChosen;

        if !mask.is_valid(index) {
            debug!("actor {}: policy chose masked-out action {:?}", actor.id, action);
        }

        match resolve_move(level, position, action) {
            Some(next) => {
                actor.commit(next);
                self.phase = ResolverPhase::Committed;
                debug!(
                    "actor {}: {:?} ({:.1}, {:.1}) -> ({:.1}, {:.1})",
                    actor.id, action, position.x, position.y, next.x, next.y
                );
                TickOutcome::Committed {
                    action,
                    position: next,
                }
            }
            None => {
                self.phase = ResolverPhase::Rejected;
                debug!(
                    "actor {}: {:?} from ({:.1}, {:.1}) is blocked",
                    actor.id, action, position.x, position.y
                );
                TickOutcome::Rejected { action, position }
            }
        }
    }
}

impl Default for MovementResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::Coordinate;
    use crate::rl::policy::{Policy, PolicyInput, RandomPolicy};
    use crate::rl::action_space::NUM_ACTIONS;
    use crate::rl::session::SessionError;
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    struct OpenCells(HashSet<Coordinate>);

    impl OpenCells {
        /// (5,5) plus the neighbours whose mask entry is true
        fn around_five(mask: [bool; 4]) -> Self {
            let center = Coordinate::new(5, 5);
            let mut cells: HashSet<Coordinate> = [center].into_iter().collect();
            for action in Action::ALL {
                if mask[action.index()] {
                    let (dx, dy) = action.delta();
                    cells.insert(center.offset(dx, dy));
                }
            }
            Self(cells)
        }
    }

    impl Level for OpenCells {
        fn is_accessible(&self, coord: Coordinate) -> bool {
            self.0.contains(&coord)
        }

        fn floor_tiles(&self) -> Vec<Coordinate> {
            self.0.iter().copied().collect()
        }
    }

    /// Always answers the same index and records the mask it saw
    struct FixedPolicy {
        index: usize,
        seen: Mutex<Vec<ActionMask>>,
    }

    impl FixedPolicy {
        fn new(index: usize) -> Arc<Self> {
            Arc::new(Self {
                index,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Policy for FixedPolicy {
        fn name(&self) -> &str {
            "fixed"
        }

        fn select_action(
            &self,
            _input: &PolicyInput,
            mask: &ActionMask,
        ) -> Result<usize, PolicyError> {
            self.seen.lock().unwrap().push(*mask);
            Ok(self.index)
        }
    }

    struct FailingPolicy(fn() -> PolicyError);

    impl Policy for FailingPolicy {
        fn name(&self) -> &str {
            "failing"
        }

        fn select_action(
            &self,
            _input: &PolicyInput,
            _mask: &ActionMask,
        ) -> Result<usize, PolicyError> {
            Err((self.0)())
        }
    }

    #[test]
    fn test_masked_out_choice_is_rejected() {
        let level = OpenCells::around_five([true, false, true, false]);
        let policy = FixedPolicy::new(1);
        let mut actor = Actor::new(0, Coordinate::new(5, 5), policy.clone());
        let mut resolver = MovementResolver::new();

        let outcome = resolver.tick(&mut actor, &level);

        assert!(matches!(outcome, TickOutcome::Rejected { action: Action::South, .. }));
        assert_eq!(actor.position(), Position::new(5.0, 5.0));
        assert_eq!(resolver.phase(), ResolverPhase::Rejected);
        assert_eq!(
            policy.seen.lock().unwrap()[0].as_slice(),
            &[true, false, true, false]
        );
    }

    /// North of (5,5) is open while the mask is built (four queries), then
    /// closes before the move is applied.
    struct ClosingDoor {
        queries: Cell<usize>,
    }

    impl Level for ClosingDoor {
        fn is_accessible(&self, coord: Coordinate) -> bool {
            let seen = self.queries.get();
            self.queries.set(seen + 1);
            coord == Coordinate::new(5, 5) || (coord == Coordinate::new(5, 6) && seen < NUM_ACTIONS)
        }

        fn floor_tiles(&self) -> Vec<Coordinate> {
            vec![Coordinate::new(5, 5)]
        }
    }

    #[test]
    fn test_move_is_revalidated_after_mask() {
        let level = ClosingDoor {
            queries: Cell::new(0),
        };
        let policy = FixedPolicy::new(Action::North.index());
        let mut actor = Actor::new(0, Coordinate::new(5, 5), policy.clone());
        let mut resolver = MovementResolver::new();

        let outcome = resolver.tick(&mut actor, &level);

        assert!(policy.seen.lock().unwrap()[0].is_valid(Action::North.index()));
        assert!(matches!(outcome, TickOutcome::Rejected { action: Action::North, .. }));
        assert_eq!(actor.position(), Position::new(5.0, 5.0));
        assert_eq!(resolver.phase(), ResolverPhase::Rejected);
        assert_eq!(level.queries.get(), NUM_ACTIONS + 1);
    }

    #[test]
    fn test_legal_choice_is_committed() {
        let level = OpenCells::around_five([true, true, true, true]);
        let mut actor = Actor::new(0, Coordinate::new(5, 5), FixedPolicy::new(0));
        let mut resolver = MovementResolver::new();

        let outcome = resolver.tick(&mut actor, &level);

        match outcome {
            TickOutcome::Committed { action, position } => {
                assert_eq!(action, Action::North);
                assert_eq!(position, Position::new(5.0, 6.0));
            }
            other => panic!("expected commit, got {:?}", other),
        }
        assert_eq!(actor.position(), Position::new(5.0, 6.0));
        assert_eq!(resolver.phase(), ResolverPhase::Committed);
    }

    #[test]
    fn test_mask_is_rebuilt_every_tick() {
        let level = OpenCells::around_five([true, false, false, false]);
        let policy = FixedPolicy::new(0);
        let mut actor = Actor::new(0, Coordinate::new(5, 5), policy.clone());
        let mut resolver = MovementResolver::new();

        resolver.tick(&mut actor, &level);
        resolver.tick(&mut actor, &level);

        let seen = policy.seen.lock().unwrap();
        assert_eq!(seen[0].as_slice(), &[true, false, false, false]);
        // From (5,6) only the way back south is open
        assert_eq!(seen[1].as_slice(), &[false, true, false, false]);
        assert_eq!(actor.coordinate(), Coordinate::new(5, 6));
    }

    #[test]
    fn test_random_walk_never_leaves_floor() {
        let level = OpenCells::around_five([true, false, true, false]);
        let mut actor = Actor::new(0, Coordinate::new(5, 5), Arc::new(RandomPolicy::seeded(11)));
        let mut resolver = MovementResolver::new();

        let mut rejected = 0;
        for _ in 0..500 {
            let outcome = resolver.tick(&mut actor, &level);
            if !outcome.is_committed() {
                rejected += 1;
            }
            assert!(level.is_accessible(actor.coordinate()));
        }
        assert!(rejected > 0);
    }

    #[test]
    fn test_policy_failure_keeps_position() {
        let level = OpenCells::around_five([true; 4]);
        let policy = Arc::new(FailingPolicy(|| {
            PolicyError::Session(SessionError::Inference("device lost".to_string()))
        }));
        let mut actor = Actor::new(0, Coordinate::new(5, 5), policy);
        let mut resolver = MovementResolver::new();

        let outcome = resolver.tick(&mut actor, &level);

        assert!(matches!(outcome, TickOutcome::Failed(_)));
        assert!(!outcome.is_fatal());
        assert_eq!(outcome.action(), None);
        assert_eq!(actor.position(), Position::new(5.0, 5.0));
    }

    #[test]
    fn test_closed_session_is_fatal() {
        let level = OpenCells::around_five([true; 4]);
        let policy = Arc::new(FailingPolicy(|| PolicyError::Session(SessionError::ClosedSession)));
        let mut actor = Actor::new(0, Coordinate::new(5, 5), policy);

        let outcome = MovementResolver::new().tick(&mut actor, &level);

        assert!(outcome.is_fatal());
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let level = OpenCells::around_five([true; 4]);
        let mut actor = Actor::new(0, Coordinate::new(5, 5), FixedPolicy::new(9));

        let outcome = MovementResolver::new().tick(&mut actor, &level);

        assert!(matches!(
            outcome,
            TickOutcome::Failed(PolicyError::ActionOutOfRange { index: 9, len: 4 })
        ));
        assert_eq!(actor.coordinate(), Coordinate::new(5, 5));
    }
}
