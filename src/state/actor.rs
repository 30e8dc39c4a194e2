use std::fmt;
use std::sync::Arc;

use crate::infra::{Coordinate, Position};
use crate::rl::Policy;

/// A moving entity driven by a policy. Several actors may share one policy.
pub struct Actor {
    pub id: usize,
    position: Position,
    policy: Arc<dyn Policy>,
}

impl Actor {
    pub fn new(id: usize, start: Coordinate, policy: Arc<dyn Policy>) -> Self {
        Self {
            id,
            position: start.into(),
            policy,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn coordinate(&self) -> Coordinate {
        self.position.to_coordinate()
    }

    pub fn policy(&self) -> &Arc<dyn Policy> {
        &self.policy
    }

    /// Re-seed the actor on a tile chosen by the map provider
    pub fn place(&mut self, coord: Coordinate) {
        self.position = coord.into();
    }

    pub(crate) fn commit(&mut self, position: Position) {
        self.position = position;
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("policy", &self.policy.name())
            .finish()
    }
}
