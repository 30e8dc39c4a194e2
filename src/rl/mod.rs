//! Policy-driven movement
//!
//! One tick for one actor:
//!
//! ```text
//! Level + Position
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ActionMask::build()                                        │
//! │  - Accessibility of each action's target cell               │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Policy::select_action()                                    │
//! │  - RandomPolicy: uniform draw                               │
//! │  - InferencePolicy: one forward pass on an InferenceSession │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  MovementResolver                                           │
//! │  - Re-validates the target cell, then commits or rejects    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod action_space;
pub mod env;
pub mod metrics;
pub mod policy;
pub mod policy_map;
pub mod resolver;
pub mod session;

// Burn-dependent modules
#[cfg(feature = "rl")]
pub mod burn_backend;

pub use action_space::{Action, ActionMask, NUM_ACTIONS};
pub use env::{DungeonEnv, EnvConfig, Observation, StepInfo, StepResult};
pub use metrics::{EvaluationMetrics, MovingAverage};
pub use policy::{InferencePolicy, Policy, PolicyError, PolicyInput, RandomPolicy};
pub use policy_map::PolicyMap;
pub use resolver::{MovementResolver, ResolverPhase, TickOutcome};
pub use session::{
    BackendError, HostTensor, InferenceSession, ModelSignature, ModelStore, RawSession,
    SessionError, TensorId,
};

#[cfg(feature = "rl")]
pub use burn_backend::{BurnModelStore, BurnSession, PolicyNet, PolicyNetConfig};
