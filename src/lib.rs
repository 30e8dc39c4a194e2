pub mod config;
pub mod infra;
pub mod rl;
pub mod simulation;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ConfigError, PolicyKind, SimConfig};
pub use infra::{Coordinate, Position};
pub use simulation::{EpisodeResult, Simulation, SimulationError, StepStatus};
pub use state::{Actor, GridMap, Level};
