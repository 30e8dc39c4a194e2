mod composite_observer;
mod default_observer;
mod replay;
mod simulation_observer;
mod types;

pub use composite_observer::CompositeObserver;
pub use default_observer::DefaultObserver;
pub use replay::{ReplayFile, ReplayObserver, ReplayRecord};
pub use simulation_observer::SimulationObserver;
pub use types::{Bounds, Coordinate, Position};
