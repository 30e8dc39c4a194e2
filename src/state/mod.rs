mod actor;
mod map;

pub use actor::Actor;
pub use map::{GridMap, Level, LevelError, Tile};
