pub mod config;
pub mod types;
pub mod waypoints;

pub use config::{ClassConfig, ConfigError, ItemStorageConfig, PodStorageConfig, StowConfig, TieBreak};
pub use types::*;
pub use waypoints::{WaypointIndex, WaypointLocator};
