pub mod allocator;
pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod geometry;
pub mod logging;
pub mod persistence;
pub mod region;
pub mod registry;
pub mod rng;
pub mod scenario;
pub mod session;
pub mod terrain;
pub mod territory;

pub use allocator::{RegionAllocator, SafetyCheck};
pub use config::Settings;
pub use error::{GameError, InvalidLink, InvariantViolation, PersistenceError};
pub use game::{Game, GameParams, PlayerId};
pub use registry::GameRegistry;
pub use session::{Session, SharedSession};
pub use territory::{BeaconGraph, BeaconId, ScoreType, TeamId, TerritoryScorer};
