//! Game simulation modules

pub mod constants;
pub mod duel;
pub mod error;
pub mod movement;
pub mod player;
pub mod registry;
pub mod snapshot;
pub mod world;

pub use duel::{Duel, DuelAction, DuelEnding, DuelError, DuelPhase};
pub use error::CommandError;
pub use registry::GameRegistry;
pub use world::{ConnId, GameWorld, Outbound, WorldHandle, WorldInput, WorldStats};
