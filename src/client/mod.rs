//! Client-side reconciliation: interpolation for remote entities and
//! prediction for the controlling player

pub mod interpolation;
pub mod prediction;

pub use interpolation::{EntityPose, Snapshot, SnapshotBuffer};
pub use prediction::{LocalPredictor, PendingInput};
