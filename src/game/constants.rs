//! World constants shared by the authoritative server and client reconciliation

use serde::{Deserialize, Serialize};

/// Tick interval in milliseconds (20 Hz)
pub const TICK_MS: u64 = 50;
/// Upper bound for a single tick's measured elapsed time
pub const MAX_TICK_DT_MS: u64 = 200;

/// Movement speed in pixels per second
pub const SPEED: f32 = 220.0;
pub const WORLD_TILES: u32 = 1000;
pub const TILE_SIZE: u32 = 64;
pub const WORLD_SIZE: f32 = (WORLD_TILES * TILE_SIZE) as f32;
/// Two free players at or under this distance become engaged
pub const TOUCH_RADIUS: f32 = 32.0;
/// A target intent is considered reached under this distance
pub const ARRIVE_EPSILON: f32 = 1.0;

/// Spawn area (both axes)
pub const SPAWN_MIN: f32 = 2000.0;
pub const SPAWN_MAX: f32 = 10000.0;

pub const MAX_HP: i32 = 100;
pub const STRIKE_DAMAGE: i32 = 18;
pub const HEAL_AMOUNT: i32 = 15;
/// Cumulative strikes required before either side may flee
pub const FLEE_MIN_STRIKES: u32 = 3;
/// Item kind awarded to the winner of a knockout
pub const DUEL_LOOT_BASE_TYPE: &str = "duel_trophy";

/// Inbound frames above this size close the connection
pub const MAX_MSG_BYTES: usize = 2048;
/// Token bucket capacity and refill rate, messages per second
pub const MAX_MSG_RATE: u32 = 50;

pub const CHAT_MAX_CHARS: usize = 180;
pub const NAME_MAX_CHARS: usize = 16;

/// Client render delay behind the newest snapshot
pub const INTERP_DELAY_MS: f64 = 100.0;
/// How much snapshot history the client keeps
pub const SNAPSHOT_RETENTION_MS: f64 = 1000.0;
/// Predicted and authoritative positions further apart than this are hard-snapped
pub const PREDICTION_SNAP_DISTANCE: f32 = 96.0;

/// Constants sent to clients on welcome so both sides integrate identically
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameConstants {
    pub tick_ms: u64,
    pub speed: f32,
    pub world_tiles: u32,
    pub tile_size: u32,
    pub world_size: f32,
    pub touch_radius: f32,
    pub max_hp: i32,
    pub strike_damage: i32,
    pub heal_amount: i32,
    pub flee_min_strikes: u32,
}

impl GameConstants {
    pub const fn current() -> Self {
        Self {
            tick_ms: TICK_MS,
            speed: SPEED,
            world_tiles: WORLD_TILES,
            tile_size: TILE_SIZE,
            world_size: WORLD_SIZE,
            touch_radius: TOUCH_RADIUS,
            max_hp: MAX_HP,
            strike_damage: STRIKE_DAMAGE,
            heal_amount: HEAL_AMOUNT,
            flee_min_strikes: FLEE_MIN_STRIKES,
        }
    }
}

impl Default for GameConstants {
    fn default() -> Self {
        Self::current()
    }
}
