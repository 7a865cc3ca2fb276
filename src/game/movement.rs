//! Movement integration and proximity engagement for one tick

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::constants::{ARRIVE_EPSILON, MAX_TICK_DT_MS, SPEED, TOUCH_RADIUS};
use super::player::{clamp_to_world, MovementIntent};
use super::registry::GameRegistry;

/// A moved entity in the per-tick delta
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerMove {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
}

/// Output of one tick
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub moved: Vec<PlayerMove>,
    /// New mutual engagements, one entry per pair
    pub engagements: Vec<(Uuid, Uuid)>,
}

/// Measures wall-clock time between ticks, clamped to `MAX_TICK_DT_MS`
#[derive(Debug, Clone)]
pub struct TickClock {
    last: Instant,
    max_step: Duration,
}

impl TickClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            last: now,
            max_step: Duration::from_millis(MAX_TICK_DT_MS),
        }
    }

    /// Elapsed time since the previous lap
    pub fn lap(&mut self) -> Duration {
        self.lap_at(Instant::now())
    }

    pub fn lap_at(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        elapsed.min(self.max_step)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Movement system for the free-roaming world
pub struct MovementSystem;

impl MovementSystem {
    /// Advance one position along an intent.
    /// Returns (new_x, new_y, intent_after).
    pub fn step(
        x: f32,
        y: f32,
        intent: MovementIntent,
        dt: f32,
    ) -> (f32, f32, Option<MovementIntent>) {
        let step = SPEED * dt;
        match intent {
            MovementIntent::Direction { dx, dy } => {
                let nx = clamp_to_world(x + dx * step);
                let ny = clamp_to_world(y + dy * step);
                (nx, ny, Some(intent))
            }
            MovementIntent::Target { x: tx, y: ty } => {
                let dx = tx - x;
                let dy = ty - y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < ARRIVE_EPSILON {
                    return (x, y, None);
                }
                let travel = step.min(dist);
                let nx = clamp_to_world(x + dx / dist * travel);
                let ny = clamp_to_world(y + dy / dist * travel);

                let rx = tx - nx;
                let ry = ty - ny;
                if (rx * rx + ry * ry).sqrt() < ARRIVE_EPSILON {
                    (nx, ny, None)
                } else {
                    (nx, ny, Some(intent))
                }
            }
        }
    }

    /// Run one tick over the registry: integrate free movers, then scan for contact
    pub fn tick(registry: &mut GameRegistry, elapsed: Duration) -> TickOutcome {
        let dt = elapsed.min(Duration::from_millis(MAX_TICK_DT_MS)).as_secs_f32();
        let mut outcome = TickOutcome::default();

        for player in registry.players_mut() {
            if !player.is_free() {
                continue;
            }
            let Some(intent) = player.intent else {
                continue;
            };

            let (nx, ny, next) = Self::step(player.x, player.y, intent, dt);
            player.intent = next;
            if nx != player.x || ny != player.y {
                player.x = nx;
                player.y = ny;
                outcome.moved.push(PlayerMove {
                    id: player.id,
                    x: nx,
                    y: ny,
                });
            }
        }

        outcome.engagements = Self::scan_contacts(registry);
        outcome
    }

    /// Naive pairwise proximity scan over free players
    fn scan_contacts(registry: &mut GameRegistry) -> Vec<(Uuid, Uuid)> {
        let mut free: Vec<(Uuid, f32, f32)> = registry
            .players()
            .filter(|p| p.is_free())
            .map(|p| (p.id, p.x, p.y))
            .collect();
        free.sort_unstable_by_key(|(id, _, _)| *id);

        let mut taken = vec![false; free.len()];
        let mut pairs = Vec::new();

        for i in 0..free.len() {
            for j in (i + 1)..free.len() {
                let (a, ax, ay) = free[i];
                let (b, bx, by) = free[j];
                let dx = ax - bx;
                let dy = ay - by;
                let touching = (dx * dx + dy * dy).sqrt() <= TOUCH_RADIUS;

                if registry.in_release_grace(a, b) {
                    if !touching {
                        registry.clear_release_grace(a, b);
                    }
                    continue;
                }
                if touching && !taken[i] && !taken[j] {
                    taken[i] = true;
                    taken[j] = true;
                    pairs.push((a, b));
                }
            }
        }

        for &(a, b) in &pairs {
            registry.engage(a, b);
        }
        pairs
    }
}
