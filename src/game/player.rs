//! Player records owned by the registry

use uuid::Uuid;

use super::constants::WORLD_SIZE;

/// What a player is currently trying to do with their feet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementIntent {
    /// Unit vector, kept until replaced or cleared
    Direction { dx: f32, dy: f32 },
    /// Walk toward a point, cleared on arrival
    Target { x: f32, y: f32 },
}

impl MovementIntent {
    /// Build a direction intent, normalizing the vector. A zero (or non-finite)
    /// vector means "stop" and yields `None`.
    pub fn direction(dx: f32, dy: f32) -> Option<Self> {
        if !dx.is_finite() || !dy.is_finite() {
            return None;
        }
        let len = (dx * dx + dy * dy).sqrt();
        if len <= f32::EPSILON {
            return None;
        }
        Some(Self::Direction {
            dx: dx / len,
            dy: dy / len,
        })
    }

    /// Build a target intent clamped to world bounds
    pub fn target(x: f32, y: f32) -> Option<Self> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(Self::Target {
            x: clamp_to_world(x),
            y: clamp_to_world(y),
        })
    }
}

/// Clamp a coordinate into `[0, WORLD_SIZE]`
pub fn clamp_to_world(v: f32) -> f32 {
    v.clamp(0.0, WORLD_SIZE)
}

/// Authoritative player record
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    pub color: String,

    pub x: f32,
    pub y: f32,
    pub intent: Option<MovementIntent>,

    /// Partner of the current mutual engagement
    pub engaged_with: Option<Uuid>,
    /// Pending or active duel; locks the player out of free movement
    pub duel_id: Option<Uuid>,

    /// Highest movement command sequence processed for this player
    pub last_input_seq: u32,
}

impl Player {
    pub fn new(id: Uuid, name: String, color: String, x: f32, y: f32) -> Self {
        Self {
            id,
            name,
            color,
            x: clamp_to_world(x),
            y: clamp_to_world(y),
            intent: None,
            engaged_with: None,
            duel_id: None,
            last_input_seq: 0,
        }
    }

    /// Neither engaged nor in a duel
    pub fn is_free(&self) -> bool {
        self.engaged_with.is_none() && self.duel_id.is_none()
    }

    pub fn distance_to(&self, other: &Player) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Record an acknowledged movement sequence; never goes backwards
    pub fn ack_seq(&mut self, seq: Option<u32>) {
        if let Some(seq) = seq {
            self.last_input_seq = self.last_input_seq.max(seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_normalized() {
        match MovementIntent::direction(3.0, 4.0) {
            Some(MovementIntent::Direction { dx, dy }) => {
                assert!((dx - 0.6).abs() < 1e-6);
                assert!((dy - 0.8).abs() < 1e-6);
            }
            other => panic!("unexpected intent {:?}", other),
        }
    }

    #[test]
    fn zero_direction_means_stop() {
        assert!(MovementIntent::direction(0.0, 0.0).is_none());
        assert!(MovementIntent::direction(f32::NAN, 1.0).is_none());
    }

    #[test]
    fn target_is_clamped_to_world() {
        assert_eq!(
            MovementIntent::target(-50.0, WORLD_SIZE + 10.0),
            Some(MovementIntent::Target { x: 0.0, y: WORLD_SIZE })
        );
    }

    #[test]
    fn ack_seq_is_monotonic() {
        let mut p = Player::new(Uuid::new_v4(), "a".into(), "#fff".into(), 0.0, 0.0);
        p.ack_seq(Some(5));
        p.ack_seq(Some(3));
        p.ack_seq(None);
        assert_eq!(p.last_input_seq, 5);
    }
}
