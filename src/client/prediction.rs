//! Local movement prediction for the controlling player

use std::collections::VecDeque;

use uuid::Uuid;

use crate::game::constants::PREDICTION_SNAP_DISTANCE;
use crate::game::movement::MovementSystem;
use crate::game::player::MovementIntent;
use crate::ws::protocol::EntityState;

/// A move command not yet acknowledged by the server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingInput {
    pub seq: u32,
    pub target: (f32, f32),
    pub issued_at: f64,
}

/// Predicts the own entity ahead of the authoritative stream.
///
/// Divergence policy on reconcile:
/// - nothing pending: adopt the authoritative position
/// - estimate further than `PREDICTION_SNAP_DISTANCE` from it: hard snap
/// - otherwise keep predicting from the local estimate
#[derive(Debug, Clone)]
pub struct LocalPredictor {
    player_id: Uuid,
    pending: VecDeque<PendingInput>,
    next_seq: u32,
    last_ack: u32,
    estimate: Option<(f32, f32)>,
    last_step: Option<f64>,
    snap_distance: f32,
}

impl LocalPredictor {
    pub fn new(player_id: Uuid) -> Self {
        Self {
            player_id,
            pending: VecDeque::new(),
            next_seq: 0,
            last_ack: 0,
            estimate: None,
            last_step: None,
            snap_distance: PREDICTION_SNAP_DISTANCE,
        }
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    pub fn position(&self) -> Option<(f32, f32)> {
        self.estimate
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingInput> {
        self.pending.iter()
    }

    pub fn last_ack(&self) -> u32 {
        self.last_ack
    }

    /// Queue a move toward `(x, y)` and return its sequence number.
    /// Prediction up to `now_ms` is applied toward the previous target first.
    pub fn queue_move(&mut self, x: f32, y: f32, now_ms: f64) -> u32 {
        self.predict(now_ms);
        self.next_seq = self.next_seq.saturating_add(1).max(self.last_ack.saturating_add(1));
        self.pending.push_back(PendingInput {
            seq: self.next_seq,
            target: (x, y),
            issued_at: now_ms,
        });
        self.last_step = Some(now_ms);
        self.next_seq
    }

    /// Advance the estimate toward the newest pending target by the wall time
    /// since the previous step
    pub fn predict(&mut self, now_ms: f64) -> Option<(f32, f32)> {
        let dt = match self.last_step {
            Some(last) => ((now_ms - last).max(0.0) / 1000.0) as f32,
            None => 0.0,
        };
        self.last_step = Some(now_ms);

        let (Some((x, y)), Some(input)) = (self.estimate, self.pending.back()) else {
            return self.estimate;
        };
        let Some(intent) = MovementIntent::target(input.target.0, input.target.1) else {
            return self.estimate;
        };

        let (nx, ny, _) = MovementSystem::step(x, y, intent, dt);
        self.estimate = Some((nx, ny));
        self.estimate
    }

    /// Drop every pending input the server has processed
    pub fn ack(&mut self, seq: u32) {
        self.last_ack = self.last_ack.max(seq);
        while self
            .pending
            .front()
            .is_some_and(|p| p.seq <= self.last_ack)
        {
            self.pending.pop_front();
        }
    }

    /// Fold in the authoritative position and acknowledged sequence
    pub fn reconcile(&mut self, authoritative: (f32, f32), ack: u32) {
        self.ack(ack);

        let Some((x, y)) = self.estimate else {
            self.estimate = Some(authoritative);
            return;
        };
        if self.pending.is_empty() {
            self.estimate = Some(authoritative);
            return;
        }

        let dx = authoritative.0 - x;
        let dy = authoritative.1 - y;
        if (dx * dx + dy * dy).sqrt() > self.snap_distance {
            self.estimate = Some(authoritative);
        }
    }

    /// Reconcile from this player's entry in a `State` broadcast
    pub fn observe(&mut self, state: &EntityState) {
        self.reconcile((state.x, state.y), state.ack);
    }

    /// Forget all local state, e.g. after a reconnect
    pub fn reset(&mut self, position: Option<(f32, f32)>) {
        self.pending.clear();
        self.estimate = position;
        self.last_step = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::SPEED;

    fn near(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
    }

    fn predictor_at(x: f32, y: f32) -> LocalPredictor {
        let mut p = LocalPredictor::new(Uuid::new_v4());
        p.reset(Some((x, y)));
        p
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let mut p = predictor_at(0.0, 0.0);
        let a = p.queue_move(10.0, 0.0, 0.0);
        let b = p.queue_move(20.0, 0.0, 0.0);
        let c = p.queue_move(30.0, 0.0, 0.0);
        assert!(a < b && b < c);
        assert_eq!(a, 1);
    }

    #[test]
    fn predicts_toward_newest_target_at_server_speed() {
        let mut p = predictor_at(1000.0, 1000.0);
        p.queue_move(1000.0, 5000.0, 0.0);
        p.queue_move(5000.0, 1000.0, 0.0);

        let pos = p.predict(100.0).unwrap();
        assert!(near(pos, (1000.0 + SPEED * 0.1, 1000.0)));
    }

    #[test]
    fn stops_at_target() {
        let mut p = predictor_at(1000.0, 1000.0);
        p.queue_move(1010.0, 1000.0, 0.0);
        let pos = p.predict(1000.0).unwrap();
        assert!(near(pos, (1010.0, 1000.0)));
    }

    #[test]
    fn ack_discards_processed_inputs_only() {
        let mut p = predictor_at(0.0, 0.0);
        for i in 0..4 {
            p.queue_move(100.0 * (i + 1) as f32, 0.0, 0.0);
        }
        p.ack(2);
        let left: Vec<u32> = p.pending().map(|i| i.seq).collect();
        assert_eq!(left, vec![3, 4]);

        // Stale acks never move backwards
        p.ack(1);
        assert_eq!(p.last_ack(), 2);
        assert_eq!(p.pending().count(), 2);
    }

    #[test]
    fn fully_acked_predictor_adopts_server_position() {
        let mut p = predictor_at(1000.0, 1000.0);
        let seq = p.queue_move(1100.0, 1000.0, 0.0);
        p.predict(100.0);

        p.reconcile((1030.0, 1005.0), seq);
        assert_eq!(p.position(), Some((1030.0, 1005.0)));
        assert_eq!(p.pending().count(), 0);
    }

    #[test]
    fn small_divergence_keeps_estimate_large_divergence_snaps() {
        let mut p = predictor_at(1000.0, 1000.0);
        p.queue_move(2000.0, 1000.0, 0.0);
        let est = p.predict(100.0).unwrap();

        p.reconcile((est.0 - 10.0, est.1), 0);
        assert_eq!(p.position(), Some(est));

        p.reconcile((est.0 - 500.0, est.1), 0);
        assert_eq!(p.position(), Some((est.0 - 500.0, est.1)));
        assert_eq!(p.pending().count(), 1);
    }

    #[test]
    fn observe_reads_state_entry() {
        let mut p = LocalPredictor::new(Uuid::new_v4());
        p.observe(&EntityState { x: 7.0, y: 8.0, r: None, ack: 0 });
        assert_eq!(p.position(), Some((7.0, 8.0)));
    }

    #[test]
    fn sequence_continues_past_acks_after_reset() {
        let mut p = predictor_at(0.0, 0.0);
        p.queue_move(1.0, 1.0, 0.0);
        p.ack(9);
        p.reset(Some((0.0, 0.0)));
        assert_eq!(p.queue_move(2.0, 2.0, 0.0), 10);
    }
}
