//! Snapshot interpolation buffer
//!
//! Remote entities are rendered a fixed delay in the past, between the two
//! buffered snapshots that bracket the render time. Timestamps are
//! milliseconds in whatever clock the caller stamps snapshots with, as long
//! as `get_interpolated` is queried with the same clock.

use std::collections::{HashMap, VecDeque};
use std::f32::consts::{PI, TAU};

use uuid::Uuid;

use crate::game::constants::{INTERP_DELAY_MS, SNAPSHOT_RETENTION_MS};
use crate::ws::protocol::EntityState;

/// Renderable state of one entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityPose {
    pub x: f32,
    pub y: f32,
    /// Orientation in radians
    pub r: Option<f32>,
}

impl From<&EntityState> for EntityPose {
    fn from(e: &EntityState) -> Self {
        Self {
            x: e.x,
            y: e.y,
            r: e.r,
        }
    }
}

/// Immutable capture of entity poses at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub ts: f64,
    pub seq: u64,
    pub entities: HashMap<Uuid, EntityPose>,
}

impl Snapshot {
    /// Build from the entity map of a `State` broadcast
    pub fn from_state(ts: f64, seq: u64, entities: &HashMap<Uuid, EntityState>) -> Self {
        Self {
            ts,
            seq,
            entities: entities
                .iter()
                .map(|(id, e)| (*id, EntityPose::from(e)))
                .collect(),
        }
    }
}

/// Ordered, time-bounded snapshot buffer
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    delay_ms: f64,
    retention_ms: f64,
    snaps: VecDeque<Snapshot>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::with_timing(INTERP_DELAY_MS, SNAPSHOT_RETENTION_MS)
    }

    pub fn with_timing(delay_ms: f64, retention_ms: f64) -> Self {
        Self {
            delay_ms,
            retention_ms,
            snaps: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.snaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snaps.is_empty()
    }

    pub fn clear(&mut self) {
        self.snaps.clear();
    }

    /// Insert in timestamp order and drop snapshots older than the retention
    /// window, measured back from the newest one. A repeated timestamp
    /// replaces the earlier snapshot.
    pub fn push(&mut self, snapshot: Snapshot) {
        if !snapshot.ts.is_finite() {
            return;
        }

        match self
            .snaps
            .binary_search_by(|s| s.ts.total_cmp(&snapshot.ts))
        {
            Ok(i) => self.snaps[i] = snapshot,
            Err(i) => self.snaps.insert(i, snapshot),
        }

        let Some(newest) = self.snaps.back().map(|s| s.ts) else {
            return;
        };
        let cutoff = newest - self.retention_ms;
        while self.snaps.front().is_some_and(|s| s.ts < cutoff) {
            self.snaps.pop_front();
        }
    }

    /// Entity poses at `now_ms - delay`
    pub fn get_interpolated(&self, now_ms: f64) -> HashMap<Uuid, EntityPose> {
        let render_ts = now_ms - self.delay_ms;

        let (Some(first), Some(last)) = (self.snaps.front(), self.snaps.back()) else {
            return HashMap::new();
        };
        if render_ts <= first.ts {
            return first.entities.clone();
        }
        // A NaN clock has no place in the buffer; show the newest state
        if render_ts >= last.ts || render_ts.is_nan() {
            return last.entities.clone();
        }

        let i = match self.snaps.binary_search_by(|s| s.ts.total_cmp(&render_ts)) {
            Ok(hit) => return self.snaps[hit].entities.clone(),
            Err(i) => i,
        };
        // first.ts < render_ts < last.ts, so 1 <= i < len
        let a = &self.snaps[i - 1];
        let b = &self.snaps[i];
        let t = ((render_ts - a.ts) / (b.ts - a.ts)) as f32;

        let mut out = HashMap::with_capacity(a.entities.len().max(b.entities.len()));
        for (id, ea) in &a.entities {
            let pose = match b.entities.get(id) {
                Some(eb) => lerp_pose(ea, eb, t),
                None => *ea,
            };
            out.insert(*id, pose);
        }
        for (id, eb) in &b.entities {
            out.entry(*id).or_insert(*eb);
        }
        out
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn lerp_pose(a: &EntityPose, b: &EntityPose, t: f32) -> EntityPose {
    EntityPose {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
        r: match (a.r, b.r) {
            (Some(ra), Some(rb)) => Some(lerp_angle(ra, rb, t)),
            (ra, rb) => ra.or(rb),
        },
    }
}

/// Interpolate along the shorter arc
fn lerp_angle(a: f32, b: f32, t: f32) -> f32 {
    let mut diff = (b - a) % TAU;
    if diff > PI {
        diff -= TAU;
    } else if diff < -PI {
        diff += TAU;
    }
    a + diff * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(x: f32, y: f32) -> EntityPose {
        EntityPose { x, y, r: None }
    }

    fn snap(ts: f64, entities: &[(Uuid, EntityPose)]) -> Snapshot {
        Snapshot {
            ts,
            seq: ts as u64,
            entities: entities.iter().copied().collect(),
        }
    }

    #[test]
    fn empty_buffer_renders_nothing() {
        assert!(SnapshotBuffer::new().get_interpolated(5000.0).is_empty());
    }

    #[test]
    fn non_finite_clock_renders_an_edge_frame() {
        let id = Uuid::new_v4();
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(1000.0, &[(id, pose(0.0, 0.0))]));
        buf.push(snap(1050.0, &[(id, pose(100.0, 50.0))]));

        assert_eq!(buf.get_interpolated(f64::NAN)[&id], pose(100.0, 50.0));
        assert_eq!(buf.get_interpolated(-f64::NAN)[&id], pose(100.0, 50.0));
        assert_eq!(buf.get_interpolated(f64::INFINITY)[&id], pose(100.0, 50.0));
        assert_eq!(buf.get_interpolated(f64::NEG_INFINITY)[&id], pose(0.0, 0.0));
    }

    #[test]
    fn interpolates_between_bracketing_snapshots() {
        let id = Uuid::new_v4();
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(1000.0, &[(id, pose(0.0, 0.0))]));
        buf.push(snap(1050.0, &[(id, pose(100.0, 50.0))]));

        // render_ts = 1025
        let frame = buf.get_interpolated(1125.0);
        assert_eq!(frame[&id], pose(50.0, 25.0));
    }

    #[test]
    fn exact_timestamp_returns_snapshot_verbatim() {
        let id = Uuid::new_v4();
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(1000.0, &[(id, pose(0.1, 0.2))]));
        buf.push(snap(1050.0, &[(id, pose(10.3, 7.7))]));
        buf.push(snap(1100.0, &[(id, pose(20.9, 3.3))]));

        assert_eq!(buf.get_interpolated(1150.0)[&id], pose(10.3, 7.7));
        assert_eq!(buf.get_interpolated(1100.0)[&id], pose(0.1, 0.2));
    }

    #[test]
    fn outside_range_clamps_to_edge_snapshot() {
        let id = Uuid::new_v4();
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(1000.0, &[(id, pose(1.0, 1.0))]));
        buf.push(snap(1050.0, &[(id, pose(2.0, 2.0))]));

        assert_eq!(buf.get_interpolated(500.0)[&id], pose(1.0, 1.0));
        assert_eq!(buf.get_interpolated(9000.0)[&id], pose(2.0, 2.0));
    }

    #[test]
    fn one_sided_entities_pass_through() {
        let (stays, leaves, arrives) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(0.0, &[(stays, pose(0.0, 0.0)), (leaves, pose(5.0, 5.0))]));
        buf.push(snap(100.0, &[(stays, pose(10.0, 0.0)), (arrives, pose(9.0, 9.0))]));

        let frame = buf.get_interpolated(150.0);
        assert_eq!(frame.len(), 3);
        assert_eq!(frame[&stays], pose(5.0, 0.0));
        assert_eq!(frame[&leaves], pose(5.0, 5.0));
        assert_eq!(frame[&arrives], pose(9.0, 9.0));
    }

    #[test]
    fn out_of_order_pushes_are_sorted_and_old_ones_pruned() {
        let id = Uuid::new_v4();
        let mut buf = SnapshotBuffer::new();
        buf.push(snap(1100.0, &[(id, pose(2.0, 0.0))]));
        buf.push(snap(1000.0, &[(id, pose(0.0, 0.0))]));
        assert_eq!(buf.get_interpolated(1150.0)[&id], pose(1.0, 0.0));

        buf.push(snap(2500.0, &[(id, pose(9.0, 0.0))]));
        assert_eq!(buf.len(), 1);

        buf.push(snap(f64::NAN, &[]));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn orientation_takes_the_short_way_round() {
        let id = Uuid::new_v4();
        let mut buf = SnapshotBuffer::new();
        let a = EntityPose { x: 0.0, y: 0.0, r: Some(PI - 0.1) };
        let b = EntityPose { x: 0.0, y: 0.0, r: Some(-PI + 0.1) };
        buf.push(snap(0.0, &[(id, a)]));
        buf.push(snap(100.0, &[(id, b)]));

        let r = buf.get_interpolated(150.0)[&id].r.unwrap();
        assert!((r - PI).abs() < 1e-4, "r = {}", r);
    }

    #[test]
    fn builds_from_state_broadcast() {
        let id = Uuid::new_v4();
        let mut entities = HashMap::new();
        entities.insert(id, EntityState { x: 3.0, y: 4.0, r: None, ack: 7 });
        let snap = Snapshot::from_state(42.0, 9, &entities);
        assert_eq!(snap.entities[&id], pose(3.0, 4.0));
        assert_eq!(snap.seq, 9);
    }
}
