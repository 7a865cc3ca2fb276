//! Snapshot building for network transmission

use std::collections::HashMap;

use crate::ws::protocol::{EntityState, PlayerInfo, ServerMsg};

use super::registry::GameRegistry;

/// Builds the per-tick `State` broadcast and full world listings
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    /// Sequence of the last `State` built
    seq: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Build a timestamped entity state for every player
    pub fn build_state(&mut self, ts: u64, registry: &GameRegistry) -> ServerMsg {
        self.seq += 1;

        let entities: HashMap<_, _> = registry
            .players()
            .map(|p| {
                (
                    p.id,
                    EntityState {
                        x: p.x,
                        y: p.y,
                        r: None,
                        ack: p.last_input_seq,
                    },
                )
            })
            .collect();

        ServerMsg::State {
            ts,
            seq: self.seq,
            entities,
        }
    }

    /// Full listing of every player, sent on join
    pub fn world_snapshot(registry: &GameRegistry) -> ServerMsg {
        let mut players: Vec<PlayerInfo> = registry.players().map(PlayerInfo::from).collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        ServerMsg::WorldSnapshot { players }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Player;
    use uuid::Uuid;

    #[test]
    fn state_carries_positions_acks_and_increasing_seq() {
        let mut reg = GameRegistry::new();
        let mut p = Player::new(Uuid::new_v4(), "a".into(), "#fff".into(), 12.0, 34.0);
        p.last_input_seq = 7;
        let id = p.id;
        reg.add_player(p);

        let mut builder = SnapshotBuilder::new();
        let first = builder.build_state(1_000, &reg);
        let second = builder.build_state(1_050, &reg);

        match (first, second) {
            (
                ServerMsg::State { seq: s1, entities, ts, .. },
                ServerMsg::State { seq: s2, .. },
            ) => {
                assert_eq!(ts, 1_000);
                assert!(s2 > s1);
                let e = entities[&id];
                assert_eq!((e.x, e.y, e.ack), (12.0, 34.0, 7));
            }
            other => panic!("unexpected messages {:?}", other),
        }
    }
}
