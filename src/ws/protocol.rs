//! WebSocket protocol message definitions
//! Every frame is an `{"op": TAG, "d": payload}` envelope. The closed set of
//! variants below is the operation allow-list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::constants::GameConstants;
use crate::game::duel::{Duel, DuelAction, DuelEnding};
use crate::game::movement::PlayerMove;
use crate::game::player::Player;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMsg {
    /// Enter the world
    Join {
        /// Auth token, required when token auth is configured
        #[serde(default)]
        token: Option<String>,
        /// Display name for guest joins
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },

    /// Walk toward a point
    MoveTarget {
        x: f32,
        y: f32,
        /// Client command sequence for reconciliation
        #[serde(default)]
        seq: Option<u32>,
    },

    /// Walk along a direction; zero vector stops
    MoveDir {
        dx: f32,
        dy: f32,
        #[serde(default)]
        seq: Option<u32>,
    },

    ChatSend {
        text: String,
    },

    /// Leave the current engagement
    EngageLeave {},

    DuelInvite {
        target: Uuid,
    },

    DuelAccept {
        duel_id: Uuid,
    },

    DuelAction {
        duel_id: Uuid,
        /// Parsed by the handler; unknown kinds get an error reply
        action: String,
    },

    /// Liveness check
    Ping {
        #[serde(default)]
        t: u64,
    },
}

impl ClientMsg {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Join { .. } => "JOIN",
            Self::MoveTarget { .. } => "MOVE_TARGET",
            Self::MoveDir { .. } => "MOVE_DIR",
            Self::ChatSend { .. } => "CHAT_SEND",
            Self::EngageLeave {} => "ENGAGE_LEAVE",
            Self::DuelInvite { .. } => "DUEL_INVITE",
            Self::DuelAccept { .. } => "DUEL_ACCEPT",
            Self::DuelAction { .. } => "DUEL_ACTION",
            Self::Ping { .. } => "PING",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMsg {
    /// Sent once after a successful join
    Welcome {
        id: Uuid,
        constants: GameConstants,
    },

    /// Full world listing
    WorldSnapshot {
        players: Vec<PlayerInfo>,
    },

    PlayerJoined(PlayerInfo),

    /// Per-tick movement delta
    PlayerMoves(Vec<PlayerMove>),

    PlayerLeft {
        id: Uuid,
    },

    /// Per-tick timestamped entity state for interpolation and reconciliation
    State {
        /// Server time, unix millis
        ts: u64,
        seq: u64,
        entities: HashMap<Uuid, EntityState>,
    },

    EngageStart {
        a: Uuid,
        b: Uuid,
    },

    EngageEnd {
        a: Uuid,
        b: Uuid,
    },

    DuelInvite {
        duel_id: Uuid,
        from: Uuid,
        to: Uuid,
    },

    DuelStart(DuelView),

    DuelUpdate {
        duel: DuelView,
        actor: Uuid,
        action: DuelAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        damage: Option<i32>,
    },

    DuelEnd {
        duel: DuelView,
        winner: Option<Uuid>,
        ending: DuelEnding,
    },

    /// Item awarded to the winner of a knockout
    InvAdd {
        item: LootItem,
        from: Uuid,
        duel_id: Uuid,
    },

    Chat {
        from: Uuid,
        name: String,
        text: String,
    },

    Error {
        code: String,
        message: String,
    },

    Pong {
        t: u64,
    },
}

/// Public player attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub x: f32,
    pub y: f32,
    pub engage_with: Option<Uuid>,
    pub duel_id: Option<Uuid>,
}

impl From<&Player> for PlayerInfo {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            color: p.color.clone(),
            x: p.x,
            y: p.y,
            engage_with: p.engaged_with,
            duel_id: p.duel_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootItem {
    pub uid: Uuid,
    pub base_type: String,
}

/// Entity entry in a `State` broadcast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f32>,
    /// Last movement command sequence the server processed for this entity
    pub ack: u32,
}

/// Duel state carried by every duel event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelView {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub hp: HashMap<Uuid, i32>,
    pub turn: Uuid,
    pub turn_no: u32,
    pub strikes: u32,
}

impl From<&Duel> for DuelView {
    fn from(d: &Duel) -> Self {
        Self {
            id: d.id,
            participants: d.participants(),
            hp: d.hp_map(),
            turn: d.turn(),
            turn_no: d.turn_no(),
            strikes: d.strikes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_client_envelopes() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"op":"MOVE_TARGET","d":{"x":10.5,"y":20,"seq":3}}"#).unwrap();
        assert_eq!(msg, ClientMsg::MoveTarget { x: 10.5, y: 20.0, seq: Some(3) });

        let msg: ClientMsg = serde_json::from_str(r#"{"op":"ENGAGE_LEAVE","d":{}}"#).unwrap();
        assert_eq!(msg, ClientMsg::EngageLeave {});

        let msg: ClientMsg = serde_json::from_str(r#"{"op":"JOIN","d":{"name":"kim"}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Join { token: None, name: Some("kim".into()), color: None }
        );
    }

    #[test]
    fn rejects_unknown_ops_and_bad_payloads() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"op":"ADMIN_KICK","d":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"op":"MOVE_TARGET","d":{"x":"a"}}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"[1,2,3]"#).is_err());
    }

    #[test]
    fn server_messages_use_op_envelope() {
        let id = Uuid::nil();
        let json = serde_json::to_value(ServerMsg::PlayerLeft { id }).unwrap();
        assert_eq!(json["op"], "PLAYER_LEFT");
        assert_eq!(json["d"]["id"], id.to_string());

        let json = serde_json::to_value(ServerMsg::Pong { t: 9 }).unwrap();
        assert_eq!(json, serde_json::json!({"op": "PONG", "d": {"t": 9}}));
    }

    #[test]
    fn inventory_award_carries_item_shape() {
        let (uid, from, duel_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let msg = ServerMsg::InvAdd {
            item: LootItem { uid, base_type: "duel_trophy".into() },
            from,
            duel_id,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["op"], "INV_ADD");
        assert_eq!(json["d"]["item"]["uid"], uid.to_string());
        assert_eq!(json["d"]["item"]["base_type"], "duel_trophy");
        assert_eq!(json["d"]["from"], from.to_string());
        assert_eq!(json["d"]["duel_id"], duel_id.to_string());
    }
}
