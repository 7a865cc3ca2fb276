//! World state and authoritative tick loop
//!
//! One task owns the registry. Ticks and inbound commands are processed on
//! that task one at a time, so handlers never interleave with each other or
//! with movement integration.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::IdentityResolver;
use crate::store::{DuelTurnRecord, HistoryQueue, ItemTransferRecord};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, DuelView, LootItem, PlayerInfo, ServerMsg};

use super::constants::{
    GameConstants, CHAT_MAX_CHARS, DUEL_LOOT_BASE_TYPE, NAME_MAX_CHARS, SPAWN_MAX, SPAWN_MIN,
    TICK_MS,
};
use super::duel::{Duel, DuelAction, DuelEnding, DuelPhase};
use super::error::CommandError;
use super::movement::{MovementSystem, TickClock};
use super::player::{MovementIntent, Player};
use super::registry::GameRegistry;
use super::snapshot::SnapshotBuilder;

/// Identifies one WebSocket connection
pub type ConnId = Uuid;

/// Frames queued for one connection's writer
pub type Outbound = Arc<ServerMsg>;

/// Per-connection outbound queue depth
pub const OUTBOUND_CAPACITY: usize = 256;

const DEFAULT_COLOR: &str = "#4cc9f0";

/// Everything the world task consumes besides its own timer
#[derive(Debug)]
pub enum WorldInput {
    Connect {
        conn_id: ConnId,
        tx: mpsc::Sender<Outbound>,
    },
    Message {
        conn_id: ConnId,
        msg: ClientMsg,
    },
    Disconnect {
        conn_id: ConnId,
    },
}

/// Counters readable from outside the world task
#[derive(Debug, Default)]
pub struct WorldStats {
    players: AtomicUsize,
    live_duels: AtomicUsize,
    tick: AtomicU64,
}

impl WorldStats {
    pub fn players(&self) -> usize {
        self.players.load(Ordering::Relaxed)
    }

    pub fn live_duels(&self) -> usize {
        self.live_duels.load(Ordering::Relaxed)
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }
}

/// Handle to the running world
#[derive(Clone)]
pub struct WorldHandle {
    pub input_tx: mpsc::Sender<WorldInput>,
    pub stats: Arc<WorldStats>,
}

struct Session {
    tx: mpsc::Sender<Outbound>,
    player: Option<Uuid>,
}

/// The authoritative world
pub struct GameWorld {
    registry: GameRegistry,
    sessions: HashMap<ConnId, Session>,
    player_conns: HashMap<Uuid, ConnId>,
    input_rx: mpsc::Receiver<WorldInput>,
    snapshots: SnapshotBuilder,
    history: HistoryQueue,
    identity: Arc<dyn IdentityResolver>,
    rng: ChaCha8Rng,
    clock: TickClock,
    tick: u64,
    stats: Arc<WorldStats>,
    /// Connections whose outbound queue refused an event frame
    stalled: Vec<ConnId>,
}

impl GameWorld {
    /// Create a new world
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        history: HistoryQueue,
        seed: u64,
    ) -> (Self, WorldHandle) {
        let (input_tx, input_rx) = mpsc::channel(1024);
        let stats = Arc::new(WorldStats::default());

        let handle = WorldHandle {
            input_tx,
            stats: stats.clone(),
        };

        let world = Self {
            registry: GameRegistry::new(),
            sessions: HashMap::new(),
            player_conns: HashMap::new(),
            input_rx,
            snapshots: SnapshotBuilder::new(),
            history,
            identity,
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock: TickClock::new(),
            tick: 0,
            stats,
            stalled: Vec::new(),
        };

        (world, handle)
    }

    /// Run the authoritative tick loop until every input sender is dropped
    pub async fn run(mut self) {
        info!(tick_ms = TICK_MS, "World started");

        let mut tick_interval = interval(Duration::from_millis(TICK_MS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.clock = TickClock::new();

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let elapsed = self.clock.lap();
                    self.step(elapsed);
                }
                input = self.input_rx.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
            }
        }

        info!(tick = self.tick, "World stopped");
    }

    /// Advance the world by one tick and broadcast the results
    fn step(&mut self, elapsed: Duration) {
        self.tick += 1;
        let outcome = MovementSystem::tick(&mut self.registry, elapsed);

        if !outcome.moved.is_empty() {
            self.broadcast(ServerMsg::PlayerMoves(outcome.moved));
        }

        for (a, b) in outcome.engagements {
            debug!(a = %a, b = %b, "Players engaged");
            self.broadcast(ServerMsg::EngageStart { a, b });
        }

        if self.registry.player_count() > 0 {
            let state = self.snapshots.build_state(unix_millis(), &self.registry);
            self.broadcast(state);
        }

        self.evict_stalled();
        self.publish_stats();
    }

    fn handle_input(&mut self, input: WorldInput) {
        match input {
            WorldInput::Connect { conn_id, tx } => {
                self.sessions.insert(conn_id, Session { tx, player: None });
            }
            WorldInput::Message { conn_id, msg } => self.dispatch(conn_id, msg),
            WorldInput::Disconnect { conn_id } => self.handle_disconnect(conn_id),
        }
        self.evict_stalled();
        self.publish_stats();
    }

    /// Route one decoded message to its handler
    fn dispatch(&mut self, conn_id: ConnId, msg: ClientMsg) {
        let Some(joined) = self.sessions.get(&conn_id).map(|s| s.player) else {
            return;
        };

        let Some(player_id) = joined else {
            match msg {
                ClientMsg::Join { token, name, color } => {
                    let result = self.handle_join(conn_id, token, name, color);
                    self.reply_error(conn_id, result);
                }
                other => {
                    debug!(conn_id = %conn_id, op = other.op(), "Dropping message before join");
                }
            }
            return;
        };

        let result = match msg {
            ClientMsg::Join { .. } => Err(CommandError::AlreadyJoined),
            ClientMsg::MoveTarget { x, y, seq } => {
                if let Some(intent) = MovementIntent::target(x, y) {
                    self.registry.set_intent(&player_id, Some(intent), seq);
                }
                Ok(())
            }
            ClientMsg::MoveDir { dx, dy, seq } => {
                self.registry
                    .set_intent(&player_id, MovementIntent::direction(dx, dy), seq);
                Ok(())
            }
            ClientMsg::ChatSend { text } => self.handle_chat(player_id, &text),
            ClientMsg::EngageLeave {} => self.handle_engage_leave(player_id),
            ClientMsg::DuelInvite { target } => self.handle_duel_invite(player_id, target),
            ClientMsg::DuelAccept { duel_id } => self.handle_duel_accept(player_id, duel_id),
            ClientMsg::DuelAction { duel_id, action } => {
                self.handle_duel_action(player_id, duel_id, &action)
            }
            ClientMsg::Ping { t } => {
                self.send_to_conn(conn_id, ServerMsg::Pong { t });
                Ok(())
            }
        };

        self.reply_error(conn_id, result);
    }

    fn reply_error(&mut self, conn_id: ConnId, result: Result<(), CommandError>) {
        if let Err(e) = result {
            debug!(conn_id = %conn_id, error = %e, "Command rejected");
            self.send_to_conn(
                conn_id,
                ServerMsg::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                },
            );
        }
    }

    /// Handle player join request
    fn handle_join(
        &mut self,
        conn_id: ConnId,
        token: Option<String>,
        name: Option<String>,
        color: Option<String>,
    ) -> Result<(), CommandError> {
        let identity = self.identity.resolve(token.as_deref())?;
        if self.registry.player(&identity.id).is_some() {
            return Err(CommandError::AlreadyJoined);
        }

        let name = sanitize_name(identity.display_name.or(name).as_deref());
        if self.registry.name_taken(&name) {
            return Err(CommandError::NameInUse);
        }

        let x = self.rng.gen_range(SPAWN_MIN..SPAWN_MAX);
        let y = self.rng.gen_range(SPAWN_MIN..SPAWN_MAX);
        let player = Player::new(identity.id, name, sanitize_color(color.as_deref()), x, y);
        let info = PlayerInfo::from(&player);
        let player_id = player.id;

        if !self.registry.add_player(player) {
            return Err(CommandError::NameInUse);
        }
        if let Some(session) = self.sessions.get_mut(&conn_id) {
            session.player = Some(player_id);
        }
        self.player_conns.insert(player_id, conn_id);

        self.send_to_conn(
            conn_id,
            ServerMsg::Welcome {
                id: player_id,
                constants: GameConstants::current(),
            },
        );
        let snapshot = SnapshotBuilder::world_snapshot(&self.registry);
        self.send_to_conn(conn_id, snapshot);
        self.broadcast_except(conn_id, ServerMsg::PlayerJoined(info.clone()));

        info!(
            player_id = %player_id,
            name = %info.name,
            player_count = self.registry.player_count(),
            "Player joined world"
        );
        Ok(())
    }

    fn handle_chat(&mut self, player_id: Uuid, text: &str) -> Result<(), CommandError> {
        let text: String = text.trim().chars().take(CHAT_MAX_CHARS).collect();
        if text.is_empty() {
            return Ok(());
        }
        let name = self
            .registry
            .player(&player_id)
            .ok_or(CommandError::NoSuchPlayer)?
            .name
            .clone();

        self.broadcast(ServerMsg::Chat {
            from: player_id,
            name,
            text,
        });
        Ok(())
    }

    fn handle_engage_leave(&mut self, player_id: Uuid) -> Result<(), CommandError> {
        let player = self
            .registry
            .player(&player_id)
            .ok_or(CommandError::NoSuchPlayer)?;

        if let Some(duel_id) = player.duel_id {
            if let Some(duel) = self.registry.duel_mut(&duel_id) {
                if duel.phase() == DuelPhase::Active {
                    return Err(CommandError::DuelInProgress);
                }
                duel.force_end(DuelEnding::Cancelled);
            }
            self.finish_duel(duel_id);
            return Ok(());
        }

        if let Some(partner) = self.registry.release_engagement(&player_id) {
            self.broadcast(ServerMsg::EngageEnd {
                a: player_id,
                b: partner,
            });
        }
        Ok(())
    }

    fn handle_duel_invite(&mut self, player_id: Uuid, target: Uuid) -> Result<(), CommandError> {
        if target == player_id {
            return Err(CommandError::SelfTarget);
        }
        let me = self
            .registry
            .player(&player_id)
            .ok_or(CommandError::NoSuchPlayer)?;
        let other = self
            .registry
            .player(&target)
            .ok_or(CommandError::NoSuchPlayer)?;

        if me.duel_id.is_some() {
            return Err(CommandError::AlreadyInDuel);
        }
        if other.duel_id.is_some() {
            return Err(CommandError::TargetBusy);
        }
        if me.engaged_with != Some(target) {
            return Err(CommandError::NotEngaged);
        }

        let duel = Duel::invite(Uuid::new_v4(), player_id, target);
        let duel_id = duel.id;
        self.registry.insert_duel(duel);

        let invite = ServerMsg::DuelInvite {
            duel_id,
            from: player_id,
            to: target,
        };
        self.send_to_player(player_id, invite.clone());
        self.send_to_player(target, invite);

        info!(duel_id = %duel_id, inviter = %player_id, invitee = %target, "Duel invited");
        Ok(())
    }

    fn handle_duel_accept(&mut self, player_id: Uuid, duel_id: Uuid) -> Result<(), CommandError> {
        let duel = self
            .registry
            .duel_mut(&duel_id)
            .ok_or(CommandError::NoSuchDuel)?;
        let first = duel.accept(player_id, &mut self.rng)?;
        let view = DuelView::from(&*duel);
        let participants = duel.participants();

        for id in participants {
            self.send_to_player(id, ServerMsg::DuelStart(view.clone()));
        }

        info!(duel_id = %duel_id, first_turn = %first, "Duel started");
        Ok(())
    }

    fn handle_duel_action(
        &mut self,
        player_id: Uuid,
        duel_id: Uuid,
        action: &str,
    ) -> Result<(), CommandError> {
        let duel = self
            .registry
            .duel_mut(&duel_id)
            .ok_or(CommandError::NoSuchDuel)?;
        let action: DuelAction = action.parse()?;

        let turn_no = duel.turn_no();
        let outcome = duel.act(player_id, action)?;
        let view = DuelView::from(&*duel);
        let participants = duel.participants();

        self.history.record_turn(DuelTurnRecord {
            duel_id,
            turn_no,
            actor: player_id,
            action,
            damage: outcome.damage,
            hp_after: participants
                .iter()
                .map(|id| (*id, view.hp.get(id).copied().unwrap_or(0)))
                .collect(),
            recorded_at: chrono::Utc::now(),
        });

        let update = ServerMsg::DuelUpdate {
            duel: view,
            actor: player_id,
            action,
            damage: outcome.damage,
        };
        for id in participants {
            self.send_to_player(id, update.clone());
        }

        if outcome.ending.is_some() {
            self.finish_duel(duel_id);
        }
        Ok(())
    }

    /// Retire an ended duel, release both players and announce the result
    fn finish_duel(&mut self, duel_id: Uuid) {
        let Some(duel) = self.registry.retire_duel(&duel_id) else {
            return;
        };
        let ending = duel.ending().unwrap_or(DuelEnding::Cancelled);
        let end = ServerMsg::DuelEnd {
            duel: DuelView::from(&duel),
            winner: ending.winner(),
            ending,
        };
        let [a, b] = duel.participants();

        self.send_to_player(a, end.clone());
        self.send_to_player(b, end);
        self.broadcast(ServerMsg::EngageEnd { a, b });

        if let DuelEnding::Knockout { winner, loser } = ending {
            let item = LootItem {
                uid: Uuid::new_v4(),
                base_type: DUEL_LOOT_BASE_TYPE.to_string(),
            };
            self.history.record_item_transfer(ItemTransferRecord {
                id: Uuid::new_v4(),
                item_uid: item.uid,
                base_type: item.base_type.clone(),
                from_player: loser,
                to_player: winner,
                duel_id: Some(duel_id),
                reason: "duel_victory".to_string(),
                recorded_at: chrono::Utc::now(),
            });
            self.send_to_player(
                winner,
                ServerMsg::InvAdd {
                    item,
                    from: loser,
                    duel_id,
                },
            );
        }

        info!(duel_id = %duel_id, ending = ?ending, "Duel ended");
    }

    /// Connection closed: remove the player and unwind their engagement/duel
    fn handle_disconnect(&mut self, conn_id: ConnId) {
        let Some(session) = self.sessions.remove(&conn_id) else {
            return;
        };
        let Some(player_id) = session.player else {
            return;
        };
        self.player_conns.remove(&player_id);

        let Some(departure) = self.registry.remove_player(&player_id) else {
            return;
        };

        if let Some(duel) = departure.ended_duel {
            let ending = duel.ending().unwrap_or(DuelEnding::Forfeit { by: player_id });
            if let Some(opponent) = duel.opponent(player_id) {
                self.send_to_player(
                    opponent,
                    ServerMsg::DuelEnd {
                        duel: DuelView::from(&duel),
                        winner: ending.winner(),
                        ending,
                    },
                );
            }
            info!(duel_id = %duel.id, player_id = %player_id, "Duel forfeited on disconnect");
        }

        if let Some(partner) = departure.released_partner {
            self.broadcast(ServerMsg::EngageEnd {
                a: player_id,
                b: partner,
            });
        }

        self.broadcast(ServerMsg::PlayerLeft { id: player_id });

        info!(
            player_id = %player_id,
            player_count = self.registry.player_count(),
            "Player left world"
        );
    }

    fn publish_stats(&self) {
        self.stats
            .players
            .store(self.registry.player_count(), Ordering::Relaxed);
        self.stats
            .live_duels
            .store(self.registry.live_duel_count(), Ordering::Relaxed);
        self.stats.tick.store(self.tick, Ordering::Relaxed);
    }

    fn send_to_conn(&mut self, conn_id: ConnId, msg: ServerMsg) {
        if let Some(session) = self.sessions.get(&conn_id) {
            if !push(conn_id, &session.tx, Arc::new(msg)) {
                self.stalled.push(conn_id);
            }
        }
    }

    fn send_to_player(&mut self, player_id: Uuid, msg: ServerMsg) {
        if let Some(conn_id) = self.player_conns.get(&player_id).copied() {
            self.send_to_conn(conn_id, msg);
        }
    }

    /// Send to every joined connection
    fn broadcast(&mut self, msg: ServerMsg) {
        let msg = Arc::new(msg);
        for (conn_id, session) in &self.sessions {
            if session.player.is_some() && !push(*conn_id, &session.tx, msg.clone()) {
                self.stalled.push(*conn_id);
            }
        }
    }

    fn broadcast_except(&mut self, skip: ConnId, msg: ServerMsg) {
        let msg = Arc::new(msg);
        for (conn_id, session) in &self.sessions {
            if *conn_id != skip
                && session.player.is_some()
                && !push(*conn_id, &session.tx, msg.clone())
            {
                self.stalled.push(*conn_id);
            }
        }
    }

    /// Disconnect every client that could not take an event frame. Dropping
    /// the session closes its outbound queue, which ends the writer task.
    fn evict_stalled(&mut self) {
        while let Some(conn_id) = self.stalled.pop() {
            if self.sessions.contains_key(&conn_id) {
                warn!(conn_id = %conn_id, "Client too slow for event frames, disconnecting");
                self.handle_disconnect(conn_id);
            }
        }
    }
}

/// Per-tick frames superseded by the next tick
fn is_tick_frame(msg: &ServerMsg) -> bool {
    matches!(msg, ServerMsg::State { .. } | ServerMsg::PlayerMoves(_))
}

/// Non-blocking enqueue. Returns false when an event frame hit a full queue;
/// tick frames are dropped instead.
fn push(conn_id: ConnId, tx: &mpsc::Sender<Outbound>, msg: Outbound) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(msg)) if is_tick_frame(&msg) => {
            debug!(conn_id = %conn_id, "Client outbound queue full, dropping tick frame");
            true
        }
        Err(mpsc::error::TrySendError::Full(_)) => false,
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(conn_id = %conn_id, "Client outbound queue closed");
            true
        }
    }
}

fn sanitize_name(raw: Option<&str>) -> String {
    let name: String = raw
        .unwrap_or_default()
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(NAME_MAX_CHARS)
        .collect();
    if name.is_empty() {
        "anon".to_string()
    } else {
        name
    }
}

fn sanitize_color(raw: Option<&str>) -> String {
    match raw {
        Some(c)
            if (c.len() == 4 || c.len() == 7)
                && c.starts_with('#')
                && c[1..].chars().all(|ch| ch.is_ascii_hexdigit()) =>
        {
            c.to_string()
        }
        _ => DEFAULT_COLOR.to_string(),
    }
}
