//! Fire-and-forget duel and loot history
//!
//! Gameplay pushes records onto an unbounded queue and never waits for them.
//! A background writer drains the queue; failures are logged and dropped, so
//! stored history may trail what clients have already seen.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::duel::DuelAction;

use super::supabase::SupabaseClient;

const TURNS_TABLE: &str = "duel_turns";
const TRANSFERS_TABLE: &str = "item_transfers";

/// One accepted duel action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuelTurnRecord {
    pub duel_id: Uuid,
    pub turn_no: u32,
    pub actor: Uuid,
    pub action: DuelAction,
    pub damage: Option<i32>,
    pub hp_after: Vec<(Uuid, i32)>,
    pub recorded_at: DateTime<Utc>,
}

/// Item moving between players
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTransferRecord {
    pub id: Uuid,
    pub item_uid: Uuid,
    pub base_type: String,
    pub from_player: Uuid,
    pub to_player: Uuid,
    pub duel_id: Option<Uuid>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryRecord {
    Turn(DuelTurnRecord),
    Transfer(ItemTransferRecord),
}

/// Producer side, cloned into the world
#[derive(Debug, Clone)]
pub struct HistoryQueue {
    tx: mpsc::UnboundedSender<HistoryRecord>,
}

impl HistoryQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HistoryRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn record_turn(&self, record: DuelTurnRecord) {
        self.push(HistoryRecord::Turn(record));
    }

    pub fn record_item_transfer(&self, record: ItemTransferRecord) {
        self.push(HistoryRecord::Transfer(record));
    }

    fn push(&self, record: HistoryRecord) {
        if self.tx.send(record).is_err() {
            warn!("History writer gone, dropping record");
        }
    }
}

/// Where drained records go
pub enum HistorySink {
    Supabase(SupabaseClient),
    /// No store configured; records are only logged
    Log,
}

impl HistorySink {
    async fn write(&self, record: &HistoryRecord) -> Result<(), super::SupabaseError> {
        match (self, record) {
            (Self::Supabase(client), HistoryRecord::Turn(turn)) => {
                client.append(TURNS_TABLE, turn).await
            }
            (Self::Supabase(client), HistoryRecord::Transfer(transfer)) => {
                client.append(TRANSFERS_TABLE, transfer).await
            }
            (Self::Log, record) => {
                debug!(?record, "History record");
                Ok(())
            }
        }
    }
}

/// Drain the queue until every producer is dropped
pub async fn run_writer(mut rx: mpsc::UnboundedReceiver<HistoryRecord>, sink: HistorySink) {
    info!("History writer started");
    while let Some(record) = rx.recv().await {
        if let Err(e) = sink.write(&record).await {
            warn!(error = %e, "Failed to persist history record");
        }
    }
    info!("History writer stopped");
}
