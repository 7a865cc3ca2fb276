//! Persistence collaborators (append-only, never read back into the simulation)

pub mod history;
pub mod supabase;

pub use history::{DuelTurnRecord, HistoryQueue, HistorySink, ItemTransferRecord};
pub use supabase::{SupabaseClient, SupabaseError};
