//! Application state shared across routes

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::auth::{GuestResolver, IdentityResolver, JwtResolver};
use crate::config::Config;
use crate::game::{GameWorld, WorldHandle};
use crate::store::history::run_writer;
use crate::store::{HistoryQueue, HistorySink, SupabaseClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub world: WorldHandle,
}

impl AppState {
    /// Build the collaborators and spawn the world and history tasks.
    /// Must be called from inside a tokio runtime.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let identity: Arc<dyn IdentityResolver> = match &config.auth_jwt_secret {
            Some(secret) => Arc::new(JwtResolver::new(secret.clone())),
            None => {
                warn!("AUTH_JWT_SECRET not set, accepting guest joins");
                Arc::new(GuestResolver)
            }
        };

        let sink = match (&config.supabase_url, &config.supabase_service_role_key) {
            (Some(url), Some(key)) => HistorySink::Supabase(SupabaseClient::new(url, key)),
            _ => {
                info!("Supabase not configured, duel history is logged only");
                HistorySink::Log
            }
        };
        let (history, history_rx) = HistoryQueue::new();
        tokio::spawn(run_writer(history_rx, sink));

        let seed = config
            .world_seed
            .unwrap_or_else(|| rand::thread_rng().gen());
        info!(seed, "Spawning world");

        let (world, handle) = GameWorld::new(identity, history, seed);
        tokio::spawn(world.run());

        Self {
            config,
            world: handle,
        }
    }
}
