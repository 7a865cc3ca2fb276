//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HS256 secret for join tokens. Without it, guests join by name.
    pub auth_jwt_secret: Option<String>,

    /// Supabase project URL for duel/loot history
    pub supabase_url: Option<String>,
    /// Supabase service role key (bypasses RLS - server only!)
    pub supabase_service_role_key: Option<String>,

    /// Allowed client origins for CORS
    pub client_origin: String,

    /// Seed for spawn positions and first-turn coin flips
    pub world_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let supabase_url = non_empty(lookup("SUPABASE_URL"));
        let supabase_service_role_key = non_empty(lookup("SUPABASE_SERVICE_ROLE_KEY"));
        if supabase_url.is_some() != supabase_service_role_key.is_some() {
            return Err(ConfigError::Incomplete(
                "SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set together",
            ));
        }

        let world_seed = match lookup("WORLD_SEED") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("WORLD_SEED"))?,
            ),
            None => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            auth_jwt_secret: non_empty(lookup("AUTH_JWT_SECRET")),

            supabase_url,
            supabase_service_role_key,

            client_origin: lookup("CLIENT_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),

            world_seed,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Incomplete configuration: {0}")]
    Incomplete(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_run_in_guest_mode() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.log_level, "info");
        assert!(config.auth_jwt_secret.is_none());
        assert!(config.supabase_url.is_none());
        assert!(config.world_seed.is_none());
    }

    #[test]
    fn port_overrides_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:1")]).unwrap();
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(load(&[("SERVER_ADDR", "nope")]), Err(ConfigError::InvalidAddress)));
        assert!(matches!(load(&[("WORLD_SEED", "x")]), Err(ConfigError::Invalid("WORLD_SEED"))));
        assert!(matches!(
            load(&[("SUPABASE_URL", "https://x.supabase.co")]),
            Err(ConfigError::Incomplete(_))
        ));
    }

    #[test]
    fn empty_secret_means_guest_mode() {
        let config = load(&[("AUTH_JWT_SECRET", "  "), ("WORLD_SEED", "42")]).unwrap();
        assert!(config.auth_jwt_secret.is_none());
        assert_eq!(config.world_seed, Some(42));
    }
}
