//! Configuration for the coordinator and the server.
//!
//! Every struct has a `Default`; [`ServerConfig::from_env`] overlays the
//! `GRIDLOCK_*` environment variables on top of the defaults.

use std::str::FromStr;
use std::time::Duration;

use gridlock_session::SessionConfig;

use crate::GridlockError;

/// Tuning for the room coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Deadline for every call into the durable store.
    pub store_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
        }
    }
}

/// Everything the server binary needs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub session: SessionConfig,
    pub coordinator: CoordinatorConfig,
    /// How long a new connection has to send its authenticate intent.
    pub handshake_timeout: Duration,
    /// A connection that sends no application message for this long is
    /// closed. WebSocket ping and pong frames do not count; an otherwise
    /// quiet client sends `heartbeat`.
    pub idle_timeout: Duration,
    /// How often expired sessions and abandoned rooms are swept.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session: SessionConfig::default(),
            coordinator: CoordinatorConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `GRIDLOCK_*` environment variables.
    ///
    /// # Errors
    /// [`GridlockError::Config`] if a variable is set but does not parse.
    pub fn from_env() -> Result<Self, GridlockError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary source.
    ///
    /// # Errors
    /// [`GridlockError::Config`] if a value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GridlockError> {
        let mut config = Self::default();
        if let Some(addr) = lookup("GRIDLOCK_BIND") {
            config.bind_addr = addr;
        }
        if let Some(ms) = parse::<u64>(&lookup, "GRIDLOCK_AUTH_TIMEOUT_MS")? {
            config.session.auth_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, "GRIDLOCK_STORE_TIMEOUT_MS")? {
            config.coordinator.store_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<u64>(&lookup, "GRIDLOCK_RECONNECT_GRACE_SECS")? {
            config.session.reconnect_grace_secs = secs;
        }
        if let Some(secs) = parse::<u64>(&lookup, "GRIDLOCK_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "GRIDLOCK_SWEEP_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(GridlockError::Config(
                    "GRIDLOCK_SWEEP_INTERVAL_SECS must be positive".into(),
                ));
            }
            config.sweep_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, GridlockError>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| GridlockError::Config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_empty_gives_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.session.reconnect_grace_secs, 30);
        assert_eq!(config.coordinator.store_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_from_lookup_overlays_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GRIDLOCK_BIND", "0.0.0.0:9000"),
            ("GRIDLOCK_AUTH_TIMEOUT_MS", "750"),
            ("GRIDLOCK_RECONNECT_GRACE_SECS", " 5 "),
            ("GRIDLOCK_IDLE_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.session.auth_timeout, Duration::from_millis(750));
        assert_eq!(config.session.reconnect_grace_secs, 5);
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_from_lookup_bad_number_is_config_error() {
        let err = ServerConfig::from_lookup(lookup(&[("GRIDLOCK_STORE_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, GridlockError::Config(_)));
        assert!(err.to_string().contains("GRIDLOCK_STORE_TIMEOUT_MS"));
    }

    #[test]
    fn test_from_lookup_zero_sweep_interval_rejected() {
        let result = ServerConfig::from_lookup(lookup(&[("GRIDLOCK_SWEEP_INTERVAL_SECS", "0")]));
        assert!(result.is_err());
    }
}
