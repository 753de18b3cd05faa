use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_DATABASE_PATH: &str = "data/users.db";
const DEFAULT_ORDER_QUEUE_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    // Kept optional here; main refuses to start without it.
    pub private_key_encryption_key: Option<String>,
    pub database_path: PathBuf,
    pub order_queue_capacity: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_bot_token", &"<redacted>")
            .field(
                "private_key_encryption_key",
                &self.private_key_encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .field("database_path", &self.database_path)
            .field("order_queue_capacity", &self.order_queue_capacity)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup (the process environment in `load`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let order_queue_capacity = match lookup("ORDER_QUEUE_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .context("Failed to parse ORDER_QUEUE_CAPACITY")?,
            None => DEFAULT_ORDER_QUEUE_CAPACITY,
        };

        Ok(Self {
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN")
                .context("TELEGRAM_BOT_TOKEN not set in environment")?,
            private_key_encryption_key: lookup("PRIVATE_KEY_ENCRYPTION_KEY")
                .filter(|key| !key.is_empty()),
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            order_queue_capacity: order_queue_capacity.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(&[("TELEGRAM_BOT_TOKEN", "123:abc")])).unwrap();
        assert_eq!(config.telegram_bot_token, "123:abc");
        assert!(config.private_key_encryption_key.is_none());
        assert_eq!(config.database_path, PathBuf::from("data/users.db"));
        assert_eq!(config.order_queue_capacity, 100);
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn test_empty_encryption_key_counts_as_missing() {
        let config = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("PRIVATE_KEY_ENCRYPTION_KEY", ""),
        ]))
        .unwrap();
        assert!(config.private_key_encryption_key.is_none());
    }

    #[test]
    fn test_invalid_queue_capacity_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ORDER_QUEUE_CAPACITY", "lots"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "super-token"),
            ("PRIVATE_KEY_ENCRYPTION_KEY", "super-secret"),
        ]))
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-token"));
        assert!(!rendered.contains("super-secret"));
    }
}
