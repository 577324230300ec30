use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::broadcast::BroadcastSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub owner_id: i64,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub data_file: PathBuf,
    pub force_sub_channel: Option<String>,
    pub force_sub_link: String,
    pub broadcast_delay_ms: u64,
    pub broadcast_max_retries: usize,
}

struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str, default: &str) -> String {
        (self.lookup)(name).unwrap_or_else(|| default.to_string())
    }

    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn u64(&self, name: &str, default: u64) -> u64 {
        (self.lookup)(name)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(default)
    }

    fn usize(&self, name: &str, default: usize) -> usize {
        (self.lookup)(name)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(default)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source = EnvSource { lookup };

        let bot_token = source.string("BOT_TOKEN", "");
        if bot_token.trim().is_empty() {
            return Err(anyhow!("BOT_TOKEN is required"));
        }

        let owner_raw = source
            .optional("OWNER_ID")
            .ok_or_else(|| anyhow!("OWNER_ID is required"))?;
        let owner_id = owner_raw
            .parse::<i64>()
            .map_err(|_| anyhow!("Invalid OWNER_ID value: {owner_raw}"))?;

        Ok(Config {
            bot_token,
            owner_id,
            log_level: source.string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(source.string("LOG_DIR", "logs")),
            data_file: PathBuf::from(source.string("DATA_FILE", "bot_data.json")),
            force_sub_channel: source.optional("FORCE_SUB_CHANNEL"),
            force_sub_link: source.string("FORCE_SUB_LINK", ""),
            broadcast_delay_ms: source.u64("BROADCAST_DELAY_MS", 80),
            broadcast_max_retries: source.usize("BROADCAST_MAX_RETRIES", 3),
        })
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            send_delay: Duration::from_millis(self.broadcast_delay_ms),
            max_rate_limit_retries: self.broadcast_max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = load(&[("BOT_TOKEN", "123:abc"), ("OWNER_ID", "42")]).unwrap();
        assert_eq!(config.owner_id, 42);
        assert_eq!(config.data_file, PathBuf::from("bot_data.json"));
        assert_eq!(config.force_sub_channel, None);
        assert_eq!(
            config.broadcast_settings().send_delay,
            Duration::from_millis(80)
        );
        assert_eq!(config.broadcast_settings().max_rate_limit_retries, 3);
    }

    #[test]
    fn missing_token_or_owner_is_an_error() {
        assert!(load(&[("OWNER_ID", "42")]).is_err());
        assert!(load(&[("BOT_TOKEN", "123:abc")]).is_err());
        assert!(load(&[("BOT_TOKEN", "123:abc"), ("OWNER_ID", "owner")]).is_err());
    }

    #[test]
    fn blank_force_sub_channel_disables_the_gate() {
        let config = load(&[
            ("BOT_TOKEN", "123:abc"),
            ("OWNER_ID", "42"),
            ("FORCE_SUB_CHANNEL", "   "),
            ("LOG_LEVEL", "DEBUG"),
        ])
        .unwrap();
        assert_eq!(config.force_sub_channel, None);
        assert_eq!(config.log_level, "debug");
    }
}
