//! Process configuration read from the environment

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_HISTORY_LIMIT: usize = 5;
const DEFAULT_SESSION_TTL_SECS: u64 = 900;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Everything the bot needs to start
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    /// Actor allowed into the admin menu
    pub admin_user_id: Option<i64>,
    /// Ordered generation credentials; empty disables scenarios
    pub gemini_api_keys: Vec<String>,
    pub gemini_model: String,
    pub scenario_history_limit: usize,
    pub db_path: PathBuf,
    pub reference_data_dir: PathBuf,
    /// `None` keeps wizard sessions until they finish
    pub session_ttl: Option<Duration>,
    pub poll_timeout: Duration,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let telegram_token = var("TELEGRAM_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_TOKEN"))?;

        let admin_user_id = var("ADMIN_USER_ID")
            .map(|v| parse_number("ADMIN_USER_ID", &v))
            .transpose()?;

        let gemini_api_keys = var("GEMINI_API_KEYS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let scenario_history_limit = var("SCENARIO_HISTORY_LIMIT")
            .map(|v| parse_number("SCENARIO_HISTORY_LIMIT", &v))
            .transpose()?
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        let session_ttl_secs: u64 = var("SESSION_TTL_SECS")
            .map(|v| parse_number("SESSION_TTL_SECS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let poll_timeout_secs: u64 = var("POLL_TIMEOUT_SECS")
            .map(|v| parse_number("POLL_TIMEOUT_SECS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS);

        let db_path = var("BOT_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(home).join(".shelter-bot").join("bot.db")
            },
            PathBuf::from,
        );

        Ok(Self {
            telegram_token,
            admin_user_id,
            gemini_api_keys,
            gemini_model: var("GEMINI_MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            scenario_history_limit,
            db_path,
            reference_data_dir: var("REFERENCE_DATA_DIR")
                .map_or_else(|| PathBuf::from("./iran"), PathBuf::from),
            session_ttl: (session_ttl_secs > 0).then(|| Duration::from_secs(session_ttl_secs)),
            poll_timeout: Duration::from_secs(poll_timeout_secs),
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        BotConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_token_is_required() {
        assert_eq!(
            config_from(&[]).unwrap_err(),
            ConfigError::Missing("TELEGRAM_TOKEN")
        );
        assert_eq!(
            config_from(&[("TELEGRAM_TOKEN", "  ")]).unwrap_err(),
            ConfigError::Missing("TELEGRAM_TOKEN")
        );
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("TELEGRAM_TOKEN", "t"), ("HOME", "/home/bot")]).unwrap();
        assert_eq!(config.gemini_model, "gemini-1.5-flash");
        assert_eq!(config.scenario_history_limit, 5);
        assert_eq!(config.session_ttl, Some(Duration::from_secs(900)));
        assert_eq!(config.poll_timeout, Duration::from_secs(30));
        assert_eq!(config.db_path, PathBuf::from("/home/bot/.shelter-bot/bot.db"));
        assert_eq!(config.reference_data_dir, PathBuf::from("./iran"));
        assert!(config.gemini_api_keys.is_empty());
        assert!(config.admin_user_id.is_none());
    }

    #[test]
    fn test_key_list_drops_blanks_and_keeps_order() {
        let config = config_from(&[
            ("TELEGRAM_TOKEN", "t"),
            ("GEMINI_API_KEYS", "k1, ,k2,,k3 "),
        ])
        .unwrap();
        assert_eq!(config.gemini_api_keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let config = config_from(&[("TELEGRAM_TOKEN", "t"), ("SESSION_TTL_SECS", "0")]).unwrap();
        assert_eq!(config.session_ttl, None);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = config_from(&[("TELEGRAM_TOKEN", "t"), ("ADMIN_USER_ID", "boss")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "ADMIN_USER_ID",
                value: "boss".to_string()
            }
        );
    }
}
