//! Configuration loading from the environment and `.env` files.

use std::{env, path::Path, str::FromStr, time::Duration};
use thiserror::Error;

/// relays asked for profiles when the group scope has none
pub const DEFAULT_PROFILE_RELAYS: [&str; 5] = [
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
    "wss://nostr.wine",
    "wss://relay.snort.social",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("unknown profile policy '{0}', expected 'fallback' or 'fill-missing'")]
    InvalidProfilePolicy(String),
}

/// how the broader relay set is used when loading profiles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfilePolicy {
    /// ask the fallback relays only when the group scope returned no profile at all
    #[default]
    FallbackWhenEmpty,
    /// ask the fallback relays for every author the group scope had no profile for
    FillMissing,
}

impl FromStr for ProfilePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "fallback" | "fallback-when-empty" => Ok(ProfilePolicy::FallbackWhenEmpty),
            "fill-missing" | "fill_missing" => Ok(ProfilePolicy::FillMissing),
            other => Err(ConfigError::InvalidProfilePolicy(other.to_string())),
        }
    }
}

/// Settings for one group client, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    /// NIP-29 group identifier; nothing can be fetched without it.
    pub group_id: Option<String>,
    /// Relay hosting the group; publishes go here.
    pub group_relay: Option<String>,
    /// General relays, used when no group relay is configured.
    pub relays: Vec<String>,
    /// Broader relay set for profile lookups.
    pub fallback_relays: Vec<String>,
    /// How many chat messages to request.
    pub message_limit: usize,
    pub query_timeout: Duration,
    pub publish_timeout: Duration,
    pub join_timeout: Duration,
    pub profile_policy: ProfilePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_id: None,
            group_relay: None,
            relays: Vec::new(),
            fallback_relays: DEFAULT_PROFILE_RELAYS.iter().map(|s| s.to_string()).collect(),
            message_limit: 50,
            query_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(10),
            profile_policy: ProfilePolicy::FallbackWhenEmpty,
        }
    }
}

impl Config {
    /// Load settings from the process environment, defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let fallback_relays = match non_empty("PROFILE_RELAYS") {
            Some(s) => csv_strings(s),
            None => defaults.fallback_relays,
        };

        Ok(Self {
            group_id: non_empty("GROUP_ID"),
            group_relay: non_empty("GROUP_RELAY"),
            relays: csv_strings(env::var("RELAYS").unwrap_or_default()),
            fallback_relays,
            message_limit: number("MESSAGE_LIMIT")?.unwrap_or(defaults.message_limit as u64)
                as usize,
            query_timeout: millis("QUERY_TIMEOUT_MS")?.unwrap_or(defaults.query_timeout),
            publish_timeout: millis("PUBLISH_TIMEOUT_MS")?.unwrap_or(defaults.publish_timeout),
            join_timeout: millis("JOIN_TIMEOUT_MS")?.unwrap_or(defaults.join_timeout),
            profile_policy: env::var("PROFILE_POLICY")
                .unwrap_or_default()
                .parse()?,
        })
    }

    /// Load the specified `.env` file into the environment, then read it.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Self::from_env()
    }

    /// relays holding the group's events: the group relay if set, else the general set
    pub fn group_scope(&self) -> Vec<String> {
        match &self.group_relay {
            Some(relay) => vec![relay.clone()],
            None => self.relays.clone(),
        }
    }

    /// where events for the group get published
    pub fn publish_relay(&self) -> Option<&str> {
        self.group_relay
            .as_deref()
            .or_else(|| self.relays.first().map(String::as_str))
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn number(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match non_empty(var) {
        None => Ok(None),
        Some(value) => match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(Some(n)),
            _ => Err(ConfigError::InvalidNumber { var, value }),
        },
    }
}

fn millis(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(number(var)?.map(Duration::from_millis))
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    input
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, sync::Mutex};
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 9] = [
        "GROUP_ID",
        "GROUP_RELAY",
        "RELAYS",
        "PROFILE_RELAYS",
        "MESSAGE_LIMIT",
        "QUERY_TIMEOUT_MS",
        "PUBLISH_TIMEOUT_MS",
        "JOIN_TIMEOUT_MS",
        "PROFILE_POLICY",
    ];

    fn load(contents: &str) -> Result<Config, ConfigError> {
        for v in VARS.iter() {
            env::remove_var(v);
        }
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, contents).unwrap();
        Config::from_env_file(&env_path)
    }

    #[test]
    fn test_loads_env() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let cfg = load(concat!(
            "GROUP_ID=pizza\n",
            "GROUP_RELAY=wss://groups.example.com\n",
            "RELAYS=\"wss://r1, wss://r2\"\n",
            "PROFILE_RELAYS=wss://p1\n",
            "MESSAGE_LIMIT=20\n",
            "QUERY_TIMEOUT_MS=1500\n",
            "PUBLISH_TIMEOUT_MS=2000\n",
            "JOIN_TIMEOUT_MS=3000\n",
            "PROFILE_POLICY=fill-missing\n",
        ))
        .unwrap();

        assert_eq!(cfg.group_id.as_deref(), Some("pizza"));
        assert_eq!(cfg.group_relay.as_deref(), Some("wss://groups.example.com"));
        assert_eq!(cfg.relays, vec!["wss://r1", "wss://r2"]);
        assert_eq!(cfg.fallback_relays, vec!["wss://p1"]);
        assert_eq!(cfg.message_limit, 20);
        assert_eq!(cfg.query_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.publish_timeout, Duration::from_secs(2));
        assert_eq!(cfg.join_timeout, Duration::from_secs(3));
        assert_eq!(cfg.profile_policy, ProfilePolicy::FillMissing);
        assert_eq!(cfg.group_scope(), vec!["wss://groups.example.com"]);
        assert_eq!(cfg.publish_relay(), Some("wss://groups.example.com"));
    }

    #[test]
    fn test_defaults_when_optional_absent() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let cfg = load("RELAYS=wss://r1\nGROUP_RELAY=\n").unwrap();

        assert!(cfg.group_id.is_none());
        assert!(cfg.group_relay.is_none());
        assert_eq!(cfg.fallback_relays.len(), DEFAULT_PROFILE_RELAYS.len());
        assert_eq!(cfg.message_limit, 50);
        assert_eq!(cfg.publish_timeout, Duration::from_secs(5));
        assert_eq!(cfg.join_timeout, Duration::from_secs(10));
        assert_eq!(cfg.profile_policy, ProfilePolicy::FallbackWhenEmpty);
        assert_eq!(cfg.group_scope(), vec!["wss://r1"]);
        assert_eq!(cfg.publish_relay(), Some("wss://r1"));
    }

    #[test]
    fn test_invalid_values_error() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        assert!(matches!(
            load("MESSAGE_LIMIT=lots\n"),
            Err(ConfigError::InvalidNumber {
                var: "MESSAGE_LIMIT",
                ..
            })
        ));
        assert!(matches!(
            load("QUERY_TIMEOUT_MS=0\n"),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            load("PROFILE_POLICY=merge-everything\n"),
            Err(ConfigError::InvalidProfilePolicy(_))
        ));
    }

    #[test]
    fn test_missing_file_errors() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        assert!(matches!(
            Config::from_env_file("/nonexistent/.env"),
            Err(ConfigError::EnvFile(_))
        ));
    }

    #[test]
    fn test_csv_helpers() {
        assert_eq!(csv_strings("a, b , ,c"), vec!["a", "b", "c"]);
        assert!(csv_strings("").is_empty());
    }
}
