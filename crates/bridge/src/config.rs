//! Bridge configuration: a TOML file with environment overrides.
//!
//! ```toml
//! [link]
//! host = "127.0.0.1"
//! port = 7777
//!
//! [rules]
//! catalog = "config/signals.yml"
//! path = "config/rules.yml"
//! on_invalid = "reject"
//! initial_match = "fire"
//!
//! [session]
//! event_window_secs = 60
//!
//! [tokens]
//! Shift1 = 0
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shift_link::{LinkConfig, TokenMap};
use shift_rules::{InitialMatch, OnInvalidRule};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub link: LinkConfig,
    pub rules: RulesConfig,
    pub session: SessionConfig,
    /// Token → bit position overrides on top of the default map.
    pub tokens: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Signal catalog YAML.
    pub catalog: PathBuf,
    /// Rules YAML.
    pub path: PathBuf,
    pub on_invalid: OnInvalidRule,
    pub initial_match: InitialMatch,
    /// Reload the rules file when it changes.
    pub watch: bool,
    pub audit_max_entries: usize,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("config/signals.yml"),
            path: PathBuf::from("config/rules.yml"),
            on_invalid: OnInvalidRule::default(),
            initial_match: InitialMatch::default(),
            watch: true,
            audit_max_entries: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long journal events stay in the recent-event window.
    pub event_window_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { event_window_secs: 60 }
    }
}

impl SessionConfig {
    pub fn event_window(&self) -> Duration {
        Duration::from_secs(self.event_window_secs)
    }
}

impl BridgeConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides, validated like a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_opt)
    }

    /// Defaults plus overrides read through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_opt);
    }

    /// Apply `SHIFT_*` overrides read through `lookup`. Unparseable ports are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SHIFT_LINK_HOST") {
            self.link.host = v;
        }
        if let Some(port) = lookup("SHIFT_LINK_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.link.port = port;
        }
        if let Some(v) = lookup("SHIFT_CATALOG_PATH") {
            self.rules.catalog = PathBuf::from(v);
        }
        if let Some(v) = lookup("SHIFT_RULES_PATH") {
            self.rules.path = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.host.trim().is_empty() {
            return Err(ConfigError::Invalid("link.host must not be empty".into()));
        }
        if self.link.port == 0 {
            return Err(ConfigError::Invalid("link.port must be non-zero".into()));
        }
        if self.link.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("link.poll_interval_ms must be non-zero".into()));
        }
        if self.rules.audit_max_entries == 0 {
            return Err(ConfigError::Invalid("rules.audit_max_entries must be non-zero".into()));
        }
        self.token_map()?;
        Ok(())
    }

    pub fn token_map(&self) -> Result<TokenMap, ConfigError> {
        Ok(TokenMap::with_overrides(
            self.tokens.iter().map(|(token, &position)| (token.clone(), position)),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = BridgeConfig::from_toml("").unwrap();
        let mut expected = BridgeConfig::default();
        expected.apply_env_overrides();
        assert_eq!(config, expected);
        assert_eq!(config.session.event_window(), Duration::from_secs(60));
        assert_eq!(config.rules.initial_match, InitialMatch::Fire);
        assert_eq!(config.rules.on_invalid, OnInvalidRule::Reject);
    }

    #[test]
    fn sections_parse() {
        let mut config: BridgeConfig = toml::from_str(
            r#"
[link]
host = "192.168.1.20"
port = 9100
steady_retry_ms = 10000

[rules]
catalog = "/etc/shift/signals.yml"
path = "/etc/shift/rules.yml"
on_invalid = "skip"
initial_match = "baseline"
watch = false

[session]
event_window_secs = 15

[tokens]
Shift1 = 4
Shift5 = 0
"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.link.address(), "192.168.1.20:9100");
        assert_eq!(config.link.steady_retry_ms, 10_000);
        assert_eq!(config.link.initial_retry_ms, LinkConfig::default().initial_retry_ms);
        assert_eq!(config.rules.on_invalid, OnInvalidRule::Skip);
        assert_eq!(config.rules.initial_match, InitialMatch::Baseline);
        assert!(!config.rules.watch);
        assert_eq!(config.session.event_window_secs, 15);

        let tokens = config.token_map().unwrap();
        assert_eq!(tokens.position("Shift1"), Some(4));
        assert_eq!(tokens.position("Shift5"), Some(0));
    }

    #[test]
    fn colliding_tokens_fail_validation() {
        let err = BridgeConfig::from_toml("[tokens]\nShift1 = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Tokens(_)), "got {err}");

        let err = BridgeConfig::from_toml("[tokens]\nShift1 = 16\n").unwrap_err();
        assert!(matches!(err, ConfigError::Tokens(_)), "got {err}");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            BridgeConfig::from_toml("[link]\nport = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::from_toml("[rules]\non_invalid = \"maybe\"\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            ("SHIFT_LINK_HOST", "10.1.1.1"),
            ("SHIFT_LINK_PORT", "8123"),
            ("SHIFT_RULES_PATH", "/tmp/rules.yml"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.link.host, "10.1.1.1");
        assert_eq!(config.link.port, 8123);
        assert_eq!(config.rules.path, PathBuf::from("/tmp/rules.yml"));
        assert_eq!(config.rules.catalog, PathBuf::from("config/signals.yml"));
    }

    #[test]
    fn bad_port_override_is_ignored() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| (key == "SHIFT_LINK_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.link.port, LinkConfig::default().port);
    }

    #[test]
    fn env_only_config_is_validated() {
        let config = BridgeConfig::from_lookup(|key| (key == "SHIFT_LINK_PORT").then(|| "9001".to_string())).unwrap();
        assert_eq!(config.link.port, 9001);

        let err = BridgeConfig::from_lookup(|key| (key == "SHIFT_LINK_HOST").then(|| "   ".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {err}");
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shift-bridge.toml");
        std::fs::write(&path, "[session]\nevent_window_secs = 5\n").unwrap();
        let config = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(config.session.event_window_secs, 5);

        assert!(matches!(
            BridgeConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
