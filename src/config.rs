// Application configuration
// Log verbosity defaults differ between debug and release builds

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: &str = "debug";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Grace period before a `disconnected` connection is torn down
pub const DEFAULT_RECOVERY_GRACE_SECS: u64 = 10;

/// Connectivity-assist server type
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Stun,
    Turn,
}

/// ICE server configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ServerKind,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn stun(id: &str, url: &str) -> Self {
        ServerConfig {
            id: id.into(),
            kind: ServerKind::Stun,
            url: url.into(),
            username: None,
            credential: None,
        }
    }
}

/// Which media kinds to request from the capture source
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        CaptureConstraints {
            audio: false,
            video: true,
        }
    }
}

/// Text form used for the manually exchanged descriptions
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionEncoding {
    /// `{"type": ..., "sdp": ...}`, pasteable into a browser
    #[default]
    Json,
    /// gzip + base64 of the JSON form
    Compact,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub ice_servers: Vec<ServerConfig>,
    pub recovery_grace_secs: u64,
    pub capture: CaptureConstraints,
    pub encoding: DescriptionEncoding,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ice_servers: default_ice_servers(),
            recovery_grace_secs: DEFAULT_RECOVERY_GRACE_SECS,
            capture: CaptureConstraints::default(),
            encoding: DescriptionEncoding::default(),
        }
    }
}

/// Public Google STUN servers used when nothing is configured
pub fn default_ice_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::stun("default-stun", "stun:stun.l.google.com:19302"),
        ServerConfig::stun("default-stun-1", "stun:stun1.l.google.com:19302"),
    ]
}

impl Config {
    /// Load and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            if server.url.trim().is_empty() {
                return Err(Error::Config(format!(
                    "ice server '{}' has an empty url",
                    server.id
                )));
            }

            if server.kind == ServerKind::Turn
                && (server.username.is_none() || server.credential.is_none())
            {
                return Err(Error::Config(format!(
                    "turn server '{}' requires username and credential",
                    server.id
                )));
            }
        }

        if self.recovery_grace_secs == 0 {
            return Err(Error::Config(
                "recovery_grace_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    pub fn recovery_grace(&self) -> Duration {
        Duration::from_secs(self.recovery_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.recovery_grace(), Duration::from_secs(10));
        assert!(config.capture.video);
        assert!(!config.capture.audio);
    }

    #[test]
    fn parses_servers_and_encoding() {
        let config = Config::from_toml(
            r#"
            recovery_grace_secs = 5
            encoding = "compact"

            [capture]
            audio = true

            [[ice_servers]]
            id = "relay"
            type = "turn"
            url = "turn.example.org:3478"
            username = "alice"
            credential = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.recovery_grace_secs, 5);
        assert_eq!(config.encoding, DescriptionEncoding::Compact);
        assert!(config.capture.audio);
        assert!(config.capture.video);
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].kind, ServerKind::Turn);
    }

    #[test]
    fn rejects_empty_url() {
        let err = Config::from_toml(
            r#"
            [[ice_servers]]
            id = "broken"
            type = "stun"
            url = " "
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_turn_without_credentials() {
        let err = Config::from_toml(
            r#"
            [[ice_servers]]
            id = "relay"
            type = "turn"
            url = "turn:turn.example.org"
            username = "alice"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("relay")));
    }

    #[test]
    fn rejects_zero_grace() {
        let err = Config::from_toml("recovery_grace_secs = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
