use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Output substrings that drive status transitions.
///
/// Each field is matched as a plain substring against every line the server
/// prints. The defaults match the stock Minecraft server.
///
/// # Examples
///
/// ```
/// use fleet_runner::config::Markers;
///
/// let markers = Markers::default();
/// assert_eq!(markers.save_started, "Saving the game");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Markers {
    /// Printed once the server accepts players.
    pub ready: String,
    /// Printed when a world save begins.
    pub save_started: String,
    /// Printed when a world save has been flushed.
    pub save_completed: String,
    /// Printed when a player connects.
    pub player_joined: String,
    /// Printed when a player disconnects.
    pub player_left: String,
    /// Printed by the runtime when it cannot load the server artifact.
    pub fatal: String,
    /// Prefixes followed by the game version, e.g. `1.18.2`.
    pub version_banners: Vec<String>,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            ready: "For help, type \"help\"".to_string(),
            save_started: "Saving the game".to_string(),
            save_completed: "Saved the game".to_string(),
            player_joined: "joined the game".to_string(),
            player_left: "left the game".to_string(),
            fatal: "Error: A JNI error has occurred".to_string(),
            version_banners: vec![
                "Starting minecraft server version ".to_string(),
                "Loading for game Minecraft ".to_string(),
            ],
        }
    }
}

/// Daemon configuration for Fleet Runner.
///
/// Every field except `root` has a default, so the smallest valid
/// configuration names only the data root.
///
/// # JSON Schema
///
/// ```json
/// {
///   "root": "/var/lib/fleet",
///   "apiPort": 5076,
///   "reservedPorts": [22, 80],
///   "stopTimeout": 15,
///   "stopAttempts": 3,
///   "selfHealLimit": 3
/// }
/// ```
///
/// Durations are given in seconds and may be fractional.
///
/// # Examples
///
/// ```
/// use fleet_runner::config::Config;
///
/// let config = Config::parse_from_str(r#"{ "root": "/var/lib/fleet" }"#).unwrap();
/// assert_eq!(config.api_port, 5076);
/// assert_eq!(config.servers_dir(), std::path::PathBuf::from("/var/lib/fleet/servers"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Data root holding `servers/`, `backups/` and `runtime/`.
    pub root: PathBuf,

    /// Directory containing `<platform>.zip` runtime bundles.
    /// Defaults to `<root>/bundles`.
    #[serde(default)]
    pub runtime_bundles: Option<PathBuf>,

    /// Port of the management API. Always treated as reserved.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Ports that are never handed to an instance.
    #[serde(default = "default_reserved_ports")]
    pub reserved_ports: Vec<u16>,

    /// How long a single graceful stop attempt waits for the process to exit.
    #[serde(default = "default_stop_timeout", with = "secs")]
    pub stop_timeout: Duration,

    /// Graceful stop attempts before escalating to a kill.
    #[serde(default = "default_stop_attempts")]
    pub stop_attempts: u32,

    /// How long to wait for a killed process to be reaped.
    #[serde(default = "default_kill_timeout", with = "secs")]
    pub kill_timeout: Duration,

    /// How long a backup waits for the live server to finish saving.
    #[serde(default = "default_save_timeout", with = "secs")]
    pub save_timeout: Duration,

    /// Upper bound for build-step installers.
    #[serde(default = "default_install_timeout", with = "secs")]
    pub install_timeout: Duration,

    /// Upper bound for stopping every instance at daemon exit.
    #[serde(default = "default_shutdown_deadline", with = "secs")]
    pub shutdown_deadline: Duration,

    /// Period of the background player-count refresh.
    #[serde(default = "default_player_refresh", with = "secs")]
    pub player_refresh_interval: Duration,

    /// Timeout for a single player-count query.
    #[serde(default = "default_ping_timeout", with = "secs")]
    pub ping_timeout: Duration,

    /// Corrective restarts allowed before self-healing gives up.
    #[serde(default = "default_self_heal_limit")]
    pub self_heal_limit: u32,

    /// Console lines kept in memory per instance.
    #[serde(default = "default_transcript_limit")]
    pub transcript_limit: usize,

    /// Output markers recognised by the line parser.
    #[serde(default)]
    pub markers: Markers,
}

fn default_api_port() -> u16 {
    5076
}

fn default_reserved_ports() -> Vec<u16> {
    vec![22, 80]
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_stop_attempts() -> u32 {
    3
}

fn default_kill_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_save_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_install_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_shutdown_deadline() -> Duration {
    Duration::from_secs(60)
}

fn default_player_refresh() -> Duration {
    Duration::from_secs(60)
}

fn default_ping_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_self_heal_limit() -> u32 {
    3
}

fn default_transcript_limit() -> usize {
    1000
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

impl Config {
    /// Builds a configuration with every default applied under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            runtime_bundles: None,
            api_port: default_api_port(),
            reserved_ports: default_reserved_ports(),
            stop_timeout: default_stop_timeout(),
            stop_attempts: default_stop_attempts(),
            kill_timeout: default_kill_timeout(),
            save_timeout: default_save_timeout(),
            install_timeout: default_install_timeout(),
            shutdown_deadline: default_shutdown_deadline(),
            player_refresh_interval: default_player_refresh(),
            ping_timeout: default_ping_timeout(),
            self_heal_limit: default_self_heal_limit(),
            transcript_limit: default_transcript_limit(),
            markers: Markers::default(),
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid JSON or YAML
    /// * The document does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml_str(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Directory holding one data directory per owner.
    pub fn servers_dir(&self) -> PathBuf {
        self.root.join("servers")
    }

    /// Directory holding one backup directory per owner.
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    /// Directory runtimes are provisioned into.
    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join("runtime")
    }

    /// Directory runtime bundles are read from.
    pub fn bundles_dir(&self) -> PathBuf {
        self.runtime_bundles
            .clone()
            .unwrap_or_else(|| self.root.join("bundles"))
    }

    /// Reserved ports including the API port.
    pub fn all_reserved_ports(&self) -> Vec<u16> {
        let mut ports = self.reserved_ports.clone();
        if !ports.contains(&self.api_port) {
            ports.push(self.api_port);
        }
        ports
    }
}
