use crate::error::{Error, Result};
use crate::plan::{Plan, PlanTier};
use crate::runtime::RuntimeVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// File name of the per-instance descriptor.
pub const DESCRIPTOR_FILE: &str = "instance.json";

/// Retention cap used when the plan leaves it to the descriptor.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// How a server is installed from its installer artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerFlavor {
    /// Stock server; the installer artifact is the server itself.
    #[default]
    Vanilla,
    /// Forge; the installer builds a `forge*.jar`.
    Forge,
    /// Fabric; the installer produces `fabric-server-launch.jar`.
    Fabric,
    /// Spigot, Paper, Bukkit and relatives; ready to run as shipped.
    Spigot,
    /// Custom jar, started as-is.
    Other,
}

impl ServerFlavor {
    /// Whether installing requires running the installer as a build step.
    pub fn needs_build(self) -> bool {
        matches!(self, ServerFlavor::Forge | ServerFlavor::Fabric)
    }
}

impl fmt::Display for ServerFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ServerFlavor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vanilla" => Ok(ServerFlavor::Vanilla),
            "forge" => Ok(ServerFlavor::Forge),
            "fabric" => Ok(ServerFlavor::Fabric),
            "spigot" | "paper" | "bukkit" | "craftbukkit" => Ok(ServerFlavor::Spigot),
            "other" => Ok(ServerFlavor::Other),
            _ => Err(Error::ConfigInvalid(format!("Unknown server flavor '{}'", s))),
        }
    }
}

/// Persisted settings of one instance.
///
/// Stored as `instance.json` in the instance's data directory:
///
/// ```json
/// {
///   "plan": "Basic",
///   "owner": "alice",
///   "ram": 4,
///   "runtime": "latest",
///   "flavor": "Vanilla",
///   "backupsEnabled": false,
///   "backupInterval": 0,
///   "maxBackups": 5
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    pub plan: PlanTier,
    pub owner: String,
    /// Heap ceiling in gigabytes.
    pub ram: u32,
    #[serde(default)]
    pub runtime: RuntimeVersion,
    #[serde(default)]
    pub flavor: ServerFlavor,
    #[serde(default)]
    pub backups_enabled: bool,
    /// Minutes between scheduled backups, 0 when none.
    #[serde(default)]
    pub backup_interval: u64,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

impl InstanceSettings {
    /// Fresh settings for a newly purchased plan.
    pub fn for_plan(plan: &Plan) -> Self {
        Self {
            plan: plan.tier,
            owner: plan.owner.clone(),
            ram: plan.tier.ram_gb(),
            runtime: RuntimeVersion::default(),
            flavor: ServerFlavor::default(),
            backups_enabled: false,
            backup_interval: 0,
            max_backups: plan.tier.max_backups().unwrap_or(DEFAULT_MAX_BACKUPS),
        }
    }

    /// Backups kept before the oldest is deleted.
    pub fn retention_cap(&self) -> usize {
        self.plan.max_backups().unwrap_or(self.max_backups)
    }

    /// Reads a descriptor.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content).map_err(|e| {
            Error::Serialization(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        if settings.max_backups == 0 {
            return Err(Error::ConfigInvalid(format!(
                "{}: maxBackups must be at least 1",
                path.display()
            )));
        }
        Ok(settings)
    }

    /// Writes the descriptor through a temporary file so readers never see a
    /// half-written document.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize settings: {}", e)))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);

        let mut settings = InstanceSettings::for_plan(&Plan::new(PlanTier::Advanced, "bob"));
        settings.flavor = ServerFlavor::Forge;
        settings.save(&path).unwrap();

        let loaded = InstanceSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.ram, 8);
        assert_eq!(loaded.retention_cap(), 15);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let settings: InstanceSettings =
            serde_json::from_str(r#"{ "plan": "byos", "owner": "carol", "ram": 12 }"#).unwrap();

        assert_eq!(settings.plan, PlanTier::Byos);
        assert_eq!(settings.runtime, RuntimeVersion::Latest);
        assert_eq!(settings.retention_cap(), DEFAULT_MAX_BACKUPS);
        assert!(!settings.backups_enabled);
    }

    #[test]
    fn test_zero_backup_cap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, r#"{ "plan": "BYOS", "owner": "alice", "ram": 4, "maxBackups": 0 }"#).unwrap();

        assert!(matches!(
            InstanceSettings::load(&path),
            Err(Error::ConfigInvalid(_))
        ));
    }
}
