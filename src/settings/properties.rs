use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File name of the game's property file.
pub const PROPERTIES_FILE: &str = "server.properties";

/// Properties managed by the daemon; users may not edit or remove them.
pub const PROTECTED_PROPERTIES: [&str; 2] = ["server-port", "server-ip"];

/// World directory used when `level-name` is unset.
pub const DEFAULT_LEVEL_NAME: &str = "world";

/// Player cap used when `max-players` is unset.
pub const DEFAULT_MAX_PLAYERS: u32 = 20;

/// A single `key=value` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub protected: bool,
}

impl Property {
    fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            return None;
        }
        let (name, value) = trimmed.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            protected: is_protected(name),
        })
    }
}

/// Whether `name` is one of [`PROTECTED_PROPERTIES`].
pub fn is_protected(name: &str) -> bool {
    PROTECTED_PROPERTIES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(name.trim()))
}

/// Line-oriented view of `server.properties`.
///
/// Comments, blank lines and unknown keys survive every rewrite; only the
/// edited line changes.
#[derive(Debug, Clone)]
pub struct ServerProperties {
    path: PathBuf,
}

impl ServerProperties {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(PROPERTIES_FILE),
        }
    }

    /// Writes the default file for a new instance unless one exists.
    pub fn init(dir: impl AsRef<Path>, port: u16) -> Result<Self> {
        let properties = Self::new(dir);
        if !properties.path.exists() {
            std::fs::write(
                &properties.path,
                format!("server-port={}\nmax-players={}\n", port, DEFAULT_MAX_PLAYERS),
            )?;
        }
        Ok(properties)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        let mut content = lines.join("\n");
        content.push('\n');
        let tmp = self.path.with_extension("properties.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Every property in file order. A missing file has none.
    pub fn all(&self) -> Result<Vec<Property>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|line| Property::parse(line))
            .collect())
    }

    /// Looks up a property by name, ignoring case.
    pub fn get(&self, name: &str) -> Result<Option<Property>> {
        Ok(self
            .all()?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim())))
    }

    /// Port the server binds to, if recorded.
    pub fn port(&self) -> Result<Option<u16>> {
        Ok(self
            .get("server-port")?
            .and_then(|p| p.value.parse::<u16>().ok()))
    }

    /// Configured player cap.
    pub fn max_players(&self) -> Result<u32> {
        Ok(self
            .get("max-players")?
            .and_then(|p| p.value.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_PLAYERS))
    }

    /// Directory name of the world.
    pub fn level_name(&self) -> Result<String> {
        Ok(self
            .get("level-name")?
            .map(|p| p.value)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL_NAME.to_string()))
    }

    /// Sets a property without the protection check. Used for daemon-owned
    /// keys such as the port.
    pub(crate) fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut lines = self.read_lines()?;
        let entry = format!("{}={}", name.trim(), value.trim());
        let existing = lines.iter().position(|line| {
            Property::parse(line).is_some_and(|p| p.name.eq_ignore_ascii_case(name.trim()))
        });
        match existing {
            Some(index) => lines[index] = entry,
            None => lines.push(entry),
        }
        self.write_lines(&lines)
    }

    /// Sets a user-editable property, adding it when absent.
    #[tracing::instrument(skip(self))]
    pub fn update(&self, name: &str, value: &str) -> Result<()> {
        if is_protected(name) {
            return Err(Error::ProtectedProperty(name.to_string()));
        }
        self.set(name, value)
    }

    /// Removes a user-editable property.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, name: &str) -> Result<()> {
        if is_protected(name) {
            return Err(Error::ProtectedProperty(name.to_string()));
        }
        let mut lines = self.read_lines()?;
        let before = lines.len();
        lines.retain(|line| {
            !Property::parse(line).is_some_and(|p| p.name.eq_ignore_ascii_case(name.trim()))
        });
        if lines.len() == before {
            return Err(Error::PropertyNotFound(name.to_string()));
        }
        self.write_lines(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let properties = ServerProperties::init(dir.path(), 25570).unwrap();
        assert_eq!(properties.port().unwrap(), Some(25570));
        assert_eq!(properties.max_players().unwrap(), 20);

        let again = ServerProperties::init(dir.path(), 1).unwrap();
        assert_eq!(again.port().unwrap(), Some(25570));
    }

    #[test]
    fn test_update_keeps_comments_and_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROPERTIES_FILE),
            "#Minecraft server properties\nmotd=hello\nserver-port=7\ndifficulty=easy\n",
        )
        .unwrap();
        let properties = ServerProperties::new(dir.path());

        properties.update("MOTD", "welcome").unwrap();
        properties.update("pvp", "false").unwrap();

        let content = std::fs::read_to_string(properties.path()).unwrap();
        assert_eq!(
            content,
            "#Minecraft server properties\nmotd=welcome\nserver-port=7\ndifficulty=easy\npvp=false\n"
        );
    }

    #[test]
    fn test_protected_properties_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let properties = ServerProperties::init(dir.path(), 9).unwrap();

        assert!(matches!(
            properties.update("server-port", "1"),
            Err(Error::ProtectedProperty(_))
        ));
        assert!(matches!(
            properties.remove("Server-IP"),
            Err(Error::ProtectedProperty(_))
        ));
        assert!(matches!(
            properties.remove("nope"),
            Err(Error::PropertyNotFound(_))
        ));
        assert!(properties.get("server-port").unwrap().unwrap().protected);
    }

    #[test]
    fn test_level_name_default() {
        let dir = tempfile::tempdir().unwrap();
        let properties = ServerProperties::new(dir.path());
        assert_eq!(properties.level_name().unwrap(), "world");
        assert!(properties.all().unwrap().is_empty());
    }
}
