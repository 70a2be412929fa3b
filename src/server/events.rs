use crate::config::Markers;

/// Something a server announced on its console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// The server accepts players.
    Ready,
    /// A world save began.
    SaveStarted,
    /// The world save finished.
    SaveCompleted,
    /// A player joined or left.
    PlayerActivity,
    /// The runtime could not load the server artifact.
    FatalError,
    /// The server reported its game version `1.<minor>.x`.
    VersionBanner { minor: u32 },
}

/// Classifies console lines into [`OutputEvent`]s.
///
/// Markers are tried in a fixed order and the first match wins, so each line
/// yields at most one event.
#[derive(Debug, Clone)]
pub struct OutputParser {
    markers: Markers,
}

impl OutputParser {
    pub fn new(markers: Markers) -> Self {
        Self { markers }
    }

    pub fn parse(&self, line: &str) -> Option<OutputEvent> {
        let m = &self.markers;
        if line.contains(&m.fatal) {
            Some(OutputEvent::FatalError)
        } else if line.contains(&m.ready) {
            Some(OutputEvent::Ready)
        } else if line.contains(&m.save_completed) {
            Some(OutputEvent::SaveCompleted)
        } else if line.contains(&m.save_started) {
            Some(OutputEvent::SaveStarted)
        } else if line.contains(&m.player_joined) || line.contains(&m.player_left) {
            Some(OutputEvent::PlayerActivity)
        } else {
            m.version_banners
                .iter()
                .find_map(|banner| {
                    let (_, rest) = line.split_once(banner.as_str())?;
                    game_minor(rest)
                })
                .map(|minor| OutputEvent::VersionBanner { minor })
        }
    }
}

/// Minor component of a version string such as `1.18.2` or `1.16.5-forge`.
fn game_minor(version: &str) -> Option<u32> {
    let token = version.split_whitespace().next()?;
    let minor = token.split('.').nth(1)?;
    let digits: String = minor.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> OutputParser {
        OutputParser::new(Markers::default())
    }

    #[test]
    fn test_stock_server_lines() {
        let p = parser();
        assert_eq!(
            p.parse(r#"[12:00:01] [Server thread/INFO]: Done (3.2s)! For help, type "help""#),
            Some(OutputEvent::Ready)
        );
        assert_eq!(
            p.parse("[Server thread/INFO]: Saving the game (this may take a moment!)"),
            Some(OutputEvent::SaveStarted)
        );
        assert_eq!(
            p.parse("[Server thread/INFO]: Saved the game"),
            Some(OutputEvent::SaveCompleted)
        );
        assert_eq!(
            p.parse("[Server thread/INFO]: Steve joined the game"),
            Some(OutputEvent::PlayerActivity)
        );
        assert_eq!(
            p.parse("Error: A JNI error has occurred, please check your installation"),
            Some(OutputEvent::FatalError)
        );
        assert_eq!(p.parse("[Server thread/INFO]: Preparing spawn area"), None);
    }

    #[test]
    fn test_version_banners() {
        let p = parser();
        assert_eq!(
            p.parse("[Server thread/INFO]: Starting minecraft server version 1.18.2"),
            Some(OutputEvent::VersionBanner { minor: 18 })
        );
        assert_eq!(
            p.parse("[main/INFO]: Loading for game Minecraft 1.16.5"),
            Some(OutputEvent::VersionBanner { minor: 16 })
        );
        assert_eq!(
            p.parse("Starting minecraft server version 1.8"),
            Some(OutputEvent::VersionBanner { minor: 8 })
        );
        assert_eq!(p.parse("Starting minecraft server version snapshot"), None);
    }
}
