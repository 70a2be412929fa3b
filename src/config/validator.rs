use crate::config::{Config, Markers};
use crate::error::{Error, Result};
use std::time::Duration;

fn validate_duration(name: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(Error::ConfigInvalid(format!("'{}' must be greater than zero", name)));
    }
    Ok(())
}

/// Validates the output markers
pub fn validate_markers(markers: &Markers) -> Result<()> {
    let named = [
        ("ready", &markers.ready),
        ("saveStarted", &markers.save_started),
        ("saveCompleted", &markers.save_completed),
        ("playerJoined", &markers.player_joined),
        ("playerLeft", &markers.player_left),
        ("fatal", &markers.fatal),
    ];

    for (name, value) in named {
        if value.is_empty() {
            return Err(Error::ConfigInvalid(format!("Marker '{}' is empty", name)));
        }
    }

    if markers.version_banners.iter().any(|banner| banner.is_empty()) {
        return Err(Error::ConfigInvalid("Version banner marker is empty".to_string()));
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    if config.root.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("Data root is empty".to_string()));
    }

    if config.api_port == 0 {
        return Err(Error::ConfigInvalid("API port must not be 0".to_string()));
    }

    if config.stop_attempts == 0 {
        return Err(Error::ConfigInvalid("'stopAttempts' must be at least 1".to_string()));
    }

    if config.transcript_limit == 0 {
        return Err(Error::ConfigInvalid("'transcriptLimit' must be at least 1".to_string()));
    }

    validate_duration("stopTimeout", config.stop_timeout)?;
    validate_duration("killTimeout", config.kill_timeout)?;
    validate_duration("saveTimeout", config.save_timeout)?;
    validate_duration("installTimeout", config.install_timeout)?;
    validate_duration("shutdownDeadline", config.shutdown_deadline)?;
    validate_duration("playerRefreshInterval", config.player_refresh_interval)?;
    validate_duration("pingTimeout", config.ping_timeout)?;

    validate_markers(&config.markers)?;

    Ok(())
}
