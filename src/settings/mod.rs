//! Persisted per-instance settings.
//!
//! Two files live in every instance directory: the daemon's own descriptor
//! (`instance.json`) and the game's `server.properties`.
mod descriptor;
mod properties;

pub use descriptor::{DEFAULT_MAX_BACKUPS, DESCRIPTOR_FILE, InstanceSettings, ServerFlavor};
pub use properties::{
    DEFAULT_LEVEL_NAME, DEFAULT_MAX_PLAYERS, PROPERTIES_FILE, PROTECTED_PROPERTIES, Property,
    ServerProperties, is_protected,
};
