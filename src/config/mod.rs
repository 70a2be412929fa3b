//! Configuration module for Fleet Runner.
//!
//! This module handles parsing, validation, and access to the daemon
//! configuration. It supports loading configurations from files or strings
//! in JSON or YAML format.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use fleet_runner::config::{Config, validate_config};
//!
//! let config = Config::from_file("fleet.json").unwrap();
//! validate_config(&config).unwrap();
//! println!("Servers live under {}", config.servers_dir().display());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use fleet_runner::config::Config;
//! use std::time::Duration;
//!
//! let mut config = Config::with_root("/var/lib/fleet");
//! config.stop_timeout = Duration::from_secs(30);
//! assert!(config.all_reserved_ports().contains(&5076));
//! ```
mod parser;
pub mod validator;

pub use parser::{Config, Markers};
pub use validator::validate_config;
