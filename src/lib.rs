/*!
 # Fleet Runner

 A Rust library for hosting a fleet of game server instances on one machine.

 ## Overview

 Fleet Runner provides functionality to:
 - Launch, stop, restart and install one server process per owner
 - Follow each server's console to track its lifecycle status
 - Restart servers on the runtime they actually need when they fail to load
 - Take point-in-time backups coordinated with the server's world saves
 - Hand every instance a port that no other instance or host service uses

 ## Basic Usage

 ```no_run
 use fleet_runner::config::{Config, validate_config};
 use fleet_runner::network::{LegacyPing, NoopPortMapper};
 use fleet_runner::plan::{Plan, PlanTier};
 use fleet_runner::server::StopMethod;
 use fleet_runner::{InstanceContext, InstanceRegistry, Result};
 use std::sync::Arc;

 #[tokio::main]
 async fn main() -> Result<()> {
     let config = Config::from_file("fleet.json")?;
     validate_config(&config)?;

     let ctx = InstanceContext::new(
         config,
         Arc::new(NoopPortMapper::new()),
         Arc::new(LegacyPing::new()),
     );
     let registry = InstanceRegistry::open(ctx)?;

     // Create an instance for a new owner, or look up an existing one
     let instance = match registry.get("alice") {
         Some(instance) => instance,
         None => registry.add(&Plan::new(PlanTier::Basic, "alice"))?,
     };

     if instance.start().await {
         instance.schedule_backups(30)?;
         let backup = instance.create_backup(true).await?;
         println!("Backed up to {}", backup.path.display());
         instance.stop(StopMethod::Normal).await;
     }

     registry.stop_all().await;
     Ok(())
 }
 ```

 ## Features

 - **Supervision**: Escalating stops, process-tree kills, bounded self-healing
 - **Backups**: Zip archives with per-plan retention and recurring schedules
 - **Configuration**: Daemon settings from JSON or YAML files
 - **Error Handling**: A single error type across the crate
 - **Async Support**: Built on tokio, instrumented with `tracing`
*/

pub mod backup;
pub mod config;
pub mod error;
pub mod instance;
pub mod network;
pub mod plan;
pub mod ports;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod settings;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use instance::{Artifacts, Instance, InstanceContext, InstanceSnapshot};
pub use registry::InstanceRegistry;
pub use server::{LifecycleStatus, RunId, StopMethod};
