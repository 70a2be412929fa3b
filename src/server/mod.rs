/// Server supervision module for Fleet Runner.
///
/// This module handles the lifecycle, monitoring, and process management of
/// game server instances. All public lifecycle operations are instrumented with
/// `tracing` spans carrying the instance owner.
///
/// # Components
///
/// * `status` - The lifecycle status of an instance and its restore slot
/// * `events` - Classifying console lines into output events
/// * `lifecycle` - Bounded history of lifecycle events
/// * `monitor` - Periodic player-count refresh while a server runs
/// * `process` - Spawning and killing server processes
/// * `supervisor` - Start, stop, install and self-healing of an instance
///
/// # Examples
///
/// Recognising console output:
///
/// ```
/// use fleet_runner::config::Markers;
/// use fleet_runner::server::{OutputEvent, OutputParser};
///
/// let parser = OutputParser::new(Markers::default());
/// assert_eq!(
///     parser.parse("Starting minecraft server version 1.16.5"),
///     Some(OutputEvent::VersionBanner { minor: 16 })
/// );
/// ```
///
/// Driving an instance:
///
/// ```no_run
/// use fleet_runner::server::StopMethod;
/// # async fn demo(instance: std::sync::Arc<fleet_runner::Instance>) {
/// if instance.start().await {
///     // ... later
///     assert!(instance.stop(StopMethod::Normal).await);
/// }
/// # }
/// ```
mod events;
pub mod lifecycle;
pub mod monitor;
mod process;
mod status;
mod supervisor;

pub use events::{OutputEvent, OutputParser};
pub use lifecycle::{LifecycleEvent, LifecycleEventKind, LifecycleLog};
pub use monitor::{PlayerMonitor, PlayerMonitorConfig};
pub use process::{
    INSTALLER_ARTIFACT, RunId, SERVER_ARTIFACT, ServerProcess, StopMethod, installer_args,
    server_args,
};
pub use status::{LifecycleStatus, StatusCell};
pub use supervisor::{FABRIC_LAUNCHER, STOP_COMMAND, plan_correction};
