/// Error handling module for Fleet Runner.
///
/// This module defines the error types used throughout the library.
/// It provides a comprehensive set of errors that can occur when
/// supervising game-server instances, along with helpful context for debugging.
///
/// # Example
///
/// ```
/// use fleet_runner::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::InstanceNotFound(owner)) => println!("'{}' does not have a server", owner),
///         Err(Error::ArtifactMissing(name)) => println!("Nothing to launch: {} is missing", name),
///         Err(Error::Timeout(msg)) => println!("Operation timed out: {}", msg),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use thiserror::Error;

/// Errors that can occur in the fleet-runner library.
///
/// This enum represents all possible error types that can be returned from
/// operations in the Fleet Runner library. Each variant includes context
/// information to help diagnose and handle the error appropriately.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration JSON or YAML is malformed
    /// - Required fields are missing
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - A timeout or limit is zero
    /// - A marker string is empty
    /// - The data root is empty
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Error when starting, stopping, or communicating with a server process.
    ///
    /// This error occurs when:
    /// - The process fails to launch
    /// - The process stdin is closed
    /// - A kill signal could not be delivered
    #[error("Server process error: {0}")]
    Process(String),

    /// No instance is registered for the given owner.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// An instance already exists for the given owner.
    #[error("Instance already exists: {0}")]
    InstanceExists(String),

    /// A required artifact is not present in the instance directory.
    ///
    /// This error occurs when:
    /// - Starting without a launchable artifact
    /// - Installing without an installer artifact
    #[error("Missing artifact: {0}")]
    ArtifactMissing(String),

    /// The server is already running.
    #[error("Already running")]
    AlreadyRunning,

    /// The server is not running.
    ///
    /// This error occurs when:
    /// - Sending a console command to an offline instance
    #[error("Not running")]
    NotRunning,

    /// Another lifecycle operation is still settling.
    ///
    /// This error occurs when:
    /// - Backing up a server that has not finished starting
    #[error("Busy: server is {0}")]
    Busy(String),

    /// The instance's plan does not allow the requested change.
    #[error("Not allowed by plan {0}")]
    PlanRestricted(String),

    /// A plan name did not match any known tier.
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    /// A game property does not exist.
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// A game property is protected against modification or removal.
    #[error("Property is protected: {0}")]
    ProtectedProperty(String),

    /// The requested runtime could not be located or provisioned.
    #[error("Runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// No port is left to allocate.
    #[error("No ports left to allocate")]
    PortsExhausted,

    /// A backup could not be created, listed, or removed.
    #[error("Backup error: {0}")]
    Backup(String),

    /// A server installation did not produce a launchable artifact.
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// Automatic runtime correction gave up after the configured number of restarts.
    #[error("Self-healing gave up after {0} corrective restarts")]
    SelfHealExhausted(u32),

    /// Operation timed out.
    ///
    /// This error occurs when:
    /// - A save does not complete before a backup
    /// - An installer runs past its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Error in serializing or deserializing persisted settings.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Underlying filesystem or pipe error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reading or writing a zip archive.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for fleet-runner operations.
///
/// This is a convenience type alias for `std::result::Result` with the `Error` type
/// from this module.
pub type Result<T> = std::result::Result<T, Error>;
