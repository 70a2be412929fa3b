// src/server/process.rs
use crate::error::{Error, Result};
use crate::settings::ServerFlavor;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use uuid::Uuid;

/// Launchable server artifact inside an instance directory.
pub const SERVER_ARTIFACT: &str = "start.jar";

/// Installer artifact inside an instance directory.
pub const INSTALLER_ARTIFACT: &str = "installer.jar";

/// Minimum heap handed to every server.
pub const MIN_HEAP: &str = "-Xms128M";

/// Unique identifier for one run of a server process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunId(Uuid);

impl RunId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a running server is brought down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMethod {
    /// Console `stop`, retried, then a kill.
    Normal,
    /// Terminate the process tree at once.
    Kill,
    /// `Normal`, then start again.
    Restart,
}

/// Arguments launching the server artifact with a heap ceiling of `ram_gb`.
pub fn server_args(ram_gb: u32) -> Vec<String> {
    vec![
        MIN_HEAP.to_string(),
        format!("-Xmx{}G", ram_gb),
        "-jar".to_string(),
        SERVER_ARTIFACT.to_string(),
        "nogui".to_string(),
    ]
}

/// Arguments running the installer of a build flavour, `None` for flavours
/// shipped ready to run.
pub fn installer_args(ram_gb: u32, flavor: ServerFlavor) -> Option<Vec<String>> {
    let mut args = vec![
        MIN_HEAP.to_string(),
        format!("-Xmx{}G", ram_gb),
        "-jar".to_string(),
        INSTALLER_ARTIFACT.to_string(),
    ];
    match flavor {
        ServerFlavor::Forge => args.push("--installServer".to_string()),
        ServerFlavor::Fabric => {
            args.push("server".to_string());
            args.push("-downloadMinecraft".to_string());
        }
        ServerFlavor::Vanilla | ServerFlavor::Spigot | ServerFlavor::Other => return None,
    }
    Some(args)
}

/// A spawned server or installer process
pub struct ServerProcess {
    /// Run ID
    id: RunId,
    /// Child process
    child: Child,
    /// OS process id, also the process group on unix
    pid: Option<u32>,
}

impl ServerProcess {
    /// Spawn `executable` in `cwd` with every standard stream piped.
    ///
    /// On unix the child leads a new process group so the whole tree can be
    /// signalled at once.
    pub fn spawn(executable: &Path, args: &[String], cwd: &Path) -> Result<Self> {
        let mut command = Command::new(executable);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            Error::Process(format!(
                "Failed to start {}: {}",
                executable.display(),
                e
            ))
        })?;
        let pid = child.id();

        Ok(Self {
            id: RunId::new(),
            child,
            pid,
        })
    }

    /// Get the run ID
    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the stdin pipe from the process
    pub fn take_stdin(&mut self) -> Result<ChildStdin> {
        self.child.stdin.take().ok_or_else(|| {
            Error::Process("Failed to get stdin pipe from child process".to_string())
        })
    }

    /// Take the stdout pipe from the process
    pub fn take_stdout(&mut self) -> Result<ChildStdout> {
        self.child.stdout.take().ok_or_else(|| {
            Error::Process("Failed to get stdout pipe from child process".to_string())
        })
    }

    /// Take the stderr pipe from the process
    pub fn take_stderr(&mut self) -> Result<ChildStderr> {
        self.child.stderr.take().ok_or_else(|| {
            Error::Process("Failed to get stderr pipe from child process".to_string())
        })
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Terminate the process and everything it spawned, then reap it
    pub async fn kill(&mut self) -> Result<ExitStatus> {
        if let Some(pid) = self.pid {
            kill_tree(pid);
        }
        if let Err(e) = self.child.kill().await {
            tracing::debug!(run = %self.id, error = %e, "Child already gone");
        }
        self.wait().await
    }
}

#[cfg(unix)]
fn kill_tree(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "Failed to signal process group");
    }
}

#[cfg(windows)]
fn kill_tree(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        tracing::debug!(pid, error = %e, "Failed to run taskkill");
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(_pid: u32) {}
