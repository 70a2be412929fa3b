//! Process supervision of an instance.
//!
//! Every run of a server gets three tasks: one reader per output stream feeding
//! [`Instance::handle_line`] in order, and an exit task that owns the child,
//! waits for it (or for a kill request) and then runs the exit handler. Stop
//! requests only ever talk to the child through stdin or the kill channel, so
//! waiting for an exit never blocks the output readers.

use crate::error::{Error, Result};
use crate::instance::{Instance, RunState, accept_eula};
use crate::runtime::RuntimeVersion;
use crate::server::{
    INSTALLER_ARTIFACT, LifecycleEventKind, LifecycleStatus, OutputEvent, RunId, SERVER_ARTIFACT,
    ServerProcess, StopMethod, installer_args, server_args,
};
use crate::settings::ServerFlavor;
use crate::transport::{StdioConsole, spawn_line_reader};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;

/// How long the exit task waits for the output readers to drain.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Console command asking the server to shut down.
pub const STOP_COMMAND: &str = "stop";

/// Build artifact produced by the Fabric installer.
pub const FABRIC_LAUNCHER: &str = "fabric-server-launch.jar";

/// Runtime a corrective restart should switch to, if any.
///
/// A fatal loader error always asks for the newest runtime. Otherwise a
/// version banner that disagrees with the configured runtime asks for the one
/// it requires.
pub fn plan_correction(
    configured: RuntimeVersion,
    fatal_seen: bool,
    required: Option<RuntimeVersion>,
) -> Option<RuntimeVersion> {
    if fatal_seen {
        return Some(RuntimeVersion::newest());
    }
    required.filter(|&required| required != configured)
}

async fn wait_exited(mut exited: watch::Receiver<bool>) -> bool {
    exited.wait_for(|exited| *exited).await.is_ok()
}

impl Instance {
    /// Starts the server. Returns `false`, with the reason logged, when it
    /// could not be launched.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn start(&self) -> bool {
        match self.try_start().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Start failed");
                false
            }
        }
    }

    /// Starts the server, reporting why it could not be launched.
    pub async fn try_start(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        {
            let mut state = self.state();
            state.heal_attempts = 0;
            state.last_failure = None;
        }
        self.start_locked().await
    }

    /// Start with the operation lock held.
    pub(crate) async fn start_locked(&self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        if !self.force_scan().server {
            return Err(Error::ArtifactMissing(SERVER_ARTIFACT.to_string()));
        }

        let (ram, runtime) = {
            let state = self.state();
            (state.settings.ram, state.settings.runtime)
        };
        let executable = self.ctx.runtime.resolve(runtime).await?;

        self.open_port().await;
        let launched = accept_eula(&self.dir).and_then(|()| {
            let mut process = ServerProcess::spawn(&executable, &server_args(ram), &self.dir)?;
            let stdin = process.take_stdin()?;
            let stdout = process.take_stdout()?;
            let stderr = process.take_stderr()?;
            Ok((process, stdin, stdout, stderr))
        });
        let (mut process, stdin, stdout, stderr) = match launched {
            Ok(launched) => launched,
            Err(e) => {
                self.state().status.set(LifecycleStatus::Offline);
                self.close_port().await;
                return Err(e);
            }
        };
        let run_id = process.id();

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        {
            let mut state = self.state();
            state.run = Some(RunState {
                id: run_id,
                console: StdioConsole::new(stdin),
                kill_tx: Some(kill_tx),
                exited: exited_rx,
                stop_requested: false,
                killed: false,
            });
            state.required_runtime = None;
            state.fatal_seen = false;
            state.status.set(LifecycleStatus::Starting);
        }
        tracing::info!(run = %run_id, pid = ?process.pid(), %runtime, ram, "Server process started");
        self.record(LifecycleEventKind::Started, Some(run_id), Some(runtime.to_string()));

        let readers = [
            self.spawn_reader(run_id, stdout),
            self.spawn_reader(run_id, stderr),
        ];
        self.players.start(self.port);

        let weak = self.weak.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = process.wait() => Some(status),
                Ok(()) = kill_rx => None,
            };
            let status = match outcome {
                Some(status) => status,
                None => process.kill().await,
            };

            let drained = time::timeout(READER_DRAIN_TIMEOUT, async {
                for reader in readers {
                    let _ = reader.await;
                }
            })
            .await;
            if drained.is_err() {
                tracing::debug!(run = %run_id, "Output readers still open after exit");
            }

            if let Some(instance) = weak.upgrade() {
                instance.handle_exit(run_id, status).await;
            }
            let _ = exited_tx.send(true);
        });

        Ok(())
    }

    fn spawn_reader<R>(&self, run_id: RunId, stream: R) -> JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let weak = self.weak.clone();
        spawn_line_reader(stream, move |line| {
            if let Some(instance) = weak.upgrade() {
                instance.handle_line(run_id, line);
            }
        })
    }

    async fn open_port(&self) {
        let mapper = &self.ctx.port_mapper;
        match mapper.is_open(self.port).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = mapper.open(self.port, &self.owner).await {
                    tracing::warn!(port = self.port, error = %e, "Failed to open port forward");
                }
            }
            Err(e) => tracing::warn!(port = self.port, error = %e, "Failed to query port forward"),
        }
    }

    async fn close_port(&self) {
        if let Err(e) = self.ctx.port_mapper.close(self.port).await {
            tracing::warn!(port = self.port, error = %e, "Failed to close port forward");
        }
    }

    /// Applies one console line of run `run_id`.
    pub(crate) fn handle_line(&self, run_id: RunId, line: String) {
        let event = self.ctx.parser.parse(&line);
        let mut became_ready = false;
        let mut refresh_players = false;
        {
            let mut state = self.state();
            if state.run.as_ref().map(|run| run.id) != Some(run_id) {
                return;
            }
            state.transcript.push_back(line);
            while state.transcript.len() > self.ctx.config.transcript_limit {
                state.transcript.pop_front();
            }

            let current = state.status.current();
            match event {
                None => {}
                Some(OutputEvent::Ready) => {
                    if current == LifecycleStatus::Starting {
                        state.status.set(LifecycleStatus::Online);
                        state.heal_attempts = 0;
                        became_ready = true;
                    }
                }
                Some(OutputEvent::SaveStarted) => {
                    if matches!(current, LifecycleStatus::Online | LifecycleStatus::BackingUp) {
                        state.status.set(LifecycleStatus::Saving);
                        tracing::debug!(owner = %self.owner, from = %current, "Saving");
                    }
                }
                Some(OutputEvent::SaveCompleted) => {
                    if current == LifecycleStatus::Saving {
                        state.status.restore_previous();
                        tracing::debug!(owner = %self.owner, to = %state.status.current(), "Save completed");
                    }
                    self.save_signal.send_modify(|saves| *saves += 1);
                }
                Some(OutputEvent::PlayerActivity) => refresh_players = true,
                Some(OutputEvent::FatalError) => {
                    tracing::warn!(owner = %self.owner, run = %run_id, "Runtime failed to load the server");
                    state.fatal_seen = true;
                }
                Some(OutputEvent::VersionBanner { minor }) => {
                    if state.required_runtime.is_none() {
                        let required = RuntimeVersion::for_game_minor(minor);
                        state.required_runtime = Some(required);
                        let configured = state.settings.runtime;
                        if required != configured {
                            tracing::warn!(
                                owner = %self.owner,
                                run = %run_id,
                                minor,
                                %configured,
                                %required,
                                "Server needs a different runtime"
                            );
                            if let Some(run) = state.run.as_mut() {
                                if !run.stop_requested {
                                    if let Some(kill) = run.kill_tx.take() {
                                        run.killed = true;
                                        let _ = kill.send(());
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        if became_ready {
            tracing::info!(owner = %self.owner, run = %run_id, "Server online");
            self.record(LifecycleEventKind::Ready, Some(run_id), None);
        }
        if refresh_players {
            self.players.refresh_in_background(self.port);
        }
    }

    /// Cleans up after run `run_id` exited and decides on a corrective restart.
    pub(crate) async fn handle_exit(&self, run_id: RunId, status: Result<ExitStatus>) {
        let (run, correction) = {
            let mut state = self.state();
            if state.run.as_ref().map(|run| run.id) != Some(run_id) {
                return;
            }
            let Some(run) = state.run.take() else {
                return;
            };
            state.status.set(LifecycleStatus::Offline);

            let correction = if run.stop_requested {
                None
            } else {
                plan_correction(
                    state.settings.runtime,
                    state.fatal_seen,
                    state.required_runtime,
                )
            };
            (run, correction)
        };

        self.players.stop();
        self.close_port().await;

        let details = match &status {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        };
        let kind = if run.killed {
            LifecycleEventKind::Killed
        } else if run.stop_requested {
            LifecycleEventKind::Stopped
        } else {
            LifecycleEventKind::Exited
        };
        tracing::info!(owner = %self.owner, run = %run_id, ?kind, status = %details, "Server process ended");
        self.record(kind, Some(run_id), Some(details));

        if let Some(target) = correction {
            self.self_heal(run_id, target);
        }
    }

    fn self_heal(&self, run_id: RunId, target: RuntimeVersion) {
        let limit = self.ctx.config.self_heal_limit;
        let attempt = {
            let mut state = self.state();
            if state.heal_attempts >= limit {
                let failure = Error::SelfHealExhausted(state.heal_attempts).to_string();
                state.last_failure = Some(failure.clone());
                drop(state);
                tracing::error!(owner = %self.owner, run = %run_id, "{}", failure);
                self.record(LifecycleEventKind::SelfHealExhausted, Some(run_id), Some(failure));
                return;
            }
            state.heal_attempts += 1;
            state.heal_attempts
        };

        if let Err(e) = self.set_runtime(target) {
            tracing::warn!(owner = %self.owner, error = %e, "Failed to persist runtime selection");
        }
        tracing::warn!(owner = %self.owner, %target, attempt, limit, "Restarting with corrected runtime");
        self.record(
            LifecycleEventKind::SelfHealRestart,
            Some(run_id),
            Some(format!("{} (attempt {}/{})", target, attempt, limit)),
        );

        let weak = self.weak.clone();
        tokio::spawn(async move {
            let Some(instance) = weak.upgrade() else {
                return;
            };
            let _op = instance.op_lock.lock().await;
            if let Err(e) = instance.start_locked().await {
                tracing::warn!(owner = %instance.owner, error = %e, "Corrective restart failed");
                instance.state().last_failure = Some(e.to_string());
            }
        });
    }

    /// Sends a console command to the running server.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn send_command(&self, command: &str) -> Result<()> {
        let console = self
            .state()
            .run
            .as_ref()
            .map(|run| run.console.clone())
            .ok_or(Error::NotRunning)?;
        console.send_command(command).await
    }

    /// Stops the server. Succeeds at once when nothing is running.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn stop(&self, method: StopMethod) -> bool {
        let _op = self.op_lock.lock().await;
        self.stop_locked(method).await
    }

    pub(crate) async fn stop_locked(&self, method: StopMethod) -> bool {
        let (console, exited) = {
            let mut state = self.state();
            let Some(run) = state.run.as_mut() else {
                return true;
            };
            run.stop_requested = true;
            let handles = (run.console.clone(), run.exited.clone());
            state.status.set(match method {
                StopMethod::Normal => LifecycleStatus::Stopping,
                StopMethod::Restart => LifecycleStatus::Restarting,
                StopMethod::Kill => LifecycleStatus::Killing,
            });
            handles
        };

        if method == StopMethod::Kill {
            return self.kill_and_wait(exited).await;
        }

        let attempts = self.ctx.config.stop_attempts;
        let mut stopped = false;
        for attempt in 1..=attempts {
            tracing::debug!(attempt, attempts, "Sending stop");
            if let Err(e) = console.send_command(STOP_COMMAND).await {
                tracing::debug!(attempt, error = %e, "Stop command not delivered");
            }
            if time::timeout(self.ctx.config.stop_timeout, wait_exited(exited.clone()))
                .await
                .is_ok()
            {
                stopped = true;
                break;
            }
            tracing::warn!(attempt, attempts, "Server did not stop in time");
        }

        if !stopped {
            self.state().status.set(LifecycleStatus::Killing);
            if !self.kill_and_wait(exited).await {
                return false;
            }
        }

        match method {
            StopMethod::Restart => match self.start_locked().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Restart failed to start");
                    false
                }
            },
            _ => true,
        }
    }

    /// Asks the exit task to kill the process tree. Returns whether a kill
    /// was requested.
    pub(crate) fn request_kill(&self) -> bool {
        let mut state = self.state();
        let Some(run) = state.run.as_mut() else {
            return false;
        };
        run.stop_requested = true;
        run.killed = true;
        match run.kill_tx.take() {
            Some(kill) => kill.send(()).is_ok(),
            None => false,
        }
    }

    async fn kill_and_wait(&self, exited: watch::Receiver<bool>) -> bool {
        tracing::warn!(owner = %self.owner, "Killing server process tree");
        self.request_kill();
        let done = time::timeout(self.ctx.config.kill_timeout, wait_exited(exited))
            .await
            .is_ok();
        if !done {
            tracing::error!(owner = %self.owner, "Server process survived kill");
        }
        done
    }

    /// Turns the installer artifact into the server artifact and starts it.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub async fn install(&self) -> bool {
        let _op = self.op_lock.lock().await;

        if !self.stop_locked(StopMethod::Normal).await {
            tracing::warn!("Install aborted: server did not stop");
            return false;
        }
        if !self.force_scan().installer {
            tracing::warn!("Install aborted: no installer artifact");
            return false;
        }

        let flavor = self.state().settings.flavor;
        self.state().status.set(LifecycleStatus::Installing);
        tracing::info!(%flavor, "Installing server");

        let result = self.install_flavor(flavor).await;
        self.state().status.set(LifecycleStatus::Offline);
        self.force_scan();

        match result {
            Ok(()) => {
                self.record(LifecycleEventKind::Installed, None, Some(flavor.to_string()));
                self.state().last_failure = None;
                match self.start_locked().await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(error = %e, "Installed server failed to start");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Install failed");
                self.record(LifecycleEventKind::InstallFailed, None, Some(e.to_string()));
                self.state().last_failure = Some(e.to_string());
                false
            }
        }
    }

    async fn install_flavor(&self, flavor: ServerFlavor) -> Result<()> {
        let installer = self.dir.join(INSTALLER_ARTIFACT);
        let server = self.dir.join(SERVER_ARTIFACT);

        let (ram, runtime) = {
            let state = self.state();
            (state.settings.ram, state.settings.runtime)
        };
        let Some(args) = installer_args(ram, flavor) else {
            // Shipped ready to run.
            if flavor == ServerFlavor::Other && server.is_file() {
                return Ok(());
            }
            return promote(&installer, &server);
        };

        let executable = self.ctx.runtime.resolve(runtime).await?;
        let mut process = ServerProcess::spawn(&executable, &args, &self.dir)?;
        let readers = [
            self.spawn_install_reader(process.take_stdout()?),
            self.spawn_install_reader(process.take_stderr()?),
        ];
        drop(process.take_stdin()?);

        let status = match time::timeout(self.ctx.config.install_timeout, process.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                process.kill().await?;
                return Err(Error::InstallFailed(format!(
                    "installer did not finish within {:?}",
                    self.ctx.config.install_timeout
                )));
            }
        };
        let _ = time::timeout(READER_DRAIN_TIMEOUT, async {
            for reader in readers {
                let _ = reader.await;
            }
        })
        .await;
        if !status.success() {
            return Err(Error::InstallFailed(format!("installer exited with {}", status)));
        }

        let built = build_artifact(&self.dir, flavor)?;
        promote(&built, &server)?;
        std::fs::remove_file(&installer)?;
        tracing::info!(artifact = %built.display(), "Promoted build artifact");
        Ok(())
    }

    fn spawn_install_reader<R>(&self, stream: R) -> JoinHandle<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let weak = self.weak.clone();
        spawn_line_reader(stream, move |line| {
            if let Some(instance) = weak.upgrade() {
                instance.push_transcript(line);
            }
        })
    }
}

/// Moves `artifact` over the server artifact, replacing any previous build.
fn promote(artifact: &Path, server: &Path) -> Result<()> {
    if server.is_file() {
        std::fs::remove_file(server)?;
    }
    std::fs::rename(artifact, server)?;
    Ok(())
}

/// The single artifact a build flavour's installer left in `dir`.
pub(crate) fn build_artifact(dir: &Path, flavor: ServerFlavor) -> Result<PathBuf> {
    let candidates: Vec<PathBuf> = match flavor {
        ServerFlavor::Fabric => {
            let launcher = dir.join(FABRIC_LAUNCHER);
            if launcher.is_file() { vec![launcher] } else { Vec::new() }
        }
        _ => std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    return false;
                };
                path.is_file()
                    && name.starts_with("forge")
                    && name.ends_with(".jar")
                    && name != INSTALLER_ARTIFACT
                    && !name.contains("installer")
            })
            .collect(),
    };

    match <[PathBuf; 1]>::try_from(candidates) {
        Ok([artifact]) => Ok(artifact),
        Err(found) => Err(Error::InstallFailed(format!(
            "expected exactly one {} build artifact, found {}",
            flavor,
            found.len()
        ))),
    }
}
