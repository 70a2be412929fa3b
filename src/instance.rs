//! A single managed server instance.
//!
//! An [`Instance`] bundles everything known about one owner's server: its data
//! directory, persisted settings, live status and the handle of the running
//! process. Lifecycle operations live in [`crate::server`], backups in
//! [`crate::backup`]; both act on the same shared `Arc<Instance>`.

use crate::backup::{BackupSchedule, BackupStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::network::{PlayerCounter, PortMapper};
use crate::plan::PlanTier;
use crate::runtime::{RuntimeResolver, RuntimeVersion};
use crate::server::{
    INSTALLER_ARTIFACT, LifecycleEvent, LifecycleEventKind, LifecycleLog, LifecycleStatus,
    OutputParser, PlayerMonitor, PlayerMonitorConfig, RunId, SERVER_ARTIFACT, StatusCell,
};
use crate::settings::{DESCRIPTOR_FILE, InstanceSettings, ServerFlavor, ServerProperties};
use crate::transport::StdioConsole;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{oneshot, watch};

/// File recording the licence acceptance.
pub const EULA_FILE: &str = "eula.txt";

/// Services shared by every instance of a fleet.
#[derive(Clone)]
pub struct InstanceContext {
    pub config: Arc<Config>,
    pub runtime: Arc<RuntimeResolver>,
    pub port_mapper: Arc<dyn PortMapper>,
    pub players: Arc<dyn PlayerCounter>,
    pub parser: Arc<OutputParser>,
}

impl InstanceContext {
    pub fn new(
        config: Config,
        port_mapper: Arc<dyn PortMapper>,
        players: Arc<dyn PlayerCounter>,
    ) -> Self {
        let runtime = RuntimeResolver::new(config.runtime_dir(), config.bundles_dir());
        let parser = OutputParser::new(config.markers.clone());
        Self {
            config: Arc::new(config),
            runtime: Arc::new(runtime),
            port_mapper,
            players,
            parser: Arc::new(parser),
        }
    }
}

/// Which artifacts are present in the data directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    /// `start.jar`
    pub server: bool,
    /// `installer.jar`
    pub installer: bool,
}

/// Point-in-time view of an instance for status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub owner: String,
    pub status: LifecycleStatus,
    pub players: u32,
    pub max_players: u32,
    pub plan: PlanTier,
    pub ram: u32,
    pub port: u16,
    pub runtime: RuntimeVersion,
    pub flavor: ServerFlavor,
    pub modded: bool,
    pub plugins: bool,
    pub backups_enabled: bool,
    pub backup_interval: u64,
}

/// Bookkeeping of the live process.
pub(crate) struct RunState {
    pub(crate) id: RunId,
    pub(crate) console: StdioConsole,
    pub(crate) kill_tx: Option<oneshot::Sender<()>>,
    pub(crate) exited: watch::Receiver<bool>,
    /// A stop was asked for; the exit is expected.
    pub(crate) stop_requested: bool,
    /// The process tree was killed rather than stopped.
    pub(crate) killed: bool,
}

/// Mutable state guarded by the instance mutex.
pub(crate) struct InstanceState {
    pub(crate) status: StatusCell,
    pub(crate) settings: InstanceSettings,
    pub(crate) artifacts: Artifacts,
    pub(crate) transcript: VecDeque<String>,
    pub(crate) run: Option<RunState>,
    /// Runtime the current run's version banner asked for.
    pub(crate) required_runtime: Option<RuntimeVersion>,
    /// The current run hit the runtime's fatal loader error.
    pub(crate) fatal_seen: bool,
    /// Corrective restarts since the instance was last online.
    pub(crate) heal_attempts: u32,
    pub(crate) last_failure: Option<String>,
}

/// One owner's server.
pub struct Instance {
    pub(crate) owner: String,
    pub(crate) dir: PathBuf,
    pub(crate) port: u16,
    pub(crate) ctx: InstanceContext,
    pub(crate) state: Mutex<InstanceState>,
    /// Serialises start, stop, install and backup.
    pub(crate) op_lock: tokio::sync::Mutex<()>,
    /// Bumped every time the server reports a finished save.
    pub(crate) save_signal: watch::Sender<u64>,
    pub(crate) log: LifecycleLog,
    pub(crate) players: PlayerMonitor,
    pub(crate) properties: ServerProperties,
    pub(crate) backup_store: BackupStore,
    pub(crate) schedule: BackupSchedule,
    pub(crate) weak: Weak<Instance>,
}

impl Instance {
    /// Sets up the data directory of a new instance and returns it.
    ///
    /// Writes the descriptor, the default `server.properties` and the EULA
    /// acceptance.
    pub fn create(
        dir: impl Into<PathBuf>,
        port: u16,
        settings: InstanceSettings,
        ctx: InstanceContext,
    ) -> Result<Arc<Self>> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        settings.save(dir.join(DESCRIPTOR_FILE))?;
        ServerProperties::init(&dir, port)?;
        accept_eula(&dir)?;
        Ok(Self::open(dir, port, settings, ctx))
    }

    /// Wraps an existing data directory.
    pub fn open(
        dir: impl Into<PathBuf>,
        port: u16,
        settings: InstanceSettings,
        ctx: InstanceContext,
    ) -> Arc<Self> {
        let dir = dir.into();
        let owner = settings.owner.clone();
        let backup_store = BackupStore::new(ctx.config.backups_dir().join(&owner));
        let players = PlayerMonitor::new(
            Arc::clone(&ctx.players),
            PlayerMonitorConfig {
                refresh_interval: ctx.config.player_refresh_interval,
                query_timeout: ctx.config.ping_timeout,
            },
        );
        let (save_signal, _) = watch::channel(0);

        let instance = Arc::new_cyclic(|weak| Self {
            owner,
            properties: ServerProperties::new(&dir),
            dir,
            port,
            state: Mutex::new(InstanceState {
                status: StatusCell::new(),
                settings,
                artifacts: Artifacts::default(),
                transcript: VecDeque::new(),
                run: None,
                required_runtime: None,
                fatal_seen: false,
                heal_attempts: 0,
                last_failure: None,
            }),
            op_lock: tokio::sync::Mutex::new(()),
            save_signal,
            log: LifecycleLog::new(),
            players,
            backup_store,
            schedule: BackupSchedule::new(),
            weak: weak.clone(),
            ctx,
        });
        instance.force_scan();
        instance
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, InstanceState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn record(&self, kind: LifecycleEventKind, run: Option<RunId>, details: Option<String>) {
        if let Err(e) = self.log.record(kind, run, details) {
            tracing::warn!(owner = %self.owner, error = %e, "Failed to record lifecycle event");
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn status(&self) -> LifecycleStatus {
        self.state().status.current()
    }

    pub fn previous_status(&self) -> LifecycleStatus {
        self.state().status.previous()
    }

    pub fn settings(&self) -> InstanceSettings {
        self.state().settings.clone()
    }

    /// Whether a server process is alive.
    pub fn is_running(&self) -> bool {
        self.state().run.is_some()
    }

    /// Id of the live process run.
    pub fn run_id(&self) -> Option<RunId> {
        self.state().run.as_ref().map(|run| run.id)
    }

    /// Re-reads which artifacts exist on disk.
    pub fn force_scan(&self) -> Artifacts {
        let artifacts = Artifacts {
            server: self.dir.join(SERVER_ARTIFACT).is_file(),
            installer: self.dir.join(INSTALLER_ARTIFACT).is_file(),
        };
        self.state().artifacts = artifacts;
        artifacts
    }

    /// Artifacts as of the last scan.
    pub fn artifacts(&self) -> Artifacts {
        self.state().artifacts
    }

    /// Console lines kept from recent runs, oldest first.
    pub fn transcript(&self) -> Vec<String> {
        self.state().transcript.iter().cloned().collect()
    }

    pub(crate) fn push_transcript(&self, line: String) {
        let limit = self.ctx.config.transcript_limit;
        let mut state = self.state();
        state.transcript.push_back(line);
        while state.transcript.len() > limit {
            state.transcript.pop_front();
        }
    }

    pub fn player_count(&self) -> u32 {
        self.players.count()
    }

    /// Queries the player count now. Reports zero when no server is running.
    pub async fn refresh_players(&self) -> u32 {
        if !self.is_running() {
            return 0;
        }
        self.players.refresh(self.port).await
    }

    /// The game's `server.properties`.
    pub fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    /// Lifecycle history, newest first.
    pub fn lifecycle_events(&self, limit: Option<usize>) -> Result<Vec<LifecycleEvent>> {
        self.log.events(limit)
    }

    /// Terminal failure of the last lifecycle operation, if any.
    pub fn last_failure(&self) -> Option<String> {
        self.state().last_failure.clone()
    }

    fn update_settings(&self, change: impl FnOnce(&mut InstanceSettings)) -> Result<()> {
        let mut state = self.state();
        let mut settings = state.settings.clone();
        change(&mut settings);
        settings.save(self.dir.join(DESCRIPTOR_FILE))?;
        state.settings = settings;
        Ok(())
    }

    /// Sets the heap ceiling. Only the unrestricted plan may choose its own.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub fn set_max_ram(&self, gigabytes: u32) -> Result<()> {
        let plan = self.state().settings.plan;
        if !plan.is_unrestricted() {
            return Err(Error::PlanRestricted(plan.to_string()));
        }
        if gigabytes == 0 {
            return Err(Error::ConfigInvalid("RAM limit must be at least 1 GB".to_string()));
        }
        self.update_settings(|s| s.ram = gigabytes)?;
        tracing::info!(ram = gigabytes, "RAM limit changed");
        Ok(())
    }

    /// Selects the runtime the next start uses.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub fn set_runtime(&self, runtime: RuntimeVersion) -> Result<()> {
        self.update_settings(|s| s.runtime = runtime)?;
        tracing::info!(%runtime, "Runtime changed");
        Ok(())
    }

    /// Selects how the next install treats the installer artifact.
    #[tracing::instrument(skip(self), fields(owner = %self.owner))]
    pub fn set_flavor(&self, flavor: ServerFlavor) -> Result<()> {
        self.update_settings(|s| s.flavor = flavor)?;
        tracing::info!(%flavor, "Server flavor changed");
        Ok(())
    }

    pub(crate) fn persist_schedule(&self, minutes: u64) -> Result<()> {
        self.update_settings(|s| {
            s.backups_enabled = minutes > 0;
            s.backup_interval = minutes;
        })
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        let (status, settings) = {
            let state = self.state();
            (state.status.current(), state.settings.clone())
        };
        let max_players = self.properties.max_players().unwrap_or_else(|e| {
            tracing::debug!(owner = %self.owner, error = %e, "Unreadable server.properties");
            crate::settings::DEFAULT_MAX_PLAYERS
        });

        InstanceSnapshot {
            owner: self.owner.clone(),
            status,
            players: self.players.count(),
            max_players,
            plan: settings.plan,
            ram: settings.ram,
            port: self.port,
            runtime: settings.runtime,
            flavor: settings.flavor,
            modded: self.dir.join("mods").is_dir(),
            plugins: self.dir.join("plugins").is_dir(),
            backups_enabled: settings.backups_enabled,
            backup_interval: settings.backup_interval,
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("owner", &self.owner)
            .field("dir", &self.dir)
            .field("port", &self.port)
            .field("status", &self.status())
            .finish()
    }
}

/// Writes `eula=true` unless the directory already accepts the EULA.
pub(crate) fn accept_eula(dir: &Path) -> Result<()> {
    let path = dir.join(EULA_FILE);
    let accepted = std::fs::read_to_string(&path)
        .map(|content| {
            content
                .lines()
                .any(|line| line.trim().eq_ignore_ascii_case("eula=true"))
        })
        .unwrap_or(false);
    if !accepted {
        std::fs::write(&path, "eula=true\n")?;
    }
    Ok(())
}
