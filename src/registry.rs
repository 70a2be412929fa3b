//! Owner-keyed registry of every instance on the host.

use crate::error::{Error, Result};
use crate::instance::{Instance, InstanceContext};
use crate::plan::Plan;
use crate::ports::PortRegistry;
use crate::server::StopMethod;
use crate::settings::{DESCRIPTOR_FILE, InstanceSettings, ServerProperties};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time;

/// Every instance of the fleet, keyed by owner.
///
/// Built once by the daemon at startup from the descriptors found under the
/// servers directory.
pub struct InstanceRegistry {
    ctx: InstanceContext,
    ports: PortRegistry,
    instances: RwLock<BTreeMap<String, Arc<Instance>>>,
}

impl InstanceRegistry {
    /// Discovers every instance under `<root>/servers`.
    ///
    /// Instances are visited in directory-name order. A persisted port that is
    /// missing, reserved or already taken by an earlier instance is replaced
    /// with a fresh allocation and written back. Persisted backup schedules
    /// are reinstalled.
    #[tracing::instrument(skip(ctx), fields(root = %ctx.config.root.display()))]
    pub fn open(ctx: InstanceContext) -> Result<Self> {
        let config = &ctx.config;
        std::fs::create_dir_all(config.servers_dir())?;
        std::fs::create_dir_all(config.backups_dir())?;

        let registry = Self {
            ports: PortRegistry::new(config.all_reserved_ports()),
            instances: RwLock::new(BTreeMap::new()),
            ctx: ctx.clone(),
        };

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(config.servers_dir())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.join(DESCRIPTOR_FILE).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            let settings = match InstanceSettings::load(dir.join(DESCRIPTOR_FILE)) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Skipping unreadable instance");
                    continue;
                }
            };
            if registry.get(&settings.owner).is_some() {
                tracing::warn!(owner = %settings.owner, dir = %dir.display(), "Skipping duplicate owner");
                continue;
            }

            let port = registry.revalidate_port(&dir, &settings.owner)?;
            let instance = Instance::open(&dir, port, settings.clone(), ctx.clone());
            if settings.backups_enabled && settings.backup_interval > 0 {
                instance.install_schedule(settings.backup_interval);
            }
            tracing::info!(owner = %settings.owner, port, "Discovered instance");
            registry.write().insert(settings.owner.clone(), instance);
        }

        tracing::info!(count = registry.read().len(), "Instance registry ready");
        Ok(registry)
    }

    fn revalidate_port(&self, dir: &std::path::Path, owner: &str) -> Result<u16> {
        let properties = ServerProperties::new(dir);
        let persisted = properties.port().unwrap_or_else(|e| {
            tracing::warn!(owner, error = %e, "Unreadable server.properties");
            None
        });

        if let Some(port) = persisted {
            if self.ports.claim(port) {
                return Ok(port);
            }
        }

        let port = self.ports.allocate()?;
        tracing::warn!(owner, ?persisted, port, "Reassigned instance port");
        properties.set("server-port", &port.to_string())?;
        Ok(port)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<Instance>>> {
        self.instances
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<Instance>>> {
        self.instances
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates the instance for a newly purchased plan.
    #[tracing::instrument(skip(self), fields(owner = %plan.owner, plan = %plan.tier))]
    pub fn add(&self, plan: &Plan) -> Result<Arc<Instance>> {
        validate_owner(&plan.owner)?;

        let mut instances = self.write();
        if instances.contains_key(&plan.owner) {
            return Err(Error::InstanceExists(plan.owner.clone()));
        }

        let port = self.ports.allocate()?;
        let dir = self.ctx.config.servers_dir().join(&plan.owner);
        let settings = InstanceSettings::for_plan(plan);
        let instance = match Instance::create(dir, port, settings, self.ctx.clone()) {
            Ok(instance) => instance,
            Err(e) => {
                self.ports.release(port);
                return Err(e);
            }
        };

        tracing::info!(port, "Instance created");
        instances.insert(plan.owner.clone(), Arc::clone(&instance));
        Ok(instance)
    }

    /// Looks up the instance of `owner`.
    pub fn get(&self, owner: &str) -> Option<Arc<Instance>> {
        self.read().get(owner).cloned()
    }

    /// Looks up the instance of `owner`, failing when there is none.
    pub fn require(&self, owner: &str) -> Result<Arc<Instance>> {
        self.get(owner)
            .ok_or_else(|| Error::InstanceNotFound(owner.to_string()))
    }

    /// Every owner, sorted.
    pub fn owners(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn instances(&self) -> Vec<Arc<Instance>> {
        self.read().values().cloned().collect()
    }

    pub fn ports(&self) -> &PortRegistry {
        &self.ports
    }

    pub fn context(&self) -> &InstanceContext {
        &self.ctx
    }

    /// Stops every instance gracefully within the shutdown deadline.
    ///
    /// Instances still running at the deadline are killed. Backup schedules
    /// are cancelled either way. Returns whether every instance stopped in
    /// time.
    #[tracing::instrument(skip(self))]
    pub async fn stop_all(&self) -> bool {
        let instances = self.instances();
        for instance in &instances {
            instance.schedule.cancel();
        }

        let deadline = self.ctx.config.shutdown_deadline;
        let stops = instances
            .iter()
            .map(|instance| instance.stop(StopMethod::Normal));

        let all_stopped = match time::timeout(deadline, join_all(stops)).await {
            Ok(results) => results.into_iter().all(|stopped| stopped),
            Err(_) => {
                tracing::error!(?deadline, "Shutdown deadline passed, killing remaining servers");
                false
            }
        };

        if !all_stopped {
            for instance in instances.iter().filter(|i| i.is_running()) {
                instance.request_kill();
            }
        }

        tracing::info!(count = instances.len(), all_stopped, "Fleet stopped");
        all_stopped
    }
}

/// Owner ids double as directory names.
fn validate_owner(owner: &str) -> Result<()> {
    let valid = !owner.is_empty()
        && !owner.starts_with('.')
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::ConfigInvalid(format!("Invalid owner id '{}'", owner)))
    }
}
