//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use fleet_runner::config::Config;
use fleet_runner::error::{Error, Result};
use fleet_runner::network::{NoopPortMapper, PlayerCount, PlayerCounter, PortMapper};
use fleet_runner::plan::{Plan, PlanTier};
use fleet_runner::runtime::{RuntimeResolver, RuntimeVersion};
use fleet_runner::server::SERVER_ARTIFACT;
use fleet_runner::{Instance, InstanceContext, InstanceRegistry, LifecycleStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Stands in for the runtime: a server on 1.18 that answers `stop` and
/// `save-all`, and a Forge installer when run with `--installServer`.
pub const SERVER_SCRIPT: &str = r#"#!/bin/sh
case "$*" in
  *--installServer*)
    echo "Installing server"
    touch forge-1.16.5-36.2.0.jar
    exit 0
    ;;
esac
echo "[Server thread/INFO]: Starting minecraft server version 1.18.2"
echo '[Server thread/INFO]: Done (0.5s)! For help, type "help"'
while IFS= read -r line; do
  case "$line" in
    stop)
      echo "[Server thread/INFO]: Stopping server"
      exit 0
      ;;
    save-all)
      echo "[Server thread/INFO]: Saving the game (this may take a moment!)"
      echo "[Server thread/INFO]: Saved the game"
      ;;
    *)
      echo "[Server thread/INFO]: $line"
      ;;
  esac
done
"#;

/// Takes a second to come up and a second to save.
pub const SLOW_SCRIPT: &str = r#"#!/bin/sh
sleep 1
echo '[Server thread/INFO]: Done (1.0s)! For help, type "help"'
while IFS= read -r line; do
  case "$line" in
    stop)
      exit 0
      ;;
    save-all)
      echo "[Server thread/INFO]: Saving the game (this may take a moment!)"
      sleep 1
      echo "[Server thread/INFO]: Saved the game"
      ;;
    *)
      echo "[Server thread/INFO]: $line"
      ;;
  esac
done
"#;

/// Only honours the third `stop`.
pub const STUBBORN_SCRIPT: &str = r#"#!/bin/sh
echo '[Server thread/INFO]: Done (0.5s)! For help, type "help"'
stops=0
while IFS= read -r line; do
  if [ "$line" = "stop" ]; then
    stops=$((stops + 1))
    echo "[Server thread/INFO]: stop request $stops"
    if [ "$stops" -ge 3 ]; then
      exit 0
    fi
  fi
done
"#;

/// Never honours `stop` and ignores end of input.
pub const HUNG_SCRIPT: &str = r#"#!/bin/sh
echo '[Server thread/INFO]: Done (0.5s)! For help, type "help"'
while true; do
  sleep 1
done
"#;

/// Fails like a runtime too old for the server artifact.
pub const FATAL_SCRIPT: &str = r#"#!/bin/sh
echo "Error: A JNI error has occurred, please check your installation and try again" >&2
exit 1
"#;

/// Configuration with timeouts small enough for tests.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::with_root(root);
    config.stop_timeout = Duration::from_millis(500);
    config.kill_timeout = Duration::from_secs(5);
    config.save_timeout = Duration::from_secs(5);
    config.install_timeout = Duration::from_secs(10);
    config.shutdown_deadline = Duration::from_secs(10);
    config.ping_timeout = Duration::from_millis(200);
    config
}

/// Reports a fixed player count.
pub struct FixedPlayers(pub u32);

#[async_trait]
impl PlayerCounter for FixedPlayers {
    async fn query(&self, _port: u16) -> Result<PlayerCount> {
        Ok(PlayerCount {
            online: self.0,
            max: 20,
            ..Default::default()
        })
    }
}

/// Refuses every query.
pub struct NoPlayers;

#[async_trait]
impl PlayerCounter for NoPlayers {
    async fn query(&self, _port: u16) -> Result<PlayerCount> {
        Err(Error::Other("connection refused".to_string()))
    }
}

pub fn context(config: Config) -> InstanceContext {
    context_with(config, Arc::new(NoopPortMapper::new()))
}

pub fn context_with(config: Config, mapper: Arc<dyn PortMapper>) -> InstanceContext {
    InstanceContext::new(config, mapper, Arc::new(NoPlayers))
}

/// Puts `script` where the resolver looks for `version`.
#[cfg(unix)]
pub fn install_runtime(config: &Config, version: RuntimeVersion, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let resolver = RuntimeResolver::new(config.runtime_dir(), config.bundles_dir());
    let path = resolver.executable_path(version);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A registry under `root` with one instance for `owner` on `tier`, holding a
/// launchable artifact.
pub fn registry_with_instance(
    config: Config,
    owner: &str,
    tier: PlanTier,
) -> (InstanceRegistry, Arc<Instance>) {
    let registry = InstanceRegistry::open(context(config)).unwrap();
    let instance = registry.add(&Plan::new(tier, owner)).unwrap();
    std::fs::write(instance.dir().join(SERVER_ARTIFACT), b"jar").unwrap();
    (registry, instance)
}

/// Polls until `instance` reaches `status`.
pub async fn wait_for_status(instance: &Instance, status: LifecycleStatus, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if instance.status() == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    instance.status() == status
}

/// Polls until `check` holds.
pub async fn wait_until(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
