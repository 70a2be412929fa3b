mod common;

use common::*;
use fleet_runner::error::{Error, Result};
use fleet_runner::plan::PlanTier;
use fleet_runner::runtime::RuntimeVersion;
use fleet_runner::settings::{DESCRIPTOR_FILE, InstanceSettings, PROPERTIES_FILE, ServerFlavor};
use fleet_runner::LifecycleStatus;
use std::collections::BTreeSet;
use std::time::Duration;

#[test]
fn test_ram_limit_restricted_by_plan() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let config = test_config(temp.path());
    let (registry, byos) = registry_with_instance(config, "byos", PlanTier::Byos);

    byos.set_max_ram(12)?;
    assert_eq!(byos.settings().ram, 12);
    assert!(matches!(byos.set_max_ram(0), Err(Error::ConfigInvalid(_))));

    let persisted = InstanceSettings::load(byos.dir().join(DESCRIPTOR_FILE))?;
    assert_eq!(persisted.ram, 12);

    for (owner, tier) in [
        ("basic", PlanTier::Basic),
        ("intermediate", PlanTier::Intermediate),
        ("advanced", PlanTier::Advanced),
        ("pro", PlanTier::Pro),
        ("elite", PlanTier::Elite),
    ] {
        let instance = registry.add(&fleet_runner::plan::Plan::new(tier, owner))?;
        assert_eq!(instance.settings().ram, tier.ram_gb());
        assert!(matches!(
            instance.set_max_ram(32),
            Err(Error::PlanRestricted(_))
        ));
        assert_eq!(instance.settings().ram, tier.ram_gb());
    }

    Ok(())
}

#[test]
fn test_new_instance_layout() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (_registry, instance) =
        registry_with_instance(test_config(temp.path()), "alice", PlanTier::Advanced);
    let dir = instance.dir();

    assert!(dir.join(DESCRIPTOR_FILE).is_file());
    assert!(dir.join(PROPERTIES_FILE).is_file());
    assert_eq!(std::fs::read_to_string(dir.join("eula.txt"))?.trim(), "eula=true");
    assert_eq!(instance.properties().port()?, Some(instance.port()));
    assert_eq!(instance.status(), LifecycleStatus::Offline);
    assert_eq!(instance.previous_status(), LifecycleStatus::Offline);

    let snapshot = instance.snapshot();
    assert_eq!(snapshot.owner, "alice");
    assert_eq!(snapshot.plan, PlanTier::Advanced);
    assert_eq!(snapshot.ram, 8);
    assert_eq!(snapshot.max_players, 20);
    assert_eq!(snapshot.players, 0);
    assert!(!snapshot.modded);

    std::fs::create_dir(dir.join("mods"))?;
    assert!(instance.snapshot().modded);

    Ok(())
}

#[test]
fn test_settings_persist() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (_registry, instance) =
        registry_with_instance(test_config(temp.path()), "alice", PlanTier::Basic);

    instance.set_runtime(RuntimeVersion::Legacy)?;
    instance.set_flavor(ServerFlavor::Fabric)?;

    let persisted = InstanceSettings::load(instance.dir().join(DESCRIPTOR_FILE))?;
    assert_eq!(persisted.runtime, RuntimeVersion::Legacy);
    assert_eq!(persisted.flavor, ServerFlavor::Fabric);
    assert_eq!(persisted.plan, PlanTier::Basic);

    Ok(())
}

#[tokio::test]
async fn test_offline_backups_keep_newest() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (_registry, instance) =
        registry_with_instance(test_config(temp.path()), "alice", PlanTier::Basic);
    std::fs::create_dir_all(instance.dir().join("world"))?;
    std::fs::write(instance.dir().join("world/level.dat"), b"level")?;

    let mut names = Vec::new();
    for _ in 0..7 {
        names.push(instance.create_backup(true).await?.name);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(instance.status(), LifecycleStatus::Offline);

    let kept: BTreeSet<String> = instance.backups()?.into_iter().map(|b| b.name).collect();
    let newest: BTreeSet<String> = names[2..].iter().cloned().collect();
    assert_eq!(kept, newest);

    let newest_name = instance.backups()?[0].name.clone();
    assert_eq!(&newest_name, names.last().unwrap());
    let removed = instance.remove_backup(1)?;
    assert_eq!(removed.name, newest_name);
    assert!(instance.remove_backup(10).is_err());
    assert_eq!(instance.backups()?.len(), 4);

    assert_eq!(instance.remove_all_backups()?, 4);
    assert!(instance.backups()?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_partial_backup_scope() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (_registry, instance) =
        registry_with_instance(test_config(temp.path()), "alice", PlanTier::Basic);
    let dir = instance.dir();
    std::fs::create_dir_all(dir.join("world/region"))?;
    std::fs::write(dir.join("world/level.dat"), b"level")?;
    std::fs::write(dir.join("world/region/r.0.0.mca"), b"region")?;
    std::fs::create_dir_all(dir.join("logs"))?;
    std::fs::write(dir.join("logs/latest.log"), b"log")?;

    let record = instance.create_backup(false).await?;

    let archive = zip::ZipArchive::new(std::fs::File::open(&record.path)?)?;
    let names: BTreeSet<&str> = archive.file_names().collect();
    assert!(names.contains("world/level.dat"));
    assert!(names.contains("world/region/r.0.0.mca"));
    assert!(names.contains(PROPERTIES_FILE));
    assert!(names.contains(DESCRIPTOR_FILE));
    assert!(!names.contains("logs/latest.log"));
    assert!(!names.contains("start.jar"));

    Ok(())
}

#[tokio::test]
async fn test_backup_schedule_persists() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (_registry, instance) =
        registry_with_instance(test_config(temp.path()), "alice", PlanTier::Basic);

    instance.schedule_backups(30)?;
    assert_eq!(instance.backup_schedule(), Some(Duration::from_secs(30 * 60)));
    let settings = InstanceSettings::load(instance.dir().join(DESCRIPTOR_FILE))?;
    assert!(settings.backups_enabled);
    assert_eq!(settings.backup_interval, 30);

    // Rescheduling replaces the timer
    instance.schedule_backups(15)?;
    assert_eq!(instance.backup_schedule(), Some(Duration::from_secs(15 * 60)));

    instance.schedule_backups(0)?;
    assert_eq!(instance.backup_schedule(), None);
    let settings = InstanceSettings::load(instance.dir().join(DESCRIPTOR_FILE))?;
    assert!(!settings.backups_enabled);
    assert_eq!(settings.backup_interval, 0);

    Ok(())
}

#[test]
fn test_properties_protect_port() -> Result<()> {
    let temp = tempfile::tempdir()?;
    let (_registry, instance) =
        registry_with_instance(test_config(temp.path()), "alice", PlanTier::Basic);
    let properties = instance.properties();

    assert!(matches!(
        properties.update("server-port", "1"),
        Err(Error::ProtectedProperty(_))
    ));
    assert!(matches!(
        properties.remove("server-ip"),
        Err(Error::ProtectedProperty(_))
    ));
    assert!(matches!(
        properties.remove("motd"),
        Err(Error::PropertyNotFound(_))
    ));
    properties.update("motd", "hi")?;
    properties.remove("motd")?;
    properties.update("max-players", "40")?;
    assert_eq!(instance.snapshot().max_players, 40);

    Ok(())
}
