//! Runtime selection and provisioning.
//!
//! Servers are launched with one of two runtime variants. Executables live at
//! `<runtime>/<platform>/<major>/bin/java[.exe]`; when the requested variant is
//! missing the platform bundle `<bundles>/<platform>.zip` is extracted first.

use crate::backup::archive;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// First game minor version that requires the latest runtime.
pub const LATEST_RUNTIME_FROM_MINOR: u32 = 17;

/// Runtime variant an instance is launched with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeVersion {
    /// Java 8, for game versions before 1.17.
    Legacy,
    /// Java 16, for game versions from 1.17 on.
    #[default]
    Latest,
}

impl RuntimeVersion {
    /// Major version number of the runtime.
    pub fn major(self) -> u32 {
        match self {
            RuntimeVersion::Legacy => 8,
            RuntimeVersion::Latest => 16,
        }
    }

    /// Runtime variant required by a game of version `1.<minor>`.
    pub fn for_game_minor(minor: u32) -> Self {
        if minor >= LATEST_RUNTIME_FROM_MINOR {
            RuntimeVersion::Latest
        } else {
            RuntimeVersion::Legacy
        }
    }

    /// Newest variant known.
    pub fn newest() -> Self {
        RuntimeVersion::Latest
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "java {}", self.major())
    }
}

/// Folder name of the host platform inside the runtime root.
pub fn platform_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "Win64"
    } else if cfg!(target_os = "linux") {
        "Linux64"
    } else {
        "Unix64"
    }
}

/// Maps runtime variants to executables, provisioning them on demand.
#[derive(Debug)]
pub struct RuntimeResolver {
    root: PathBuf,
    bundles: PathBuf,
    provision_lock: Mutex<()>,
}

impl RuntimeResolver {
    /// `root` receives extracted runtimes, `bundles` holds the platform zips.
    pub fn new(root: impl Into<PathBuf>, bundles: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bundles: bundles.into(),
            provision_lock: Mutex::new(()),
        }
    }

    /// Directory the bundle for this platform is extracted into.
    pub fn platform_dir(&self) -> PathBuf {
        self.root.join(platform_name())
    }

    /// Location of the executable for `version`, whether present or not.
    pub fn executable_path(&self, version: RuntimeVersion) -> PathBuf {
        let exe = if cfg!(target_os = "windows") {
            "java.exe"
        } else {
            "java"
        };
        self.platform_dir()
            .join(version.major().to_string())
            .join("bin")
            .join(exe)
    }

    /// Returns the executable for `version`, extracting the platform bundle
    /// first when it is missing.
    #[tracing::instrument(skip(self), fields(runtime = %version))]
    pub async fn resolve(&self, version: RuntimeVersion) -> Result<PathBuf> {
        let path = self.executable_path(version);
        if path.is_file() {
            return Ok(path);
        }

        // Serialise provisioning so two instances never extract over each other.
        let _guard = self.provision_lock.lock().await;
        if path.is_file() {
            return Ok(path);
        }

        let bundle = self.bundles.join(format!("{}.zip", platform_name()));
        if !bundle.is_file() {
            tracing::error!(bundle = %bundle.display(), "Runtime missing and no bundle to provision from");
            return Err(Error::RuntimeUnavailable(format!(
                "{} not found and bundle {} is missing",
                path.display(),
                bundle.display()
            )));
        }

        tracing::info!(bundle = %bundle.display(), "Extracting runtime binaries");
        let target = self.platform_dir();
        tokio::task::spawn_blocking(move || archive::extract_archive(&bundle, &target))
            .await
            .map_err(|e| Error::Other(format!("Runtime extraction task failed: {}", e)))??;

        if path.is_file() {
            tracing::info!("Runtime provisioned");
            Ok(path)
        } else {
            Err(Error::RuntimeUnavailable(format!(
                "bundle did not contain {}",
                path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_runtime_by_game_version() {
        assert_eq!(RuntimeVersion::for_game_minor(8), RuntimeVersion::Legacy);
        assert_eq!(RuntimeVersion::for_game_minor(16), RuntimeVersion::Legacy);
        assert_eq!(RuntimeVersion::for_game_minor(17), RuntimeVersion::Latest);
        assert_eq!(RuntimeVersion::for_game_minor(20), RuntimeVersion::Latest);
    }

    #[test]
    fn test_executable_layout() {
        let resolver = RuntimeResolver::new("/srv/runtime", "/srv/bundles");
        let path = resolver.executable_path(RuntimeVersion::Legacy);
        assert!(path.starts_with(PathBuf::from("/srv/runtime").join(platform_name()).join("8")));
    }

    #[tokio::test]
    async fn test_resolve_without_bundle_fails() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = RuntimeResolver::new(dir.path().join("runtime"), dir.path().join("bundles"));

        let result = resolver.resolve(RuntimeVersion::Latest).await;
        assert!(matches!(result, Err(Error::RuntimeUnavailable(_))));
    }

    #[tokio::test]
    async fn test_resolve_extracts_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = RuntimeResolver::new(dir.path().join("runtime"), dir.path().join("bundles"));
        let exe = resolver.executable_path(RuntimeVersion::Latest);
        let exe_name = exe.file_name().unwrap().to_owned();

        let staging = dir.path().join("staging");
        std::fs::create_dir_all(staging.join("16").join("bin")).unwrap();
        std::fs::write(staging.join("16").join("bin").join(&exe_name), b"runtime").unwrap();
        std::fs::create_dir_all(dir.path().join("bundles")).unwrap();
        let bundle = dir.path().join("bundles").join(format!("{}.zip", platform_name()));
        archive::create_archive(&staging, &bundle, &archive::ArchiveScope::Full).unwrap();

        assert_eq!(resolver.resolve(RuntimeVersion::Latest).await.unwrap(), exe);
        assert!(exe.is_file());
        // The legacy runtime was not in the bundle
        assert!(matches!(
            resolver.resolve(RuntimeVersion::Legacy).await,
            Err(Error::RuntimeUnavailable(_))
        ));
    }
}
