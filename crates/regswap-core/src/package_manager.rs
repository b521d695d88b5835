//! Package manager detection.

use crate::accessor::Backend;
use crate::error::{RegswapError, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Package managers a workspace can be using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PackageManager {
    #[default]
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManager {
    /// Detect the package manager of the workspace rooted at `root` from its lock file.
    ///
    /// Falls back to npm when no known lock file exists.
    pub fn detect(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let detected = if root.join("yarn.lock").exists() {
            PackageManager::Yarn
        } else if root.join("pnpm-lock.yaml").exists() {
            PackageManager::Pnpm
        } else {
            PackageManager::Npm
        };
        debug!("Detected {} in {}", detected, root.display());
        detected
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
        }
    }

    /// Config dialect used to read and write the registry setting.
    ///
    /// pnpm reads npm's config files, so it shares npm's dialect.
    pub fn backend(&self) -> Backend {
        match self {
            PackageManager::Yarn => Backend::Yarn,
            PackageManager::Npm | PackageManager::Pnpm => Backend::Npm,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = RegswapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "npm" => Ok(PackageManager::Npm),
            "yarn" => Ok(PackageManager::Yarn),
            "pnpm" => Ok(PackageManager::Pnpm),
            other => Err(RegswapError::Validation {
                field: "package_manager".into(),
                message: format!("unsupported package manager '{other}'"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_defaults_to_npm() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Npm);
    }

    #[test]
    fn test_detect_by_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("pnpm-lock.yaml"), "").unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Pnpm);

        // yarn.lock wins when both are present
        std::fs::write(temp_dir.path().join("yarn.lock"), "").unwrap();
        assert_eq!(PackageManager::detect(temp_dir.path()), PackageManager::Yarn);
    }

    #[test]
    fn test_backend_mapping() {
        assert_eq!(PackageManager::Npm.backend(), Backend::Npm);
        assert_eq!(PackageManager::Pnpm.backend(), Backend::Npm);
        assert_eq!(PackageManager::Yarn.backend(), Backend::Yarn);
    }

    #[test]
    fn test_roundtrip() {
        for pm in [PackageManager::Npm, PackageManager::Yarn, PackageManager::Pnpm] {
            assert_eq!(pm.as_str().parse::<PackageManager>().unwrap(), pm);
        }
        assert!("bun".parse::<PackageManager>().is_err());
    }
}
