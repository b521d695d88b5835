//! Startup options for a registry swap.

use crate::config::ServerConfig;
use crate::error::{RegswapError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which npm config file the registry write applies to.
///
/// Yarn ignores this; its registry setting is always global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLocation {
    Global,
    #[default]
    User,
    Project,
}

impl ConfigLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigLocation::Global => "global",
            ConfigLocation::User => "user",
            ConfigLocation::Project => "project",
        }
    }
}

impl fmt::Display for ConfigLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigLocation {
    type Err = RegswapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "global" => Ok(ConfigLocation::Global),
            "user" => Ok(ConfigLocation::User),
            "project" => Ok(ConfigLocation::Project),
            other => Err(RegswapError::Validation {
                field: "location".into(),
                message: format!("expected global, user or project, got '{other}'"),
            }),
        }
    }
}

/// Options the registry server is started with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupOptions {
    /// Port passed as `--listen`.
    #[serde(default)]
    pub port: Option<u16>,
    /// Server config file passed as `--config`.
    #[serde(default)]
    pub config: Option<PathBuf>,
    /// Storage directory override.
    #[serde(default)]
    pub storage: Option<PathBuf>,
    /// Scope of the registry write.
    #[serde(default)]
    pub location: ConfigLocation,
}

impl StartupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_config(mut self, path: impl AsRef<Path>) -> Self {
        self.config = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_storage(mut self, path: impl AsRef<Path>) -> Self {
        self.storage = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_location(mut self, location: ConfigLocation) -> Self {
        self.location = location;
        self
    }

    /// Load options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RegswapError::io_with_path(e, path))?;
        let options: Self = serde_json::from_str(&raw)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(RegswapError::Validation {
                field: "port".into(),
                message: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    /// Port the server will actually listen on.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(ServerConfig::DEFAULT_PORT)
    }

    /// URL the package manager is pointed at while the server runs.
    pub fn registry_url(&self) -> String {
        ServerConfig::registry_url(self.effective_port())
    }
}
