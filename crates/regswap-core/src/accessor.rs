//! Reading and writing the package manager's registry setting.
//!
//! Two config dialects are supported, npm's (also used for pnpm) and yarn's.
//! npm scopes every command with `--location`; yarn's setting is global.

use crate::config::PackageManagerConfig;
use crate::error::{RegswapError, Result};
use crate::options::ConfigLocation;
use std::ffi::OsString;
use std::fmt;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Registry config dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// `npm config ... --location <loc>`
    Npm,
    /// `yarn config ...`, global only
    Yarn,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Npm => "npm",
            Backend::Yarn => "yarn",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single registry config command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction<'a> {
    Get,
    Set(&'a str),
    Delete,
}

impl<'a> ConfigAction<'a> {
    /// Arguments for running this action against `backend`, without the program name.
    pub fn args(&self, backend: Backend, location: ConfigLocation) -> Vec<String> {
        let key = PackageManagerConfig::REGISTRY_KEY.to_string();
        let mut args = vec!["config".to_string()];
        match self {
            ConfigAction::Get => args.extend(["get".to_string(), key]),
            ConfigAction::Set(url) => args.extend(["set".to_string(), key, url.to_string()]),
            ConfigAction::Delete => args.extend(["delete".to_string(), key]),
        }
        if backend == Backend::Npm {
            args.extend(["--location".to_string(), location.to_string()]);
        }
        args
    }
}

/// The registry value found before the swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub backend: Backend,
    pub location: ConfigLocation,
    /// `None` means the key was not set and must be deleted on restore.
    pub prior_value: Option<String>,
}

/// Capability to read and change the registry setting of a backend.
pub trait RegistryConfig: Send + Sync {
    /// Current registry value, `None` when unset.
    fn read(&self, backend: Backend, location: ConfigLocation) -> Result<Option<String>>;

    /// Set the registry to `url`.
    fn write(&self, backend: Backend, location: ConfigLocation, url: &str) -> Result<()>;

    /// Remove the registry key.
    fn delete(&self, backend: Backend, location: ConfigLocation) -> Result<()>;
}

/// Capture the current registry value.
pub fn snapshot<C: RegistryConfig + ?Sized>(
    accessor: &C,
    backend: Backend,
    location: ConfigLocation,
) -> Result<RegistrySnapshot> {
    let prior_value = accessor.read(backend, location)?;
    debug!("Snapshot of {} registry ({}): {:?}", backend, location, prior_value);
    Ok(RegistrySnapshot {
        backend,
        location,
        prior_value,
    })
}

/// Put the registry back to what `snapshot` recorded.
///
/// Safe to call repeatedly; every call converges on the same end state.
pub fn restore<C: RegistryConfig + ?Sized>(
    accessor: &C,
    snapshot: &RegistrySnapshot,
) -> Result<()> {
    match snapshot.prior_value {
        Some(ref value) => {
            info!("Restoring {} registry to {}", snapshot.backend, value);
            accessor.write(snapshot.backend, snapshot.location, value)
        }
        None => {
            info!("Removing {} registry override", snapshot.backend);
            accessor.delete(snapshot.backend, snapshot.location)
        }
    }
}

/// Interpret the stdout of a `config get registry` command.
pub fn parse_registry_output(stdout: &str) -> Option<String> {
    let value = stdout.trim();
    if value.is_empty() || value == PackageManagerConfig::UNSET_MARKER {
        None
    } else {
        Some(value.to_string())
    }
}

/// [`RegistryConfig`] backed by the real `npm` / `yarn` executables.
#[derive(Debug, Clone)]
pub struct CommandRegistryConfig {
    npm_program: OsString,
    yarn_program: OsString,
}

impl Default for CommandRegistryConfig {
    fn default() -> Self {
        Self {
            npm_program: PackageManagerConfig::NPM_PROGRAM.into(),
            yarn_program: PackageManagerConfig::YARN_PROGRAM.into(),
        }
    }
}

impl CommandRegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different npm executable.
    pub fn with_npm_program(mut self, program: impl Into<OsString>) -> Self {
        self.npm_program = program.into();
        self
    }

    /// Use a different yarn executable.
    pub fn with_yarn_program(mut self, program: impl Into<OsString>) -> Self {
        self.yarn_program = program.into();
        self
    }

    fn program(&self, backend: Backend) -> &OsString {
        match backend {
            Backend::Npm => &self.npm_program,
            Backend::Yarn => &self.yarn_program,
        }
    }

    /// Run `action` and return its stdout, or the failure as a message.
    fn run(
        &self,
        backend: Backend,
        location: ConfigLocation,
        action: ConfigAction<'_>,
    ) -> std::result::Result<String, String> {
        let program = self.program(backend);
        let args = action.args(backend, location);
        debug!("Running {} {}", program.to_string_lossy(), args.join(" "));

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("failed to run {}: {}", program.to_string_lossy(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{} ({})", output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl RegistryConfig for CommandRegistryConfig {
    fn read(&self, backend: Backend, location: ConfigLocation) -> Result<Option<String>> {
        let stdout = self
            .run(backend, location, ConfigAction::Get)
            .map_err(|message| RegswapError::ConfigRead { backend, message })?;
        Ok(parse_registry_output(&stdout))
    }

    fn write(&self, backend: Backend, location: ConfigLocation, url: &str) -> Result<()> {
        self.run(backend, location, ConfigAction::Set(url))
            .map(|_| ())
            .map_err(|message| RegswapError::ConfigWrite { backend, message })
    }

    fn delete(&self, backend: Backend, location: ConfigLocation) -> Result<()> {
        self.run(backend, location, ConfigAction::Delete)
            .map(|_| ())
            .map_err(|message| RegswapError::ConfigWrite { backend, message })
    }
}
