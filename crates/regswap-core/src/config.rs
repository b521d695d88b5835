//! Centralized configuration for regswap.
//!
//! Constants for the registry server, the environment variables it understands,
//! and timing of child shutdown.

use std::time::Duration;

/// Registry server defaults.
pub struct ServerConfig;

impl ServerConfig {
    /// Program looked up on `PATH` when no override is given.
    pub const DEFAULT_PROGRAM: &'static str = "verdaccio";
    /// Port Verdaccio listens on when `--listen` is not passed.
    pub const DEFAULT_PORT: u16 = 4873;
    /// Host used in the registry URL written to the package manager.
    pub const REGISTRY_HOST: &'static str = "localhost";
    /// How long a terminated child gets to exit before it is force-killed.
    pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);
    /// Capacity of the termination-trigger channel.
    pub const TRIGGER_CHANNEL_CAPACITY: usize = 8;

    /// Registry URL for a server listening on `port`.
    pub fn registry_url(port: u16) -> String {
        format!("http://{}:{}/", Self::REGISTRY_HOST, port)
    }
}

/// Environment variable names.
pub struct EnvVars;

impl EnvVars {
    /// Overrides the registry server program.
    pub const SERVER_BIN: &'static str = "VERDACCIO_BIN";
    /// Tells the child to handle SIGINT/SIGTERM itself.
    pub const HANDLE_KILL_SIGNALS: &'static str = "VERDACCIO_HANDLE_KILL_SIGNALS";
    /// Overrides the storage directory from the server config file.
    pub const STORAGE_PATH: &'static str = "VERDACCIO_STORAGE_PATH";
}

/// Package manager config command names.
pub struct PackageManagerConfig;

impl PackageManagerConfig {
    pub const NPM_PROGRAM: &'static str = "npm";
    pub const YARN_PROGRAM: &'static str = "yarn";
    pub const REGISTRY_KEY: &'static str = "registry";
    /// What `yarn config get` prints for a key that is not set.
    pub const UNSET_MARKER: &'static str = "undefined";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_url() {
        assert_eq!(ServerConfig::registry_url(4873), "http://localhost:4873/");
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(ServerConfig::TERMINATE_GRACE > Duration::ZERO);
        assert!(ServerConfig::TERMINATE_GRACE <= Duration::from_secs(10));
    }
}
