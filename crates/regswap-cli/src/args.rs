//! Command-line arguments.

use anyhow::{Context, Result};
use clap::Parser;
use regswap_core::{ConfigLocation, PackageManager, ServerCommand, StartupOptions};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "regswap")]
#[command(about = "Run a local Verdaccio registry with npm/yarn temporarily pointed at it")]
pub struct Args {
    /// Port for the registry server (server default 4873)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Verdaccio config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Storage directory, overriding the one in the config file
    #[arg(short, long)]
    pub storage: Option<PathBuf>,

    /// npm config location to write the registry to (global, user, project)
    #[arg(short, long)]
    pub location: Option<ConfigLocation>,

    /// JSON file with startup options; flags override its values
    #[arg(long)]
    pub options: Option<PathBuf>,

    /// Workspace root used to detect the package manager (defaults to cwd)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Skip detection and use this package manager (npm, yarn, pnpm)
    #[arg(long)]
    pub package_manager: Option<PackageManager>,

    /// Registry server executable (defaults to $VERDACCIO_BIN, then `verdaccio`)
    #[arg(long)]
    pub server_bin: Option<PathBuf>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Args {
    /// Options file (if any) overlaid with explicit flags.
    pub fn startup_options(&self) -> Result<StartupOptions> {
        let mut options = match self.options {
            Some(ref path) => StartupOptions::from_json_file(path)
                .with_context(|| format!("failed to load options from {}", path.display()))?,
            None => StartupOptions::new(),
        };
        if let Some(port) = self.port {
            options.port = Some(port);
        }
        if let Some(ref config) = self.config {
            options.config = Some(config.clone());
        }
        if let Some(ref storage) = self.storage {
            options.storage = Some(storage.clone());
        }
        if let Some(location) = self.location {
            options.location = location;
        }
        options.validate()?;
        Ok(options)
    }

    pub fn server_command(&self) -> ServerCommand {
        match self.server_bin {
            Some(ref bin) => ServerCommand::new(bin),
            None => ServerCommand::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("regswap").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let options = args.startup_options().unwrap();
        assert_eq!(options, StartupOptions::new());
        assert!(args.package_manager.is_none());
        assert!(!args.json);
    }

    #[test]
    fn test_flags() {
        let args = parse(&[
            "--port",
            "4873",
            "--config",
            "/tmp/c.yml",
            "--location",
            "project",
            "--package-manager",
            "yarn",
        ]);
        let options = args.startup_options().unwrap();
        assert_eq!(options.port, Some(4873));
        assert_eq!(options.config, Some(PathBuf::from("/tmp/c.yml")));
        assert_eq!(options.location, ConfigLocation::Project);
        assert_eq!(args.package_manager, Some(PackageManager::Yarn));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let argv = ["regswap", "--location", "workspace"];
        assert!(Args::try_parse_from(argv).is_err());
        let argv = ["regswap", "--package-manager", "bun"];
        assert!(Args::try_parse_from(argv).is_err());
        assert!(parse(&["--port", "0"]).startup_options().is_err());
    }

    #[test]
    fn test_flags_override_options_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("options.json");
        std::fs::write(&path, r#"{"port": 4000, "storage": "/srv/storage"}"#).unwrap();

        let path_str = path.to_str().unwrap();
        let options = parse(&["--options", path_str, "--port", "5000"])
            .startup_options()
            .unwrap();
        assert_eq!(options.port, Some(5000));
        assert_eq!(options.storage, Some(PathBuf::from("/srv/storage")));
    }

    #[test]
    fn test_server_bin_override() {
        let args = parse(&["--server-bin", "/opt/verdaccio/bin/verdaccio"]);
        assert_eq!(
            args.server_command(),
            ServerCommand::new("/opt/verdaccio/bin/verdaccio")
        );
    }
}
