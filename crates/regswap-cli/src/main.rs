//! regswap - run a local Verdaccio registry with npm/yarn pointed at it.
//!
//! The package manager's registry setting is restored when the server exits
//! or when this process receives SIGINT, SIGTERM or SIGHUP.

mod args;

use anyhow::{Context, Result};
use args::Args;
use clap::Parser;
use regswap_core::{
    signals, CommandRegistryConfig, LifecycleCoordinator, PackageManager, ProcessSupervisor,
    RunResult, TerminationReason, TerminationTrigger,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let options = args.startup_options()?;
    let package_manager = match args.package_manager {
        Some(pm) => pm,
        None => {
            let root = match args.root {
                Some(ref root) => root.clone(),
                None => std::env::current_dir().context("failed to resolve current directory")?,
            };
            PackageManager::detect(&root)
        }
    };
    info!(
        "Using {} ({} registry config, location {})",
        package_manager,
        package_manager.backend(),
        options.location
    );

    let supervisor = ProcessSupervisor::new(args.server_command());
    let coordinator = LifecycleCoordinator::new(Arc::new(CommandRegistryConfig::new()), supervisor);
    let triggers = signals::subscribe().context("failed to install signal handlers")?;

    let result = coordinator
        .run(package_manager.backend(), &options, triggers)
        .await;

    if args.json {
        // Intentional stdout: machine-readable result
        println!("{}", serde_json::to_string(&result)?);
    }
    Ok(ExitCode::from(exit_code(&result)))
}

/// 0 on success, 128 + signo after a signal, 1 otherwise.
fn exit_code(result: &RunResult) -> u8 {
    if result.success {
        return 0;
    }
    match result.termination {
        Some(TerminationReason::Signal(ref name)) => signal_exit_code(name).unwrap_or(1),
        _ => 1,
    }
}

fn signal_exit_code(name: &str) -> Option<u8> {
    [
        TerminationTrigger::Interrupt,
        TerminationTrigger::Terminate,
        TerminationTrigger::Hangup,
    ]
    .into_iter()
    .find(|trigger| trigger.name() == name)
    .and_then(|trigger| u8::try_from(trigger.exit_code()).ok())
}
