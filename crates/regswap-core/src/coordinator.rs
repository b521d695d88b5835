//! Registry swap lifecycle.
//!
//! [`LifecycleCoordinator::run`] snapshots the registry setting, points it at
//! the local server, runs the server until it exits or a termination trigger
//! arrives, and restores the setting. Restoration goes through a
//! [`CleanupHandler`], which performs terminate + restore at most once no
//! matter how many exit paths fire.

use crate::accessor::{self, Backend, RegistryConfig, RegistrySnapshot};
use crate::config::ServerConfig;
use crate::error::{RegswapError, Result};
use crate::options::StartupOptions;
use crate::signals::TerminationTrigger;
use crate::supervisor::{ProcessHandle, ProcessSupervisor, TerminationReason};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Outcome of one registry swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub success: bool,
    /// How the server stopped, if it was started.
    #[serde(skip)]
    pub termination: Option<TerminationReason>,
}

impl RunResult {
    fn failure() -> Self {
        Self {
            success: false,
            termination: None,
        }
    }

    fn from_reason(reason: TerminationReason) -> Self {
        Self {
            success: reason.is_success(),
            termination: Some(reason),
        }
    }
}

/// Terminates the server and restores the registry, once.
///
/// Dropping the handler runs it if nothing else has, so an early return or a
/// cancelled run still restores the registry.
pub struct CleanupHandler {
    accessor: Arc<dyn RegistryConfig>,
    snapshot: RegistrySnapshot,
    process: Mutex<Option<ProcessHandle>>,
    fired: AtomicBool,
}

impl CleanupHandler {
    pub fn new(accessor: Arc<dyn RegistryConfig>, snapshot: RegistrySnapshot) -> Self {
        Self {
            accessor,
            snapshot,
            process: Mutex::new(None),
            fired: AtomicBool::new(false),
        }
    }

    /// Bind the server the handler should stop.
    pub fn attach(&self, handle: ProcessHandle) {
        *self
            .process
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
    }

    pub fn has_run(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stop the server (forwarding `signal` if given) and restore the registry.
    ///
    /// Returns `true` only for the call that did the work.
    pub fn run(&self, signal: Option<TerminationTrigger>) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("Cleanup already ran, ignoring {:?}", signal);
            return false;
        }

        let handle = self.process.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone();
        if let Some(handle) = handle {
            if let Err(e) = handle.terminate(signal) {
                warn!("Failed to stop registry server: {}", e);
            }
        }

        if let Err(e) = accessor::restore(self.accessor.as_ref(), &self.snapshot) {
            error!(
                "Failed to restore {} registry to {:?}: {}",
                self.snapshot.backend, self.snapshot.prior_value, e
            );
        }
        true
    }
}

impl Drop for CleanupHandler {
    fn drop(&mut self) {
        self.run(None);
    }
}

enum Completion {
    Exited(TerminationReason),
    Triggered(TerminationTrigger),
}

/// Runs a registry swap from start to finish.
pub struct LifecycleCoordinator {
    accessor: Arc<dyn RegistryConfig>,
    supervisor: ProcessSupervisor,
}

impl LifecycleCoordinator {
    pub fn new(accessor: Arc<dyn RegistryConfig>, supervisor: ProcessSupervisor) -> Self {
        Self {
            accessor,
            supervisor,
        }
    }

    /// Swap the registry, run the server, and put everything back.
    ///
    /// Never returns an error: any failure is logged and reported as
    /// `success: false`. The registry is restored on every path once it has
    /// been changed.
    pub async fn run(
        &self,
        backend: Backend,
        options: &StartupOptions,
        mut triggers: mpsc::Receiver<TerminationTrigger>,
    ) -> RunResult {
        let result = match self.try_run(backend, options, &mut triggers).await {
            Ok(reason) => RunResult::from_reason(reason),
            Err(e) => {
                error!("Registry swap failed: {}", e);
                RunResult::failure()
            }
        };
        // Unsubscribe
        drop(triggers);
        result
    }

    async fn try_run(
        &self,
        backend: Backend,
        options: &StartupOptions,
        triggers: &mut mpsc::Receiver<TerminationTrigger>,
    ) -> Result<TerminationReason> {
        options.validate()?;

        let config = self.accessor.clone();
        let location = options.location;
        let url = options.registry_url();
        let snapshot = tokio::task::spawn_blocking(move || {
            let snapshot = accessor::snapshot(config.as_ref(), backend, location)?;
            config.write(backend, location, &url)?;
            info!("Pointed {} registry ({}) at {}", backend, location, url);
            Ok::<_, RegswapError>(snapshot)
        })
        .await
        .map_err(|e| RegswapError::ConfigWrite {
            backend,
            message: format!("config task failed: {e}"),
        })??;

        let cleanup = Arc::new(CleanupHandler::new(self.accessor.clone(), snapshot));
        let mut process = self.supervisor.start(options);
        cleanup.attach(process.handle());

        let completion = tokio::select! {
            reason = process.wait() => Completion::Exited(reason),
            Some(trigger) = triggers.recv() => Completion::Triggered(trigger),
        };

        let reason = match completion {
            Completion::Exited(reason) => {
                run_cleanup(&cleanup, None).await;
                if let Err(e) = reason.clone().into_result(process.program()) {
                    error!("{}", e);
                }
                reason
            }
            Completion::Triggered(trigger) => {
                warn!("Received {}, shutting down registry server", trigger);
                run_cleanup(&cleanup, Some(trigger)).await;
                let exit = process.wait_with_grace(ServerConfig::TERMINATE_GRACE).await;
                debug!("Registry server after {}: {}", trigger, exit);
                TerminationReason::Signal(trigger.name().to_string())
            }
        };
        Ok(reason)
    }
}

/// Run the handler off the async workers; npm/yarn calls block.
async fn run_cleanup(cleanup: &Arc<CleanupHandler>, signal: Option<TerminationTrigger>) {
    let handler = cleanup.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || handler.run(signal)).await {
        error!("Cleanup task failed: {}", e);
    }
}
