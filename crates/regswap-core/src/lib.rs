//! regswap core - point a package manager at a throwaway local registry.
//!
//! For the lifetime of one run, the npm (or yarn) registry setting is pointed
//! at a locally spawned Verdaccio server. When the server exits, or the process
//! is interrupted, the server is stopped and the previous setting is put back.
//!
//! # Example
//!
//! ```rust,no_run
//! use regswap_core::{
//!     signals, CommandRegistryConfig, LifecycleCoordinator, PackageManager, ProcessSupervisor,
//!     StartupOptions,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> regswap_core::Result<()> {
//!     let backend = PackageManager::detect(".").backend();
//!     let options = StartupOptions::new().with_port(4873);
//!
//!     let coordinator = LifecycleCoordinator::new(
//!         Arc::new(CommandRegistryConfig::new()),
//!         ProcessSupervisor::default(),
//!     );
//!     let result = coordinator.run(backend, &options, signals::subscribe()?).await;
//!     println!("success: {}", result.success);
//!     Ok(())
//! }
//! ```

pub mod accessor;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod options;
pub mod package_manager;
pub mod signals;
pub mod supervisor;

// Re-export commonly used types
pub use accessor::{Backend, CommandRegistryConfig, RegistryConfig, RegistrySnapshot};
pub use coordinator::{CleanupHandler, LifecycleCoordinator, RunResult};
pub use error::{RegswapError, Result};
pub use options::{ConfigLocation, StartupOptions};
pub use package_manager::PackageManager;
pub use signals::TerminationTrigger;
pub use supervisor::{
    ProcessHandle, ProcessState, ProcessSupervisor, ServerCommand, SupervisedProcess,
    TerminationReason,
};
