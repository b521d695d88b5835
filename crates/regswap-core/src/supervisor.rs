//! Registry server process supervision.
//!
//! A [`ProcessSupervisor`] launches one server child per [`start`] call. The
//! returned [`SupervisedProcess`] is awaited for the outcome, and its cloneable
//! [`ProcessHandle`] can signal the child from elsewhere.
//!
//! [`start`]: ProcessSupervisor::start

use crate::config::{EnvVars, ServerConfig};
use crate::error::{RegswapError, Result};
use crate::options::StartupOptions;
use crate::signals::TerminationTrigger;
use std::ffi::OsString;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Lifecycle of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Running,
    Exited(i32),
    Killed,
    SpawnFailed,
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }
}

/// Why the child stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    NormalExit(i32),
    AbnormalExit(i32),
    Signal(String),
    SpawnError(String),
}

impl TerminationReason {
    /// Only a clean zero exit counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, TerminationReason::NormalExit(0))
    }

    pub fn from_status(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => TerminationReason::NormalExit(0),
            Some(code) => TerminationReason::AbnormalExit(code),
            None => TerminationReason::Signal(signal_name(status)),
        }
    }

    /// Convert to a `Result` for `program`, failing for anything but a clean exit.
    pub fn into_result(self, program: &str) -> Result<()> {
        match self {
            TerminationReason::NormalExit(0) => Ok(()),
            TerminationReason::NormalExit(code) | TerminationReason::AbnormalExit(code) => {
                Err(RegswapError::AbnormalExit { code })
            }
            TerminationReason::Signal(signal) => Err(RegswapError::Terminated { signal }),
            TerminationReason::SpawnError(message) => Err(RegswapError::Spawn {
                program: program.to_string(),
                message,
            }),
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::NormalExit(code) => write!(f, "exited normally ({code})"),
            TerminationReason::AbnormalExit(code) => write!(f, "exited with status {code}"),
            TerminationReason::Signal(name) => write!(f, "stopped by {name}"),
            TerminationReason::SpawnError(message) => write!(f, "failed to start: {message}"),
        }
    }
}

#[cfg(unix)]
fn signal_name(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(raw) => nix::sys::signal::Signal::try_from(raw)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("signal {raw}")),
        None => "unknown signal".to_string(),
    }
}

#[cfg(not(unix))]
fn signal_name(_status: ExitStatus) -> String {
    "unknown signal".to_string()
}

/// Program and leading arguments used to run the registry server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl ServerCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    /// `$VERDACCIO_BIN` if set, otherwise `verdaccio` from `PATH`.
    pub fn from_env() -> Self {
        match std::env::var_os(EnvVars::SERVER_BIN) {
            Some(program) if !program.is_empty() => Self::new(program),
            _ => Self::new(ServerConfig::DEFAULT_PROGRAM),
        }
    }

    /// Add an argument placed before the generated server arguments.
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Default for ServerCommand {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Command-line arguments for the server: `[--listen <port>] [--config <path>]`.
pub fn server_args(options: &StartupOptions) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(port) = options.port {
        args.push("--listen".into());
        args.push(port.to_string().into());
    }
    if let Some(ref config) = options.config {
        args.push("--config".into());
        args.push(config.clone().into_os_string());
    }
    args
}

/// Environment additions for the server.
pub fn server_env(options: &StartupOptions) -> Vec<(&'static str, OsString)> {
    let mut env = vec![(EnvVars::HANDLE_KILL_SIGNALS, OsString::from("true"))];
    if let Some(ref storage) = options.storage {
        env.push((EnvVars::STORAGE_PATH, storage.clone().into_os_string()));
    }
    env
}

#[derive(Debug)]
struct HandleState {
    pid: Option<u32>,
    state: ProcessState,
}

/// Shared view of a supervised child, used to signal it.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    inner: Arc<Mutex<HandleState>>,
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HandleState {
                pid: None,
                state: ProcessState::NotStarted,
            })),
        }
    }
}

impl ProcessHandle {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ProcessState) {
        self.lock().state = state;
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock().pid
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Send `signal` (SIGTERM when `None`) to the child.
    ///
    /// Returns `false` without error when there is nothing to signal.
    pub fn terminate(&self, signal: Option<TerminationTrigger>) -> Result<bool> {
        let guard = self.lock();
        let pid = match (guard.state.is_running(), guard.pid) {
            (true, Some(pid)) => pid,
            _ => {
                debug!("No running registry server to terminate ({:?})", guard.state);
                return Ok(false);
            }
        };
        let signal = signal.unwrap_or(TerminationTrigger::Terminate);
        info!("Sending {} to registry server (PID {})", signal, pid);
        send_signal(pid, signal)
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: TerminationTrigger) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), signal.as_nix()) {
        Ok(()) => Ok(true),
        // Already gone
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(RegswapError::Signal {
            message: format!("failed to send {signal} to {pid}: {e}"),
        }),
    }
}

#[cfg(windows)]
fn send_signal(pid: u32, _signal: TerminationTrigger) -> Result<bool> {
    // No POSIX signals; taskkill /T takes the whole tree down
    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| RegswapError::Signal {
            message: format!("failed to run taskkill: {e}"),
        })?;

    if output.status.success() {
        return Ok(true);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    // "not found" means it already exited
    if !stderr.contains("not found") && !stderr.contains("not running") {
        warn!("taskkill failed for {}: {}", pid, stderr);
    }
    Ok(false)
}

#[cfg(not(any(unix, windows)))]
fn send_signal(pid: u32, _signal: TerminationTrigger) -> Result<bool> {
    warn!("Process termination not implemented for this platform (PID {})", pid);
    Ok(false)
}

/// A launched (or failed-to-launch) registry server.
#[derive(Debug)]
pub struct SupervisedProcess {
    program: String,
    child: Option<Child>,
    handle: ProcessHandle,
    outcome: Option<TerminationReason>,
}

impl SupervisedProcess {
    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> ProcessState {
        self.handle.state()
    }

    /// Program the server was launched from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for the child to stop. Repeated calls return the same reason.
    pub async fn wait(&mut self) -> TerminationReason {
        if let Some(ref outcome) = self.outcome {
            return outcome.clone();
        }
        let Some(child) = self.child.as_mut() else {
            return TerminationReason::SpawnError("registry server was never started".into());
        };

        let reason = match child.wait().await {
            Ok(status) => {
                let reason = TerminationReason::from_status(status);
                self.handle.set_state(match status.code() {
                    Some(code) => ProcessState::Exited(code),
                    None => ProcessState::Killed,
                });
                reason
            }
            Err(e) => {
                // Lost track of the child; treat as a failed exit
                warn!("Failed to wait on registry server: {}", e);
                self.handle.set_state(ProcessState::Killed);
                TerminationReason::AbnormalExit(-1)
            }
        };
        info!("Registry server {}", reason);
        self.outcome = Some(reason.clone());
        reason
    }

    /// Wait up to `grace` for the child to stop, then force-kill it.
    pub async fn wait_with_grace(&mut self, grace: Duration) -> TerminationReason {
        let waited = tokio::time::timeout(grace, self.wait()).await;
        match waited {
            Ok(reason) => reason,
            Err(_) => {
                warn!("Registry server still running after {:?}, killing it", grace);
                if let Some(child) = self.child.as_mut() {
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill registry server: {}", e);
                    }
                }
                self.wait().await
            }
        }
    }
}

/// Launches registry server processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    command: ServerCommand,
}

impl ProcessSupervisor {
    pub fn new(command: ServerCommand) -> Self {
        Self { command }
    }

    /// Spawn the server without waiting for it.
    ///
    /// A spawn failure is not returned here; it surfaces as
    /// [`TerminationReason::SpawnError`] from [`SupervisedProcess::wait`].
    pub fn start(&self, options: &StartupOptions) -> SupervisedProcess {
        let handle = ProcessHandle::default();
        handle.set_state(ProcessState::Starting);

        let args = server_args(options);
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .args(&args)
            .envs(server_env(options))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let program = self.command.program.to_string_lossy().into_owned();
        info!("Launching {} {:?}", program, args);

        match cmd.spawn() {
            Ok(child) => {
                let pid = child.id();
                {
                    let mut state = handle.lock();
                    state.pid = pid;
                    state.state = ProcessState::Running;
                }
                info!("Registry server started with PID {:?}", pid);
                SupervisedProcess {
                    program,
                    child: Some(child),
                    handle,
                    outcome: None,
                }
            }
            Err(e) => {
                error!("Failed to spawn {}: {}", program, e);
                handle.set_state(ProcessState::SpawnFailed);
                SupervisedProcess {
                    program,
                    child: None,
                    handle,
                    outcome: Some(TerminationReason::SpawnError(e.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_server_args_full() {
        let options = StartupOptions::new()
            .with_port(4873)
            .with_config("/tmp/c.yml");
        assert_eq!(
            server_args(&options),
            ["--listen", "4873", "--config", "/tmp/c.yml"].map(OsString::from)
        );
    }

    #[test]
    fn test_server_args_empty() {
        assert!(server_args(&StartupOptions::new()).is_empty());
    }

    #[test]
    fn test_server_args_config_only() {
        let options = StartupOptions::new().with_config("/etc/verdaccio.yml");
        assert_eq!(
            server_args(&options),
            ["--config", "/etc/verdaccio.yml"].map(OsString::from)
        );
    }

    #[test]
    fn test_server_env() {
        let env = server_env(&StartupOptions::new());
        assert_eq!(env, vec![(EnvVars::HANDLE_KILL_SIGNALS, OsString::from("true"))]);

        let env = server_env(&StartupOptions::new().with_storage("/tmp/storage"));
        assert_eq!(env.len(), 2);
        assert_eq!(
            env[1],
            (
                EnvVars::STORAGE_PATH,
                PathBuf::from("/tmp/storage").into_os_string()
            )
        );
    }

    #[test]
    fn test_server_command_builder() {
        let command = ServerCommand::new("node")
            .with_arg("verdaccio.js")
            .with_args(["--verbose"]);
        assert_eq!(command.program, OsString::from("node"));
        assert_eq!(command.args, ["verdaccio.js", "--verbose"].map(OsString::from));
    }

    #[cfg(unix)]
    #[test]
    fn test_reason_from_status() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(
            TerminationReason::from_status(ExitStatus::from_raw(0)),
            TerminationReason::NormalExit(0)
        );
        assert_eq!(
            TerminationReason::from_status(ExitStatus::from_raw(3 << 8)),
            TerminationReason::AbnormalExit(3)
        );
        assert_eq!(
            TerminationReason::from_status(ExitStatus::from_raw(9)),
            TerminationReason::Signal("SIGKILL".into())
        );
    }

    #[test]
    fn test_only_clean_exit_is_success() {
        assert!(TerminationReason::NormalExit(0).is_success());
        assert!(!TerminationReason::AbnormalExit(1).is_success());
        assert!(!TerminationReason::Signal("SIGTERM".into()).is_success());
        assert!(!TerminationReason::SpawnError("nope".into()).is_success());
    }

    #[test]
    fn test_reason_into_result() {
        assert!(TerminationReason::NormalExit(0).into_result("verdaccio").is_ok());
        assert!(matches!(
            TerminationReason::AbnormalExit(7).into_result("verdaccio"),
            Err(RegswapError::AbnormalExit { code: 7 })
        ));

        let err = TerminationReason::Signal("SIGTERM".into())
            .into_result("verdaccio")
            .unwrap_err();
        assert!(matches!(err, RegswapError::Terminated { ref signal } if signal == "SIGTERM"));
        assert_eq!(err.to_string(), "Registry server stopped by SIGTERM");

        let err = TerminationReason::SpawnError("not found".into())
            .into_result("/opt/custom-server")
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to spawn /opt/custom-server: not found");
    }

    #[test]
    fn test_handle_not_started() {
        let handle = ProcessHandle::default();
        assert_eq!(handle.state(), ProcessState::NotStarted);
        assert_eq!(handle.pid(), None);
        assert!(!handle.terminate(None).unwrap());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let supervisor =
            ProcessSupervisor::new(ServerCommand::new("/nonexistent/regswap-test-verdaccio"));
        let mut process = supervisor.start(&StartupOptions::new());

        assert_eq!(process.state(), ProcessState::SpawnFailed);
        assert!(matches!(
            process.wait().await,
            TerminationReason::SpawnError(_)
        ));
        assert!(!process.handle().terminate(None).unwrap());
    }

    #[tokio::test]
    async fn test_spawn_failure_names_configured_program() {
        let program = "/nonexistent/regswap-custom-server";
        let supervisor = ProcessSupervisor::new(ServerCommand::new(program));
        let mut process = supervisor.start(&StartupOptions::new());
        assert_eq!(process.program(), program);

        match process.wait().await.into_result(process.program()) {
            Err(RegswapError::Spawn { program: name, .. }) => assert_eq!(name, program),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit() {
        let supervisor =
            ProcessSupervisor::new(ServerCommand::new("sh").with_args(["-c", "exit 0"]));
        let mut process = supervisor.start(&StartupOptions::new().with_port(4873));
        assert!(process.handle().pid().is_some());

        assert_eq!(process.wait().await, TerminationReason::NormalExit(0));
        assert_eq!(process.state(), ProcessState::Exited(0));
        // Cached
        assert_eq!(process.wait().await, TerminationReason::NormalExit(0));
        // Already exited, nothing to signal
        assert!(!process.handle().terminate(None).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit() {
        let supervisor =
            ProcessSupervisor::new(ServerCommand::new("sh").with_args(["-c", "exit 3"]));
        let mut process = supervisor.start(&StartupOptions::new());

        assert_eq!(process.wait().await, TerminationReason::AbnormalExit(3));
        assert_eq!(process.state(), ProcessState::Exited(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_running_child() {
        let supervisor =
            ProcessSupervisor::new(ServerCommand::new("sh").with_args(["-c", "exec sleep 30"]));
        let mut process = supervisor.start(&StartupOptions::new());
        assert!(process.handle().is_running());

        assert!(process
            .handle()
            .terminate(Some(TerminationTrigger::Terminate))
            .unwrap());
        let reason = process.wait_with_grace(Duration::from_secs(5)).await;

        assert_eq!(reason, TerminationReason::Signal("SIGTERM".into()));
        assert_eq!(process.state(), ProcessState::Killed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_grace_expiry_force_kills() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let ready = temp_dir.path().join("ready");

        // Ignores SIGTERM, so only the force kill stops it
        let supervisor = ProcessSupervisor::new(ServerCommand::new("sh").with_args([
            OsString::from("-c"),
            OsString::from("trap '' TERM; touch \"$0\"; while :; do sleep 1; done"),
            ready.clone().into_os_string(),
        ]));
        let mut process = supervisor.start(&StartupOptions::new());

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !ready.exists() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(ready.exists(), "script never became ready");
        process.handle().terminate(None).unwrap();

        let reason = process.wait_with_grace(Duration::from_millis(300)).await;
        assert_eq!(reason, TerminationReason::Signal("SIGKILL".into()));
    }
}
