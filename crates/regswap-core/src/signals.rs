//! Termination triggers.
//!
//! OS signals are forwarded into a bounded channel. The receiving end is the
//! subscription; dropping it stops the listener task.

use crate::config::ServerConfig;
use crate::error::Result;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// An event that ends the run early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationTrigger {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Hangup,
}

impl TerminationTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            TerminationTrigger::Interrupt => "SIGINT",
            TerminationTrigger::Terminate => "SIGTERM",
            TerminationTrigger::Hangup => "SIGHUP",
        }
    }

    /// Signal number on POSIX systems.
    pub fn number(&self) -> i32 {
        match self {
            TerminationTrigger::Hangup => 1,
            TerminationTrigger::Interrupt => 2,
            TerminationTrigger::Terminate => 15,
        }
    }

    /// Shell convention for a process that died from this signal.
    pub fn exit_code(&self) -> i32 {
        128 + self.number()
    }

    #[cfg(unix)]
    pub(crate) fn as_nix(&self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            TerminationTrigger::Interrupt => Signal::SIGINT,
            TerminationTrigger::Terminate => Signal::SIGTERM,
            TerminationTrigger::Hangup => Signal::SIGHUP,
        }
    }
}

impl fmt::Display for TerminationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Create an unconnected trigger channel.
///
/// Callers that drive shutdown themselves (tests, embedding hosts) send on the
/// returned sender instead of relying on OS signals.
pub fn channel() -> (
    mpsc::Sender<TerminationTrigger>,
    mpsc::Receiver<TerminationTrigger>,
) {
    mpsc::channel(ServerConfig::TRIGGER_CHANNEL_CAPACITY)
}

/// Subscribe to SIGINT, SIGTERM and SIGHUP.
///
/// Must be called from inside a tokio runtime.
pub fn subscribe() -> Result<mpsc::Receiver<TerminationTrigger>> {
    let (tx, rx) = channel();
    forward_os_signals(tx)?;
    Ok(rx)
}

/// Forward OS signals into `tx` until its receiver is dropped.
///
/// Handlers are installed before this returns. The returned task finishes
/// once the receiving side closes.
#[cfg(unix)]
pub fn forward_os_signals(tx: mpsc::Sender<TerminationTrigger>) -> Result<JoinHandle<()>> {
    use crate::error::RegswapError;
    use tokio::signal::unix::{signal, SignalKind};

    let install = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| RegswapError::Signal {
            message: format!("failed to install {name} handler: {e}"),
        })
    };
    let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
    let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
    let mut sighup = install(SignalKind::hangup(), "SIGHUP")?;

    let listener = tokio::spawn(async move {
        loop {
            let trigger = tokio::select! {
                _ = sigint.recv() => TerminationTrigger::Interrupt,
                _ = sigterm.recv() => TerminationTrigger::Terminate,
                _ = sighup.recv() => TerminationTrigger::Hangup,
                _ = tx.closed() => break,
            };
            debug!("Received {}", trigger);
            if tx.send(trigger).await.is_err() {
                break;
            }
        }
        debug!("Signal listener stopped");
    });
    Ok(listener)
}

/// Forward Ctrl-C into `tx` until its receiver is dropped.
#[cfg(not(unix))]
pub fn forward_os_signals(tx: mpsc::Sender<TerminationTrigger>) -> Result<JoinHandle<()>> {
    let listener = tokio::spawn(async move {
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::warn!("Ctrl-C listener failed: {}", e);
                        break;
                    }
                }
                _ = tx.closed() => break,
            }
            debug!("Received Ctrl-C");
            if tx.send(TerminationTrigger::Interrupt).await.is_err() {
                break;
            }
        }
    });
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(TerminationTrigger::Interrupt.exit_code(), 130);
        assert_eq!(TerminationTrigger::Terminate.exit_code(), 143);
        assert_eq!(TerminationTrigger::Hangup.exit_code(), 129);
    }

    #[cfg(unix)]
    #[test]
    fn test_nix_numbers_match() {
        for trigger in [
            TerminationTrigger::Interrupt,
            TerminationTrigger::Terminate,
            TerminationTrigger::Hangup,
        ] {
            assert_eq!(trigger.as_nix() as i32, trigger.number());
        }
    }

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (tx, mut rx) = channel();
        tx.send(TerminationTrigger::Hangup).await.unwrap();
        tx.send(TerminationTrigger::Interrupt).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await, Some(TerminationTrigger::Hangup));
        assert_eq!(rx.recv().await, Some(TerminationTrigger::Interrupt));
        assert_eq!(rx.recv().await, None);
    }
}
