//! Local power-off execution
//!
//! The synchronous path awaits the controller and reports its outcome to the
//! caller. The asynchronous path spawns a detached task; its failure cannot
//! reach the caller any more, so it is sent to a dedicated channel whose only
//! consumer logs it.

#![warn(missing_docs)]

use async_trait::async_trait;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Power-off errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecuteError {
    /// The power-off program could not be started
    #[error("cannot start poweroff: {0}")]
    Spawn(String),

    /// The power-off program ran and failed
    #[error("{0}")]
    Failed(String),
}

/// Something that can switch this machine off.
#[async_trait]
pub trait PowerController: Send + Sync {
    /// Wait `delay`, then power off.
    async fn power_off(&self, delay: Duration) -> Result<(), ExecuteError>;
}

/// Runs the system `poweroff` command.
#[derive(Debug, Clone)]
pub struct SystemPowerController {
    program: String,
}

impl SystemPowerController {
    /// Controller using `poweroff` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: "poweroff".to_string(),
        }
    }
}

impl Default for SystemPowerController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PowerController for SystemPowerController {
    async fn power_off(&self, delay: Duration) -> Result<(), ExecuteError> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let status = Command::new(&self.program)
            .status()
            .await
            .map_err(|e| ExecuteError::Spawn(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(ExecuteError::Failed(describe_exit(status)))
        }
    }
}

/// Describe a failed exit the way peers match on it, e.g. `signal: terminated`.
pub fn describe_exit(status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            let name = match signal {
                1 => "hangup",
                2 => "interrupt",
                3 => "quit",
                6 => "aborted",
                9 => "killed",
                15 => "terminated",
                other => return format!("signal: {other}"),
            };
            return format!("signal: {name}");
        }
    }
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => status.to_string(),
    }
}

/// Runs power-off requests, in the foreground or detached.
#[derive(Clone)]
pub struct PowerExecutor {
    controller: Arc<dyn PowerController>,
    failures: mpsc::UnboundedSender<ExecuteError>,
}

impl PowerExecutor {
    /// Executor plus the receiving end of its failure channel; hand the
    /// receiver to [`spawn_failure_sink`].
    pub fn new(
        controller: Arc<dyn PowerController>,
    ) -> (Self, mpsc::UnboundedReceiver<ExecuteError>) {
        let (failures, rx) = mpsc::unbounded_channel();
        (
            Self {
                controller,
                failures,
            },
            rx,
        )
    }

    /// Power off now (after `delay`) and report the outcome.
    pub async fn run(&self, delay: Duration) -> Result<(), ExecuteError> {
        info!(delay_ms = delay.as_millis() as u64, "Executing poweroff");
        self.controller.power_off(delay).await
    }

    /// Power off in a detached task.
    pub fn spawn_detached(&self, delay: Duration) -> JoinHandle<()> {
        let executor = self.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.run(delay).await {
                if let Err(unsent) = executor.failures.send(e) {
                    error!(error = %unsent.0, "Async poweroff failed");
                }
            }
        })
    }
}

/// Log every failure reported by detached power-offs.
pub fn spawn_failure_sink(mut failures: mpsc::UnboundedReceiver<ExecuteError>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(e) = failures.recv().await {
            error!(error = %e, "Async poweroff failed");
        }
    })
}
