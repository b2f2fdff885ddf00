// src/supervisor/launcher.rs
//! Miner process launching primitives
//!
//! Decouples the spawn/terminate mechanism from the supervisor's state
//! machine: the supervisor talks to a [`Launcher`] that yields a line
//! stream plus a [`ProcessControl`] handle, so tests can substitute a
//! scripted process and the production path can wrap `tokio::process`.

use crate::utils::error::RigError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};

/// Fully resolved invocation of a miner executable
#[derive(Debug, Clone)]
pub struct MinerCommand {
    /// Absolute or working-directory-relative path to the executable
    pub binary: PathBuf,
    /// Command-line arguments (algorithm, pool URL, user, password)
    pub args: Vec<String>,
    /// Working directory for the process, if any
    pub workdir: Option<PathBuf>,
}

/// A freshly spawned miner process
///
/// `lines` carries the combined stdout/stderr output one line at a time
/// and closes at EOF. `control` is shared between the exit observer and
/// the termination sequence.
pub struct SpawnedProcess {
    /// Combined output stream, line by line
    pub lines: mpsc::Receiver<String>,
    /// Handle for waiting on and terminating the process
    pub control: Arc<dyn ProcessControl>,
}

/// Control surface over a running miner process
///
/// All methods take `&self` so the handle can be shared between the
/// exit observer task and a concurrently running termination sequence.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Resolves when the process has exited, with its exit code if known
    ///
    /// Safe to call from several tasks; later callers observe the same
    /// terminal state.
    async fn wait(&self) -> Option<i32>;

    /// Requests a graceful shutdown (SIGTERM on Unix)
    async fn terminate(&self);

    /// Forcefully kills the process
    async fn kill(&self);

    /// OS process id, if the process is still attached
    fn pid(&self) -> Option<u32>;
}

/// Spawner of miner processes
pub trait Launcher: Send + Sync {
    /// Spawns the given command and wires up its output stream
    ///
    /// # Errors
    /// Returns `RigError::SpawnError` when the OS refuses the spawn.
    fn spawn(&self, command: &MinerCommand) -> Result<SpawnedProcess, RigError>;
}

/// Production launcher backed by `tokio::process`
pub struct TokioLauncher;

impl Launcher for TokioLauncher {
    fn spawn(&self, command: &MinerCommand) -> Result<SpawnedProcess, RigError> {
        let mut cmd = Command::new(&command.binary);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            RigError::SpawnError(format!("{}: {}", command.binary.display(), e))
        })?;

        let (tx, rx) = mpsc::channel::<String>(256);

        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let control = Arc::new(TokioProcessControl {
            pid: child.id(),
            child: Mutex::new(child),
        });

        Ok(SpawnedProcess { lines: rx, control })
    }
}

/// [`ProcessControl`] over a `tokio::process::Child`
///
/// `wait` polls `try_wait` instead of holding the child lock across an
/// await, so a termination call can always get at the handle.
struct TokioProcessControl {
    pid: Option<u32>,
    child: Mutex<tokio::process::Child>,
}

#[async_trait]
impl ProcessControl for TokioProcessControl {
    async fn wait(&self) -> Option<i32> {
        loop {
            {
                let mut child = self.child.lock().await;
                match child.try_wait() {
                    Ok(Some(status)) => return status.code(),
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("try_wait failed: {}", e);
                        return None;
                    }
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    }

    async fn terminate(&self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                match Command::new("kill")
                    .arg("-TERM")
                    .arg(pid.to_string())
                    .status()
                    .await
                {
                    Ok(status) if status.success() => return,
                    Ok(status) => log::warn!("kill -TERM exited with {}", status),
                    Err(e) => log::warn!("Failed to signal pid {}: {}", pid, e),
                }
            }
        }
        // No graceful signal available; fall through to a hard kill
        self.kill().await;
    }

    async fn kill(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.start_kill() {
            log::warn!("Kill failed (process likely already dead): {}", e);
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}
