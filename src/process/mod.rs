//! Supervision of spawned peer processes.
//!
//! A [`ProcessGroup`] owns every process it spawned. Processes are killed by
//! [`ProcessGroup::kill_all`], or on drop when a test bails out early.


use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Child;
use tokio::process::Command;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::utils::file_io::open_log_file;
use crate::LaunchError;
use crate::Result;

/// Everything needed to launch one process
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Set on top of the inherited environment (or on an empty one)
    pub env: BTreeMap<String, String>,
    pub inherit_env: bool,
    pub working_dir: PathBuf,
    /// Receives both stdout and stderr
    pub log_path: PathBuf,
}

/// A live process spawned by a [`ProcessGroup`]
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Child,
    log_path: PathBuf,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    /// False once the process has exited on its own or was killed.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kills the process and reaps it. A process that already exited is not an error.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.child.kill().await
    }
}

/// Registry of the processes spawned for one test
#[derive(Debug, Default)]
pub struct ProcessGroup {
    processes: Vec<ProcessHandle>,
}

impl ProcessGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launches a process and registers it. Returns its pid.
    ///
    /// # Errors
    /// `LaunchError::ExecutableNotFound` when the binary is missing,
    /// `LaunchError::LogFile` when the log file cannot be opened and
    /// `LaunchError::Spawn` for any other OS failure.
    pub fn spawn(
        &mut self,
        spec: SpawnSpec,
    ) -> Result<u32> {
        // Relative paths would otherwise resolve against the child's working dir
        let executable = std::fs::canonicalize(&spec.executable)
            .map_err(|_| LaunchError::ExecutableNotFound(spec.executable.clone()))?;

        let stdout = open_log_file(&spec.log_path)?;
        let stderr = stdout.try_clone().map_err(|source| LaunchError::LogFile {
            path: spec.log_path.clone(),
            source,
        })?;

        let mut command = Command::new(&executable);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        if !spec.inherit_env {
            command.env_clear();
        }
        command.envs(&spec.env);

        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            executable: executable.clone(),
            source,
        })?;
        let pid = child.id().unwrap_or_default();

        info!(pid, ?executable, args = ?spec.args, "spawned process");
        debug!(pid, log = ?spec.log_path, env = ?spec.env, "process environment");

        self.processes.push(ProcessHandle {
            pid,
            child,
            log_path: spec.log_path,
        });
        Ok(pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().map(|p| p.pid).collect()
    }

    pub fn get_mut(
        &mut self,
        pid: u32,
    ) -> Option<&mut ProcessHandle> {
        self.processes.iter_mut().find(|p| p.pid == pid)
    }

    pub fn is_running(
        &mut self,
        pid: u32,
    ) -> bool {
        self.get_mut(pid).map(ProcessHandle::is_running).unwrap_or(false)
    }

    /// Kills one process and drops it from the registry.
    /// Returns `false` if the pid is not registered.
    pub async fn kill(
        &mut self,
        pid: u32,
    ) -> bool {
        let Some(index) = self.processes.iter().position(|p| p.pid == pid) else {
            return false;
        };
        let mut handle = self.processes.remove(index);
        kill_logged(&mut handle).await;
        true
    }

    /// Kills the most recently spawned process and returns its pid.
    pub async fn pop(&mut self) -> Option<u32> {
        let mut handle = self.processes.pop()?;
        kill_logged(&mut handle).await;
        Some(handle.pid)
    }

    /// Kills every registered process, oldest first.
    ///
    /// Idempotent: the registry is drained even when a kill fails, so a
    /// second call (or a call on an empty group) does nothing.
    pub async fn kill_all(&mut self) {
        while !self.processes.is_empty() {
            let mut handle = self.processes.remove(0);
            kill_logged(&mut handle).await;
        }
    }
}

async fn kill_logged(handle: &mut ProcessHandle) {
    info!("Killing {}", handle.pid);
    if let Err(e) = handle.kill().await {
        warn!(pid = handle.pid, "failed to kill process: {:?}", e);
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        for handle in self.processes.iter_mut() {
            if let Err(e) = handle.child.start_kill() {
                debug!(pid = handle.pid, "start_kill on drop: {:?}", e);
            }
        }
    }
}
