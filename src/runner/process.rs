//! # Host process backend.
//!
//! Each instance is spawned in its own process group so that stopping it also
//! reaches the helpers it forked.
//!
//! ## Stop sequence
//! ```text
//! SIGTERM → process group (fallback: the pid itself)
//!   └─ wait up to grace ─► exited? return exit
//!                        └─ no: SIGKILL → group, kill child, reap
//! ```
//!
//! Dropping a live handle (an aborted supervisor task) sends SIGKILL to the
//! whole group, so neither the instance nor its helpers are orphaned.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{Exit, LaunchSpec, Process, Runner};
use crate::error::RunnerError;

/// Launches [`LaunchSpec`]s as host processes.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    spec: LaunchSpec,
}

impl ProcessRunner {
    pub fn new(spec: LaunchSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    fn unsupported(&self, reason: &str) -> RunnerError {
        RunnerError::Unsupported {
            id: self.spec.id.clone(),
            reason: reason.to_string(),
        }
    }

    fn command(&self) -> Result<Command, RunnerError> {
        if self.spec.image.is_some() {
            return Err(self.unsupported("container images need a container backend"));
        }
        if !self.spec.mounts.is_empty() {
            return Err(self.unsupported("mounts need a container backend"));
        }
        if self.spec.namespaces.any() {
            return Err(self.unsupported("namespace isolation needs a container backend"));
        }
        let Some((program, rest)) = self.spec.args.split_first() else {
            return Err(RunnerError::Spawn {
                id: self.spec.id.clone(),
                reason: "empty command line".into(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .envs(&self.spec.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);
        Ok(cmd)
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    fn id(&self) -> &str {
        &self.spec.id
    }

    async fn start(&self) -> Result<Box<dyn Process>, RunnerError> {
        let child = self.command()?.spawn().map_err(|e| RunnerError::Spawn {
            id: self.spec.id.clone(),
            reason: e.to_string(),
        })?;
        debug!(service = %self.spec.id, pid = ?child.id(), "process spawned");
        Ok(Box::new(ChildProcess {
            id: self.spec.id.clone(),
            pid: child.id(),
            child,
            exit: None,
        }))
    }
}

struct ChildProcess {
    id: String,
    pid: Option<u32>,
    child: Child,
    exit: Option<Exit>,
}

impl ChildProcess {
    async fn reap(&mut self) -> Exit {
        let exit = match self.child.wait().await {
            Ok(status) => Exit::from(status),
            Err(e) => Exit::Error(e.to_string()),
        };
        self.exit = Some(exit.clone());
        exit
    }

    #[cfg(unix)]
    fn signal(&self, sig: nix::sys::signal::Signal) -> Result<(), RunnerError> {
        use nix::sys::signal::{kill, killpg};
        use nix::unistd::Pid;

        let Some(raw) = self.pid else {
            return Ok(());
        };
        let pid = i32::try_from(raw)
            .ok()
            .filter(|p| *p > 1)
            .map(Pid::from_raw)
            .ok_or_else(|| RunnerError::Stop {
                id: self.id.clone(),
                reason: format!("refusing to signal pid {raw}"),
            })?;
        killpg(pid, sig)
            .or_else(|_| kill(pid, sig))
            .map_err(|e| RunnerError::Stop {
                id: self.id.clone(),
                reason: format!("{sig}: {e}"),
            })
    }

    async fn force(&mut self) -> Exit {
        #[cfg(unix)]
        {
            if let Err(e) = self.signal(nix::sys::signal::Signal::SIGKILL) {
                debug!(service = %self.id, error = %e, "SIGKILL to group failed");
            }
        }
        let _ = self.child.start_kill();
        self.reap().await
    }
}

#[async_trait]
impl Process for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn wait(&mut self) -> Exit {
        match &self.exit {
            Some(exit) => exit.clone(),
            None => self.reap().await,
        }
    }

    async fn stop(&mut self, grace: Duration) -> Result<Exit, RunnerError> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }

        #[cfg(unix)]
        let graceful = self.signal(nix::sys::signal::Signal::SIGTERM);
        #[cfg(not(unix))]
        let graceful = self.child.start_kill().map_err(|e| RunnerError::Stop {
            id: self.id.clone(),
            reason: e.to_string(),
        });

        if let Err(e) = graceful {
            warn!(service = %self.id, error = %e, "graceful stop failed; killing");
            return Ok(self.force().await);
        }

        match tokio::time::timeout(grace, self.reap()).await {
            Ok(exit) => Ok(exit),
            Err(_) => {
                warn!(service = %self.id, ?grace, "process ignored SIGTERM; sending SIGKILL");
                Ok(self.force().await)
            }
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.exit.is_some() {
            return;
        }
        #[cfg(unix)]
        if let Err(e) = self.signal(nix::sys::signal::Signal::SIGKILL) {
            debug!(service = %self.id, error = %e, "SIGKILL to group on drop failed");
        }
        let _ = self.child.start_kill();
    }
}
