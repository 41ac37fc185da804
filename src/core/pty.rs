//! Pseudoterminal wrapper for Unix
//!
//! This module allocates a pty pair, spawns a child process as the session
//! leader with the slave side as its controlling terminal, and exposes the
//! master side as a reader and a writer.

use std::io::{self, Read, Write};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to allocate pseudoterminal: {0}")]
    Open(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Failed to clone PTY reader: {0}")]
    Reader(String),

    #[error("Failed to take PTY writer: {0}")]
    Writer(String),

    #[error("Failed to signal process group: {0}")]
    Signal(#[source] nix::Error),

    #[error("Failed to wait for process: {0}")]
    Wait(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// What a session leader runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Shell from `$SHELL`, falling back to `/bin/sh`
    pub fn default_shell() -> Self {
        Self::new(std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()))
    }
}

/// Master side of a pty plus the child it drives
pub struct Pty {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
    /// Set once the process group has been signalled
    killed: bool,
}

impl Pty {
    /// Allocate a pty pair and spawn `command` on its slave side.
    ///
    /// The child gets a new session with the slave as controlling terminal and
    /// `TERM=dumb`. The slave handle is closed in the parent before returning.
    pub fn spawn(command: &CommandSpec, rows: u16, cols: u16) -> Result<Self> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&command.program);
        cmd.args(&command.args);
        cmd.env("TERM", "dumb");
        if let Ok(dir) = std::env::current_dir() {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(format!("{}: {}", command.program, e)))?;

        // Only the child may hold the slave open, otherwise reads never see EOF
        drop(pair.slave);

        let pid = child.process_id();
        debug!("spawned {} (pid {:?})", command.program, pid);

        Ok(Self {
            master: pair.master,
            child,
            pid,
            killed: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Blocking reader over the master side, for a worker thread
    pub fn reader(&self) -> Result<Box<dyn Read + Send>> {
        self.master
            .try_clone_reader()
            .map_err(|e| PtyError::Reader(e.to_string()))
    }

    /// Writer over the master side. Can be taken only once.
    pub fn writer(&self) -> Result<Box<dyn Write + Send>> {
        self.master
            .take_writer()
            .map_err(|e| PtyError::Writer(e.to_string()))
    }

    /// Exit code if the child has exited (reaps it)
    pub fn try_wait(&mut self) -> Result<Option<u32>> {
        self.child
            .try_wait()
            .map(|status| status.map(|s| s.exit_code()))
            .map_err(PtyError::Wait)
    }

    /// SIGKILL the whole process group, then reap the leader.
    ///
    /// The group is signalled even when the leader is already gone, since
    /// background members may still hold the slave open. Only the first call
    /// does anything.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;
        let reaped = matches!(self.child.try_wait(), Ok(Some(_)));

        match self.pid {
            Some(pid) => match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) | Err(nix::Error::ESRCH) => {}
                Err(e) if reaped => debug!("killpg({}) failed: {}", pid, e),
                Err(e) => {
                    // Not a group leader after all; fall back to the process itself
                    debug!("killpg({}) failed: {}", pid, e);
                    self.child.kill().map_err(|_| PtyError::Signal(e))?;
                }
            },
            None if reaped => {}
            None => self.child.kill().map_err(PtyError::Wait)?,
        }

        if !reaped {
            self.child.wait().map_err(PtyError::Wait)?;
        }
        Ok(())
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            debug!("cleanup of pid {:?} failed: {}", self.pid, e);
        }
    }
}

/// Whether `pid` has exited. Zombies waiting for init count as exited.
#[cfg(test)]
pub(crate) fn exited(pid: u32) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if nix::sys::signal::kill(Pid::from_raw(pid as i32), None).is_err() {
            return true;
        }
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap_or_default();
        if stat.rsplit(')').next().map_or(false, |rest| rest.trim_start().starts_with('Z')) {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    false
}
