//! Script process spawning and control.
//!
//! The supervisor only talks to a process through the [`ProcessLauncher`],
//! [`ScriptProcess`] and [`ScriptOutput`] traits, so tests can substitute a
//! scripted fake for a real child process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::Instrument;

use crate::process::ScriptInvocation;

/// Size of a single stdout read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// The interpreter binary was not found.
    #[error("Interpreter not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied")]
    PermissionDenied,
    /// Process stdout was not captured.
    #[error("Process stdout not available")]
    NoStdout,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(err: std::io::Error, program: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Capability to start script processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync + 'static {
    /// Start a process. Resolves once the OS reports it as live.
    async fn spawn(&self, invocation: &ScriptInvocation) -> Result<SpawnedScript, SpawnError>;
}

/// A freshly spawned script: its process handle and its stdout.
///
/// The two halves are separate so that the exit of the process can be
/// observed while stdout is still open, which happens whenever a
/// descendant inherits the pipe.
pub struct SpawnedScript {
    pub process: Box<dyn ScriptProcess>,
    pub output: Box<dyn ScriptOutput>,
}

impl std::fmt::Debug for SpawnedScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedScript")
            .field("pid", &self.process.id())
            .finish_non_exhaustive()
    }
}

/// Stdout of a script process.
#[async_trait]
pub trait ScriptOutput: Send {
    /// Read the next chunk of stdout. `Ok(None)` means end of stream.
    ///
    /// Must be cancel safe: dropping the future loses no data.
    async fn read_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>>;
}

/// A live script process.
#[async_trait]
pub trait ScriptProcess: Send {
    /// OS process id, while known.
    fn id(&self) -> Option<u32>;

    /// Ask the process to exit. Does not wait.
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Force the process to exit. Does not wait.
    fn kill(&mut self) -> std::io::Result<()>;

    /// Wait for exit. Returns the exit code, or `None` if killed by a signal.
    ///
    /// Must be cancel safe.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;
}

/// Launcher backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn spawn(&self, invocation: &ScriptInvocation) -> Result<SpawnedScript, SpawnError> {
        let (process, output) = ChildProcess::spawn(invocation)?;
        Ok(SpawnedScript {
            process: Box::new(process),
            output: Box::new(output),
        })
    }
}

/// A running child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
}

/// Captured stdout of a [`ChildProcess`].
#[derive(Debug)]
pub struct ChildOutput {
    stdout: ChildStdout,
    buf: Box<[u8]>,
}

impl ChildProcess {
    /// Spawn the invocation with stdout and stderr piped.
    ///
    /// Stderr is drained in the background and logged at debug level.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn.
    pub fn spawn(invocation: &ScriptInvocation) -> Result<(Self, ChildOutput), SpawnError> {
        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = invocation.get_working_dir() {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(e, invocation.program()))?;

        let stdout = child.stdout.take().ok_or(SpawnError::NoStdout)?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr).in_current_span());
        }

        let output = ChildOutput {
            stdout,
            buf: vec![0; READ_CHUNK_SIZE].into_boxed_slice(),
        };
        Ok((Self { child }, output))
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(%line, "Script stderr"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading script stderr");
                break;
            }
        }
    }
}

#[async_trait]
impl ScriptOutput for ChildOutput {
    async fn read_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let n = self.stdout.read(&mut self.buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(self.buf[..n].to_vec()))
        }
    }
}

#[async_trait]
impl ScriptProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let Some(pid) = self.id() else {
                // Already reaped
                return Ok(());
            };
            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            kill(nix_pid, Signal::SIGTERM).map_err(std::io::Error::from)
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}
