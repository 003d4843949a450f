//! Supervisor for diagnostic script runs.
//!
//! This module ties the process launcher, the line classifier and the run
//! state machine together. A [`RunSupervisor`] owns at most one script
//! process at a time; `start` while a run is active is ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::classify::{LineBuffer, LogRecord};
use crate::config::ScriptConfig;
use crate::process::{
    InvalidTestId, ProcessLauncher, ScriptInvocation, ScriptOutput, ScriptProcess, SpawnedScript,
    TestId, TokioLauncher,
};
use crate::supervisor::{dispatch_events, Observers, RunEvent, RunState, RunStateMachine};

/// How long stdout is still read once the script has exited.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// The run currently owned by a supervisor.
#[derive(Debug)]
struct ActiveRun {
    run_id: Uuid,
    test_id: TestId,
    cancel: CancellationToken,
}

/// State shared between the supervisor handle and its run task.
#[derive(Debug, Default)]
struct Shared {
    machine: RunStateMachine,
    active: Option<ActiveRun>,
}

/// Everything a run task needs to report back.
#[derive(Clone)]
struct RunContext {
    shared: Arc<Mutex<Shared>>,
    events: UnboundedSender<RunEvent>,
}

impl RunContext {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RunEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Run event dropped, dispatcher gone");
        }
    }

    /// Transition and notify while holding the lock, so notifications
    /// leave in the same order as the transitions.
    fn transition(&self, shared: &mut Shared, state: RunState) {
        if shared.machine.transition(state) {
            self.emit(RunEvent::StateChanged(state));
        }
    }

    fn enter_running(&self) {
        let mut shared = self.lock();
        self.transition(&mut shared, RunState::Running);
    }

    fn finish(&self) {
        let mut shared = self.lock();
        shared.active = None;
        self.transition(&mut shared, RunState::Idle);
    }

    fn emit_line(&self, line: String) {
        self.emit(RunEvent::Output(LogRecord::from_line(line)));
    }
}

/// Supervises diagnostic script runs, one at a time.
///
/// Cloning yields another handle to the same supervisor. Independent
/// supervisors may coexist; exclusivity holds per supervisor.
#[derive(Clone)]
pub struct RunSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    config: ScriptConfig,
    ctx: RunContext,
    observers: Arc<Mutex<Observers>>,
}

impl std::fmt::Debug for RunSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSupervisor")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RunSupervisor {
    /// Create a supervisor that spawns real child processes.
    ///
    /// See [`RunSupervisor::with_launcher`] for the runtime requirement.
    #[must_use]
    pub fn new(config: ScriptConfig) -> Self {
        Self::with_launcher(config, TokioLauncher)
    }

    /// Create a supervisor using a custom process launcher.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the notification
    /// dispatcher is spawned here.
    #[must_use]
    pub fn with_launcher(config: ScriptConfig, launcher: impl ProcessLauncher) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let observers = Arc::new(Mutex::new(Observers::new()));
        tokio::spawn(dispatch_events(Arc::clone(&observers), rx));

        Self {
            launcher: Arc::new(launcher),
            config,
            ctx: RunContext {
                shared: Arc::new(Mutex::new(Shared::default())),
                events,
            },
            observers,
        }
    }

    /// Register a callback for classified output lines.
    ///
    /// Callbacks run on the dispatcher task and must not register further
    /// callbacks from inside themselves.
    pub fn on_output(&self, callback: impl FnMut(&LogRecord) + Send + 'static) {
        self.lock_observers().add_output(callback);
    }

    /// Register a callback for run state changes.
    pub fn on_state_change(&self, callback: impl FnMut(RunState) + Send + 'static) {
        self.lock_observers().add_state(callback);
    }

    /// Register a callback for diagnostics such as spawn failures.
    pub fn on_diagnostic(&self, callback: impl FnMut(&str) + Send + 'static) {
        self.lock_observers().add_diagnostic(callback);
    }

    /// Start a run of `test_id`.
    ///
    /// Returns immediately. Returns `false` without doing anything if a run
    /// is already active.
    pub fn start(&self, test_id: TestId, verbose: bool) -> bool {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        {
            let mut shared = self.ctx.lock();
            let state = shared.machine.state();
            if state != RunState::Idle {
                tracing::debug!(%test_id, ?state, "Run already active, ignoring start");
                return false;
            }
            shared.active = Some(ActiveRun {
                run_id,
                test_id,
                cancel: cancel.clone(),
            });
            self.ctx.transition(&mut shared, RunState::Starting);
        }

        let invocation = ScriptInvocation::for_test(&self.config, test_id, verbose);
        let span = tracing::info_span!("run", %run_id, %test_id);
        tokio::spawn(
            execute(
                Arc::clone(&self.launcher),
                self.ctx.clone(),
                invocation,
                cancel,
                self.config.terminate_timeout(),
            )
            .instrument(span),
        );
        true
    }

    /// Start a run from a test name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTestId` if `name` is not a known test; nothing is
    /// spawned in that case.
    pub fn start_named(&self, name: &str, verbose: bool) -> Result<bool, InvalidTestId> {
        let test_id = name.parse::<TestId>()?;
        Ok(self.start(test_id, verbose))
    }

    /// Ask the active process to terminate.
    ///
    /// The state is left alone; it returns to `Idle` once the process has
    /// exited. Returns `false` if there was no active run.
    pub fn stop(&self) -> bool {
        let shared = self.ctx.lock();
        if let Some(run) = &shared.active {
            tracing::info!(run_id = %run.run_id, test_id = %run.test_id, "Stop requested");
            run.cancel.cancel();
            true
        } else {
            tracing::debug!("Stop requested while idle, ignoring");
            false
        }
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.ctx.lock().machine.state()
    }

    /// The test being run, if any.
    #[must_use]
    pub fn active_test(&self) -> Option<TestId> {
        self.ctx.lock().active.as_ref().map(|run| run.test_id)
    }

    /// Number of runs started since creation.
    #[must_use]
    pub fn runs_started(&self) -> u64 {
        self.ctx.lock().machine.runs_started()
    }

    #[must_use]
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    fn lock_observers(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drive one run from spawn to exit.
async fn execute(
    launcher: Arc<dyn ProcessLauncher>,
    ctx: RunContext,
    invocation: ScriptInvocation,
    cancel: CancellationToken,
    terminate_timeout: Duration,
) {
    tracing::info!(command = %invocation.command_line(), "Spawning diagnostic script");

    let SpawnedScript {
        mut process,
        mut output,
    } = match launcher.spawn(&invocation).await {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::error!(error = %e, "Failed to spawn diagnostic script");
            ctx.emit(RunEvent::Diagnostic(format!(
                "Failed to start {}: {e}",
                invocation.program()
            )));
            ctx.finish();
            return;
        }
    };

    tracing::info!(pid = ?process.id(), "Diagnostic script running");
    ctx.enter_running();

    let supervised = supervise(
        &ctx,
        process.as_mut(),
        output.as_mut(),
        &cancel,
        terminate_timeout,
    )
    .await;
    match supervised {
        Ok(exit_code) => tracing::info!(?exit_code, "Diagnostic script exited"),
        Err(e) => {
            tracing::warn!(error = %e, "Lost track of diagnostic script");
            ctx.emit(RunEvent::Diagnostic(format!(
                "Failed to wait for diagnostic script: {e}"
            )));
        }
    }

    ctx.finish();
}

/// Termination progress of a run after `stop`.
#[derive(Debug, Default)]
struct Termination {
    kill_deadline: Option<Instant>,
    killed: bool,
}

impl Termination {
    fn requested(&self) -> bool {
        self.kill_deadline.is_some()
    }

    fn awaiting_kill(&self) -> bool {
        self.kill_deadline.is_some() && !self.killed
    }

    fn request(&mut self, process: &mut dyn ScriptProcess, timeout: Duration) {
        tracing::info!(pid = ?process.id(), "Terminating diagnostic script");
        if let Err(e) = process.terminate() {
            tracing::warn!(error = %e, "Failed to signal diagnostic script");
        }
        self.kill_deadline = Some(Instant::now() + timeout);
    }

    fn force(&mut self, process: &mut dyn ScriptProcess) {
        tracing::warn!(pid = ?process.id(), "Diagnostic script ignored termination, killing");
        if let Err(e) = process.kill() {
            tracing::warn!(error = %e, "Failed to kill diagnostic script");
        }
        self.killed = true;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Stream output until the process exits.
///
/// Exit of the process ends the run even while a descendant still holds
/// stdout open; whatever is already in the pipe is drained first. Stop
/// requests are honored until the exit.
async fn supervise(
    ctx: &RunContext,
    process: &mut dyn ScriptProcess,
    output: &mut dyn ScriptOutput,
    cancel: &CancellationToken,
    terminate_timeout: Duration,
) -> std::io::Result<Option<i32>> {
    let mut lines = LineBuffer::new();
    let mut termination = Termination::default();
    let mut output_open = true;

    let status = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled(), if !termination.requested() => {
                termination.request(process, terminate_timeout);
            }
            () = sleep_until_deadline(termination.kill_deadline), if termination.awaiting_kill() => {
                termination.force(process);
            }
            chunk = output.read_chunk(), if output_open => {
                output_open = forward_chunk(ctx, &mut lines, chunk);
            }
            status = process.wait() => break status,
        }
    };

    if output_open {
        drain_output(ctx, &mut lines, output).await;
    }

    if let Some(fragment) = lines.finish() {
        tracing::debug!(len = fragment.len(), "Flushing unterminated final line");
        ctx.emit_line(fragment);
    }

    status
}

/// Emit the complete lines of `chunk`. Returns whether stdout is still open.
fn forward_chunk(
    ctx: &RunContext,
    lines: &mut LineBuffer,
    chunk: std::io::Result<Option<Vec<u8>>>,
) -> bool {
    match chunk {
        Ok(Some(bytes)) => {
            for line in lines.push(&bytes) {
                ctx.emit_line(line);
            }
            true
        }
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read script output");
            false
        }
    }
}

/// Read what an exited script left behind, bounded by [`OUTPUT_DRAIN_TIMEOUT`].
async fn drain_output(ctx: &RunContext, lines: &mut LineBuffer, output: &mut dyn ScriptOutput) {
    let deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, output.read_chunk()).await {
            Ok(chunk) => {
                if !forward_chunk(ctx, lines, chunk) {
                    return;
                }
            }
            Err(_) => {
                tracing::debug!("Script stdout still held open after exit, no longer reading");
                return;
            }
        }
    }
}
