//! Scripted process launcher for supervisor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use periphery_tester::process::{
    ProcessLauncher, ScriptInvocation, ScriptOutput, ScriptProcess, SpawnError, SpawnedScript,
};
use periphery_tester::supervisor::{RunEvent, RunState, RunSupervisor};
use tokio::sync::{mpsc, watch};

/// How a fake process reacts to SIGTERM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTerminate {
    /// Exit right away, as if killed by the signal.
    Exit,
    /// Keep running until killed.
    Ignore,
}

type StdoutWriter = mpsc::UnboundedSender<Vec<u8>>;

/// Test-side controls of one fake process.
#[derive(Clone)]
pub struct FakeControl {
    stdout: Arc<Mutex<Option<StdoutWriter>>>,
    exit: Arc<watch::Sender<Option<Option<i32>>>>,
    pub terminated: Arc<AtomicUsize>,
    pub killed: Arc<AtomicUsize>,
}

impl FakeControl {
    /// Write bytes to the fake stdout.
    pub fn write(&self, bytes: &[u8]) {
        if let Some(stdout) = self.stdout.lock().unwrap().as_ref() {
            let _ = stdout.send(bytes.to_vec());
        }
    }

    /// Close the process's end of stdout and exit with `code`.
    pub fn exit(&self, code: i32) {
        self.stdout.lock().unwrap().take();
        self.exit.send_replace(Some(Some(code)));
    }

    /// Hand stdout to a descendant that outlives the process, keeping the
    /// stream open until the returned handle is dropped.
    pub fn inherit_stdout(&self) -> FakeDescendant {
        let stdout = self.stdout.lock().unwrap().clone();
        FakeDescendant(stdout.expect("stdout already closed"))
    }

    pub fn terminate_count(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.killed.load(Ordering::SeqCst)
    }
}

/// A background helper still writing to the script's stdout.
pub struct FakeDescendant(StdoutWriter);

impl FakeDescendant {
    pub fn write(&self, bytes: &[u8]) {
        let _ = self.0.send(bytes.to_vec());
    }
}

pub struct FakeProcess {
    stdout: Arc<Mutex<Option<StdoutWriter>>>,
    exit_tx: Arc<watch::Sender<Option<Option<i32>>>>,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
    on_terminate: OnTerminate,
    terminated: Arc<AtomicUsize>,
    killed: Arc<AtomicUsize>,
}

impl FakeProcess {
    fn die(&mut self) {
        self.stdout.lock().unwrap().take();
        self.exit_tx.send_if_modified(|exit| {
            if exit.is_none() {
                *exit = Some(None);
                true
            } else {
                false
            }
        });
    }
}

pub struct FakeOutput {
    stdout: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Create a connected fake process, its stdout and its controls.
pub fn fake_process(on_terminate: OnTerminate) -> (FakeProcess, FakeOutput, FakeControl) {
    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
    let stdout_tx = Arc::new(Mutex::new(Some(stdout_tx)));
    let (exit_tx, exit_rx) = watch::channel(None);
    let exit_tx = Arc::new(exit_tx);
    let terminated = Arc::new(AtomicUsize::new(0));
    let killed = Arc::new(AtomicUsize::new(0));

    let process = FakeProcess {
        stdout: Arc::clone(&stdout_tx),
        exit_tx: Arc::clone(&exit_tx),
        exit_rx,
        on_terminate,
        terminated: Arc::clone(&terminated),
        killed: Arc::clone(&killed),
    };
    let output = FakeOutput { stdout: stdout_rx };
    let control = FakeControl {
        stdout: stdout_tx,
        exit: exit_tx,
        terminated,
        killed,
    };
    (process, output, control)
}

#[async_trait]
impl ScriptOutput for FakeOutput {
    async fn read_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.stdout.recv().await)
    }
}

#[async_trait]
impl ScriptProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        if self.on_terminate == OnTerminate::Exit {
            self.die();
        }
        Ok(())
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.killed.fetch_add(1, Ordering::SeqCst);
        self.die();
        Ok(())
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let exit = self
            .exit_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| std::io::Error::other("exit channel closed"))?;
        let code = *exit;
        Ok(code.flatten())
    }
}

/// Launcher handing out queued fake processes.
#[derive(Default)]
pub struct FakeLauncher {
    queue: Mutex<VecDeque<Result<SpawnedScript, SpawnError>>>,
    invocations: Mutex<Vec<ScriptInvocation>>,
    spawns: AtomicUsize,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a process for the next spawn and return its controls.
    pub fn push(&self, on_terminate: OnTerminate) -> FakeControl {
        let (process, output, control) = fake_process(on_terminate);
        self.queue.lock().unwrap().push_back(Ok(SpawnedScript {
            process: Box::new(process),
            output: Box::new(output),
        }));
        control
    }

    /// Make the next spawn fail.
    pub fn push_failure(&self, error: SpawnError) {
        self.queue.lock().unwrap().push_back(Err(error));
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<ScriptInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

/// Shares one launcher between the test and the supervisor.
pub struct SharedLauncher(pub Arc<FakeLauncher>);

#[async_trait]
impl ProcessLauncher for SharedLauncher {
    async fn spawn(&self, invocation: &ScriptInvocation) -> Result<SpawnedScript, SpawnError> {
        self.0.spawns.fetch_add(1, Ordering::SeqCst);
        self.0.invocations.lock().unwrap().push(invocation.clone());
        let next = self.0.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(SpawnError::NotFound(invocation.program().to_string())))
    }
}

/// Collect every notification of `supervisor` into one ordered channel.
pub fn record_events(supervisor: &RunSupervisor) -> mpsc::UnboundedReceiver<RunEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    let out_tx = tx.clone();
    supervisor.on_output(move |record| {
        let _ = out_tx.send(RunEvent::Output(record.clone()));
    });
    let state_tx = tx.clone();
    supervisor.on_state_change(move |state| {
        let _ = state_tx.send(RunEvent::StateChanged(state));
    });
    supervisor.on_diagnostic(move |message| {
        let _ = tx.send(RunEvent::Diagnostic(message.to_string()));
    });

    rx
}

/// Receive the next event, failing the test after a second.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> RunEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for run event")
        .expect("event channel closed")
}

/// Receive events until the run returns to idle, inclusive.
pub async fn events_until_idle(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let idle = event == RunEvent::StateChanged(RunState::Idle);
        events.push(event);
        if idle {
            return events;
        }
    }
}

/// Assert that no event arrives within a short window.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<RunEvent>) {
    let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(result.is_err(), "unexpected event: {result:?}");
}
