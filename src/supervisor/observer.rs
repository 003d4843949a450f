//! Notification delivery to the presentation layer.
//!
//! Every notification of a supervisor is pushed onto one channel and
//! drained by a single dispatcher task, so callbacks run one at a time and
//! in the order the supervisor produced them.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;

use crate::classify::LogRecord;
use crate::supervisor::RunState;

/// A notification produced by a supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A classified line of script output.
    Output(LogRecord),
    /// The run state changed.
    StateChanged(RunState),
    /// Something went wrong that the user should hear about.
    Diagnostic(String),
}

type OutputCallback = Box<dyn FnMut(&LogRecord) + Send>;
type StateCallback = Box<dyn FnMut(RunState) + Send>;
type DiagnosticCallback = Box<dyn FnMut(&str) + Send>;

/// Registered notification callbacks.
#[derive(Default)]
pub struct Observers {
    output: Vec<OutputCallback>,
    state: Vec<StateCallback>,
    diagnostic: Vec<DiagnosticCallback>,
}

impl Observers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_output(&mut self, callback: impl FnMut(&LogRecord) + Send + 'static) {
        self.output.push(Box::new(callback));
    }

    pub fn add_state(&mut self, callback: impl FnMut(RunState) + Send + 'static) {
        self.state.push(Box::new(callback));
    }

    pub fn add_diagnostic(&mut self, callback: impl FnMut(&str) + Send + 'static) {
        self.diagnostic.push(Box::new(callback));
    }

    /// Invoke every callback interested in `event`, in registration order.
    pub fn dispatch(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Output(record) => self.output.iter_mut().for_each(|cb| cb(record)),
            RunEvent::StateChanged(state) => self.state.iter_mut().for_each(|cb| cb(*state)),
            RunEvent::Diagnostic(message) => {
                self.diagnostic.iter_mut().for_each(|cb| cb(message.as_str()));
            }
        }
    }

    /// Whether no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.output.is_empty() && self.state.is_empty() && self.diagnostic.is_empty()
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("output", &self.output.len())
            .field("state", &self.state.len())
            .field("diagnostic", &self.diagnostic.len())
            .finish()
    }
}

/// Drain `events` into `observers` until every sender is gone.
pub(crate) async fn dispatch_events(
    observers: Arc<Mutex<Observers>>,
    mut events: UnboundedReceiver<RunEvent>,
) {
    while let Some(event) = events.recv().await {
        tracing::trace!(?event, "Dispatching run event");
        observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dispatch(&event);
    }
    tracing::debug!("Run event channel closed");
}
