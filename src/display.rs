//! Colored terminal output for supervised runs.
//!
//! This is the console rendition of the presentation layer: it styles
//! classified script lines and state changes for a terminal.

use std::io::{self, Write};

use chrono::Local;
use owo_colors::OwoColorize;

use crate::classify::{LogRecord, Severity};
use crate::process::TestId;
use crate::supervisor::RunState;

/// Get current local time for line prefixes.
fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Style a line according to its severity.
#[must_use]
pub fn style_line(severity: Severity, text: &str) -> String {
    match severity {
        Severity::Error => text.red().to_string(),
        Severity::Ok => text.green().to_string(),
        Severity::Fail => text.red().bold().to_string(),
        Severity::Success => text.green().bold().to_string(),
        Severity::Start => text.bold().to_string(),
        Severity::Plain => text.to_string(),
    }
}

/// Human label for a run state.
#[must_use]
pub fn state_label(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "stopped",
        RunState::Starting => "starting",
        RunState::Running => "running",
    }
}

/// Print one classified script line.
pub fn print_record(record: &LogRecord) {
    println!(
        "{} {}",
        timestamp().dimmed(),
        style_line(record.severity, &record.text)
    );
    let _ = io::stdout().flush();
}

/// Print a run state change.
pub fn print_state(state: RunState) {
    let label = state_label(state);
    let styled = match state {
        RunState::Idle => label.dimmed().to_string(),
        RunState::Starting => label.yellow().to_string(),
        RunState::Running => label.cyan().to_string(),
    };
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[PROCESS]".blue().bold(),
        styled
    );
    let _ = io::stdout().flush();
}

/// Print a supervisor diagnostic.
pub fn print_diagnostic(message: &str) {
    eprintln!("{} {}", "[SUPERVISOR]".magenta().bold(), message);
    let _ = io::stderr().flush();
}

/// Print a usage hint for the operator.
pub fn print_hint(message: &str) {
    eprintln!("{} {}", "hint:".cyan().bold(), message);
    let _ = io::stderr().flush();
}

/// Print the available tests.
pub fn print_test_list() {
    for id in TestId::ALL {
        println!("{:<14} {}", id.as_str().bold(), id.description().dimmed());
    }
    let _ = io::stdout().flush();
}
