//! Periphery tester - supervised runs of board diagnostic scripts.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use periphery_tester::classify::Severity;
use periphery_tester::config::{ConfigLoader, ScriptConfig};
use periphery_tester::display;
use periphery_tester::process::TestId;
use periphery_tester::supervisor::{RunState, RunSupervisor};

#[derive(Parser)]
#[command(
    name = "periphery-tester",
    about = "Run board peripheral diagnostics under supervision",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one diagnostic test.
    Run {
        /// Test to run (COMPLEX, USB, PCI, HDMI, UART, UART_ENDLESS, RS422,
        /// SATA, RTC, CAN, EMMC, ETHERNET).
        test: TestId,
        /// Ask the script for debug output.
        #[arg(short, long)]
        debug: bool,
    },
    /// List the available tests.
    List,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Run a test to completion, mapping Ctrl-C to a stop request.
async fn run_test(config: ScriptConfig, test: TestId, script_debug: bool) -> ExitCode {
    let supervisor = RunSupervisor::new(config);
    let failed = Arc::new(AtomicBool::new(false));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let output_failed = Arc::clone(&failed);
    supervisor.on_output(move |record| {
        if record.severity == Severity::Fail {
            output_failed.store(true, Ordering::Relaxed);
        }
        display::print_record(record);
    });

    supervisor.on_state_change(move |state| {
        display::print_state(state);
        if state == RunState::Idle {
            let _ = done_tx.send(());
        }
    });

    let diagnostic_failed = Arc::clone(&failed);
    supervisor.on_diagnostic(move |message| {
        diagnostic_failed.store(true, Ordering::Relaxed);
        display::print_diagnostic(message);
    });

    tracing::info!(%test, script_debug, "Starting diagnostic run");
    if test.is_endless() {
        display::print_hint(&format!("{test} runs until stopped, press Ctrl-C to end it"));
    }
    supervisor.start(test, script_debug);

    loop {
        tokio::select! {
            _ = done_rx.recv() => break,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    let _ = done_rx.recv().await;
                    break;
                }
                supervisor.stop();
            }
        }
    }

    if failed.load(Ordering::Relaxed) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = cli.config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            display::print_diagnostic(&e.to_string());
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Commands::Run {
            test,
            debug: script_debug,
        } => run_test(config.script, test, script_debug).await,
        Commands::List => {
            display::print_test_list();
            ExitCode::SUCCESS
        }
    }
}
