//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the diagnostic script is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Interpreter binary, looked up on `PATH`.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Arguments passed to the interpreter before the script path.
    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,
    /// Path of the diagnostic script.
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,
    /// Flag telling the script to print plain, untinted log lines.
    #[serde(default = "default_quiet_flag")]
    pub quiet_flag: String,
    /// Flag enabling debug output from the script.
    #[serde(default = "default_verbose_flag")]
    pub verbose_flag: String,
    /// Seconds to wait after SIGTERM before force-killing.
    #[serde(default = "default_terminate_timeout_secs")]
    pub terminate_timeout_secs: u64,
    /// Working directory for the script process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-u".to_string()]
}

fn default_script_path() -> PathBuf {
    PathBuf::from("/root/test-sm-tm.py")
}

fn default_quiet_flag() -> String {
    "-q".to_string()
}

fn default_verbose_flag() -> String {
    "-v".to_string()
}

fn default_terminate_timeout_secs() -> u64 {
    5
}

impl ScriptConfig {
    /// Grace period between SIGTERM and a forced kill.
    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            script_path: default_script_path(),
            quiet_flag: default_quiet_flag(),
            verbose_flag: default_verbose_flag(),
            terminate_timeout_secs: default_terminate_timeout_secs(),
            working_dir: None,
        }
    }
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesterConfig {
    #[serde(default)]
    pub script: ScriptConfig,
}
