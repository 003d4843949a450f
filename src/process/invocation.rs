//! Command line construction for the diagnostic script.

use std::borrow::Cow;
use std::path::PathBuf;

use crate::config::ScriptConfig;
use crate::process::TestId;

/// A fully resolved script command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ScriptInvocation {
    /// Build the invocation for a test.
    ///
    /// The argument order is fixed: interpreter arguments, script path,
    /// quiet flag, optional verbose flag, then the test token last.
    #[must_use]
    pub fn for_test(config: &ScriptConfig, test_id: TestId, verbose: bool) -> Self {
        let mut args = config.interpreter_args.clone();
        args.push(config.script_path.to_string_lossy().into_owned());
        args.push(config.quiet_flag.clone());

        if verbose {
            args.push(config.verbose_flag.clone());
        }

        args.push(test_id.as_str().to_string());

        Self {
            program: config.interpreter.clone(),
            args,
            working_dir: config.working_dir.clone(),
        }
    }

    /// Create an invocation from raw parts.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn get_working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Render the command line with shell quoting, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| shell_escape::escape(Cow::Borrowed(part)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
