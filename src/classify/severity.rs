//! Severity classification of diagnostic script output.
//!
//! The diagnostic script prefixes each status line with a bracketed tag
//! such as `[OK]` or `[FAIL]`. This module maps a raw line onto a small
//! set of severities so the presentation layer can style it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a single output line, derived from its leading tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// `[ERROR]` - a single check reported a problem.
    Error,
    /// `[OK]` - a single check passed.
    Ok,
    /// `[FAIL]` - the whole test run failed.
    Fail,
    /// `[SUCCESS]` - the whole test run passed.
    Success,
    /// `[START]` - a test run announced itself.
    Start,
    /// Anything without a recognized tag.
    #[default]
    Plain,
}

impl Severity {
    /// All severities, in tag-table order.
    pub const ALL: [Self; 6] = [
        Self::Error,
        Self::Ok,
        Self::Fail,
        Self::Success,
        Self::Start,
        Self::Plain,
    ];

    /// Look up the severity for a leading token.
    ///
    /// Only exact matches count; `[ok]` or `[OK]:` are plain.
    #[must_use]
    pub fn from_tag(token: &str) -> Self {
        match token {
            "[ERROR]" => Self::Error,
            "[OK]" => Self::Ok,
            "[FAIL]" => Self::Fail,
            "[SUCCESS]" => Self::Success,
            "[START]" => Self::Start,
            _ => Self::Plain,
        }
    }

    /// The tag that produces this severity, if any.
    #[must_use]
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::Error => Some("[ERROR]"),
            Self::Ok => Some("[OK]"),
            Self::Fail => Some("[FAIL]"),
            Self::Success => Some("[SUCCESS]"),
            Self::Start => Some("[START]"),
            Self::Plain => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Ok => "ok",
            Self::Fail => "fail",
            Self::Success => "success",
            Self::Start => "start",
            Self::Plain => "plain",
        };
        f.write_str(name)
    }
}

/// One classified line of script output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Severity derived from the leading tag.
    pub severity: Severity,
    /// The full original line, tag included.
    pub text: String,
}

impl LogRecord {
    /// Classify a line into a record.
    #[must_use]
    pub fn from_line(line: impl Into<String>) -> Self {
        let text = line.into();
        let severity = classify(&text).0;
        Self { severity, text }
    }
}

/// Classify a raw output line.
///
/// The leading token is everything up to the first whitespace character,
/// so a line starting with whitespace has an empty token and is plain.
/// The returned text is always the full original line.
#[must_use]
pub fn classify(line: &str) -> (Severity, &str) {
    let token = line.split(char::is_whitespace).next().unwrap_or_default();
    (Severity::from_tag(token), line)
}
