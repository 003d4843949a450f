//! Output classification: line splitting and severity tagging.

mod lines;
mod severity;

pub use lines::*;
pub use severity::*;
