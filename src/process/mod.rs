//! Diagnostic script invocation and process control.

mod invocation;
mod spawn;
mod test_id;

pub use invocation::*;
pub use spawn::*;
pub use test_id::*;
