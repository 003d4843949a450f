//! Run supervision: process ownership, state tracking and notifications.

mod observer;
mod runner;
mod state;

pub use observer::*;
pub use runner::*;
pub use state::*;
