//! Periphery tester - supervised runs of board diagnostic scripts.

pub mod classify;
pub mod config;
pub mod display;
pub mod process;
pub mod supervisor;
