//! Command implementations for poolward CLI

pub mod check;

pub use check::run_check;
