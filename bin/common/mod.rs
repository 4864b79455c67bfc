//! Shared pieces for the `hopper` binary.

pub mod config;
pub mod logging;
pub mod monitor;
