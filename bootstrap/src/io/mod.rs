//! I/O adapters: script loading, process-backed scripts, and config files.

pub mod command;
pub mod config;
pub mod loader;
