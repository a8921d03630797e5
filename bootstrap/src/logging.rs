//! `tracing` setup for the `bootstrap` binary.
//!
//! A run reports to its caller in two ways. Outcomes come back through the
//! [`ScriptStream`](crate::sequence::ScriptStream) and resolution problems
//! through [`Session::errors`](crate::Session::errors); the binary prints
//! both. `tracing` events from resolution and execution only help debug a
//! run, so the default filter keeps them quiet.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `warn`. Events go to
/// stderr so stdout carries only outcome lines.
///
/// # Example
/// ```bash
/// RUST_LOG=bootstrap=debug cargo run -- -- --scripts scripts/schema.toml
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
