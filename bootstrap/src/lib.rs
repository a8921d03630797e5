//! Fail-fast bootstrap script sequencer.
//!
//! Given an ordered list of script identifiers, this crate resolves each to a
//! runnable [`Script`](script::Script), validates its shape, and runs the
//! units strictly in order, reporting each outcome as it settles and halting
//! on the first failure. It is meant to run once at startup to bring an
//! external resource (a database, a cache, a bucket) into a known state.
//!
//! - **[`core`]**: Pure, deterministic logic (argument scan, shape checks).
//! - **[`io`]**: Loaders, process-backed scripts, and config files.
//!
//! [`resolve`], [`sequence`] and [`session`] build the run on top of those.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod resolve;
pub mod script;
pub mod sequence;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::RunError;
pub use script::{BoxedScript, Outcome, Script};
pub use session::{IdentifierSource, Session, SessionConfig, SessionPhase};
