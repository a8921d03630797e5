//! Stable exit codes for the `bootstrap` binary.

use crate::error::RunError;

/// Every script succeeded.
pub const OK: i32 = 0;
/// No scripts were specified, or the config file is invalid.
pub const CONFIGURATION: i32 = 1;
/// At least one script could not be resolved or had the wrong shape.
pub const RESOLUTION: i32 = 2;
/// A script failed; later scripts did not run.
pub const EXECUTION: i32 = 3;

/// Exit code for a terminal run error.
pub fn for_error(err: &RunError) -> i32 {
    match err {
        RunError::Configuration | RunError::AlreadyRun => CONFIGURATION,
        RunError::Resolution { .. } => RESOLUTION,
        RunError::Execution { .. } => EXECUTION,
    }
}
