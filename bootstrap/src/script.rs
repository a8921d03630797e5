//! Script unit contract shared by the resolver and the sequencer.
//!
//! A script is anything with a non-empty name and a zero-argument async
//! entry point. Host applications implement [`Script`] directly and register
//! the implementation with [`crate::io::loader::ScriptRegistry`]; manifests on
//! disk become [`crate::io::command::CommandScript`] units.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of running one script. Produced exactly once per executed unit.
///
/// `error` is present iff `success` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub script_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Outcome {
    pub fn success(script_name: impl Into<String>) -> Self {
        Self {
            success: true,
            script_name: script_name.into(),
            error: None,
        }
    }

    pub fn failure(script_name: impl Into<String>, error: impl Into<Value>) -> Self {
        Self {
            success: false,
            script_name: script_name.into(),
            error: Some(error.into()),
        }
    }
}

/// A named asynchronous bootstrap task.
///
/// Returning `Ok` with a failed [`Outcome`] and returning `Err` are treated
/// the same by the sequencer: both end the run.
pub trait Script: Send + Sync {
    /// Display name. Must be non-empty for the unit to pass resolution.
    fn name(&self) -> &str;

    fn run(&self) -> BoxFuture<'_, anyhow::Result<Outcome>>;
}

pub type BoxedScript = Box<dyn Script>;
