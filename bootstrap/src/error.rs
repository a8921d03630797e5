//! Terminal errors surfaced on a script stream.

use serde_json::Value;
use thiserror::Error;

/// Fatal run conditions. A stream yields at most one of these, as its last item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    /// No identifiers were supplied; nothing was loaded.
    #[error("no scripts specified")]
    Configuration,
    /// One or more identifiers could not be resolved or failed validation.
    #[error("{failed} script(s) failed to resolve; see Session::errors() for details")]
    Resolution { failed: usize },
    /// A script failed or its entry point returned an error. Later scripts never start.
    #[error("script '{script_name}' failed: {}", payload_text(.error))]
    Execution { script_name: String, error: Value },
    /// `Session::run` was called on a session that already ran.
    #[error("session already ran; create a new Session for a fresh run")]
    AlreadyRun,
}

fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
