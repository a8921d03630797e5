//! Test-only helpers: scripted units, registries, and on-disk manifests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::future::BoxFuture;
use serde_json::Value;
use tempfile::TempDir;
use toml::Table;

use crate::io::loader::{Export, LoadError, ScriptLoader, ScriptRegistry};
use crate::script::{BoxedScript, Outcome, Script};

/// Shared record of which scripts started, in start order.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    started: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn record(&self, name: &str) {
        self.started
            .lock()
            .expect("run log lock")
            .push(name.to_string());
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().expect("run log lock").clone()
    }

    pub fn count(&self) -> usize {
        self.started.lock().expect("run log lock").len()
    }
}

/// What a [`ScriptedScript`] does when run.
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    /// Resolve with a successful outcome.
    Succeed,
    /// Resolve with a failed outcome carrying this payload.
    Fail(Value),
    /// Return `Err` from `run`.
    Reject(String),
    /// Panic inside the future returned by `run`.
    Panic(String),
    /// Panic in `run` itself, before any future is returned.
    PanicOnCall(String),
}

/// Deterministic in-process script that records its start in a [`RunLog`].
#[derive(Debug, Clone)]
pub struct ScriptedScript {
    name: String,
    result: ScriptedResult,
    delay: Option<Duration>,
    log: RunLog,
}

impl ScriptedScript {
    pub fn new(name: &str, result: ScriptedResult, log: &RunLog) -> Self {
        Self {
            name: name.to_string(),
            result,
            delay: None,
            log: log.clone(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Script for ScriptedScript {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> BoxFuture<'_, Result<Outcome>> {
        if let ScriptedResult::PanicOnCall(message) = &self.result {
            self.log.record(&self.name);
            panic!("{message}");
        }
        Box::pin(async move {
            self.log.record(&self.name);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.result {
                ScriptedResult::Succeed => Ok(Outcome::success(&self.name)),
                ScriptedResult::Fail(error) => Ok(Outcome::failure(&self.name, error.clone())),
                ScriptedResult::Reject(message) => Err(anyhow!("{message}")),
                ScriptedResult::Panic(message) | ScriptedResult::PanicOnCall(message) => {
                    panic!("{message}")
                }
            }
        })
    }
}

/// Build a registry where each identifier maps to a scripted unit of the same name.
pub fn scripted_registry(log: &RunLog, entries: &[(&str, ScriptedResult)]) -> ScriptRegistry {
    entries
        .iter()
        .fold(ScriptRegistry::new(), |registry, (identifier, result)| {
            let script = ScriptedScript::new(identifier, result.clone(), log);
            registry.register(*identifier, move || Export::Script(Box::new(script.clone())))
        })
}

/// Build boxed scripted units directly, bypassing resolution.
pub fn scripted_units(log: &RunLog, entries: &[(&str, ScriptedResult)]) -> Vec<BoxedScript> {
    entries
        .iter()
        .map(|(name, result)| {
            Box::new(ScriptedScript::new(name, result.clone(), log)) as BoxedScript
        })
        .collect()
}

/// Parse a TOML snippet into a manifest table.
pub fn manifest_table(raw: &str) -> Table {
    toml::from_str(raw).expect("parse manifest table")
}

/// Loader wrapper that counts load attempts.
pub struct CountingLoader<L> {
    inner: L,
    loads: AtomicUsize,
}

impl<L: ScriptLoader> CountingLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl<L: ScriptLoader> ScriptLoader for CountingLoader<L> {
    fn load(&self, identifier: &str) -> Result<Export, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(identifier)
    }
}

/// Temporary directory of script manifests.
pub struct TempScripts {
    dir: TempDir,
}

impl TempScripts {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp scripts dir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `file_name` and return the absolute path.
    pub fn write(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(file_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Write a manifest that runs `command` under the name `name`.
    pub fn write_command(&self, file_name: &str, name: &str, command: &[&str]) -> Result<PathBuf> {
        let run = toml::Value::Array(
            command
                .iter()
                .map(|part| toml::Value::String(part.to_string()))
                .collect(),
        );
        self.write(file_name, &format!("name = \"{name}\"\nrun = {run}\n"))
    }
}
