//! Loader abstraction for turning identifiers into script exports.
//!
//! The [`ScriptLoader`] trait decouples resolution from where scripts live.
//! [`FileLoader`] reads TOML manifests from disk; [`ScriptRegistry`] serves
//! in-process [`Script`](crate::script::Script) implementations registered by
//! the host application.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml::Table;
use tracing::debug;

use crate::script::BoxedScript;

/// Value produced by a successful load, before shape validation.
pub enum Export {
    /// An in-process script unit.
    Script(BoxedScript),
    /// A raw manifest table. `origin` is the file it was read from, if any.
    Manifest { table: Table, origin: Option<PathBuf> },
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Script(script) => f.debug_tuple("Script").field(&script.name()).finish(),
            Export::Manifest { table, origin } => f
                .debug_struct("Manifest")
                .field("table", table)
                .field("origin", origin)
                .finish(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("script not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no script registered as '{0}'")]
    UnknownScript(String),
}

/// Capability to load a value by identifier. May fail on missing or invalid targets.
pub trait ScriptLoader: Send + Sync {
    fn load(&self, identifier: &str) -> Result<Export, LoadError>;
}

/// Loads TOML script manifests from the filesystem.
///
/// Relative identifiers resolve against the process working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl ScriptLoader for FileLoader {
    fn load(&self, identifier: &str) -> Result<Export, LoadError> {
        let path = Path::new(identifier);
        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "loading script manifest");
        let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table: Table = toml::from_str(&contents).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Export::Manifest {
            table,
            origin: Some(path.to_path_buf()),
        })
    }
}

type Factory = Box<dyn Fn() -> Export + Send + Sync>;

/// In-process registry mapping identifiers to script factories.
///
/// Each load calls the factory again, so every run gets fresh units.
#[derive(Default)]
pub struct ScriptRegistry {
    factories: HashMap<String, Factory>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `identifier`, replacing any previous entry.
    pub fn register<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Export + Send + Sync + 'static,
    {
        self.factories.insert(identifier.into(), Box::new(factory));
        self
    }

    /// Register a raw manifest table. It is validated at resolution time like any file manifest.
    pub fn register_manifest(self, identifier: impl Into<String>, table: Table) -> Self {
        self.register(identifier, move || Export::Manifest {
            table: table.clone(),
            origin: None,
        })
    }
}

impl ScriptLoader for ScriptRegistry {
    fn load(&self, identifier: &str) -> Result<Export, LoadError> {
        let factory = self
            .factories
            .get(identifier)
            .ok_or_else(|| LoadError::UnknownScript(identifier.to_string()))?;
        Ok(factory())
    }
}

impl<L: ScriptLoader + ?Sized> ScriptLoader for &L {
    fn load(&self, identifier: &str) -> Result<Export, LoadError> {
        (**self).load(identifier)
    }
}
