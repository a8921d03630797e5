//! Shape checks for loaded script exports.
//!
//! A loaded value satisfies the script contract when it carries a non-empty
//! `name` and a callable `run` entry point. For manifests, "callable" means a
//! non-empty array of strings whose first element names a program.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use toml::{Table, Value};

/// Why a loaded value does not satisfy the script contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("missing `name`")]
    MissingName,
    #[error("`name` must be a non-empty string")]
    EmptyName,
    #[error("missing `run` entry point")]
    MissingRun,
    #[error("`run` must be a non-empty array of strings starting with a program")]
    NotCallable,
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Validated, typed form of a script manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptManifest {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
    pub env: BTreeMap<String, String>,
}

/// Check the name half of the contract.
pub fn check_name(name: &str) -> Result<(), ShapeError> {
    if name.trim().is_empty() {
        return Err(ShapeError::EmptyName);
    }
    Ok(())
}

/// Validate a raw manifest table and convert it to a [`ScriptManifest`].
pub fn validate_manifest(table: &Table) -> Result<ScriptManifest, ShapeError> {
    let name = match table.get("name") {
        None => return Err(ShapeError::MissingName),
        Some(Value::String(name)) => name.clone(),
        Some(_) => return Err(ShapeError::EmptyName),
    };
    check_name(&name)?;

    let command = match table.get("run") {
        None => return Err(ShapeError::MissingRun),
        Some(Value::Array(items)) => string_items(items).ok_or(ShapeError::NotCallable)?,
        Some(_) => return Err(ShapeError::NotCallable),
    };
    let Some((program, args)) = command.split_first() else {
        return Err(ShapeError::NotCallable);
    };
    if program.trim().is_empty() {
        return Err(ShapeError::NotCallable);
    }

    Ok(ScriptManifest {
        name,
        program: program.clone(),
        args: args.to_vec(),
        timeout: timeout_field(table)?,
        env: env_field(table)?,
    })
}

fn string_items(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn timeout_field(table: &Table) -> Result<Option<Duration>, ShapeError> {
    match table.get("timeout_secs") {
        None => Ok(None),
        Some(Value::Integer(secs)) if *secs > 0 => Ok(Some(Duration::from_secs(*secs as u64))),
        Some(other) => Err(ShapeError::InvalidField {
            field: "timeout_secs",
            reason: format!("expected a positive integer, got {other}"),
        }),
    }
}

fn env_field(table: &Table) -> Result<BTreeMap<String, String>, ShapeError> {
    let Some(value) = table.get("env") else {
        return Ok(BTreeMap::new());
    };
    let Value::Table(entries) = value else {
        return Err(ShapeError::InvalidField {
            field: "env",
            reason: "expected a table of strings".to_string(),
        });
    };
    entries
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(text) => Ok((key.clone(), text.to_string())),
            None => Err(ShapeError::InvalidField {
                field: "env",
                reason: format!("value for `{key}` must be a string"),
            }),
        })
        .collect()
}
