//! Resolution of identifiers into validated script units.

use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::core::shape::{ShapeError, check_name, validate_manifest};
use crate::io::command::{CommandScript, CommandSettings};
use crate::io::loader::{Export, LoadError, ScriptLoader};
use crate::script::BoxedScript;

/// Per-run summary of which identifiers failed and how.
///
/// Both lists preserve input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub ok: bool,
    pub unresolvable: Vec<String>,
    pub wrong_shape: Vec<String>,
}

impl ResolutionReport {
    pub fn failed_count(&self) -> usize {
        self.unresolvable.len() + self.wrong_shape.len()
    }

    /// One diagnostic line per non-empty failure list.
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.unresolvable.is_empty() {
            lines.push(format!(
                "unresolvable scripts: {}",
                self.unresolvable.join(", ")
            ));
        }
        if !self.wrong_shape.is_empty() {
            lines.push(format!(
                "scripts without a non-empty name and callable run: {}",
                self.wrong_shape.join(", ")
            ));
        }
        lines
    }
}

/// Report plus the units for every identifier that passed, in input order.
pub struct Resolution {
    pub report: ResolutionReport,
    pub units: Vec<BoxedScript>,
}

/// Loads each identifier directly, then under `base_dir`, and validates the result.
pub struct Resolver<'a, L: ScriptLoader + ?Sized> {
    loader: &'a L,
    base_dir: &'a Path,
    settings: CommandSettings,
}

impl<'a, L: ScriptLoader + ?Sized> Resolver<'a, L> {
    pub fn new(loader: &'a L, base_dir: &'a Path, settings: CommandSettings) -> Self {
        Self {
            loader,
            base_dir,
            settings,
        }
    }

    /// Resolve every identifier. Does not stop at the first failure.
    #[instrument(skip_all, fields(count = identifiers.len(), base_dir = %self.base_dir.display()))]
    pub fn resolve(&self, identifiers: &[String]) -> Resolution {
        let mut report = ResolutionReport::default();
        let mut units = Vec::with_capacity(identifiers.len());

        for identifier in identifiers {
            let export = match self.load(identifier) {
                Ok(export) => export,
                Err(err) => {
                    warn!(identifier = %identifier, error = %err, "script unresolvable");
                    report.unresolvable.push(identifier.clone());
                    continue;
                }
            };
            match self.validate(export) {
                Ok(unit) => {
                    debug!(identifier = %identifier, script = unit.name(), "script resolved");
                    units.push(unit);
                }
                Err(err) => {
                    warn!(identifier = %identifier, error = %err, "script has wrong shape");
                    report.wrong_shape.push(identifier.clone());
                }
            }
        }

        report.ok = report.unresolvable.is_empty() && report.wrong_shape.is_empty();
        Resolution { report, units }
    }

    fn load(&self, identifier: &str) -> Result<Export, LoadError> {
        match self.loader.load(identifier) {
            Ok(export) => Ok(export),
            Err(direct) => {
                let joined = self.base_dir.join(identifier);
                debug!(
                    identifier,
                    error = %direct,
                    fallback = %joined.display(),
                    "direct load failed; retrying under base dir"
                );
                self.loader.load(&joined.to_string_lossy())
            }
        }
    }

    fn validate(&self, export: Export) -> Result<BoxedScript, ShapeError> {
        match export {
            Export::Script(unit) => {
                check_name(unit.name())?;
                Ok(unit)
            }
            Export::Manifest { table, origin } => {
                let manifest = validate_manifest(&table)?;
                Ok(Box::new(CommandScript::new(
                    manifest,
                    origin.as_deref(),
                    &self.settings,
                )))
            }
        }
    }
}
