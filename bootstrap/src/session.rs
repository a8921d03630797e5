//! Top-level orchestration for one bootstrap run.
//!
//! A [`Session`] reads identifiers from its [`SessionConfig`], resolves them,
//! and hands the validated units to the sequencer. Configuration and
//! resolution problems end the run before any script starts; their
//! diagnostics stay queryable through [`Session::errors`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::{info, instrument, warn};

use crate::core::args::scan_identifiers;
use crate::error::RunError;
use crate::io::command::CommandSettings;
use crate::io::config::BootstrapConfig;
use crate::io::loader::ScriptLoader;
use crate::resolve::{ResolutionReport, Resolver};
use crate::script::Outcome;
use crate::sequence::{ScriptStream, SequenceHooks, execute_with_hooks};

/// Where the session reads its identifiers from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierSource {
    /// Identifiers supplied directly, in order.
    Explicit(Vec<String>),
    /// Invocation arguments, scanned for the configured flag.
    Args(Vec<String>),
}

/// Explicit configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Flag that introduces identifiers in [`IdentifierSource::Args`].
    pub flag: String,
    pub source: IdentifierSource,
    /// Directory joined onto identifiers for the second load attempt.
    pub base_dir: PathBuf,
    pub command: CommandSettings,
}

impl SessionConfig {
    pub fn new(flag: impl Into<String>, source: IdentifierSource, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            flag: flag.into(),
            source,
            base_dir: base_dir.into(),
            command: CommandSettings::default(),
        }
    }

    /// Build a session config from the file-level config.
    pub fn from_config(cfg: &BootstrapConfig, source: IdentifierSource) -> Self {
        Self {
            flag: cfg.flag.clone(),
            source,
            base_dir: cfg.base_dir.clone(),
            command: cfg.command_settings(),
        }
    }

    pub fn identifiers(&self) -> Vec<String> {
        match &self.source {
            IdentifierSource::Explicit(identifiers) => identifiers.clone(),
            IdentifierSource::Args(args) => scan_identifiers(args, &self.flag),
        }
    }
}

/// Lifecycle of a session. Every phase except `Idle`, `Resolving` and
/// `Executing` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    Idle = 0,
    Resolving = 1,
    ResolutionFailed = 2,
    Executing = 3,
    Completed = 4,
    ExecutionFailed = 5,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionPhase::Idle,
            1 => SessionPhase::Resolving,
            2 => SessionPhase::ResolutionFailed,
            3 => SessionPhase::Executing,
            4 => SessionPhase::Completed,
            _ => SessionPhase::ExecutionFailed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::ResolutionFailed | SessionPhase::Completed | SessionPhase::ExecutionFailed
        )
    }
}

/// Status shared between the session and its sequencing task.
///
/// `ok` only ever goes from true to false.
#[derive(Debug)]
struct SessionStatus {
    ok: AtomicBool,
    phase: AtomicU8,
}

impl SessionStatus {
    fn new() -> Self {
        Self {
            ok: AtomicBool::new(true),
            phase: AtomicU8::new(SessionPhase::Idle as u8),
        }
    }

    fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    fn enter(&self, phase: SessionPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    fn fail(&self, phase: SessionPhase) {
        self.ok.store(false, Ordering::SeqCst);
        self.enter(phase);
    }
}

/// One bootstrap run. Create a new session for every run.
pub struct Session<L: ScriptLoader> {
    config: SessionConfig,
    loader: L,
    identifiers: Vec<String>,
    report: Option<ResolutionReport>,
    errors: Vec<String>,
    status: Arc<SessionStatus>,
}

impl<L: ScriptLoader> Session<L> {
    pub fn new(config: SessionConfig, loader: L) -> Self {
        Self {
            config,
            loader,
            identifiers: Vec::new(),
            report: None,
            errors: Vec::new(),
            status: Arc::new(SessionStatus::new()),
        }
    }

    /// Resolve and start the run.
    ///
    /// Configuration and resolution failures produce a stream that yields one
    /// error; otherwise the sequencer's stream is returned. A session runs at
    /// most once: later calls yield [`RunError::AlreadyRun`] and leave the
    /// status of the first run untouched.
    #[instrument(skip_all, fields(base_dir = %self.config.base_dir.display()))]
    pub fn run(&mut self) -> ScriptStream {
        if self.status.phase() != SessionPhase::Idle {
            warn!(phase = ?self.status.phase(), "session already ran");
            return ScriptStream::failed(RunError::AlreadyRun);
        }
        self.status.enter(SessionPhase::Resolving);

        self.identifiers = self.config.identifiers();
        if self.identifiers.is_empty() {
            let err = RunError::Configuration;
            warn!(flag = %self.config.flag, "no scripts specified");
            self.errors.push(err.to_string());
            self.status.fail(SessionPhase::ResolutionFailed);
            return ScriptStream::failed(err);
        }

        let resolver = Resolver::new(
            &self.loader,
            &self.config.base_dir,
            self.config.command.clone(),
        );
        let resolution = resolver.resolve(&self.identifiers);
        let report = resolution.report;
        if !report.ok {
            let err = RunError::Resolution {
                failed: report.failed_count(),
            };
            self.errors.extend(report.diagnostics());
            self.report = Some(report);
            self.status.fail(SessionPhase::ResolutionFailed);
            return ScriptStream::failed(err);
        }
        self.report = Some(report);

        info!(count = resolution.units.len(), "scripts resolved; executing");
        self.status.enter(SessionPhase::Executing);
        let completed = Arc::clone(&self.status);
        let failed = Arc::clone(&self.status);
        let hooks = SequenceHooks::default()
            .on_complete(move || completed.enter(SessionPhase::Completed))
            .on_failure(move |_| failed.fail(SessionPhase::ExecutionFailed));
        execute_with_hooks(resolution.units, hooks)
    }

    /// Run to the end, calling `on_outcome` for each successful script.
    ///
    /// Returns the number of scripts that succeeded, or the terminal error.
    pub async fn run_with<F: FnMut(&Outcome)>(&mut self, on_outcome: F) -> Result<usize, RunError> {
        self.run().for_each_outcome(on_outcome).await
    }

    /// False once any configuration, resolution, or execution error occurred.
    pub fn is_ok(&self) -> bool {
        self.status.ok.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SessionPhase {
        self.status.phase()
    }

    /// Diagnostics recorded during configuration and resolution. Never cleared.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Identifiers read for this run, in order. Empty until `run` is called.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Resolution report, once resolution has happened.
    pub fn report(&self) -> Option<&ResolutionReport> {
        self.report.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    use crate::io::loader::ScriptRegistry;
    use crate::test_support::{
        CountingLoader, RunLog, ScriptedResult, manifest_table, scripted_registry,
    };

    fn explicit(ids: &[&str]) -> SessionConfig {
        SessionConfig::new(
            "--scripts",
            IdentifierSource::Explicit(ids.iter().map(|id| id.to_string()).collect()),
            "scripts",
        )
    }

    #[tokio::test]
    async fn middle_failure_stops_the_chain() {
        let log = RunLog::default();
        let registry = scripted_registry(
            &log,
            &[
                ("a", ScriptedResult::Succeed),
                ("b", ScriptedResult::Fail(json!("boom"))),
                ("c", ScriptedResult::Succeed),
            ],
        );
        let mut session = Session::new(explicit(&["a", "b", "c"]), registry);

        let items: Vec<_> = session.run().collect().await;
        assert_eq!(
            items,
            vec![
                Ok(Outcome::success("a")),
                Err(RunError::Execution {
                    script_name: "b".to_string(),
                    error: json!("boom"),
                }),
            ]
        );
        assert_eq!(log.started(), vec!["a", "b"]);
        assert!(!session.is_ok());
        assert_eq!(session.phase(), SessionPhase::ExecutionFailed);
        assert!(session.errors().is_empty());
    }

    #[tokio::test]
    async fn panic_before_run_returns_fails_the_session() {
        let log = RunLog::default();
        let registry = scripted_registry(
            &log,
            &[
                ("a", ScriptedResult::PanicOnCall("no connection".to_string())),
                ("b", ScriptedResult::Succeed),
            ],
        );
        let mut session = Session::new(explicit(&["a", "b"]), registry);

        let result = session.run_with(|_| {}).await;
        assert_eq!(
            result,
            Err(RunError::Execution {
                script_name: "a".to_string(),
                error: json!("panicked: no connection"),
            })
        );
        assert_eq!(log.started(), vec!["a"]);
        assert!(!session.is_ok());
        assert_eq!(session.phase(), SessionPhase::ExecutionFailed);
    }

    #[tokio::test]
    async fn manifest_without_run_fails_resolution() {
        let registry = ScriptRegistry::new().register_manifest("x", manifest_table("name = \"x\""));
        let mut session = Session::new(explicit(&["x"]), registry);

        let items: Vec<_> = session.run().collect().await;
        assert_eq!(items, vec![Err(RunError::Resolution { failed: 1 })]);
        assert_eq!(
            session.report(),
            Some(&ResolutionReport {
                ok: false,
                unresolvable: Vec::new(),
                wrong_shape: vec!["x".to_string()],
            })
        );
        assert!(!session.is_ok());
        assert_eq!(session.phase(), SessionPhase::ResolutionFailed);
    }

    #[tokio::test]
    async fn empty_identifiers_fail_without_loading() {
        let log = RunLog::default();
        let loader = CountingLoader::new(scripted_registry(&log, &[("a", ScriptedResult::Succeed)]));
        let mut session = Session::new(explicit(&[]), &loader);

        let items: Vec<_> = session.run().collect().await;
        assert_eq!(items, vec![Err(RunError::Configuration)]);
        assert_eq!(loader.loads(), 0);
        assert_eq!(session.errors(), ["no scripts specified".to_string()]);
        assert!(!session.is_ok());
    }

    #[tokio::test]
    async fn resolution_failure_lists_every_bad_identifier_and_runs_nothing() {
        let log = RunLog::default();
        let registry = scripted_registry(&log, &[("good", ScriptedResult::Succeed)])
            .register_manifest("shapeless", manifest_table("name = \"shapeless\"\nrun = true"));
        let mut session = Session::new(
            explicit(&["gone", "good", "shapeless", "also-gone"]),
            registry,
        );

        let items: Vec<_> = session.run().collect().await;
        assert_eq!(items, vec![Err(RunError::Resolution { failed: 3 })]);
        assert!(log.started().is_empty());
        assert_eq!(
            session.errors(),
            [
                "unresolvable scripts: gone, also-gone".to_string(),
                "scripts without a non-empty name and callable run: shapeless".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn all_succeeding_scripts_complete_in_order() {
        let log = RunLog::default();
        let registry = scripted_registry(
            &log,
            &[
                ("one", ScriptedResult::Succeed),
                ("two", ScriptedResult::Succeed),
                ("three", ScriptedResult::Succeed),
            ],
        );
        let mut session = Session::new(explicit(&["three", "one", "two"]), registry);

        let mut seen = Vec::new();
        let count = session
            .run_with(|outcome| seen.push(outcome.script_name.clone()))
            .await
            .expect("run");
        assert_eq!(count, 3);
        assert_eq!(seen, vec!["three", "one", "two"]);
        assert!(session.is_ok());
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[tokio::test]
    async fn identifiers_come_from_argument_scan() {
        let log = RunLog::default();
        let registry = scripted_registry(
            &log,
            &[("a", ScriptedResult::Succeed), ("b", ScriptedResult::Succeed)],
        );
        let args = ["app", "--port", "80", "--db-scripts", "a", "b", "--verbose"]
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        let config = SessionConfig::new("--db-scripts", IdentifierSource::Args(args), "scripts");
        let mut session = Session::new(config, registry);

        let count = session.run_with(|_| {}).await.expect("run");
        assert_eq!(count, 2);
        assert_eq!(session.identifiers(), ["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn second_run_is_rejected_and_status_is_kept() {
        let log = RunLog::default();
        let registry = scripted_registry(&log, &[("a", ScriptedResult::Succeed)]);
        let mut session = Session::new(explicit(&["a"]), registry);

        session.run_with(|_| {}).await.expect("first run");
        let items: Vec<_> = session.run().collect().await;
        assert_eq!(items, vec![Err(RunError::AlreadyRun)]);
        assert_eq!(log.count(), 1);
        assert!(session.is_ok());
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[tokio::test]
    async fn failed_status_never_reverts() {
        let log = RunLog::default();
        let registry = scripted_registry(&log, &[("a", ScriptedResult::Reject("down".to_string()))]);
        let mut session = Session::new(explicit(&["a"]), registry);

        let err = session.run_with(|_| {}).await.expect_err("failure");
        assert!(matches!(err, RunError::Execution { .. }));
        assert!(!session.is_ok());

        let _ = session.run_with(|_| {}).await;
        assert!(!session.is_ok());
        assert_eq!(session.phase(), SessionPhase::ExecutionFailed);
    }

    #[test]
    fn phase_round_trips_through_status() {
        let status = SessionStatus::new();
        for phase in [
            SessionPhase::Resolving,
            SessionPhase::Executing,
            SessionPhase::Completed,
            SessionPhase::ResolutionFailed,
            SessionPhase::ExecutionFailed,
        ] {
            status.enter(phase);
            assert_eq!(status.phase(), phase);
        }
        assert!(status.ok.load(Ordering::SeqCst));
        assert!(SessionPhase::Completed.is_terminal());
        assert!(!SessionPhase::Executing.is_terminal());
    }
}
