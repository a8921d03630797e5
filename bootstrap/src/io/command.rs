//! Process-backed scripts built from validated manifests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::future::BoxFuture;
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::core::shape::ScriptManifest;
use crate::script::{Outcome, Script};

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 100_000;

/// Execution settings applied to every command script of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSettings {
    /// Truncate captured stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Timeout for manifests that do not set `timeout_secs`.
    pub default_timeout: Option<Duration>,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            default_timeout: None,
        }
    }
}

/// A script that runs an external program.
///
/// Exit status 0 is success. A non-zero exit is a failed [`Outcome`] carrying
/// the exit code and stderr; spawn errors and timeouts are returned as `Err`.
#[derive(Debug, Clone)]
pub struct CommandScript {
    manifest: ScriptManifest,
    workdir: Option<PathBuf>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl CommandScript {
    /// Build a command script. `origin` is the manifest file; its directory
    /// becomes the working directory.
    ///
    /// A relative origin is made absolute against the current directory so
    /// the program path and the child's working directory agree.
    pub fn new(manifest: ScriptManifest, origin: Option<&Path>, settings: &CommandSettings) -> Self {
        let workdir = origin
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf()));
        let timeout = manifest.timeout.or(settings.default_timeout);
        Self {
            manifest,
            workdir,
            timeout,
            output_limit_bytes: settings.output_limit_bytes,
        }
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    /// Program path, anchored to the working directory when it is a relative path.
    fn program(&self) -> PathBuf {
        let program = Path::new(&self.manifest.program);
        match &self.workdir {
            Some(dir) if program.is_relative() && program.components().count() > 1 => {
                dir.join(program)
            }
            _ => program.to_path_buf(),
        }
    }

    #[instrument(skip_all, fields(script = %self.manifest.name))]
    async fn execute(&self) -> Result<Outcome> {
        let program = self.program();
        let mut cmd = Command::new(&program);
        cmd.args(&self.manifest.args)
            .envs(&self.manifest.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        info!(program = %program.display(), "starting script command");
        let child = cmd
            .spawn()
            .with_context(|| format!("spawn {}", program.display()))?;

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    warn!(timeout_secs = limit.as_secs(), "script command timed out");
                    anyhow!(
                        "script '{}' timed out after {:?}",
                        self.manifest.name,
                        limit
                    )
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.with_context(|| format!("wait for {}", program.display()))?;

        if output.status.success() {
            debug!("script command completed successfully");
            return Ok(Outcome::success(&self.manifest.name));
        }

        warn!(exit_code = ?output.status.code(), "script command failed");
        Ok(Outcome::failure(
            &self.manifest.name,
            json!({
                "exit_code": output.status.code(),
                "stderr": truncate_output(&output.stderr, self.output_limit_bytes),
            }),
        ))
    }
}

impl Script for CommandScript {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn run(&self) -> BoxFuture<'_, Result<Outcome>> {
        Box::pin(self.execute())
    }
}

/// Lossy-decode `bytes`, keeping at most `limit` bytes on a char boundary.
pub fn truncate_output(bytes: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= limit {
        return text.into_owned();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n[truncated {} bytes]",
        &text[..end],
        text.len() - end
    )
}
