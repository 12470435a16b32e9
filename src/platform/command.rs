//! Subprocess execution.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{InstallError, InstallResult};

/// Windows `CREATE_NO_WINDOW` process creation flag
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr, trimmed
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }

    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external programs and resolves them on the search path.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` to completion. `Err` only when it could not be run at
    /// all or the run was cancelled; a non-zero exit is reported in the
    /// output.
    async fn run(&self, program: &str, args: &[&str]) -> InstallResult<CommandOutput>;

    /// Absolute path of `command` if it resolves on the current PATH.
    fn locate(&self, command: &str) -> Option<PathBuf>;

    /// Run and require a zero exit status. Returns trimmed combined output.
    async fn run_checked(&self, program: &str, args: &[&str]) -> InstallResult<String> {
        let output = self.run(program, args).await?;
        if !output.success {
            return Err(InstallError::execution(
                command_line(program, args),
                output.status_text(),
                output.combined(),
            ));
        }
        Ok(output.combined())
    }
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// PATH used for lookups and child processes in place of the inherited one.
///
/// Shared between the runner and the PATH store so a refresh is visible to
/// the next spawn without touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    value: Arc<RwLock<Option<OsString>>>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// The refreshed PATH, or `None` while the inherited one is still current.
    pub fn get(&self) -> Option<OsString> {
        match self.value.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, path: impl Into<OsString>) {
        let path = path.into();
        match self.value.write() {
            Ok(mut guard) => *guard = Some(path),
            Err(poisoned) => *poisoned.into_inner() = Some(path),
        }
    }
}

/// Real process runner.
///
/// Children never open a console window on Windows and are killed when the
/// cancellation token fires.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    cancel: CancellationToken,
    search_path: SearchPath,
}

impl SystemRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_search_path(cancel, SearchPath::new())
    }

    pub fn with_search_path(cancel: CancellationToken, search_path: SearchPath) -> Self {
        Self { cancel, search_path }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> InstallResult<CommandOutput> {
        let line = command_line(program, args);
        if self.cancel.is_cancelled() {
            return Err(InstallError::cancelled(line));
        }
        tracing::debug!("Running: {}", line);

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = self.search_path.get() {
            cmd.env("PATH", path);
        }
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(InstallError::cancelled(line)),
            result = cmd.output() => result,
        };

        let output = output.map_err(|e| InstallError::execution(&line, "failed to start", e.to_string()))?;
        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success {
            tracing::debug!("{} exited with {}", line, result.status_text());
        }
        Ok(result)
    }

    fn locate(&self, command: &str) -> Option<PathBuf> {
        match (self.search_path.get(), std::env::current_dir()) {
            (Some(path), Ok(cwd)) => which::which_in(command, Some(path), cwd).ok(),
            _ => which::which(command).ok(),
        }
    }
}
