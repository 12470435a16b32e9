//! Presence and version probes for the managed tools.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::platform::{app_data_dir, CommandRunner};

/// Installation state of one tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoftwareStatus {
    pub name: String,
    pub installed: bool,
    pub version: String,
    pub required: bool,
}

/// Snapshot of everything the installer manages
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemCheckResult {
    pub nodejs: SoftwareStatus,
    pub git: SoftwareStatus,
    pub claude_code: SoftwareStatus,
    pub winget_available: bool,
}

impl SystemCheckResult {
    pub fn all_installed(&self) -> bool {
        self.nodejs.installed && self.git.installed && self.claude_code.installed
    }
}

/// Detects whether a named tool is installed.
#[async_trait]
pub trait ToolDetector: Send + Sync {
    async fn detect(&self, command: &str) -> SoftwareStatus;

    /// Whether the OS package manager is present and runs.
    async fn package_manager_available(&self) -> bool;
}

/// Human name for a managed command
pub fn display_name(command: &str) -> &str {
    match command {
        "node" => "Node.js",
        "git" => "Git",
        "claude" => "Claude Code",
        "npm" => "npm",
        "winget" => "winget",
        other => other,
    }
}

/// Well-known install locations consulted when a command is not on PATH.
pub fn fallback_executables(command: &str) -> Vec<PathBuf> {
    if !cfg!(windows) {
        return Vec::new();
    }
    match command {
        "node" => vec![
            PathBuf::from(r"C:\Program Files\nodejs\node.exe"),
            PathBuf::from(r"C:\Program Files (x86)\nodejs\node.exe"),
        ],
        "git" => vec![
            PathBuf::from(r"C:\Program Files\Git\cmd\git.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Git\cmd\git.exe"),
            PathBuf::from(r"C:\Program Files\Git\bin\git.exe"),
        ],
        "npm" => vec![
            PathBuf::from(r"C:\Program Files\nodejs\npm.cmd"),
            PathBuf::from(r"C:\Program Files (x86)\nodejs\npm.cmd"),
        ],
        "claude" => {
            let npm_bin = app_data_dir().join("npm");
            vec![npm_bin.join("claude.cmd"), npm_bin.join("claude.ps1")]
        }
        _ => Vec::new(),
    }
}

/// Normalise `--version` output: trims, drops a leading `v`/`V`, removes
/// line breaks, and strips Git's `git version ` prefix and `.windows.N`
/// suffix.
pub fn sanitize_version(raw: &str) -> String {
    let mut version = raw.trim();
    if let Some(rest) = version.strip_prefix("git version ") {
        version = rest;
        if let Some(idx) = version.find(".windows") {
            version = &version[..idx];
        }
    }
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    version.replace(['\r', '\n'], "")
}

/// Detector that resolves commands and runs `--version`.
pub struct SystemDetector {
    runner: Arc<dyn CommandRunner>,
}

impl SystemDetector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn resolve(&self, command: &str) -> Option<PathBuf> {
        self.runner
            .locate(command)
            .or_else(|| fallback_executables(command).into_iter().find(|p| p.is_file()))
    }
}

#[async_trait]
impl ToolDetector for SystemDetector {
    async fn detect(&self, command: &str) -> SoftwareStatus {
        let mut status = SoftwareStatus {
            name: display_name(command).to_string(),
            required: true,
            ..Default::default()
        };

        let Some(path) = self.resolve(command) else {
            tracing::debug!("{} not found", command);
            return status;
        };

        let program = path.to_string_lossy();
        match self.runner.run(&program, &["--version"]).await {
            Ok(output) if output.success => {
                status.installed = true;
                status.version = sanitize_version(&output.stdout);
                tracing::debug!("Detected {} {}", status.name, status.version);
            }
            Ok(output) => {
                tracing::debug!("{} --version failed: {}", program, output.status_text());
            }
            Err(e) => {
                tracing::debug!("{} --version could not run: {}", program, e);
            }
        }
        status
    }

    async fn package_manager_available(&self) -> bool {
        if self.runner.locate("winget").is_none() {
            return false;
        }
        matches!(self.runner.run("winget", &["--version"]).await, Ok(o) if o.success)
    }
}

/// Probe all managed tools.
pub async fn check_all(detector: &dyn ToolDetector) -> SystemCheckResult {
    SystemCheckResult {
        nodejs: detector.detect("node").await,
        git: detector.detect("git").await,
        claude_code: detector.detect("claude").await,
        winget_available: detector.package_manager_available().await,
    }
}
