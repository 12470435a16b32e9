//! Static description of each installable component.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detect::fallback_executables;

/// Stable identifier of an install step, as used in progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepId {
    #[serde(rename = "nodejs")]
    NodeJs,
    #[serde(rename = "git")]
    Git,
    #[serde(rename = "claudecode")]
    ClaudeCode,
}

impl StepId {
    /// Install order; later steps depend on earlier ones.
    pub const ALL: [StepId; 3] = [StepId::NodeJs, StepId::Git, StepId::ClaudeCode];

    pub fn as_str(self) -> &'static str {
        match self {
            StepId::NodeJs => "nodejs",
            StepId::Git => "git",
            StepId::ClaudeCode => "claudecode",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|step| step.as_str().eq_ignore_ascii_case(s))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            StepId::NodeJs => "Node.js",
            StepId::Git => "Git",
            StepId::ClaudeCode => "Claude Code",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strategy A is carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageManager {
    /// `winget install <id> --silent ...`
    Winget { id: &'static str },
    /// `npm install -g <package>`
    Npm { package: &'static str },
}

impl PackageManager {
    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Winget { .. } => "winget",
            PackageManager::Npm { .. } => "npm",
        }
    }

    /// Name for the start of a sentence.
    pub fn label(&self) -> &'static str {
        match self {
            PackageManager::Winget { .. } => "Winget",
            PackageManager::Npm { .. } => "npm",
        }
    }
}

/// Whether a missing checksum aborts the direct-download strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPolicy {
    Mandatory,
    BestEffort,
}

/// Where strategy B gets its installer from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectSource {
    /// `{base_url}/v{version}/node-v{version}-{arch}.msi`, checked against
    /// `{base_url}/v{version}/SHASUMS256.txt`
    NodeDist { base_url: String, version: String },
    /// Latest release of a GitHub repository, checked against
    /// `<asset url>.sha256` when published
    GitHubRelease { api_url: String },
}

/// Identity and strategies of one installable unit. Built once, never
/// mutated.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    pub step: StepId,
    /// Command used to detect presence and verify the install
    pub command: &'static str,
    pub version_flag: &'static str,
    pub package_manager: PackageManager,
    pub direct: Option<DirectSource>,
    pub checksum: ChecksumPolicy,
    /// Directory appended to the persistent PATH after a direct install
    pub install_dir: Option<PathBuf>,
    /// Absolute locations tried when the bare command does not verify
    pub fallback_paths: Vec<PathBuf>,
    pub poll_attempts: u32,
    /// Wait for the command to appear before verifying strategy A
    pub poll_after_package_manager: bool,
}

impl ComponentSpec {
    pub fn name(&self) -> &'static str {
        self.step.display_name()
    }

    pub fn nodejs(base_url: &str, version: &str, poll_attempts: u32) -> Self {
        Self {
            step: StepId::NodeJs,
            command: "node",
            version_flag: "--version",
            package_manager: PackageManager::Winget {
                id: "OpenJS.NodeJS.LTS",
            },
            direct: Some(DirectSource::NodeDist {
                base_url: base_url.trim_end_matches('/').to_string(),
                version: version.trim_start_matches('v').to_string(),
            }),
            checksum: ChecksumPolicy::Mandatory,
            install_dir: Some(PathBuf::from(r"C:\Program Files\nodejs")),
            fallback_paths: fallback_executables("node"),
            poll_attempts,
            poll_after_package_manager: false,
        }
    }

    pub fn git(release_url: &str, poll_attempts: u32) -> Self {
        Self {
            step: StepId::Git,
            command: "git",
            version_flag: "--version",
            package_manager: PackageManager::Winget { id: "Git.Git" },
            direct: Some(DirectSource::GitHubRelease {
                api_url: release_url.to_string(),
            }),
            checksum: ChecksumPolicy::BestEffort,
            install_dir: Some(PathBuf::from(r"C:\Program Files\Git\cmd")),
            fallback_paths: fallback_executables("git"),
            poll_attempts,
            poll_after_package_manager: false,
        }
    }

    pub fn claude_code(poll_attempts: u32) -> Self {
        Self {
            step: StepId::ClaudeCode,
            command: "claude",
            version_flag: "--version",
            package_manager: PackageManager::Npm {
                package: super::claude_code::PACKAGE,
            },
            direct: None,
            checksum: ChecksumPolicy::BestEffort,
            install_dir: None,
            fallback_paths: fallback_executables("claude"),
            poll_attempts,
            poll_after_package_manager: true,
        }
    }
}
