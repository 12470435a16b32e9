use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InstallError, InstallResult};
use crate::installer::StepId;
use crate::net::{DownloadSettings, USER_AGENT};

const MIB: u64 = 1024 * 1024;

/// Per-component availability-poll budgets (one attempt per second).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollAttempts {
    #[serde(default = "default_node_poll")]
    pub nodejs: u32,
    #[serde(default = "default_git_poll")]
    pub git: u32,
    #[serde(default = "default_claude_poll")]
    pub claudecode: u32,
}

fn default_node_poll() -> u32 {
    30
}

fn default_git_poll() -> u32 {
    30
}

fn default_claude_poll() -> u32 {
    20
}

impl Default for PollAttempts {
    fn default() -> Self {
        Self {
            nodejs: default_node_poll(),
            git: default_git_poll(),
            claudecode: default_claude_poll(),
        }
    }
}

impl PollAttempts {
    pub fn for_step(&self, step: StepId) -> u32 {
        match step {
            StepId::NodeJs => self.nodejs,
            StepId::Git => self.git,
            StepId::ClaudeCode => self.claudecode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallerConfig {
    /// Runtime version installed by the direct-download strategy
    pub node_version: String,
    pub nodejs_dist_url: String,
    pub git_release_url: String,
    pub github_api_url: String,
    /// `owner/name` of this tool's own releases
    pub self_update_repo: String,
    /// Seconds
    pub download_timeout: u64,
    /// Seconds
    pub api_timeout: u64,
    /// Seconds
    pub update_check_timeout: u64,
    pub max_download_bytes: u64,
    pub max_text_bytes: u64,
    pub max_attempts: u32,
    pub poll_attempts: PollAttempts,
    /// Step ids that are reported as skipped instead of installed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            node_version: "22.13.1".to_string(),
            nodejs_dist_url: "https://nodejs.org/dist".to_string(),
            git_release_url: "https://api.github.com/repos/git-for-windows/git/releases/latest"
                .to_string(),
            github_api_url: "https://api.github.com".to_string(),
            self_update_repo: "devstrap/devstrap".to_string(),
            download_timeout: 600,
            api_timeout: 30,
            update_check_timeout: 15,
            max_download_bytes: 500 * MIB,
            max_text_bytes: MIB,
            max_attempts: 3,
            poll_attempts: PollAttempts::default(),
            skip: Vec::new(),
        }
    }
}

impl InstallerConfig {
    pub fn config_dir() -> InstallResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("devstrap"))
            .ok_or_else(|| InstallError::Config("could not determine config directory".to_string()))
    }

    pub fn config_path() -> InstallResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load from the default location, falling back to defaults when no
    /// file exists, then apply environment overrides.
    pub fn load() -> InstallResult<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> InstallResult<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| InstallError::io_at("read", path, e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| InstallError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Apply `DEVSTRAP_NODE_VERSION` and `DEVSTRAP_SKIP`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(version) = lookup("DEVSTRAP_NODE_VERSION").filter(|v| !v.trim().is_empty()) {
            self.node_version = version.trim().trim_start_matches('v').to_string();
        }

        if let Some(skip) = lookup("DEVSTRAP_SKIP") {
            self.skip = skip
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn validate(&self) -> InstallResult<()> {
        if self.max_attempts == 0 {
            return Err(InstallError::Config("max_attempts must be at least 1".to_string()));
        }

        for (name, secs) in [
            ("download_timeout", self.download_timeout),
            ("api_timeout", self.api_timeout),
            ("update_check_timeout", self.update_check_timeout),
        ] {
            if secs == 0 {
                return Err(InstallError::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.max_download_bytes == 0 || self.max_text_bytes == 0 {
            return Err(InstallError::Config("size limits must be greater than zero".to_string()));
        }

        for (name, url) in [
            ("nodejs_dist_url", &self.nodejs_dist_url),
            ("git_release_url", &self.git_release_url),
            ("github_api_url", &self.github_api_url),
        ] {
            if !url.starts_with("https://") {
                return Err(InstallError::Config(format!(
                    "{} must be an https:// URL, got '{}'",
                    name, url
                )));
            }
        }

        if self.node_version.trim().is_empty()
            || !self
                .node_version
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.')
        {
            return Err(InstallError::Config(format!(
                "Invalid node_version '{}'. Use a plain version like '22.13.1'",
                self.node_version
            )));
        }

        if !self.self_update_repo.contains('/') {
            return Err(InstallError::Config(format!(
                "self_update_repo must look like 'owner/name', got '{}'",
                self.self_update_repo
            )));
        }

        self.skipped_steps().map(|_| ())
    }

    /// Parsed `skip` list; unknown ids are a configuration error.
    pub fn skipped_steps(&self) -> InstallResult<BTreeSet<StepId>> {
        self.skip
            .iter()
            .map(|id| {
                StepId::parse(id).ok_or_else(|| {
                    InstallError::Config(format!(
                        "Unknown step '{}' in skip. Valid steps: {}",
                        id,
                        StepId::ALL.map(|s| s.as_str()).join(", ")
                    ))
                })
            })
            .collect()
    }

    pub fn download_settings(&self) -> DownloadSettings {
        DownloadSettings {
            user_agent: USER_AGENT.to_string(),
            download_timeout: Duration::from_secs(self.download_timeout),
            text_timeout: Duration::from_secs(self.api_timeout),
            max_download_bytes: self.max_download_bytes,
            max_text_bytes: self.max_text_bytes,
            max_attempts: self.max_attempts,
            ..Default::default()
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout)
    }

    pub fn update_check_timeout(&self) -> Duration {
        Duration::from_secs(self.update_check_timeout)
    }

    /// Latest-release endpoint of this tool's own repository
    pub fn self_update_url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.github_api_url.trim_end_matches('/'),
            self.self_update_repo
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = InstallerConfig::default();
        assert_eq!(config.node_version, "22.13.1");
        assert_eq!(config.download_timeout, 600);
        assert_eq!(config.api_timeout, 30);
        assert_eq!(config.max_download_bytes, 500 * 1024 * 1024);
        assert_eq!(config.max_text_bytes, 1024 * 1024);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.poll_attempts.for_step(StepId::Git), 30);
        assert_eq!(config.poll_attempts.for_step(StepId::ClaudeCode), 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
node_version: 20.18.0
max_attempts: 5
poll_attempts:
  git: 45
skip:
  - claudecode
"#;
        let config: InstallerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.node_version, "20.18.0");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.poll_attempts.git, 45);
        assert_eq!(config.poll_attempts.nodejs, 30);
        assert_eq!(config.nodejs_dist_url, "https://nodejs.org/dist");
        assert_eq!(
            config.skipped_steps().unwrap().into_iter().collect::<Vec<_>>(),
            vec![StepId::ClaudeCode]
        );
    }

    #[test]
    fn test_serialization_omits_empty_skip() {
        let yaml = serde_yaml::to_string(&InstallerConfig::default()).unwrap();
        assert!(yaml.contains("node_version: 22.13.1"));
        assert!(!yaml.contains("skip"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = InstallerConfig::default();
        config.apply_env(env(&[
            ("DEVSTRAP_NODE_VERSION", "v20.11.1"),
            ("DEVSTRAP_SKIP", "git, claudecode,"),
        ]));
        assert_eq!(config.node_version, "20.11.1");
        assert_eq!(config.skip, vec!["git", "claudecode"]);

        let mut config = InstallerConfig::default();
        config.apply_env(env(&[("DEVSTRAP_NODE_VERSION", "  ")]));
        assert_eq!(config.node_version, "22.13.1");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = vec![
            (
                InstallerConfig {
                    max_attempts: 0,
                    ..Default::default()
                },
                "max_attempts",
            ),
            (
                InstallerConfig {
                    api_timeout: 0,
                    ..Default::default()
                },
                "api_timeout",
            ),
            (
                InstallerConfig {
                    nodejs_dist_url: "http://nodejs.org/dist".to_string(),
                    ..Default::default()
                },
                "https://",
            ),
            (
                InstallerConfig {
                    skip: vec!["python".to_string()],
                    ..Default::default()
                },
                "Unknown step 'python'",
            ),
            (
                InstallerConfig {
                    node_version: "lts".to_string(),
                    ..Default::default()
                },
                "Invalid node_version",
            ),
        ];

        for (config, needle) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(needle), "{} missing from {}", needle, err);
        }
    }

    #[test]
    fn test_load_from_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = InstallerConfig::load_from(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config, InstallerConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"api_timeout: 10\nself_update_repo: acme/devstrap\n").unwrap();

        let config = InstallerConfig::load_from(&path).unwrap();
        assert_eq!(config.api_timeout, 10);
        assert_eq!(
            config.self_update_url(),
            "https://api.github.com/repos/acme/devstrap/releases/latest"
        );
    }

    #[test]
    fn test_load_from_invalid_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_attempts: [not, a, number]").unwrap();

        let err = InstallerConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_download_settings_follow_config() {
        let config = InstallerConfig {
            download_timeout: 120,
            max_attempts: 4,
            ..Default::default()
        };
        let settings = config.download_settings();
        assert_eq!(settings.download_timeout, Duration::from_secs(120));
        assert_eq!(settings.text_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_attempts, 4);
    }
}
