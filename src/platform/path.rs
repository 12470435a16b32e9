//! Persistent PATH management.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::command::{CommandRunner, SearchPath};
use crate::error::{InstallError, InstallResult};

/// Access to the user's persistent search path.
#[async_trait]
pub trait PathEnvironment: Send + Sync {
    /// Append `dir` to the persistent user PATH unless already present, and
    /// notify running applications of the change.
    async fn add_to_path(&self, dir: &Path) -> InstallResult<()>;

    /// Rebuild the PATH used for lookups and child processes from the
    /// persistent store.
    async fn refresh_path(&self) -> InstallResult<()>;

    /// Whether `dir` is an entry of the PATH value `path_value`.
    fn contains_path(&self, path_value: &str, dir: &str) -> bool {
        path_contains(path_value, dir)
    }
}

/// Platform PATH list separator
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

/// Entry-wise PATH membership. Trailing separators are ignored; Windows
/// compares case-insensitively.
pub fn path_contains(path_value: &str, dir: &str) -> bool {
    let dir = trim_dir(dir);
    if dir.is_empty() {
        return false;
    }
    path_value
        .split(PATH_SEPARATOR)
        .map(|entry| trim_dir(entry.trim()))
        .any(|entry| same_dir(entry, dir))
}

fn trim_dir(s: &str) -> &str {
    s.trim_end_matches(['/', '\\'])
}

#[cfg(windows)]
fn same_dir(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(not(windows))]
fn same_dir(a: &str, b: &str) -> bool {
    a == b
}

/// User PATH backed by the Windows environment store.
///
/// Reads and writes go through PowerShell's `[Environment]` API, which also
/// broadcasts `WM_SETTINGCHANGE` on write.
pub struct WindowsPathEnvironment {
    runner: Arc<dyn CommandRunner>,
    search_path: SearchPath,
}

impl WindowsPathEnvironment {
    /// `search_path` receives the refreshed PATH; hand the same one to the
    /// runner so later lookups and children see it.
    pub fn new(runner: Arc<dyn CommandRunner>, search_path: SearchPath) -> Self {
        Self { runner, search_path }
    }

    async fn read_scope(&self, scope: &str) -> InstallResult<String> {
        let script = format!("[Environment]::GetEnvironmentVariable('Path', '{}')", scope);
        self.runner
            .run_checked("powershell", &["-NoProfile", "-NonInteractive", "-Command", &script])
            .await
    }
}

#[async_trait]
impl PathEnvironment for WindowsPathEnvironment {
    async fn add_to_path(&self, dir: &Path) -> InstallResult<()> {
        let dir = dir.to_string_lossy();
        let current = self.read_scope("User").await?;

        if windows_path_contains(&current, &dir) {
            tracing::debug!("{} already in user PATH", dir);
            return Ok(());
        }

        let updated = if current.trim().is_empty() {
            dir.to_string()
        } else {
            format!("{};{}", current.trim_end_matches(';'), dir)
        };

        let script = format!(
            "[Environment]::SetEnvironmentVariable('Path', '{}', 'User')",
            updated.replace('\'', "''")
        );
        self.runner
            .run_checked("powershell", &["-NoProfile", "-NonInteractive", "-Command", &script])
            .await?;

        tracing::info!("Added {} to user PATH", dir);
        Ok(())
    }

    async fn refresh_path(&self) -> InstallResult<()> {
        let machine = self.read_scope("Machine").await?;
        let user = self.read_scope("User").await?;

        let combined = match (machine.trim(), user.trim()) {
            (m, "") => m.to_string(),
            ("", u) => u.to_string(),
            (m, u) => format!("{};{}", m, u),
        };
        if combined.is_empty() {
            return Err(InstallError::Config("persistent PATH is empty".to_string()));
        }

        self.search_path.set(combined);
        tracing::debug!("Refreshed search PATH from environment store");
        Ok(())
    }

    fn contains_path(&self, path_value: &str, dir: &str) -> bool {
        windows_path_contains(path_value, dir)
    }
}

/// `;`-separated, case-insensitive membership regardless of host platform.
fn windows_path_contains(path_value: &str, dir: &str) -> bool {
    let dir = trim_dir(dir);
    !dir.is_empty()
        && path_value
            .split(';')
            .map(|entry| trim_dir(entry.trim()))
            .any(|entry| entry.eq_ignore_ascii_case(dir))
}

/// Platforms without a persistent PATH store this tool manages.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPathEnvironment;

#[async_trait]
impl PathEnvironment for UnsupportedPathEnvironment {
    async fn add_to_path(&self, _dir: &Path) -> InstallResult<()> {
        Err(InstallError::Unsupported("persistent PATH modification".to_string()))
    }

    async fn refresh_path(&self) -> InstallResult<()> {
        Ok(())
    }
}

/// PATH implementation for the current platform.
pub fn system_path_environment(
    runner: Arc<dyn CommandRunner>,
    search_path: SearchPath,
) -> Arc<dyn PathEnvironment> {
    if cfg!(windows) {
        Arc::new(WindowsPathEnvironment::new(runner, search_path))
    } else {
        Arc::new(UnsupportedPathEnvironment)
    }
}
