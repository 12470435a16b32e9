//! Per-component installers.
//!
//! Every component runs the same [`machine`]: skip if present, try the
//! package manager, fall back to a direct download, verify. Components only
//! supply their [`ComponentSpec`] and, when they have one, the direct
//! strategy.

pub mod arch;
pub mod claude_code;
pub mod git;
pub mod machine;
pub mod nodejs;
pub mod spec;
pub mod update;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::checksum;
use crate::config::InstallerConfig;
use crate::detect::{fallback_executables, sanitize_version, SystemDetector, ToolDetector};
use crate::error::{InstallError, InstallResult};
use crate::net::{Downloader, ReleaseClient, SecurityGate, USER_AGENT};
use crate::platform::{system_path_environment, CommandRunner, PathEnvironment, SearchPath, SystemRunner};
use crate::poll::AvailabilityPoller;
use crate::progress::ProgressReporter;

pub use arch::Arch;
pub use machine::{transition, InstallState, Outcome};
pub use spec::{ChecksumPolicy, ComponentSpec, DirectSource, PackageManager, StepId};

/// Everything an installer needs from the outside world.
///
/// Shared by all components of one session; nothing here is mutated by an
/// installer.
#[derive(Clone)]
pub struct InstallContext {
    pub runner: Arc<dyn CommandRunner>,
    pub path_env: Arc<dyn PathEnvironment>,
    pub detector: Arc<dyn ToolDetector>,
    /// Broad host set: release hosts plus distribution CDNs
    pub downloader: Downloader,
    /// Narrow host set: release hosts only
    pub releases: ReleaseClient,
    pub poller: AvailabilityPoller,
    pub reporter: ProgressReporter,
    pub cancel: CancellationToken,
    pub arch: Arch,
}

impl InstallContext {
    /// Context wired to the real system.
    pub fn system(
        config: &InstallerConfig,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> InstallResult<Self> {
        let search_path = SearchPath::new();
        let runner: Arc<dyn CommandRunner> =
            Arc::new(SystemRunner::with_search_path(cancel.clone(), search_path.clone()));
        let downloader = Downloader::new(
            SecurityGate::all(),
            config.download_settings(),
            reporter.clone(),
            cancel.clone(),
        )?;
        let releases = ReleaseClient::new(
            SecurityGate::github(),
            config.api_timeout(),
            USER_AGENT,
            cancel.clone(),
        )?;

        Ok(Self {
            path_env: system_path_environment(runner.clone(), search_path),
            detector: Arc::new(SystemDetector::new(runner.clone())),
            runner,
            downloader,
            releases,
            poller: AvailabilityPoller::new(cancel.clone()),
            reporter,
            cancel,
            arch: Arch::current(),
        })
    }

    fn check_cancelled(&self, operation: &str) -> InstallResult<()> {
        if self.cancel.is_cancelled() {
            return Err(InstallError::cancelled(operation));
        }
        Ok(())
    }
}

/// One installable component.
#[async_trait]
pub trait Component: Send + Sync {
    fn spec(&self) -> &ComponentSpec;

    /// Strategy B up to and including running the installer binary.
    ///
    /// Only called when `spec().direct` is set.
    async fn install_direct(&self, _ctx: &InstallContext) -> InstallResult<()> {
        let spec = self.spec();
        Err(InstallError::NoFallback {
            component: spec.name().to_string(),
            reason: "no direct download available".to_string(),
        })
    }
}

/// Build the three components in install order.
pub fn components(config: &InstallerConfig) -> Vec<Box<dyn Component>> {
    StepId::ALL
        .into_iter()
        .map(|step| component_for(step, config))
        .collect()
}

pub fn component_for(step: StepId, config: &InstallerConfig) -> Box<dyn Component> {
    let attempts = config.poll_attempts.for_step(step);
    match step {
        StepId::NodeJs => Box::new(nodejs::NodeJs::new(ComponentSpec::nodejs(
            &config.nodejs_dist_url,
            &config.node_version,
            attempts,
        ))),
        StepId::Git => Box::new(git::Git::new(ComponentSpec::git(&config.git_release_url, attempts))),
        StepId::ClaudeCode => Box::new(claude_code::ClaudeCode::new(ComponentSpec::claude_code(attempts))),
    }
}

/// Drive `component` through the install state machine.
///
/// Terminal failures are reported as an `error` progress event and returned
/// wrapped in [`InstallError::StepFailed`].
pub async fn install(component: &dyn Component, ctx: &InstallContext) -> InstallResult<()> {
    let spec = component.spec();
    let step = spec.step.as_str();
    let name = spec.name();
    let has_direct = spec.direct.is_some();

    let mut state = InstallState::NotStarted;
    // Why strategy A was abandoned
    let mut fallback_reason: Option<InstallError> = None;
    let mut failure: Option<(InstallError, String)> = None;

    ctx.reporter.reset(step);
    tracing::info!("Installing {}", name);

    loop {
        let outcome = match state {
            InstallState::NotStarted => Outcome::Proceed,

            InstallState::CheckingExisting => {
                ctx.reporter
                    .installing(step, format!("Checking for existing {} installation...", name), 0.0);
                if let Err(e) = ctx.check_cancelled("installation") {
                    failure = Some((e, format!("{} installation cancelled", name)));
                    Outcome::Aborted
                } else if ctx.detector.detect(spec.command).await.installed {
                    Outcome::Present
                } else {
                    Outcome::Absent {
                        package_manager: package_manager_available(spec, ctx).await,
                    }
                }
            }

            InstallState::AlreadyInstalled => {
                tracing::info!("{} is already installed", name);
                ctx.reporter.completed(step, format!("{} is already installed", name));
                return Ok(());
            }

            InstallState::PackageManager => {
                let pm = spec.package_manager.name();
                ctx.reporter
                    .installing(step, format!("Installing {} via {}...", name, pm), 10.0);
                match run_package_manager(spec, ctx).await {
                    Ok(()) => {
                        refresh_path(ctx).await;
                        Outcome::Succeeded
                    }
                    Err(e) if e.is_cancelled() => {
                        failure = Some((e, format!("{} installation cancelled", name)));
                        Outcome::Aborted
                    }
                    Err(e) => {
                        tracing::warn!("{} install via {} failed: {}", name, pm, e);
                        fallback_reason = Some(e);
                        Outcome::Failed
                    }
                }
            }

            InstallState::VerifyPackageManager => {
                if spec.poll_after_package_manager {
                    poll_soft(spec, ctx).await;
                    ctx.reporter
                        .installing(step, format!("Verifying {} installation...", name), 80.0);
                }
                match verify(spec, ctx).await {
                    Ok(_) => Outcome::Succeeded,
                    Err(e) if e.is_cancelled() => {
                        failure = Some((e, format!("{} installation cancelled", name)));
                        Outcome::Aborted
                    }
                    Err(e) => {
                        tracing::warn!("{} not usable after {} install: {}", name, spec.package_manager.name(), e);
                        fallback_reason = Some(e);
                        Outcome::Failed
                    }
                }
            }

            InstallState::FallingBack => {
                let reason = match &fallback_reason {
                    Some(e) => format!("{} installation failed ({})", spec.package_manager.label(), e),
                    None => format!("{} is not available", spec.package_manager.label()),
                };
                if has_direct {
                    ctx.reporter
                        .installing(step, format!("{}, trying direct download...", reason), 20.0);
                } else {
                    let message = match (&spec.package_manager, &fallback_reason) {
                        (PackageManager::Npm { .. }, None) => {
                            "npm is not available. Please install Node.js first.".to_string()
                        }
                        _ => format!("Failed to install {}: {}", name, reason),
                    };
                    let err = match fallback_reason.take() {
                        Some(e) => e,
                        None => InstallError::NoFallback {
                            component: name.to_string(),
                            reason,
                        },
                    };
                    failure = Some((err, message));
                }
                Outcome::Proceed
            }

            InstallState::DirectDownload => {
                ctx.reporter
                    .installing(step, format!("Downloading {} installer...", name), 25.0);
                match component.install_direct(ctx).await {
                    Ok(()) => {
                        after_direct_install(spec, ctx).await;
                        Outcome::Succeeded
                    }
                    Err(e) => {
                        let aborted = e.is_cancelled();
                        let message = format!("Failed to install {}: {}", name, e);
                        failure = Some((e, message));
                        if aborted {
                            Outcome::Aborted
                        } else {
                            Outcome::Failed
                        }
                    }
                }
            }

            InstallState::VerifyDirect => match verify(spec, ctx).await {
                Ok(_) => Outcome::Succeeded,
                Err(e) => {
                    let aborted = e.is_cancelled();
                    failure = Some((
                        e,
                        format!(
                            "{} was installed but verification failed. Please restart the application.",
                            name
                        ),
                    ));
                    if aborted {
                        Outcome::Aborted
                    } else {
                        Outcome::Failed
                    }
                }
            },

            InstallState::Completed => {
                tracing::info!("{} installed", name);
                ctx.reporter
                    .completed(step, format!("{} installed successfully", name));
                return Ok(());
            }

            InstallState::Failed => {
                let (err, message) = failure.take().unwrap_or_else(|| {
                    let err = InstallError::NoFallback {
                        component: name.to_string(),
                        reason: "no install strategy succeeded".to_string(),
                    };
                    let message = format!("Failed to install {}: {}", name, err);
                    (err, message)
                });
                tracing::error!("{}", message);
                ctx.reporter.error(step, message);
                return Err(InstallError::step_failed(name, err));
            }
        };

        let next = transition(state, outcome, has_direct);
        tracing::debug!(step, ?state, ?outcome, ?next, "install transition");
        state = next;
    }
}

async fn package_manager_available(spec: &ComponentSpec, ctx: &InstallContext) -> bool {
    match spec.package_manager {
        PackageManager::Winget { .. } => ctx.detector.package_manager_available().await,
        PackageManager::Npm { .. } => find_npm(ctx).is_some(),
    }
}

async fn run_package_manager(spec: &ComponentSpec, ctx: &InstallContext) -> InstallResult<()> {
    match spec.package_manager {
        PackageManager::Winget { id } => {
            ctx.runner
                .run_checked(
                    "winget",
                    &[
                        "install",
                        id,
                        "--silent",
                        "--accept-package-agreements",
                        "--accept-source-agreements",
                    ],
                )
                .await?;
        }
        PackageManager::Npm { package } => {
            let npm = find_npm(ctx).ok_or_else(|| InstallError::not_found("npm"))?;
            ctx.runner
                .run_checked(&npm.to_string_lossy(), &["install", "-g", package])
                .await?;
        }
    }
    Ok(())
}

/// Poll, extend PATH, refresh. Every step here is advisory; final
/// verification decides.
async fn after_direct_install(spec: &ComponentSpec, ctx: &InstallContext) {
    let step = spec.step.as_str();
    poll_soft(spec, ctx).await;

    if let Some(dir) = &spec.install_dir {
        if let Err(e) = ctx.path_env.add_to_path(dir).await {
            tracing::warn!("Could not add {} to PATH: {}", dir.display(), e);
            ctx.reporter.installing(
                step,
                format!("Warning: could not add {} to PATH automatically", spec.name()),
                90.0,
            );
        }
    }

    refresh_path(ctx).await;
}

async fn poll_soft(spec: &ComponentSpec, ctx: &InstallContext) {
    if let Err(e) = ctx
        .poller
        .poll_until_available(ctx.runner.as_ref(), spec.command, spec.poll_attempts)
        .await
    {
        if !e.is_cancelled() {
            ctx.reporter.installing(
                spec.step.as_str(),
                format!("Warning: {} not yet on PATH, continuing with verification", spec.command),
                75.0,
            );
        }
    }
}

async fn refresh_path(ctx: &InstallContext) {
    if let Err(e) = ctx.path_env.refresh_path().await {
        tracing::warn!("PATH refresh failed: {}", e);
    }
}

/// Check a downloaded artifact against `expected` under the component's
/// checksum policy.
///
/// `expected` is the outcome of looking the digest up. A best-effort
/// component proceeds with a warning when it is unavailable; a mandatory one
/// fails with an integrity error. A digest that was found must match.
/// Cancellation and security violations always abort.
pub(crate) async fn verify_integrity(
    spec: &ComponentSpec,
    ctx: &InstallContext,
    path: &Path,
    artifact: &str,
    expected: InstallResult<String>,
) -> InstallResult<()> {
    let step = spec.step.as_str();
    ctx.reporter.installing(step, "Verifying download integrity...", 55.0);

    let expected = match expected {
        Ok(digest) => digest,
        Err(e) if e.is_cancelled() || e.is_security() => return Err(e),
        Err(e) => match spec.checksum {
            ChecksumPolicy::Mandatory if e.is_integrity() => return Err(e),
            ChecksumPolicy::Mandatory => {
                return Err(InstallError::ChecksumMissing {
                    artifact: artifact.to_string(),
                    reason: e.to_string(),
                })
            }
            ChecksumPolicy::BestEffort => {
                tracing::warn!("No checksum for {}: {}", artifact, e);
                ctx.reporter.installing(
                    step,
                    "Warning: could not fetch checksum, skipping verification",
                    60.0,
                );
                return Ok(());
            }
        },
    };

    checksum::verify_file(path, &expected).await?;
    tracing::info!("Checksum verified for {}", artifact);
    ctx.reporter.installing(step, "Download integrity verified", 65.0);
    Ok(())
}

/// Fresh private directory for one installer download; removed on drop.
pub(crate) fn download_dir() -> InstallResult<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("devstrap-")
        .tempdir()
        .map_err(|e| InstallError::io("failed to create download directory", e))
}

/// Run `command version_flag`, then each fallback path, until one prints
/// a version. Returns the trimmed output.
pub async fn verify(spec: &ComponentSpec, ctx: &InstallContext) -> InstallResult<String> {
    verify_as(spec, ctx, spec.step.as_str()).await
}

/// [`verify`], reporting under `step`.
pub(crate) async fn verify_as(spec: &ComponentSpec, ctx: &InstallContext, step: &str) -> InstallResult<String> {
    let mut candidates: Vec<String> = vec![spec.command.to_string()];
    if cfg!(windows) {
        candidates.extend(spec.fallback_paths.iter().map(|p| p.to_string_lossy().into_owned()));
    }

    for candidate in &candidates {
        let output = match ctx.runner.run(candidate, &[spec.version_flag]).await {
            Ok(output) => output,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::debug!("{} did not run: {}", candidate, e);
                continue;
            }
        };

        let version = output.stdout.trim();
        if !output.success || version.is_empty() {
            continue;
        }

        ctx.reporter.installing(
            step,
            format!("Verified {} {}", spec.name(), sanitize_version(version)),
            95.0,
        );
        return Ok(version.to_string());
    }

    tracing::warn!("{} not found after installation (tried: {:?})", spec.command, candidates);
    Err(InstallError::not_found(spec.command))
}

/// npm on PATH or in a standard Node.js install directory.
pub fn find_npm(ctx: &InstallContext) -> Option<PathBuf> {
    find_command(ctx, "npm")
}

/// `claude` on PATH or in the npm global bin directory.
pub fn find_claude(ctx: &InstallContext) -> Option<PathBuf> {
    find_command(ctx, "claude")
}

fn find_command(ctx: &InstallContext, command: &str) -> Option<PathBuf> {
    ctx.runner
        .locate(command)
        .or_else(|| fallback_executables(command).into_iter().find(|p| p.is_file()))
}
