//! Keeping the Claude Code CLI current through npm.
//!
//! Versions are compared as opaque strings: npm's `latest` tag is the
//! authority, so any difference means an update is available.

use serde::Serialize;

use super::claude_code::PACKAGE;
use super::{find_claude, find_npm, verify_as, ComponentSpec, InstallContext};
use crate::error::{InstallError, InstallResult};

/// Progress step used while updating.
pub const UPDATE_STEP: &str = "claudeCodeUpdate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaudeCodeUpdateInfo {
    pub available: bool,
    pub current_version: String,
    pub latest_version: String,
}

/// Installed version: the first token of `claude --version`.
pub async fn installed_version(ctx: &InstallContext) -> InstallResult<String> {
    let claude = find_claude(ctx).ok_or_else(|| InstallError::not_found("claude"))?;
    let output = ctx
        .runner
        .run_checked(&claude.to_string_lossy(), &["--version"])
        .await?;
    first_token(&output).ok_or_else(|| {
        InstallError::execution(format!("{} --version", claude.display()), "no version printed", output.clone())
    })
}

/// Latest version published to the npm registry.
pub async fn latest_version(ctx: &InstallContext) -> InstallResult<String> {
    let npm = find_npm(ctx).ok_or_else(|| InstallError::not_found("npm"))?;
    let output = ctx
        .runner
        .run_checked(&npm.to_string_lossy(), &["view", PACKAGE, "version"])
        .await?;
    first_token(&output).ok_or_else(|| {
        InstallError::execution(format!("npm view {} version", PACKAGE), "no version printed", output.clone())
    })
}

fn first_token(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .next()
        .map(|token| token.trim_start_matches('v').to_string())
}

pub async fn check_update(ctx: &InstallContext) -> InstallResult<ClaudeCodeUpdateInfo> {
    let current_version = installed_version(ctx).await?;
    let latest_version = latest_version(ctx).await?;

    let info = ClaudeCodeUpdateInfo {
        available: current_version != latest_version,
        current_version,
        latest_version,
    };
    tracing::info!(
        "Claude Code {} installed, {} published",
        info.current_version,
        info.latest_version
    );
    Ok(info)
}

/// Reinstall at `@latest` and verify. Progress is reported under
/// [`UPDATE_STEP`].
pub async fn update(spec: &ComponentSpec, ctx: &InstallContext) -> InstallResult<()> {
    let reporter = &ctx.reporter;
    reporter.reset(UPDATE_STEP);
    reporter.installing(UPDATE_STEP, "Updating Claude Code...", 10.0);

    let Some(npm) = find_npm(ctx) else {
        reporter.error(UPDATE_STEP, "npm is not available");
        return Err(InstallError::step_failed("Claude Code update", InstallError::not_found("npm")));
    };

    let latest = format!("{}@latest", PACKAGE);
    if let Err(e) = ctx
        .runner
        .run_checked(&npm.to_string_lossy(), &["install", "-g", &latest])
        .await
    {
        reporter.error(UPDATE_STEP, format!("Failed to update Claude Code: {}", e));
        return Err(InstallError::step_failed("Claude Code update", e));
    }

    reporter.installing(UPDATE_STEP, "Verifying update...", 80.0);
    if let Err(e) = verify_as(spec, ctx, UPDATE_STEP).await {
        reporter.error(UPDATE_STEP, "Update completed but verification failed");
        return Err(InstallError::step_failed("Claude Code update", e));
    }

    reporter.completed(UPDATE_STEP, "Claude Code updated successfully");
    Ok(())
}
