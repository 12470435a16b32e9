//! Git for Windows: winget, then the installer from the latest GitHub
//! release.

use async_trait::async_trait;

use super::{download_dir, verify_integrity, Arch, Component, ComponentSpec, DirectSource, InstallContext};
use crate::error::{InstallError, InstallResult};
use crate::net::{ReleaseAsset, SecurityGate};

/// Inno Setup flags for a fully unattended install
pub const SILENT_FLAGS: &[&str] = &["/VERYSILENT", "/NORESTART", "/SP-", "/CLOSEAPPLICATIONS", "/NOCANCEL"];

const INSTALLER_NAME: &str = "Git-installer.exe";

pub struct Git {
    spec: ComponentSpec,
}

impl Git {
    pub fn new(spec: ComponentSpec) -> Self {
        Self { spec }
    }
}

fn is_full_installer(name: &str) -> bool {
    name.ends_with(".exe") && !name.contains("portable") && !name.contains("mingit")
}

/// Pick the installer for `arch` from a release's assets.
///
/// Prefers an architecture-specific full installer; otherwise takes any full
/// installer. Assets whose URL the gate rejects are never selected.
pub fn select_installer_asset<'a>(
    assets: &'a [ReleaseAsset],
    arch: Arch,
    gate: &SecurityGate,
) -> Option<&'a ReleaseAsset> {
    let candidates = || {
        assets.iter().filter(|asset| {
            is_full_installer(&asset.name.to_lowercase()) && gate.validate(&asset.browser_download_url).is_ok()
        })
    };

    candidates()
        .find(|asset| asset.name.to_lowercase().contains(arch.git_name()))
        .or_else(|| candidates().next())
}

/// Digest from a `.sha256` side file: the first token, if it is one.
pub fn parse_digest_file(content: &str) -> Option<String> {
    let token = content.split_whitespace().next()?;
    if token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}

#[async_trait]
impl Component for Git {
    fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    async fn install_direct(&self, ctx: &InstallContext) -> InstallResult<()> {
        let Some(DirectSource::GitHubRelease { api_url }) = &self.spec.direct else {
            return Err(InstallError::NoFallback {
                component: self.spec.name().to_string(),
                reason: "no release source configured".to_string(),
            });
        };
        let step = self.spec.step.as_str();
        ctx.check_cancelled("Git download")?;

        let release = ctx.releases.fetch_release(api_url).await?;
        if !release.is_stable() {
            return Err(InstallError::NoFallback {
                component: self.spec.name().to_string(),
                reason: format!("release {} is a draft or prerelease", release.tag_name),
            });
        }
        let asset = select_installer_asset(&release.assets, ctx.arch, ctx.releases.gate()).ok_or_else(|| {
            InstallError::NoFallback {
                component: self.spec.name().to_string(),
                reason: format!("no installer found in release {}", release.tag_name),
            }
        })?;
        let url = asset.browser_download_url.as_str();
        tracing::info!("Selected {} from release {}", asset.name, release.tag_name);

        let dir = download_dir()?;
        let installer_path = dir.path().join(INSTALLER_NAME);
        let task = ctx.downloader.task(url, &installer_path, step);
        ctx.downloader.fetch_with_retry(&task).await?;

        let checksum_url = format!("{}.sha256", url);
        let expected = match ctx.downloader.fetch_text(&checksum_url).await {
            Ok(content) => parse_digest_file(&content).ok_or_else(|| InstallError::ChecksumMissing {
                artifact: asset.name.clone(),
                reason: format!("{} is not a SHA-256 digest file", checksum_url),
            }),
            Err(e) => Err(e),
        };
        verify_integrity(&self.spec, ctx, &installer_path, &asset.name, expected).await?;

        ctx.reporter.installing(step, "Running Git installer...", 70.0);
        ctx.runner
            .run_checked(&installer_path.to_string_lossy(), SILENT_FLAGS)
            .await?;

        tracing::info!("Git installer finished");
        Ok(())
    }
}
