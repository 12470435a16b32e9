//! Node.js: winget, then the official MSI from the distribution server.

use async_trait::async_trait;

use super::{download_dir, verify_integrity, Arch, Component, ComponentSpec, DirectSource, InstallContext};
use crate::checksum::find_checksum;
use crate::error::{InstallError, InstallResult};

pub struct NodeJs {
    spec: ComponentSpec,
}

impl NodeJs {
    pub fn new(spec: ComponentSpec) -> Self {
        Self { spec }
    }
}

pub fn msi_filename(version: &str, arch: Arch) -> String {
    format!("node-v{}-{}.msi", version, arch.node_name())
}

pub fn msi_url(base_url: &str, version: &str, arch: Arch) -> String {
    format!("{}/v{}/{}", base_url, version, msi_filename(version, arch))
}

pub fn manifest_url(base_url: &str, version: &str) -> String {
    format!("{}/v{}/SHASUMS256.txt", base_url, version)
}

#[async_trait]
impl Component for NodeJs {
    fn spec(&self) -> &ComponentSpec {
        &self.spec
    }

    async fn install_direct(&self, ctx: &InstallContext) -> InstallResult<()> {
        let Some(DirectSource::NodeDist { base_url, version }) = &self.spec.direct else {
            return Err(InstallError::NoFallback {
                component: self.spec.name().to_string(),
                reason: "no distribution server configured".to_string(),
            });
        };
        let step = self.spec.step.as_str();
        ctx.check_cancelled("Node.js download")?;

        let filename = msi_filename(version, ctx.arch);
        let url = msi_url(base_url, version, ctx.arch);
        ctx.downloader.gate().validate(&url)?;

        let dir = download_dir()?;
        let msi_path = dir.path().join(&filename);
        tracing::info!("Downloading Node.js {} ({})", version, ctx.arch);

        let task = ctx.downloader.task(url, &msi_path, step);
        ctx.downloader.fetch_with_retry(&task).await?;

        let expected = match ctx.downloader.fetch_text(&manifest_url(base_url, version)).await {
            Ok(manifest) => find_checksum(&manifest, &filename),
            Err(e) => Err(e),
        };
        verify_integrity(&self.spec, ctx, &msi_path, &filename, expected).await?;

        ctx.reporter.installing(step, "Running Node.js installer...", 70.0);
        let msi = msi_path.to_string_lossy();
        ctx.runner
            .run_checked("msiexec", &["/qn", "/i", &msi, "ADDLOCAL=ALL"])
            .await?;

        tracing::info!("Node.js MSI finished");
        Ok(())
    }
}
