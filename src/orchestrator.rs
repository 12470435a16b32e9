//! Sequential install session.
//!
//! Components run strictly in [`StepId::ALL`] order because the CLI tool
//! needs the npm that the Node.js step provides. The first failure stops the
//! session.

use std::collections::BTreeSet;

use tokio_util::sync::CancellationToken;

use crate::config::InstallerConfig;
use crate::detect::{check_all, SystemCheckResult};
use crate::error::{InstallError, InstallResult};
use crate::installer::update::{self, ClaudeCodeUpdateInfo};
use crate::installer::{self, components, Component, InstallContext, StepId};
use crate::progress::ProgressReporter;

/// Step id of the synthetic event emitted after every component succeeded.
pub const COMPLETE_STEP: &str = "complete";

pub struct Orchestrator {
    ctx: InstallContext,
    components: Vec<Box<dyn Component>>,
    skip: BTreeSet<StepId>,
}

impl Orchestrator {
    pub fn new(ctx: InstallContext, components: Vec<Box<dyn Component>>, skip: BTreeSet<StepId>) -> Self {
        Self {
            ctx,
            components,
            skip,
        }
    }

    pub fn from_config(config: &InstallerConfig, ctx: InstallContext) -> InstallResult<Self> {
        config.validate()?;
        Ok(Self::new(ctx, components(config), config.skipped_steps()?))
    }

    /// Orchestrator wired to the real system.
    pub fn system(
        config: &InstallerConfig,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> InstallResult<Self> {
        let ctx = InstallContext::system(config, reporter, cancel)?;
        Self::from_config(config, ctx)
    }

    pub fn context(&self) -> &InstallContext {
        &self.ctx
    }

    fn component(&self, step: StepId) -> InstallResult<&dyn Component> {
        self.components
            .iter()
            .find(|c| c.spec().step == step)
            .map(|c| c.as_ref())
            .ok_or_else(|| InstallError::Config(format!("no installer registered for {}", step)))
    }

    pub async fn check_system(&self) -> SystemCheckResult {
        check_all(self.ctx.detector.as_ref()).await
    }

    /// Install every component not configured to be skipped.
    pub async fn install_all(&self) -> InstallResult<()> {
        for component in &self.components {
            let spec = component.spec();
            let step = spec.step;

            if self.skip.contains(&step) {
                tracing::info!("Skipping {}", spec.name());
                self.ctx
                    .reporter
                    .skipped(step.as_str(), format!("{} skipped by configuration", spec.name()));
                continue;
            }

            installer::install(component.as_ref(), &self.ctx).await?;
        }

        self.ctx
            .reporter
            .completed(COMPLETE_STEP, "All installations completed successfully!");
        tracing::info!("All components installed");
        Ok(())
    }

    /// Install one component. The skip list does not apply to an explicit
    /// request.
    pub async fn install_component(&self, step: StepId) -> InstallResult<()> {
        installer::install(self.component(step)?, &self.ctx).await
    }

    pub async fn check_cli_update(&self) -> InstallResult<ClaudeCodeUpdateInfo> {
        update::check_update(&self.ctx).await
    }

    pub async fn update_cli(&self) -> InstallResult<()> {
        let component = self.component(StepId::ClaudeCode)?;
        update::update(component.spec(), &self.ctx).await
    }
}
