use std::sync::Arc;

use anyhow::Result;
use console::style;
use tokio_util::sync::CancellationToken;

use devstrap::{InstallerConfig, Orchestrator, ProgressReporter};

use crate::cli::printer::ConsolePrinter;

pub async fn check(config: &InstallerConfig, cancel: CancellationToken) -> Result<()> {
    let orchestrator = Orchestrator::system(config, ProgressReporter::silent(), cancel)?;
    let info = orchestrator.check_cli_update().await?;

    println!("  Installed: {}", style(&info.current_version).white());
    println!("  Latest:    {}", style(&info.latest_version).white());
    println!();

    if info.available {
        println!(
            "{} Update available. Run {} to install it.",
            style("↑").yellow().bold(),
            style("devstrap update").cyan()
        );
    } else {
        println!("{} Claude Code is up to date.", style("✓").green().bold());
    }
    Ok(())
}

pub async fn execute(config: &InstallerConfig, cancel: CancellationToken) -> Result<()> {
    let printer = Arc::new(ConsolePrinter::new());
    let orchestrator = Orchestrator::system(config, ProgressReporter::new(printer.clone()), cancel)?;

    let result = orchestrator.update_cli().await;
    printer.finish();
    result?;
    Ok(())
}
