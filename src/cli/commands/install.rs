use std::sync::Arc;

use anyhow::{bail, Result};
use console::style;
use tokio_util::sync::CancellationToken;

use devstrap::installer::StepId;
use devstrap::orchestrator::COMPLETE_STEP;
use devstrap::progress::ProgressBoard;
use devstrap::{InstallProgress, InstallStatus, InstallerConfig, Orchestrator, ProgressReporter, ProgressSink};

use crate::cli::printer::ConsolePrinter;

pub async fn execute(config: &InstallerConfig, only: Option<StepId>, cancel: CancellationToken) -> Result<()> {
    let printer = Arc::new(ConsolePrinter::new());
    let board = Arc::new(ProgressBoard::new());

    let sink = {
        let printer = printer.clone();
        let board = board.clone();
        move |progress: &InstallProgress| {
            printer.on_progress(progress);
            board.on_progress(progress);
        }
    };
    let reporter = ProgressReporter::new(Arc::new(sink));
    let orchestrator = Orchestrator::system(config, reporter, cancel)?;

    let result = match only {
        Some(step) => orchestrator.install_component(step).await,
        None => orchestrator.install_all().await,
    };
    printer.finish();
    print_summary(&board);

    match result {
        Ok(()) => {
            if only.is_none() {
                println!(
                    "Open a new terminal and run {} to get started.",
                    style("claude").cyan()
                );
            }
            Ok(())
        }
        Err(e) if e.is_cancelled() => bail!("Installation cancelled"),
        Err(e) => Err(e.into()),
    }
}

fn print_summary(board: &ProgressBoard) {
    let steps: Vec<_> = board
        .snapshot()
        .into_iter()
        .filter(|s| s.step != COMPLETE_STEP)
        .collect();
    if steps.is_empty() {
        return;
    }

    println!();
    println!("{}", style("Summary").bold());
    for step in steps {
        let name = StepId::parse(&step.step).map(|s| s.display_name()).unwrap_or(&step.step);
        let mark = match step.status {
            InstallStatus::Completed => style("✓").green(),
            InstallStatus::Error => style("✗").red(),
            InstallStatus::Skipped => style("-").dim(),
            InstallStatus::Installing | InstallStatus::Pending => style("…").yellow(),
        };
        println!("  {} {:<12} {}", mark, name, style(&step.message).dim());
    }
}
