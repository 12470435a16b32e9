use anyhow::Result;
use console::style;
use tokio_util::sync::CancellationToken;

use devstrap::detect::SoftwareStatus;
use devstrap::{InstallerConfig, Orchestrator, ProgressReporter};

fn print_row(status: &SoftwareStatus) {
    if status.installed {
        println!(
            "  {} {:<12} {}",
            style("✓").green().bold(),
            status.name,
            style(&status.version).white()
        );
    } else {
        println!(
            "  {} {:<12} {}",
            style("✗").red().bold(),
            status.name,
            style("not installed").dim()
        );
    }
}

pub async fn execute(config: &InstallerConfig, json: bool, cancel: CancellationToken) -> Result<()> {
    let orchestrator = Orchestrator::system(config, ProgressReporter::silent(), cancel)?;
    let result = orchestrator.check_system().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", style("System check").bold().cyan());
    println!();
    print_row(&result.nodejs);
    print_row(&result.git);
    print_row(&result.claude_code);
    println!();
    println!(
        "  winget       {}",
        if result.winget_available {
            style("available").green()
        } else {
            style("not available").yellow()
        }
    );
    println!();

    if result.all_installed() {
        println!("{}", style("Everything is installed.").green());
    } else {
        println!("Run {} to install what is missing.", style("devstrap install").cyan());
    }
    Ok(())
}
