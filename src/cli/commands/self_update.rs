use anyhow::Result;
use console::style;
use tokio_util::sync::CancellationToken;

use devstrap::updater::{UpdateChecker, CURRENT_VERSION};
use devstrap::InstallerConfig;

pub async fn check(config: &InstallerConfig, cancel: CancellationToken) -> Result<()> {
    let checker = UpdateChecker::new(config, cancel)?;
    let info = checker.check_for_update(CURRENT_VERSION).await?;

    if info.available {
        println!(
            "{} devstrap {} is available (you have {}).",
            style("↑").yellow().bold(),
            style(&info.latest_version).green(),
            info.current_version
        );
        if let Some(url) = &info.download_url {
            println!("  Download: {}", style(url).cyan());
        }
    } else {
        println!(
            "{} devstrap {} is the latest release.",
            style("✓").green().bold(),
            info.current_version
        );
    }
    Ok(())
}
