use std::path::Path;

use anyhow::Result;
use console::style;

use devstrap::InstallerConfig;

fn resolve(custom: Option<&Path>) -> Result<std::path::PathBuf> {
    match custom {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(InstallerConfig::config_path()?),
    }
}

pub fn show(config: &InstallerConfig, custom: Option<&Path>) -> Result<()> {
    let path = resolve(custom)?;

    println!("{}", style("Effective configuration").bold().cyan());
    println!();
    print!("{}", serde_yaml::to_string(config)?);
    println!();

    if path.exists() {
        println!("Config file: {}", style(path.display()).dim());
    } else {
        println!(
            "{} {}",
            style("No config file, using defaults. Create one at").dim(),
            style(path.display()).dim()
        );
    }
    Ok(())
}

pub fn path(custom: Option<&Path>) -> Result<()> {
    println!("{}", resolve(custom)?.display());
    Ok(())
}
