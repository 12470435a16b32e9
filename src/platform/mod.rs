//! OS capabilities the installers depend on.
//!
//! Each capability is a trait with a real implementation per platform, so
//! installer logic stays free of `cfg` branches and can run against fakes.

pub mod command;
pub mod path;

pub use command::{CommandOutput, CommandRunner, SearchPath, SystemRunner};
pub use path::{path_contains, system_path_environment, PathEnvironment};

use std::path::PathBuf;

/// `%APPDATA%`, falling back to the roaming profile under the home directory.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("APPDATA").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join("AppData").join("Roaming"),
        None => PathBuf::from(r"C:\Users\Default\AppData\Roaming"),
    }
}
