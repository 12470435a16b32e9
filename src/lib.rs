//! Unattended installer for the Claude Code toolchain on Windows: Node.js,
//! Git and the Claude Code CLI.
//!
//! Each component is installed through the OS package manager when possible
//! and from a verified direct download otherwise. Downloads only go to
//! trusted HTTPS hosts, are size-capped, retried with backoff and checked
//! against published SHA-256 digests. Progress is reported through a
//! [`progress::ProgressSink`] and every long wait honours a cancellation
//! token.

pub mod checksum;
pub mod config;
pub mod detect;
pub mod error;
pub mod installer;
pub mod net;
pub mod orchestrator;
pub mod platform;
pub mod poll;
pub mod progress;
pub mod updater;
pub mod version;

pub use config::InstallerConfig;
pub use error::{InstallError, InstallResult, SecurityViolation};
pub use orchestrator::Orchestrator;
pub use progress::{InstallProgress, InstallStatus, ProgressReporter, ProgressSink};
