//! Terminal rendering of install progress.

use std::collections::HashMap;
use std::sync::Mutex;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use devstrap::installer::StepId;
use devstrap::orchestrator::COMPLETE_STEP;
use devstrap::{InstallProgress, InstallStatus, ProgressSink};

/// One progress bar per step on a terminal, one line per event otherwise.
pub struct ConsolePrinter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    interactive: bool,
}

impl ConsolePrinter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            interactive: console::Term::stderr().is_term(),
        }
    }

    fn label(step: &str) -> &str {
        StepId::parse(step).map(|s| s.display_name()).unwrap_or(step)
    }

    fn bar(&self, bars: &mut HashMap<String, ProgressBar>, step: &str) -> ProgressBar {
        bars.entry(step.to_string())
            .or_insert_with(|| {
                let pb = self.multi.add(ProgressBar::new(100));
                pb.set_style(
                    ProgressStyle::with_template("{prefix:>12.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb.set_prefix(Self::label(step).to_string());
                pb
            })
            .clone()
    }

    fn println(&self, line: String) {
        if self.interactive {
            self.multi.println(line).unwrap_or(());
        } else {
            eprintln!("{}", line);
        }
    }

    /// Leave any bar that never reached a final state where it stopped.
    pub fn finish(&self) {
        if let Ok(mut bars) = self.bars.lock() {
            for (_, pb) in bars.drain() {
                pb.abandon();
            }
        }
    }

    fn plain(&self, progress: &InstallProgress) {
        let label = Self::label(&progress.step);
        let line = match progress.status {
            InstallStatus::Installing => format!("{:>12} {:>3.0}% {}", label, progress.percentage, progress.message),
            InstallStatus::Completed => format!("{:>12} {} {}", label, style("✓").green(), progress.message),
            InstallStatus::Error => format!("{:>12} {} {}", label, style("✗").red(), progress.message),
            InstallStatus::Skipped => format!("{:>12} {}", label, style(&progress.message).dim()),
            InstallStatus::Pending => return,
        };
        self.println(line);
    }
}

impl Default for ConsolePrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsolePrinter {
    fn on_progress(&self, progress: &InstallProgress) {
        if progress.step == COMPLETE_STEP {
            self.println(format!("\n{} {}", style("✓").green().bold(), style(&progress.message).bold()));
            return;
        }
        if !self.interactive {
            self.plain(progress);
            return;
        }

        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let pb = self.bar(&mut bars, &progress.step);

        match progress.status {
            InstallStatus::Pending => {}
            InstallStatus::Installing => {
                pb.set_position(progress.percentage.round() as u64);
                pb.set_message(progress.message.clone());
            }
            InstallStatus::Completed => {
                pb.set_position(100);
                pb.finish_with_message(format!("{} {}", style("✓").green(), progress.message));
                bars.remove(&progress.step);
            }
            InstallStatus::Error => {
                pb.abandon_with_message(format!("{} {}", style("✗").red(), style(&progress.message).red()));
                bars.remove(&progress.step);
            }
            InstallStatus::Skipped => {
                pb.finish_with_message(style(&progress.message).dim().to_string());
                bars.remove(&progress.step);
            }
        }
    }
}
