//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use routine_runner::{
    RemainingTime, RoutineType, RunEvent, RunObserver, RunState, RuntimeEstimator, SystemClock,
    UnitStatus,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output format for run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON report on stdout
    Json,
}

/// Prints per-unit results and the run summary
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            use_color,
            quiet,
        }
    }

    /// Progress bar observer for a run of `total` routines
    #[must_use]
    pub fn observer(&self, total: u64, runtime_minutes: u32) -> ProgressObserver {
        if self.quiet {
            return ProgressObserver::hidden();
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        ProgressObserver {
            bar: Some(bar),
            estimator: RuntimeEstimator::new(runtime_minutes, SystemClock),
        }
    }

    /// Print one unit's verdict
    pub fn unit(&self, label: &str, status: UnitStatus, detail: Option<&str>) {
        if self.quiet && !matches!(status, UnitStatus::Failed | UnitStatus::Error) {
            return;
        }

        let badge = format!("{:<8}", status.badge());
        let badge = if self.use_color {
            badge_style(status).apply_to(badge).to_string()
        } else {
            badge
        };
        let line = match detail {
            Some(detail) => format!("{badge} {label} ({detail})"),
            None => format!("{badge} {label}"),
        };
        let _ = self.term.write_line(&line);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        self.notice(style("ℹ").blue().bold(), "INFO", message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        self.notice(style("⚠").yellow().bold(), "WARN", message);
    }

    fn notice(&self, icon: console::StyledObject<&str>, tag: &str, message: &str) {
        if self.quiet {
            return;
        }
        let line = if self.use_color {
            format!("{icon} {message}")
        } else {
            format!("{tag} {message}")
        };
        let _ = self.term.write_line(&line);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print the run summary
    pub fn summary(&self, passed: usize, warnings: usize, failed: usize, other: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");

        let total = passed + warnings + failed + other;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let warning_style = Style::new().yellow();
            let failed_style = Style::new().red().bold();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            let _ = self.term.write_line(&format!(
                "{} {} units in {:.2}s ({} passed, {} warnings, {} failed, {} other)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                warning_style.apply_to(warnings),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                other
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {total} units in {duration_secs:.2}s ({passed} passed, {warnings} warnings, {failed} failed, {other} other)"
            ));
        }
    }
}

fn badge_style(status: UnitStatus) -> Style {
    match status {
        UnitStatus::Passed => Style::new().green().bold(),
        UnitStatus::Warning | UnitStatus::Skipped => Style::new().yellow(),
        UnitStatus::Failed | UnitStatus::Error => Style::new().red().bold(),
        UnitStatus::Queued | UnitStatus::Running | UnitStatus::Stopped => Style::new().dim(),
    }
}

/// Progress bar text for the routine in flight, e.g. `Memory (5 min) · A few more minutes`
fn progress_message(routine: RoutineType, remaining: RemainingTime) -> String {
    match remaining.badge_minutes() {
        Some(minutes) if remaining == RemainingTime::FewMoreMinutes => {
            format!("{routine} ({minutes} min) · {remaining}")
        }
        _ => format!("{routine} · {remaining}"),
    }
}

/// Drives an `indicatif` progress bar from run events
#[derive(Debug)]
pub struct ProgressObserver {
    bar: Option<ProgressBar>,
    estimator: RuntimeEstimator<SystemClock>,
}

impl ProgressObserver {
    /// Observer that draws nothing
    #[must_use]
    pub const fn hidden() -> Self {
        Self {
            bar: None,
            estimator: RuntimeEstimator::new(1, SystemClock),
        }
    }
}

impl RunObserver for ProgressObserver {
    fn on_event(&mut self, event: &RunEvent, _state: &RunState) {
        let Some(bar) = &self.bar else {
            return;
        };
        match event {
            RunEvent::RunStarted { .. } => self.estimator.start(),
            RunEvent::RoutineDispatched { routine, .. } => {
                bar.inc(1);
                bar.set_message(progress_message(*routine, self.estimator.remaining()));
            }
            RunEvent::RunCompleted | RunEvent::RunCancelled => bar.finish_and_clear(),
            _ => {}
        }
    }
}
