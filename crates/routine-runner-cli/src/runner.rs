//! Plan runner: drives a plan against the scripted service and builds the report

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use chrono::{DateTime, Utc};
use routine_runner::{
    ExecutionProgress, LogObserver, RoutineType, RoutineUnit, RunDriver, RunOutcome, RunPlan,
    RunState, UnitState, UnitStatus,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Verdict of one unit in the report
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    /// Group label or routine name
    pub label: String,
    /// Routines of the unit, in order
    pub routines: Vec<RoutineType>,
    /// Displayed progress
    pub progress: ExecutionProgress,
    /// Badge status
    pub status: UnitStatus,
    /// First non-blocking member that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_test: Option<RoutineType>,
    /// Power routine summary, e.g. `Charged 0.00% in 0 seconds.`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_summary: Option<String>,
}

impl UnitReport {
    fn from_state(unit: &UnitState) -> Self {
        let power_summary = match unit.unit() {
            RoutineUnit::Single(routine) => unit
                .result()
                .and_then(|r| r.power())
                .map(|power| power.summary(*routine)),
            RoutineUnit::Group(_) => None,
        };
        Self {
            label: unit.unit().label(),
            routines: unit.unit().routines(),
            progress: unit.display_progress(),
            status: unit.status(),
            failed_test: unit.failed_test(),
            power_summary,
        }
    }

    fn detail(&self) -> Option<String> {
        self.power_summary.clone().or_else(|| {
            self.failed_test
                .map(|routine| format!("{routine} failed"))
        })
    }
}

/// Report of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Plan name
    pub plan: String,
    /// Run identifier
    pub run_id: Option<Uuid>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Wall time of the run
    pub duration_ms: u64,
    /// Per-unit verdicts in execution order
    pub units: Vec<UnitReport>,
}

impl RunReport {
    /// Build from the final run state
    #[must_use]
    pub fn from_state(
        plan: &RunPlan,
        state: &RunState,
        outcome: RunOutcome,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            plan: plan.name.clone(),
            run_id: state.run_id(),
            started_at,
            outcome,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            units: state.units().iter().map(UnitReport::from_state).collect(),
        }
    }

    /// Number of units with `status`
    #[must_use]
    pub fn count(&self, status: UnitStatus) -> usize {
        self.units.iter().filter(|u| u.status == status).count()
    }

    /// Whether any unit failed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.count(UnitStatus::Failed) > 0
    }
}

/// Runs plans against a [`FakeRoutineService`](routine_runner::FakeRoutineService)
#[derive(Debug)]
pub struct DiagnosticRunner {
    config: CliConfig,
    reporter: ProgressReporter,
}

impl DiagnosticRunner {
    /// Create a new runner
    #[must_use]
    pub fn new(config: CliConfig) -> Self {
        let quiet = config.verbosity.is_quiet() || !config.is_text();
        let reporter = ProgressReporter::new(config.color.should_color(), quiet);
        Self { config, reporter }
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Run `plan` to completion or cancellation
    ///
    /// Ctrl-C stops the run; the partial report is still returned.
    pub async fn run_plan(&self, plan: &RunPlan) -> CliResult<RunReport> {
        let service = Arc::new(plan.fake_service());
        let (driver, handle) = RunDriver::new(service);
        let mut driver = driver.with_dispatch_limit(self.config.cancel_after);
        driver.subscribe(LogObserver::new());

        let kept = driver.prepare(plan.units()).await?;
        if kept < plan.units.len() {
            self.reporter.warning(&format!(
                "{} unit(s) not supported on this device",
                plan.units.len() - kept
            ));
        }
        let total = driver
            .coordinator()
            .state()
            .units()
            .iter()
            .map(|u| u.unit().routine_count() as u64)
            .sum();
        driver.subscribe(self.reporter.observer(total, plan.runtime_minutes));

        let interrupt = tokio::spawn({
            let handle = handle.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, stopping run");
                    // Driver may already be finished
                    let _ = handle.stop();
                }
            }
        });

        self.reporter.header(&plan.name);
        let started_at = Utc::now();
        let start = Instant::now();
        driver.start()?;
        let outcome = driver.run().await;
        interrupt.abort();

        Ok(RunReport::from_state(
            plan,
            driver.coordinator().state(),
            outcome,
            started_at,
            start.elapsed(),
        ))
    }

    /// Print the report in the configured format
    pub fn print(&self, report: &RunReport) -> CliResult<()> {
        if !self.config.is_text() {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }

        if self.config.verbosity.is_verbose() {
            if let Some(run_id) = report.run_id {
                self.reporter.info(&format!(
                    "Run {run_id} started at {}",
                    report.started_at.to_rfc3339()
                ));
            }
        }
        for unit in &report.units {
            self.reporter
                .unit(&unit.label, unit.status, unit.detail().as_deref());
        }
        if report.outcome == RunOutcome::Cancelled {
            self.reporter.warning("Run cancelled");
        }

        let passed = report.count(UnitStatus::Passed);
        let warnings = report.count(UnitStatus::Warning);
        let failed = report.count(UnitStatus::Failed);
        let other = report.units.len() - passed - warnings - failed;
        self.reporter.summary(
            passed,
            warnings,
            failed,
            other,
            Duration::from_millis(report.duration_ms),
        );
        Ok(())
    }
}
