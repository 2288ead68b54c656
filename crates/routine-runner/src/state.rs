//! Run state: per-unit progress, results and the suite status.
//!
//! The coordinator is the only writer; hosts read it through
//! [`RunCoordinator::state`](crate::RunCoordinator::state).

use crate::outcome::{RoutineResult, StandardRoutineResult};
use crate::routine::{RoutineType, RoutineUnit};
use serde::Serialize;
use uuid::Uuid;

/// Execution progress of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionProgress {
    /// Waiting for its turn
    NotStarted,
    /// A routine of this unit is in flight
    Running,
    /// All routines of this unit resolved
    Completed,
    /// Stopped by the user
    Cancelled,
    /// Not run because an earlier blocking routine failed
    Skipped,
    /// Display-only: a completed group with a non-blocking failure
    Warning,
}

impl ExecutionProgress {
    /// Whether no further transition is expected in this run
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Skipped | Self::Warning
        )
    }
}

/// Status of the whole suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSuiteStatus {
    /// Idle, never run or stopped
    #[default]
    NotRunning,
    /// A run is in progress
    Running,
    /// The last run finished on its own
    Completed,
}

/// Badge status of a unit, derived from progress and results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Not started yet
    Queued,
    /// In progress
    Running,
    /// Finished and passed
    Passed,
    /// Group finished (or is finishing) with a non-blocking failure
    Warning,
    /// Failed
    Failed,
    /// The service could not run the routine
    Error,
    /// Cancelled by the user
    Stopped,
    /// Skipped after a blocking failure
    Skipped,
}

impl UnitStatus {
    /// Upper-case badge text
    #[must_use]
    pub const fn badge(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::Warning => "WARNING",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
            Self::Skipped => "SKIPPED",
        }
    }
}

/// State of one unit within a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitState {
    unit: RoutineUnit,
    progress: ExecutionProgress,
    member_results: Vec<Option<RoutineResult>>,
    failed_test: Option<RoutineType>,
    blocking_failure: bool,
}

impl UnitState {
    pub(crate) fn new(unit: RoutineUnit) -> Self {
        let member_results = vec![None; unit.routine_count()];
        Self {
            unit,
            progress: ExecutionProgress::NotStarted,
            member_results,
            failed_test: None,
            blocking_failure: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.progress = ExecutionProgress::NotStarted;
        self.member_results.iter_mut().for_each(|r| *r = None);
        self.failed_test = None;
        self.blocking_failure = false;
    }

    pub(crate) fn set_progress(&mut self, progress: ExecutionProgress) {
        self.progress = progress;
    }

    pub(crate) fn record(&mut self, member: usize, result: RoutineResult) {
        if let Some(slot) = self.member_results.get_mut(member) {
            *slot = Some(result);
        }
    }

    pub(crate) fn record_non_blocking_failure(&mut self, routine: RoutineType) {
        if self.failed_test.is_none() {
            self.failed_test = Some(routine);
        }
    }

    pub(crate) fn record_blocking_failure(&mut self) {
        self.blocking_failure = true;
    }

    /// The unit definition
    #[must_use]
    pub const fn unit(&self) -> &RoutineUnit {
        &self.unit
    }

    /// Stored execution progress
    #[must_use]
    pub const fn progress(&self) -> ExecutionProgress {
        self.progress
    }

    /// Progress as displayed: `Warning` for a completed group with a
    /// non-blocking failure, otherwise the stored progress
    #[must_use]
    pub fn display_progress(&self) -> ExecutionProgress {
        if self.progress == ExecutionProgress::Completed && self.status() == UnitStatus::Warning {
            ExecutionProgress::Warning
        } else {
            self.progress
        }
    }

    /// Result of a single-routine unit, set once it is `Completed`
    #[must_use]
    pub fn result(&self) -> Option<&RoutineResult> {
        match (&self.unit, self.progress) {
            (RoutineUnit::Single(_), ExecutionProgress::Completed) => {
                self.member_results.first().and_then(Option::as_ref)
            }
            _ => None,
        }
    }

    /// Recorded results per member, in member order
    #[must_use]
    pub fn member_results(&self) -> &[Option<RoutineResult>] {
        &self.member_results
    }

    /// First non-blocking member that failed
    #[must_use]
    pub const fn failed_test(&self) -> Option<RoutineType> {
        self.failed_test
    }

    /// Whether a blocking member of this group failed
    #[must_use]
    pub const fn has_blocking_failure(&self) -> bool {
        self.blocking_failure
    }

    /// Aggregate badge status
    #[must_use]
    pub fn status(&self) -> UnitStatus {
        match self.progress {
            ExecutionProgress::NotStarted => UnitStatus::Queued,
            ExecutionProgress::Cancelled => UnitStatus::Stopped,
            ExecutionProgress::Skipped => UnitStatus::Skipped,
            ExecutionProgress::Running => {
                if self.blocking_failure {
                    UnitStatus::Failed
                } else if self.failed_test.is_some() {
                    UnitStatus::Warning
                } else {
                    UnitStatus::Running
                }
            }
            ExecutionProgress::Completed | ExecutionProgress::Warning => match &self.unit {
                RoutineUnit::Single(_) => self
                    .result()
                    .map_or(UnitStatus::Error, |r| status_of(r.simple_result())),
                RoutineUnit::Group(_) => {
                    if self.blocking_failure {
                        UnitStatus::Failed
                    } else if self.failed_test.is_some() {
                        UnitStatus::Warning
                    } else if self
                        .member_results
                        .iter()
                        .flatten()
                        .any(|r| !r.is_pass())
                    {
                        UnitStatus::Error
                    } else {
                        UnitStatus::Passed
                    }
                }
            },
        }
    }
}

const fn status_of(result: StandardRoutineResult) -> UnitStatus {
    match result {
        StandardRoutineResult::TestPassed => UnitStatus::Passed,
        StandardRoutineResult::TestFailed => UnitStatus::Failed,
        StandardRoutineResult::ErrorExecuting | StandardRoutineResult::UnableToRun => {
            UnitStatus::Error
        }
    }
}

/// Top-level run state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunState {
    pub(crate) run_id: Option<Uuid>,
    pub(crate) units: Vec<UnitState>,
    pub(crate) cursor: Option<usize>,
    pub(crate) suite_status: TestSuiteStatus,
    pub(crate) ignore_status_updates: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    /// Create an empty state
    #[must_use]
    pub const fn new() -> Self {
        Self {
            run_id: None,
            units: Vec::new(),
            cursor: None,
            suite_status: TestSuiteStatus::NotRunning,
            ignore_status_updates: false,
        }
    }

    /// Identifier of the current or last run
    #[must_use]
    pub const fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Units in execution order
    #[must_use]
    pub fn units(&self) -> &[UnitState] {
        &self.units
    }

    /// Unit at `index`
    #[must_use]
    pub fn unit(&self, index: usize) -> Option<&UnitState> {
        self.units.get(index)
    }

    /// Index of the running unit
    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Suite status
    #[must_use]
    pub const fn suite_status(&self) -> TestSuiteStatus {
        self.suite_status
    }

    /// Whether member outcomes are currently ignored after a blocking failure
    #[must_use]
    pub const fn ignore_status_updates(&self) -> bool {
        self.ignore_status_updates
    }

    /// Progress of every unit, in order
    #[must_use]
    pub fn progress(&self) -> Vec<ExecutionProgress> {
        self.units.iter().map(UnitState::progress).collect()
    }

    /// Whether every unit reached a terminal progress
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.units.iter().all(|u| u.progress().is_terminal())
    }

    /// Number of units whose status is `status`
    #[must_use]
    pub fn count_status(&self, status: UnitStatus) -> usize {
        self.units.iter().filter(|u| u.status() == status).count()
    }

    pub(crate) fn unit_mut(&mut self, index: usize) -> Option<&mut UnitState> {
        self.units.get_mut(index)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::routine::RoutineProperties;

    fn wifi_group() -> RoutineUnit {
        RoutineUnit::group(
            vec![
                RoutineProperties::non_blocking(RoutineType::SignalStrength),
                RoutineProperties::non_blocking(RoutineType::CaptivePortal),
            ],
            "wifiGroupLabel",
        )
    }

    #[test]
    fn test_new_unit_is_queued() {
        let unit = UnitState::new(RoutineUnit::Single(RoutineType::Memory));
        assert_eq!(unit.progress(), ExecutionProgress::NotStarted);
        assert_eq!(unit.status(), UnitStatus::Queued);
        assert!(unit.result().is_none());
    }

    #[test]
    fn test_single_result_only_when_completed() {
        let mut unit = UnitState::new(RoutineUnit::Single(RoutineType::Memory));
        unit.set_progress(ExecutionProgress::Running);
        unit.record(0, RoutineResult::PASSED);
        assert!(unit.result().is_none());
        unit.set_progress(ExecutionProgress::Completed);
        assert_eq!(unit.result(), Some(&RoutineResult::PASSED));
        assert_eq!(unit.status(), UnitStatus::Passed);
    }

    #[test]
    fn test_warning_is_display_progress() {
        let mut unit = UnitState::new(wifi_group());
        unit.set_progress(ExecutionProgress::Running);
        unit.record(0, RoutineResult::FAILED);
        unit.record_non_blocking_failure(RoutineType::SignalStrength);
        assert_eq!(unit.status(), UnitStatus::Warning);
        assert_eq!(unit.display_progress(), ExecutionProgress::Running);

        unit.record(1, RoutineResult::PASSED);
        unit.set_progress(ExecutionProgress::Completed);
        assert_eq!(unit.progress(), ExecutionProgress::Completed);
        assert_eq!(unit.display_progress(), ExecutionProgress::Warning);
    }

    #[test]
    fn test_first_failed_test_wins() {
        let mut unit = UnitState::new(wifi_group());
        unit.record_non_blocking_failure(RoutineType::SignalStrength);
        unit.record_non_blocking_failure(RoutineType::CaptivePortal);
        assert_eq!(unit.failed_test(), Some(RoutineType::SignalStrength));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut unit = UnitState::new(wifi_group());
        unit.set_progress(ExecutionProgress::Completed);
        unit.record(0, RoutineResult::FAILED);
        unit.record_non_blocking_failure(RoutineType::SignalStrength);
        unit.record_blocking_failure();
        unit.reset();
        assert_eq!(unit, UnitState::new(wifi_group()));
    }

    #[test]
    fn test_error_result_status() {
        let mut unit = UnitState::new(RoutineUnit::Single(RoutineType::CpuCache));
        unit.record(0, RoutineResult::simple(StandardRoutineResult::ErrorExecuting));
        unit.set_progress(ExecutionProgress::Completed);
        assert_eq!(unit.status(), UnitStatus::Error);
    }

    #[test]
    fn test_terminal_progress() {
        assert!(!ExecutionProgress::NotStarted.is_terminal());
        assert!(!ExecutionProgress::Running.is_terminal());
        assert!(ExecutionProgress::Completed.is_terminal());
        assert!(ExecutionProgress::Cancelled.is_terminal());
        assert!(ExecutionProgress::Skipped.is_terminal());
        assert!(ExecutionProgress::Warning.is_terminal());
    }

    #[test]
    fn test_badge_text() {
        assert_eq!(UnitStatus::Passed.badge(), "PASSED");
        assert_eq!(UnitStatus::Warning.badge(), "WARNING");
        assert_eq!(UnitStatus::Failed.badge(), "FAILED");
    }
}
