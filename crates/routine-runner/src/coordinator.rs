//! Routine Run Coordinator
//!
//! A synchronous state machine that owns the run state. It never performs
//! I/O: every routine it wants executed is returned to the caller as a
//! [`Dispatch`] ticket, and the caller hands the ticket back together with
//! the service's result via [`RunCoordinator::on_external_result`].
//!
//! ```text
//! start() ──► Dispatch ──► (host calls service) ──► on_external_result()
//!                ▲                                          │
//!                └────────────── next Dispatch ◄────────────┘
//! ```
//!
//! Tickets carry the run generation, so results that arrive after `stop()`
//! or after a new run started are discarded without touching the state.

use crate::event::{RunEvent, RunObserver};
use crate::outcome::{RoutineResult, RoutineResultInfo};
use crate::result::{RunnerError, RunnerResult};
use crate::routine::{RoutineType, RoutineUnit};
use crate::state::{ExecutionProgress, RunState, TestSuiteStatus, UnitState};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// A routine handed to the execution service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    /// Run generation the dispatch belongs to
    pub generation: u64,
    /// Index of the unit
    pub unit: usize,
    /// Index of the routine within the unit
    pub member: usize,
    /// Routine to run
    pub routine: RoutineType,
}

/// Runs an ordered list of routine units, one routine at a time
pub struct RunCoordinator {
    state: RunState,
    generation: u64,
    in_flight: Option<Dispatch>,
    active: bool,
    stop_pending: bool,
    observers: Vec<Box<dyn RunObserver>>,
}

impl fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("generation", &self.generation)
            .field("suite_status", &self.state.suite_status)
            .field("units", &self.state.units.len())
            .field("in_flight", &self.in_flight)
            .field("stop_pending", &self.stop_pending)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for RunCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RunCoordinator {
    /// Create a coordinator with an empty run state
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RunState::new(),
            generation: 0,
            in_flight: None,
            active: true,
            stop_pending: false,
            observers: Vec::new(),
        }
    }

    /// Register an observer for state changes
    pub fn subscribe(&mut self, observer: impl RunObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Read-only view of the run state
    #[must_use]
    pub const fn state(&self) -> &RunState {
        &self.state
    }

    /// Current run generation
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The dispatch awaiting a result
    #[must_use]
    pub const fn in_flight(&self) -> Option<&Dispatch> {
        self.in_flight.as_ref()
    }

    /// Routine currently being executed
    #[must_use]
    pub fn current_routine(&self) -> Option<RoutineType> {
        self.in_flight.map(|d| d.routine)
    }

    /// Whether the host page is active
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Replace the unit list, resetting every unit to `NotStarted`
    ///
    /// Any dispatch still in flight is invalidated.
    pub fn initialize_run(&mut self, units: Vec<RoutineUnit>) {
        self.generation += 1;
        self.in_flight = None;
        self.stop_pending = false;
        self.state = RunState {
            run_id: None,
            units: units.into_iter().map(UnitState::new).collect(),
            cursor: None,
            suite_status: TestSuiteStatus::NotRunning,
            ignore_status_updates: false,
        };
        let units = self.state.units.len();
        self.emit(RunEvent::RunInitialized { units });
    }

    /// Start a run and return the first routine to execute
    ///
    /// Progress left over from an earlier run is reset first. An empty unit
    /// list completes immediately and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::AlreadyRunning`] if a run is in progress; the
    /// state is left untouched.
    pub fn start(&mut self) -> RunnerResult<Option<Dispatch>> {
        if self.state.suite_status == TestSuiteStatus::Running {
            return Err(RunnerError::AlreadyRunning);
        }

        self.state.units.iter_mut().for_each(UnitState::reset);
        self.generation += 1;
        self.in_flight = None;
        self.stop_pending = false;
        self.state.run_id = Some(Uuid::new_v4());
        self.state.suite_status = TestSuiteStatus::Running;
        self.state.ignore_status_updates = false;
        self.state.cursor = None;
        self.emit(RunEvent::RunStarted {
            generation: self.generation,
        });

        Ok(self.run_unit(0))
    }

    /// Stop the running suite
    ///
    /// The running unit and every unit not yet started become `Cancelled`.
    /// A routine already in flight cannot be retracted; its result will be
    /// discarded when it arrives. No completion event is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NotRunning`] if no run is in progress.
    pub fn stop(&mut self) -> RunnerResult<()> {
        if self.state.suite_status != TestSuiteStatus::Running {
            return Err(RunnerError::NotRunning);
        }

        if let Some(dispatch) = self.in_flight.take() {
            debug!(routine = %dispatch.routine, "Cancelling in-flight routine");
        }
        self.generation += 1;
        self.stop_pending = false;

        let mut cancelled = Vec::new();
        for (index, unit) in self.state.units.iter_mut().enumerate() {
            if matches!(
                unit.progress(),
                ExecutionProgress::Running | ExecutionProgress::NotStarted
            ) {
                unit.set_progress(ExecutionProgress::Cancelled);
                cancelled.push(index);
            }
        }

        self.state.suite_status = TestSuiteStatus::NotRunning;
        self.state.cursor = None;
        self.state.ignore_status_updates = false;

        for index in cancelled {
            self.emit_unit(index);
        }
        self.emit(RunEvent::RunCancelled);
        Ok(())
    }

    /// Stop the run once the routine in flight resolves
    ///
    /// That routine's result is still recorded, then the run is stopped
    /// instead of dispatching another routine. If nothing is left to
    /// dispatch the run completes as usual. Ignored when no run is in
    /// progress.
    pub fn stop_after_current(&mut self) {
        if self.state.suite_status == TestSuiteStatus::Running {
            debug!(current = ?self.current_routine(), "Stop requested after current routine");
            self.stop_pending = true;
        }
    }

    /// Whether the run stops once the routine in flight resolves
    #[must_use]
    pub const fn is_stop_pending(&self) -> bool {
        self.stop_pending
    }

    /// Record the host page becoming active or inactive
    ///
    /// Navigating away from the page stops a running suite.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active && self.state.suite_status == TestSuiteStatus::Running {
            // Precondition checked above
            let _ = self.stop();
        }
    }

    /// Deliver the service's result for `dispatch`
    ///
    /// Returns the next routine to execute, if any. Deliveries that do not
    /// match the routine in flight (after `stop()`, after a new run started,
    /// or duplicates) are discarded. A `None` result means the routine has
    /// not resolved yet and leaves it in flight.
    pub fn on_external_result(
        &mut self,
        dispatch: &Dispatch,
        result: Option<RoutineResult>,
    ) -> Option<Dispatch> {
        if self.state.suite_status != TestSuiteStatus::Running
            || self.in_flight.as_ref() != Some(dispatch)
        {
            debug!(
                routine = %dispatch.routine,
                generation = dispatch.generation,
                current = self.generation,
                "Discarding stale routine result"
            );
            return None;
        }

        let Some(result) = result else {
            debug!(routine = %dispatch.routine, "Routine not yet resolved");
            return None;
        };
        self.in_flight = None;

        let index = dispatch.unit;
        let member = dispatch.member;
        let (is_group, blocking, last_member) = match self.state.unit(index).map(UnitState::unit)
        {
            Some(RoutineUnit::Single(_)) => (false, false, true),
            Some(RoutineUnit::Group(group)) => (
                true,
                group.routines.get(member).is_some_and(|p| p.blocking),
                member + 1 >= group.len(),
            ),
            None => return None,
        };

        if is_group {
            self.apply_group_result(index, member, dispatch.routine, blocking, result);
            if !last_member {
                if self.stop_pending {
                    return self.halt();
                }
                return self.dispatch(index, member + 1);
            }
        } else if let Some(unit) = self.state.unit_mut(index) {
            unit.record(member, result);
        }

        if let Some(unit) = self.state.unit_mut(index) {
            unit.set_progress(ExecutionProgress::Completed);
        }
        self.emit_unit(index);

        if self.state.ignore_status_updates {
            self.finish();
            None
        } else {
            self.advance(index)
        }
    }

    /// Deliver a [`RoutineResultInfo`] for `dispatch`
    ///
    /// Same as [`on_external_result`](Self::on_external_result), except that
    /// a delivery naming another routine than the ticket is discarded.
    pub fn deliver(&mut self, dispatch: &Dispatch, info: RoutineResultInfo) -> Option<Dispatch> {
        if info.routine != dispatch.routine {
            warn!(
                expected = %dispatch.routine,
                delivered = %info.routine,
                "Discarding result for mismatched routine"
            );
            return None;
        }
        self.on_external_result(dispatch, info.result)
    }

    fn apply_group_result(
        &mut self,
        index: usize,
        member: usize,
        routine: RoutineType,
        blocking: bool,
        result: RoutineResult,
    ) {
        if self.state.ignore_status_updates {
            debug!(routine = %routine, "Ignoring routine outcome after blocking failure");
            return;
        }

        let Some(unit) = self.state.unit_mut(index) else {
            return;
        };
        unit.record(member, result);

        if result.is_failure() && blocking {
            unit.record_blocking_failure();
            self.state.ignore_status_updates = true;
            self.emit(RunEvent::StatusUpdatesSuppressed {
                unit: index,
                routine,
            });
            self.skip_remaining(index);
        } else if result.is_failure() {
            unit.record_non_blocking_failure(routine);
        }
        self.emit_unit(index);
    }

    /// Mark every unit after `index` that has not started as `Skipped`
    fn skip_remaining(&mut self, index: usize) {
        let mut skipped = Vec::new();
        for (i, unit) in self.state.units.iter_mut().enumerate().skip(index + 1) {
            if unit.progress() == ExecutionProgress::NotStarted {
                unit.set_progress(ExecutionProgress::Skipped);
                skipped.push(i);
            }
        }
        for i in skipped {
            self.emit_unit(i);
        }
    }

    fn advance(&mut self, index: usize) -> Option<Dispatch> {
        if self.state.suite_status != TestSuiteStatus::Running {
            return None;
        }
        self.run_unit(index + 1)
    }

    /// Begin the first runnable unit at or after `index`
    fn run_unit(&mut self, mut index: usize) -> Option<Dispatch> {
        loop {
            let Some(unit) = self.state.unit_mut(index) else {
                self.finish();
                return None;
            };
            if self.stop_pending && unit.unit().routine_count() > 0 {
                return self.halt();
            }
            unit.set_progress(ExecutionProgress::Running);
            let empty = unit.unit().routine_count() == 0;
            self.state.cursor = Some(index);

            if !empty {
                self.emit_unit(index);
                return self.dispatch(index, 0);
            }

            // A group filtered down to nothing has nothing to fail
            if let Some(unit) = self.state.unit_mut(index) {
                unit.set_progress(ExecutionProgress::Completed);
            }
            self.emit_unit(index);
            index += 1;
        }
    }

    fn halt(&mut self) -> Option<Dispatch> {
        // Only reachable while running
        let _ = self.stop();
        None
    }

    fn dispatch(&mut self, unit: usize, member: usize) -> Option<Dispatch> {
        let routine = self.state.unit(unit)?.unit().routine_at(member)?;
        let dispatch = Dispatch {
            generation: self.generation,
            unit,
            member,
            routine,
        };
        self.in_flight = Some(dispatch);
        self.emit(RunEvent::RoutineDispatched {
            unit,
            member,
            routine,
        });
        Some(dispatch)
    }

    fn finish(&mut self) {
        self.in_flight = None;
        self.stop_pending = false;
        self.state.cursor = None;
        self.state.ignore_status_updates = false;
        self.state.suite_status = TestSuiteStatus::Completed;
        self.emit(RunEvent::RunCompleted);
    }

    fn emit_unit(&mut self, index: usize) {
        if let Some(unit) = self.state.unit(index) {
            let event = RunEvent::UnitUpdated {
                unit: index,
                progress: unit.progress(),
                status: unit.status(),
            };
            self.emit(event);
        }
    }

    fn emit(&mut self, event: RunEvent) {
        for observer in &mut self.observers {
            observer.on_event(&event, &self.state);
        }
    }
}
