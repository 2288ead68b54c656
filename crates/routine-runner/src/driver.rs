//! Async run driver
//!
//! Glues a [`RunCoordinator`] to a [`RoutineService`]. Each dispatch is
//! spawned as its own task; results come back over a channel tagged with
//! the dispatch ticket, so a stopped run never waits for the call it
//! abandoned and the late result is discarded by the coordinator.
//!
//! ```text
//! RunHandle ──commands──► RunDriver::run() ◄──(Dispatch, info)── spawned calls
//!                              │                                        ▲
//!                              └──────────── RunCoordinator ──Dispatch──┘
//! ```

use crate::coordinator::{Dispatch, RunCoordinator};
use crate::event::RunObserver;
use crate::outcome::{RoutineResult, RoutineResultInfo, StandardRoutineResult};
use crate::result::{RunnerError, RunnerResult};
use crate::routine::RoutineUnit;
use crate::service::{filter_supported, RoutineService};
use crate::state::TestSuiteStatus;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Host command delivered through a [`RunHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    /// Start the configured run
    Start,
    /// Stop the running suite
    Stop,
    /// The host page became active or inactive
    SetActive(bool),
}

/// How [`RunDriver::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every unit finished
    Completed,
    /// The run was stopped
    Cancelled,
    /// The command channel closed without a run in progress
    Idle,
}

/// Cloneable handle for sending commands to a driver
#[derive(Debug, Clone)]
pub struct RunHandle {
    tx: mpsc::UnboundedSender<RunCommand>,
}

impl RunHandle {
    /// Request a run start
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::DriverClosed`] if the driver was dropped.
    pub fn start(&self) -> RunnerResult<()> {
        self.send(RunCommand::Start)
    }

    /// Request a stop
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::DriverClosed`] if the driver was dropped.
    pub fn stop(&self) -> RunnerResult<()> {
        self.send(RunCommand::Stop)
    }

    /// Report the host page becoming active or inactive
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::DriverClosed`] if the driver was dropped.
    pub fn set_active(&self, active: bool) -> RunnerResult<()> {
        self.send(RunCommand::SetActive(active))
    }

    /// Send a raw command
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::DriverClosed`] if the driver was dropped.
    pub fn send(&self, command: RunCommand) -> RunnerResult<()> {
        self.tx
            .send(command)
            .map_err(|_| RunnerError::DriverClosed)
    }
}

type Completion = (Dispatch, RoutineResultInfo);

/// Drives a coordinator against an execution service
pub struct RunDriver<S: RoutineService + 'static> {
    coordinator: RunCoordinator,
    service: Arc<S>,
    commands: mpsc::UnboundedReceiver<RunCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    dispatch_limit: Option<usize>,
    dispatched: usize,
    finished: Option<RunOutcome>,
}

impl<S: RoutineService + 'static> std::fmt::Debug for RunDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunDriver")
            .field("coordinator", &self.coordinator)
            .field("dispatch_limit", &self.dispatch_limit)
            .field("dispatched", &self.dispatched)
            .finish_non_exhaustive()
    }
}

impl<S: RoutineService + 'static> RunDriver<S> {
    /// Create a driver and its command handle
    #[must_use]
    pub fn new(service: Arc<S>) -> (Self, RunHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let driver = Self {
            coordinator: RunCoordinator::new(),
            service,
            commands,
            completions_tx,
            completions,
            dispatch_limit: None,
            dispatched: 0,
            finished: None,
        };
        (driver, RunHandle { tx })
    }

    /// Stop each run once `limit` routines have been dispatched and resolved
    ///
    /// The last routine's result is recorded; no further routine reaches
    /// the service. A limit of zero behaves like one.
    #[must_use]
    pub const fn with_dispatch_limit(mut self, limit: Option<usize>) -> Self {
        self.dispatch_limit = limit;
        self
    }

    /// The coordinator
    #[must_use]
    pub const fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }

    /// The execution service
    #[must_use]
    pub const fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Register an observer on the coordinator
    pub fn subscribe(&mut self, observer: impl RunObserver + 'static) {
        self.coordinator.subscribe(observer);
    }

    /// Initialize the run with the units the service supports
    ///
    /// Returns the number of units kept.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Service`] if the supported routines cannot be
    /// queried.
    pub async fn prepare(&mut self, units: Vec<RoutineUnit>) -> RunnerResult<usize> {
        let supported = self.service.supported_routines().await?;
        let filtered = filter_supported(&units, &supported);
        if filtered.len() < units.len() {
            info!(
                requested = units.len(),
                kept = filtered.len(),
                "Dropped units with unsupported routines"
            );
        }
        let kept = filtered.len();
        self.coordinator.initialize_run(filtered);
        Ok(kept)
    }

    /// Start a run directly, without going through the handle
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::AlreadyRunning`] if a run is in progress.
    pub fn start(&mut self) -> RunnerResult<()> {
        self.dispatched = 0;
        self.finished = None;
        let first = self.coordinator.start()?;
        self.launch(first);
        Ok(())
    }

    /// Process commands and results until the suite leaves `Running`
    ///
    /// When no run is in progress, waits for a start command first.
    /// Service faults never end the loop: they are recorded as
    /// `ErrorExecuting` results.
    pub async fn run(&mut self) -> RunOutcome {
        let mut commands_open = true;
        loop {
            if let Some(outcome) = self.finished.take() {
                return outcome;
            }
            let running = self.is_running();
            if !commands_open && !running {
                return RunOutcome::Idle;
            }

            tokio::select! {
                command = self.commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => commands_open = false,
                },
                Some((dispatch, info)) = self.completions.recv(), if running => {
                    let next = self.coordinator.deliver(&dispatch, info);
                    self.launch(next);
                }
            }
        }
    }

    fn is_running(&self) -> bool {
        self.coordinator.state().suite_status() == TestSuiteStatus::Running
    }

    fn handle_command(&mut self, command: RunCommand) {
        debug!(command = ?command, "Run command");
        match command {
            RunCommand::Start => {
                if let Err(err) = self.start() {
                    ignored(command, &err);
                }
            }
            RunCommand::Stop => match self.coordinator.stop() {
                Ok(()) => self.finished = Some(RunOutcome::Cancelled),
                Err(err) => ignored(command, &err),
            },
            RunCommand::SetActive(active) => {
                let was_running = self.is_running();
                self.coordinator.set_active(active);
                if was_running && !self.is_running() {
                    self.finished = Some(RunOutcome::Cancelled);
                }
            }
        }
    }

    /// Spawn the service call for `dispatch`, or record how the run ended
    fn launch(&mut self, dispatch: Option<Dispatch>) {
        let Some(dispatch) = dispatch else {
            match self.coordinator.state().suite_status() {
                TestSuiteStatus::Completed => self.finished = Some(RunOutcome::Completed),
                // Stopped by the dispatch limit after its last result
                TestSuiteStatus::NotRunning => self.finished = Some(RunOutcome::Cancelled),
                TestSuiteStatus::Running => {}
            }
            return;
        };

        self.dispatched += 1;
        if self.dispatch_limit.is_some_and(|limit| self.dispatched >= limit) {
            info!(limit = self.dispatched, "Dispatch limit reached, stopping after this routine");
            self.coordinator.stop_after_current();
        }

        let service = Arc::clone(&self.service);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let routine = dispatch.routine;
            let result = match service.run_routine(routine).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(routine = %routine, error = %err, "Routine execution failed");
                    RoutineResult::for_routine(routine, StandardRoutineResult::ErrorExecuting)
                }
            };
            // Driver may have been dropped
            let _ = tx.send((dispatch, RoutineResultInfo::resolved(routine, result)));
        });
    }
}

fn ignored(command: RunCommand, err: &RunnerError) {
    if err.is_precondition() {
        debug!(command = ?command, error = %err, "Ignoring run command");
    } else {
        warn!(command = ?command, error = %err, "Run command failed");
    }
}

#[cfg(all(test, feature = "fake"))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::{ChannelObserver, RunEvent};
    use crate::fake::{FakeRoutineService, ResolveMode};
    use crate::routine::{RoutineProperties, RoutineType};
    use crate::service::ServiceError;
    use crate::state::{ExecutionProgress, UnitStatus};

    fn singles(routines: &[RoutineType]) -> Vec<RoutineUnit> {
        routines.iter().copied().map(RoutineUnit::Single).collect()
    }

    async fn driver_with(
        service: FakeRoutineService,
        units: Vec<RoutineUnit>,
    ) -> (RunDriver<FakeRoutineService>, RunHandle, Arc<FakeRoutineService>) {
        let service = Arc::new(service);
        let (mut driver, handle) = RunDriver::new(Arc::clone(&service));
        driver.prepare(units).await.unwrap();
        (driver, handle, service)
    }

    #[tokio::test]
    async fn test_run_to_completion() {
        let (mut driver, handle, service) = driver_with(
            FakeRoutineService::new(),
            singles(&[RoutineType::CpuCache, RoutineType::CpuFloatingPoint]),
        )
        .await;

        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Completed);
        assert_eq!(
            driver.coordinator().state().progress(),
            vec![ExecutionProgress::Completed, ExecutionProgress::Completed]
        );
        assert_eq!(
            service.calls(),
            vec![RoutineType::CpuCache, RoutineType::CpuFloatingPoint]
        );
    }

    #[tokio::test]
    async fn test_prepare_filters_unsupported() {
        let service = FakeRoutineService::new().with_supported(vec![RoutineType::Memory]);
        let service = Arc::new(service);
        let (mut driver, _handle) = RunDriver::new(service);
        let kept = driver
            .prepare(singles(&[RoutineType::CpuCache, RoutineType::Memory]))
            .await
            .unwrap();
        assert_eq!(kept, 1);
        assert_eq!(
            driver.coordinator().state().unit(0).unwrap().unit(),
            &RoutineUnit::Single(RoutineType::Memory)
        );
    }

    #[tokio::test]
    async fn test_empty_run_completes() {
        let (mut driver, handle, service) =
            driver_with(FakeRoutineService::new(), Vec::new()).await;
        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Completed);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_service_error_recorded_as_error_executing() {
        let service = FakeRoutineService::new();
        service.set_error(RoutineType::Memory, ServiceError::Unavailable);
        let (mut driver, handle, _service) =
            driver_with(service, singles(&[RoutineType::Memory, RoutineType::CpuCache])).await;

        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Completed);
        let state = driver.coordinator().state();
        assert_eq!(state.unit(0).unwrap().status(), UnitStatus::Error);
        assert_eq!(state.unit(1).unwrap().status(), UnitStatus::Passed);
    }

    #[tokio::test]
    async fn test_rejected_routine_recorded_as_error() {
        let (mut driver, handle, service) = driver_with(
            FakeRoutineService::new(),
            singles(&[RoutineType::CpuCache, RoutineType::Memory]),
        )
        .await;
        // Support changes after the unit list was prepared
        service.set_supported(vec![RoutineType::CpuCache]);

        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Completed);
        let state = driver.coordinator().state();
        assert_eq!(state.unit(0).unwrap().status(), UnitStatus::Passed);
        assert_eq!(state.unit(1).unwrap().status(), UnitStatus::Error);
    }

    #[tokio::test]
    async fn test_blocking_failure_skips_later_calls() {
        let service = FakeRoutineService::new()
            .with_result(RoutineType::GatewayCanBePinged, RoutineResult::FAILED);
        let units = vec![
            RoutineUnit::group(
                vec![
                    RoutineProperties::blocking(RoutineType::GatewayCanBePinged),
                    RoutineProperties::blocking(RoutineType::LanConnectivity),
                ],
                "localNetworkGroupLabel",
            ),
            RoutineUnit::Single(RoutineType::DnsResolution),
        ];
        let (mut driver, handle, service) = driver_with(service, units).await;

        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Completed);
        assert_eq!(
            service.calls(),
            vec![RoutineType::GatewayCanBePinged, RoutineType::LanConnectivity]
        );
        let state = driver.coordinator().state();
        assert_eq!(state.unit(0).unwrap().status(), UnitStatus::Failed);
        assert_eq!(state.unit(1).unwrap().status(), UnitStatus::Skipped);
    }

    #[tokio::test]
    async fn test_stop_discards_late_result() {
        let (mut driver, handle, service) = driver_with(
            FakeRoutineService::new().with_mode(ResolveMode::Manual),
            singles(&[RoutineType::CpuCache, RoutineType::Memory]),
        )
        .await;

        driver.start().unwrap();
        handle.stop().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Cancelled);
        assert_eq!(
            driver.coordinator().state().progress(),
            vec![ExecutionProgress::Cancelled, ExecutionProgress::Cancelled]
        );

        // The abandoned call resolves after the stop
        service.resolve_next_with(RoutineResult::FAILED).await;

        driver.start().unwrap();
        let (outcome, ()) = tokio::join!(driver.run(), async {
            service.resolve_next().await;
            service.resolve_next().await;
        });
        assert_eq!(outcome, RunOutcome::Completed);
        let state = driver.coordinator().state();
        assert_eq!(state.unit(0).unwrap().status(), UnitStatus::Passed);
        assert_eq!(state.unit(1).unwrap().status(), UnitStatus::Passed);
    }

    #[tokio::test]
    async fn test_page_inactive_cancels() {
        let (mut driver, handle, _service) = driver_with(
            FakeRoutineService::new().with_mode(ResolveMode::Manual),
            singles(&[RoutineType::CpuStress]),
        )
        .await;

        handle.start().unwrap();
        handle.set_active(false).unwrap();
        assert_eq!(driver.run().await, RunOutcome::Cancelled);
        assert!(!driver.coordinator().is_active());
    }

    #[tokio::test]
    async fn test_dispatch_limit_stops_run() {
        let service = Arc::new(FakeRoutineService::new());
        let (driver, handle) = RunDriver::new(Arc::clone(&service));
        let mut driver = driver.with_dispatch_limit(Some(1));
        driver
            .prepare(singles(&[
                RoutineType::CpuCache,
                RoutineType::CpuStress,
                RoutineType::Memory,
            ]))
            .await
            .unwrap();

        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Cancelled);
        assert_eq!(
            driver.coordinator().state().progress(),
            vec![
                ExecutionProgress::Completed,
                ExecutionProgress::Cancelled,
                ExecutionProgress::Cancelled
            ]
        );
        assert_eq!(service.calls(), vec![RoutineType::CpuCache]);
    }

    #[tokio::test]
    async fn test_dispatch_limit_reports_only_called_routines() {
        let service = Arc::new(FakeRoutineService::new());
        let (driver, handle) = RunDriver::new(Arc::clone(&service));
        let mut driver = driver.with_dispatch_limit(Some(1));
        let (observer, mut events) = ChannelObserver::new();
        driver.subscribe(observer);
        driver
            .prepare(singles(&[RoutineType::CpuCache, RoutineType::Memory]))
            .await
            .unwrap();

        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Cancelled);

        let mut dispatched = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RunEvent::RoutineDispatched { routine, .. } = event {
                dispatched.push(routine);
            }
        }
        assert_eq!(dispatched, service.calls());
        assert_eq!(dispatched, vec![RoutineType::CpuCache]);
        assert_eq!(
            driver.coordinator().state().unit(1).unwrap().status(),
            UnitStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_dispatch_limit_not_reached_completes() {
        let service = Arc::new(FakeRoutineService::new());
        let (driver, handle) = RunDriver::new(Arc::clone(&service));
        let mut driver = driver.with_dispatch_limit(Some(2));
        driver
            .prepare(singles(&[RoutineType::CpuCache, RoutineType::Memory]))
            .await
            .unwrap();

        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Completed);
        assert_eq!(service.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_idle_when_handles_dropped() {
        let (mut driver, handle, _service) =
            driver_with(FakeRoutineService::new(), singles(&[RoutineType::Memory])).await;
        drop(handle);
        assert_eq!(driver.run().await, RunOutcome::Idle);
    }

    #[tokio::test]
    async fn test_double_start_is_ignored() {
        let (mut driver, handle, service) = driver_with(
            FakeRoutineService::new(),
            singles(&[RoutineType::CpuCache]),
        )
        .await;
        handle.start().unwrap();
        handle.start().unwrap();
        assert_eq!(driver.run().await, RunOutcome::Completed);
        assert_eq!(service.calls(), vec![RoutineType::CpuCache]);
    }
}
