//! Run events emitted by the coordinator
//!
//! Events are the interface between the coordinator and its hosts: a CLI,
//! a UI binding or a test. Every host receives the same events and reads
//! the run state it needs from the snapshot passed alongside.

use crate::routine::RoutineType;
use crate::state::{ExecutionProgress, RunState, UnitStatus};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Event emitted by `RunCoordinator` as the run state changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum RunEvent {
    /// The unit list was (re)initialized
    RunInitialized {
        /// Number of units in the new list
        units: usize,
    },
    /// A run started
    RunStarted {
        /// Generation stamped on this run's dispatches
        generation: u64,
    },
    /// A routine was handed to the execution service
    RoutineDispatched {
        /// Unit index
        unit: usize,
        /// Routine index within the unit
        member: usize,
        /// Routine dispatched
        routine: RoutineType,
    },
    /// A unit's progress or status changed
    UnitUpdated {
        /// Unit index
        unit: usize,
        /// New progress
        progress: ExecutionProgress,
        /// Badge status after the change
        status: UnitStatus,
    },
    /// A blocking failure occurred; remaining member outcomes are ignored
    StatusUpdatesSuppressed {
        /// Index of the failed group
        unit: usize,
        /// Blocking routine that failed
        routine: RoutineType,
    },
    /// Every unit reached a terminal state without cancellation
    RunCompleted,
    /// The run was stopped by the host
    RunCancelled,
}

/// Receives run events
pub trait RunObserver: Send {
    /// Called after the state change described by `event` was applied
    fn on_event(&mut self, event: &RunEvent, state: &RunState);
}

impl<F> RunObserver for F
where
    F: FnMut(&RunEvent, &RunState) + Send,
{
    fn on_event(&mut self, event: &RunEvent, state: &RunState) {
        self(event, state);
    }
}

/// Observer that forwards events to a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RunObserver for ChannelObserver {
    fn on_event(&mut self, event: &RunEvent, _state: &RunState) {
        // Receiver may be gone (host closed)
        let _ = self.tx.send(event.clone());
    }
}

/// Observer that logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LogObserver {
    /// Create a log observer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RunObserver for LogObserver {
    fn on_event(&mut self, event: &RunEvent, state: &RunState) {
        match event {
            RunEvent::RunInitialized { units } => info!(units, "Run initialized"),
            RunEvent::RunStarted { generation } => {
                info!(generation, run_id = ?state.run_id(), "Run started");
            }
            RunEvent::RoutineDispatched {
                unit,
                member,
                routine,
            } => debug!(unit, member, routine = %routine, "Routine dispatched"),
            RunEvent::UnitUpdated {
                unit,
                progress,
                status,
            } => debug!(unit, progress = ?progress, status = status.badge(), "Unit updated"),
            RunEvent::StatusUpdatesSuppressed { unit, routine } => {
                info!(unit, routine = %routine, "Blocking routine failed, skipping remaining units");
            }
            RunEvent::RunCompleted => info!(
                passed = state.count_status(UnitStatus::Passed),
                failed = state.count_status(UnitStatus::Failed),
                "Diagnostics completed"
            ),
            RunEvent::RunCancelled => info!("Run cancelled"),
        }
    }
}
