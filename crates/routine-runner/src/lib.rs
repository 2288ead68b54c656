//! Routine Runner: sequencing engine for hardware diagnostic routines
//!
//! Runs an ordered list of diagnostic units (single routines or labelled
//! groups) strictly one routine at a time against an external execution
//! service, aggregates group verdicts and supports cancellation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ROUTINE RUNNER Architecture                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ RunPlan    │    │ RunDriver  │    │ Routine    │            │
//! │   │ (YAML)     │───►│ + Run      │───►│ Service    │            │
//! │   │            │    │ Coordinator│◄───│ (backend)  │            │
//! │   └────────────┘    └─────┬──────┘    └────────────┘            │
//! │                           │ RunEvent                            │
//! │                           ▼                                     │
//! │                     RunObserver(s)                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The coordinator is synchronous and never performs I/O; the driver owns
//! the async side.

#![warn(missing_docs)]

mod coordinator;
mod driver;
mod event;
mod outcome;
mod result;
mod routine;
mod service;
mod state;

/// Remaining-time estimate for running routines
pub mod estimate;

/// Scripted execution service
#[cfg(feature = "fake")]
pub mod fake;

/// YAML run plans
pub mod plan;

pub use coordinator::{Dispatch, RunCoordinator};
pub use driver::{RunCommand, RunDriver, RunHandle, RunOutcome};
pub use estimate::{Clock, FakeClock, RemainingTime, RuntimeEstimator, SystemClock};
pub use event::{ChannelObserver, LogObserver, RunEvent, RunObserver};
#[cfg(feature = "fake")]
pub use fake::{FakeRoutineService, ResolveMode};
pub use outcome::{PowerRoutineResult, RoutineResult, RoutineResultInfo, StandardRoutineResult};
pub use plan::{ResultSpec, RunPlan, UnitSpec};
pub use result::{RunnerError, RunnerResult};
pub use routine::{RoutineCategory, RoutineGroup, RoutineProperties, RoutineType, RoutineUnit};
pub use service::{filter_supported, RoutineService, ServiceError, ServiceResult};
pub use state::{ExecutionProgress, RunState, TestSuiteStatus, UnitState, UnitStatus};

/// Commonly used types
pub mod prelude {
    pub use super::{
        ExecutionProgress, RoutineProperties, RoutineResult, RoutineService, RoutineType,
        RoutineUnit, RunCoordinator, RunDriver, RunEvent, RunHandle, RunOutcome, RunPlan,
        RunState, RunnerError, RunnerResult, TestSuiteStatus, UnitStatus,
    };
    #[cfg(feature = "fake")]
    pub use super::{FakeRoutineService, ResolveMode};
}
