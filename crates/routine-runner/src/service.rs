//! Routine Execution Service seam
//!
//! The backend that actually exercises the hardware lives outside this crate. The
//! coordinator reaches it only through [`RoutineService`], injected by the
//! host when constructing a [`RunDriver`](crate::RunDriver).

use crate::outcome::RoutineResult;
use crate::routine::{RoutineGroup, RoutineType, RoutineUnit};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors reported by an execution service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The backend is not reachable
    #[error("execution service unavailable")]
    Unavailable,

    /// The backend refused to run a routine
    #[error("{routine} rejected: {message}")]
    Rejected {
        /// Routine that was rejected
        routine: RoutineType,
        /// Error message
        message: String,
    },
}

impl ServiceError {
    /// Create a rejection error
    #[must_use]
    pub fn rejected(routine: RoutineType, message: impl Into<String>) -> Self {
        Self::Rejected {
            routine,
            message: message.into(),
        }
    }
}

/// Backend that runs diagnostic routines, one call at a time
#[async_trait]
pub trait RoutineService: Send + Sync {
    /// Run `routine` and resolve with its result
    async fn run_routine(&self, routine: RoutineType) -> ServiceResult<RoutineResult>;

    /// Routines the current device supports
    async fn supported_routines(&self) -> ServiceResult<Vec<RoutineType>>;
}

/// Restrict `units` to routines in `supported`
///
/// Unsupported singles are dropped, unsupported group members are removed,
/// and groups left without members are dropped. Order is preserved.
#[must_use]
pub fn filter_supported(units: &[RoutineUnit], supported: &[RoutineType]) -> Vec<RoutineUnit> {
    units
        .iter()
        .filter_map(|unit| match unit {
            RoutineUnit::Single(routine) => supported
                .contains(routine)
                .then(|| RoutineUnit::Single(*routine)),
            RoutineUnit::Group(group) => {
                let routines: Vec<_> = group
                    .routines
                    .iter()
                    .copied()
                    .filter(|p| supported.contains(&p.routine))
                    .collect();
                (!routines.is_empty())
                    .then(|| RoutineUnit::Group(RoutineGroup::new(routines, group.label.clone())))
            }
        })
        .collect()
}
