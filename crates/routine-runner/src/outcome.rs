//! Routine results reported by the execution service.

use crate::routine::RoutineType;
use serde::{Deserialize, Serialize};

/// Pass/fail outcome of a routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardRoutineResult {
    /// The routine ran and passed
    TestPassed,
    /// The routine ran and failed
    TestFailed,
    /// The routine could not complete because of an internal error
    ErrorExecuting,
    /// The routine is unavailable in the current device state
    UnableToRun,
}

/// Outcome of a battery charge/discharge routine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRoutineResult {
    /// Pass/fail outcome
    pub simple_result: StandardRoutineResult,
    /// Battery percentage change over the routine
    pub percent_change: f64,
    /// Routine duration in seconds
    pub time_elapsed_seconds: u32,
}

impl PowerRoutineResult {
    /// Create a power result
    #[must_use]
    pub const fn new(
        simple_result: StandardRoutineResult,
        percent_change: f64,
        time_elapsed_seconds: u32,
    ) -> Self {
        Self {
            simple_result,
            percent_change,
            time_elapsed_seconds,
        }
    }

    /// One-line summary, e.g. `Charged 0.00% in 0 seconds.`
    #[must_use]
    pub fn summary(&self, routine: RoutineType) -> String {
        let verb = if routine == RoutineType::BatteryDischarge {
            "Discharged"
        } else {
            "Charged"
        };
        format!(
            "{verb} {:.2}% in {} seconds.",
            self.percent_change, self.time_elapsed_seconds
        )
    }
}

/// Result payload, keyed by routine category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RoutineResult {
    /// Result of a standard routine
    Simple {
        /// Pass/fail outcome
        result: StandardRoutineResult,
    },
    /// Result of a power routine
    Power(PowerRoutineResult),
}

impl RoutineResult {
    /// A passing standard result
    pub const PASSED: Self = Self::simple(StandardRoutineResult::TestPassed);
    /// A failing standard result
    pub const FAILED: Self = Self::simple(StandardRoutineResult::TestFailed);

    /// Wrap a standard result
    #[must_use]
    pub const fn simple(result: StandardRoutineResult) -> Self {
        Self::Simple { result }
    }

    /// Default result shape for `routine` carrying `result`
    #[must_use]
    pub const fn for_routine(routine: RoutineType, result: StandardRoutineResult) -> Self {
        if routine.is_power() {
            Self::Power(PowerRoutineResult::new(result, 0.0, 0))
        } else {
            Self::simple(result)
        }
    }

    /// The pass/fail outcome regardless of category
    #[must_use]
    pub const fn simple_result(&self) -> StandardRoutineResult {
        match self {
            Self::Simple { result } => *result,
            Self::Power(power) => power.simple_result,
        }
    }

    /// Only an explicit `TestFailed` counts as a failure
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.simple_result(), StandardRoutineResult::TestFailed)
    }

    /// Whether the routine passed
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self.simple_result(), StandardRoutineResult::TestPassed)
    }

    /// Power payload, if any
    #[must_use]
    pub const fn power(&self) -> Option<&PowerRoutineResult> {
        match self {
            Self::Power(power) => Some(power),
            Self::Simple { .. } => None,
        }
    }
}

impl From<StandardRoutineResult> for RoutineResult {
    fn from(result: StandardRoutineResult) -> Self {
        Self::simple(result)
    }
}

impl From<PowerRoutineResult> for RoutineResult {
    fn from(result: PowerRoutineResult) -> Self {
        Self::Power(result)
    }
}

/// A result delivery for one routine
///
/// `result` is `None` while the service has not resolved the routine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutineResultInfo {
    /// Routine the result belongs to
    pub routine: RoutineType,
    /// Result, if resolved
    pub result: Option<RoutineResult>,
}

impl RoutineResultInfo {
    /// A resolved delivery
    #[must_use]
    pub const fn resolved(routine: RoutineType, result: RoutineResult) -> Self {
        Self {
            routine,
            result: Some(result),
        }
    }

    /// An unresolved delivery
    #[must_use]
    pub const fn pending(routine: RoutineType) -> Self {
        Self {
            routine,
            result: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_test_failed_is_failure() {
        assert!(RoutineResult::FAILED.is_failure());
        assert!(!RoutineResult::PASSED.is_failure());
        assert!(!RoutineResult::simple(StandardRoutineResult::ErrorExecuting).is_failure());
        assert!(!RoutineResult::simple(StandardRoutineResult::UnableToRun).is_failure());
    }

    #[test]
    fn test_power_result_failure() {
        let result = RoutineResult::Power(PowerRoutineResult::new(
            StandardRoutineResult::TestFailed,
            1.5,
            30,
        ));
        assert!(result.is_failure());
        assert!(result.power().is_some());
        assert_eq!(result.simple_result(), StandardRoutineResult::TestFailed);
    }

    #[test]
    fn test_for_routine_shapes() {
        let power = RoutineResult::for_routine(
            RoutineType::BatteryCharge,
            StandardRoutineResult::TestPassed,
        );
        assert!(power.power().is_some());
        let simple =
            RoutineResult::for_routine(RoutineType::Memory, StandardRoutineResult::TestPassed);
        assert!(simple.power().is_none());
        assert!(simple.is_pass());
    }

    #[test]
    fn test_power_summary() {
        let result = PowerRoutineResult::new(StandardRoutineResult::TestPassed, 0.0, 0);
        assert_eq!(
            result.summary(RoutineType::BatteryCharge),
            "Charged 0.00% in 0 seconds."
        );
        let result = PowerRoutineResult::new(StandardRoutineResult::TestPassed, 3.257, 120);
        assert_eq!(
            result.summary(RoutineType::BatteryDischarge),
            "Discharged 3.26% in 120 seconds."
        );
    }

    #[test]
    fn test_tagged_json() {
        let json = serde_json::to_value(RoutineResult::PASSED).unwrap();
        assert_eq!(json["kind"], "simple");
        assert_eq!(json["result"], "test_passed");
    }

    #[test]
    fn test_pending_delivery() {
        let info = RoutineResultInfo::pending(RoutineType::Memory);
        assert!(info.result.is_none());
        let info = RoutineResultInfo::resolved(RoutineType::Memory, RoutineResult::PASSED);
        assert_eq!(info.result, Some(RoutineResult::PASSED));
    }
}
