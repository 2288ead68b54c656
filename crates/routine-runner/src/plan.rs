//! Run plans loaded from YAML
//!
//! ```yaml
//! name: Network
//! runtime_minutes: 2
//! units:
//!   - routine: cpu_cache
//!   - group: localNetworkGroupLabel
//!     routines:
//!       - { routine: gateway_can_be_pinged, blocking: true }
//!       - { routine: arc_ping, blocking: false }
//! results:
//!   gateway_can_be_pinged: test_failed
//! ```
//!
//! `supported`, `results` and `resolve_delay_ms` only configure the fake
//! execution service.

use crate::estimate::{Clock, RuntimeEstimator};
use crate::outcome::{PowerRoutineResult, RoutineResult, StandardRoutineResult};
use crate::result::{RunnerError, RunnerResult};
use crate::routine::{RoutineProperties, RoutineType, RoutineUnit};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const fn default_runtime_minutes() -> u32 {
    1
}

/// One entry of the `units` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitSpec {
    /// `routine: <id>`
    Single {
        /// Routine to run
        routine: RoutineType,
    },
    /// `group: <label>` with `routines: [...]`
    Group {
        /// Group label
        group: String,
        /// Members in execution order
        routines: Vec<RoutineProperties>,
    },
}

impl From<&UnitSpec> for RoutineUnit {
    fn from(spec: &UnitSpec) -> Self {
        match spec {
            UnitSpec::Single { routine } => Self::Single(*routine),
            UnitSpec::Group { group, routines } => Self::group(routines.clone(), group.clone()),
        }
    }
}

/// Scripted result: a bare result name or a full power result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultSpec {
    /// e.g. `test_failed`
    Standard(StandardRoutineResult),
    /// `{ simple_result, percent_change, time_elapsed_seconds }`
    Power(PowerRoutineResult),
}

impl ResultSpec {
    /// Result delivered for `routine`
    #[must_use]
    pub const fn to_result(self, routine: RoutineType) -> RoutineResult {
        match self {
            Self::Standard(result) => RoutineResult::for_routine(routine, result),
            Self::Power(power) => RoutineResult::Power(power),
        }
    }
}

/// A diagnostic run described in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    /// Plan name
    pub name: String,
    /// Expected runtime of the whole run
    #[serde(default = "default_runtime_minutes")]
    pub runtime_minutes: u32,
    /// Units in execution order
    pub units: Vec<UnitSpec>,
    /// Routines the fake service supports (all when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported: Option<Vec<RoutineType>>,
    /// Scripted results for the fake service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: BTreeMap<RoutineType, ResultSpec>,
    /// Delay before each fake routine resolves
    #[serde(default)]
    pub resolve_delay_ms: u64,
}

impl RunPlan {
    /// Parse and validate a plan
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Yaml`] for malformed YAML and
    /// [`RunnerError::InvalidPlan`] when validation fails.
    pub fn from_yaml(yaml: &str) -> RunnerResult<Self> {
        let plan: Self = serde_yaml_ng::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load a plan file
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Io`] if the file cannot be read, otherwise as
    /// [`RunPlan::from_yaml`].
    pub fn load(path: impl AsRef<Path>) -> RunnerResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Check the plan for structural mistakes
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::InvalidPlan`] describing the first problem.
    pub fn validate(&self) -> RunnerResult<()> {
        if self.name.trim().is_empty() {
            return Err(RunnerError::invalid_plan("plan name is empty"));
        }
        if self.runtime_minutes == 0 {
            return Err(RunnerError::invalid_plan("runtime_minutes must be positive"));
        }

        for (index, unit) in self.units.iter().enumerate() {
            let UnitSpec::Group { group, routines } = unit else {
                continue;
            };
            if group.trim().is_empty() {
                return Err(RunnerError::invalid_plan(format!(
                    "unit {index}: group label is empty"
                )));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = routines.iter().find(|p| !seen.insert(p.routine)) {
                return Err(RunnerError::invalid_plan(format!(
                    "unit {index}: {} appears twice in group '{group}'",
                    dup.routine
                )));
            }
        }

        for (routine, spec) in &self.results {
            if matches!(spec, ResultSpec::Power(_)) && !routine.is_power() {
                return Err(RunnerError::invalid_plan(format!(
                    "{routine} cannot report a power result"
                )));
            }
        }
        Ok(())
    }

    /// Units in execution order
    #[must_use]
    pub fn units(&self) -> Vec<RoutineUnit> {
        self.units.iter().map(RoutineUnit::from).collect()
    }

    /// Number of routines across all units
    #[must_use]
    pub fn routine_count(&self) -> usize {
        self.units().iter().map(RoutineUnit::routine_count).sum()
    }

    /// Countdown for this plan's expected runtime
    #[must_use]
    pub const fn estimator<C: Clock>(&self, clock: C) -> RuntimeEstimator<C> {
        RuntimeEstimator::new(self.runtime_minutes, clock)
    }

    /// Fake execution service scripted by this plan
    #[cfg(feature = "fake")]
    #[must_use]
    pub fn fake_service(&self) -> crate::fake::FakeRoutineService {
        use crate::fake::{FakeRoutineService, ResolveMode};
        use std::time::Duration;

        let mode = if self.resolve_delay_ms > 0 {
            ResolveMode::Delay(Duration::from_millis(self.resolve_delay_ms))
        } else {
            ResolveMode::Immediate
        };
        let service = FakeRoutineService::new().with_mode(mode);
        if let Some(supported) = &self.supported {
            service.set_supported(supported.clone());
        }
        for (routine, spec) in &self.results {
            service.set_result(*routine, spec.to_result(*routine));
        }
        service
    }
}
