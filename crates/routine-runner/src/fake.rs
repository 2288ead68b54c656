//! Scripted execution service for tests and demos
//!
//! Every routine resolves with a scripted result, or with a pass when none
//! was scripted. Battery routines pass with a zeroed power result. Routines
//! outside the supported list are rejected.
//!
//! In [`ResolveMode::Manual`] each call is held until the test resolves it,
//! which makes "stop while a routine is in flight" deterministic:
//!
//! ```rust,ignore
//! let service = Arc::new(FakeRoutineService::new().with_mode(ResolveMode::Manual));
//! // ... start a run ...
//! service.resolve_next().await; // first routine resolves now
//! ```

use crate::outcome::{RoutineResult, StandardRoutineResult};
use crate::routine::RoutineType;
use crate::service::{RoutineService, ServiceError, ServiceResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

/// When a fake routine call resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Resolve as soon as the routine is called
    #[default]
    Immediate,
    /// Resolve after a fixed delay
    Delay(Duration),
    /// Hold every call until `resolve_next()`
    Manual,
}

type PendingCall = (RoutineType, oneshot::Sender<Option<RoutineResult>>);

#[derive(Debug, Default)]
struct FakeState {
    results: HashMap<RoutineType, RoutineResult>,
    errors: HashMap<RoutineType, ServiceError>,
    supported: Option<Vec<RoutineType>>,
    calls: Vec<RoutineType>,
    pending: VecDeque<PendingCall>,
}

/// In-memory [`RoutineService`]
#[derive(Debug, Default)]
pub struct FakeRoutineService {
    state: Mutex<FakeState>,
    mode: ResolveMode,
    call_arrived: Notify,
}

impl FakeRoutineService {
    /// Create a service that passes every routine immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resolve mode
    #[must_use]
    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Script the result of `routine`
    #[must_use]
    pub fn with_result(self, routine: RoutineType, result: impl Into<RoutineResult>) -> Self {
        self.set_result(routine, result);
        self
    }

    /// Restrict the supported routines
    #[must_use]
    pub fn with_supported(self, supported: Vec<RoutineType>) -> Self {
        self.set_supported(supported);
        self
    }

    /// Resolve mode in use
    #[must_use]
    pub const fn mode(&self) -> ResolveMode {
        self.mode
    }

    /// Script the result of `routine`
    pub fn set_result(&self, routine: RoutineType, result: impl Into<RoutineResult>) {
        self.lock().results.insert(routine, result.into());
    }

    /// Make calls to `routine` fail with `error`
    pub fn set_error(&self, routine: RoutineType, error: ServiceError) {
        self.lock().errors.insert(routine, error);
    }

    /// Restrict the supported routines
    pub fn set_supported(&self, supported: Vec<RoutineType>) {
        self.lock().supported = Some(supported);
    }

    /// Routines called so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<RoutineType> {
        self.lock().calls.clone()
    }

    /// Number of held calls awaiting `resolve_next()`
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Resolve the oldest held call with its scripted result
    ///
    /// Waits until a call arrives. Returns the resolved routine.
    pub async fn resolve_next(&self) -> RoutineType {
        self.release(None).await
    }

    /// Resolve the oldest held call with `result`
    pub async fn resolve_next_with(&self, result: impl Into<RoutineResult>) -> RoutineType {
        self.release(Some(result.into())).await
    }

    async fn release(&self, result: Option<RoutineResult>) -> RoutineType {
        loop {
            let next = self.lock().pending.pop_front();
            if let Some((routine, tx)) = next {
                // Caller may have been dropped
                let _ = tx.send(result);
                return routine;
            }
            self.call_arrived.notified().await;
        }
    }

    fn scripted(&self, routine: RoutineType) -> ServiceResult<RoutineResult> {
        let state = self.lock();
        if let Some(error) = state.errors.get(&routine) {
            return Err(error.clone());
        }
        Ok(state.results.get(&routine).copied().unwrap_or_else(|| {
            RoutineResult::for_routine(routine, StandardRoutineResult::TestPassed)
        }))
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RoutineService for FakeRoutineService {
    async fn run_routine(&self, routine: RoutineType) -> ServiceResult<RoutineResult> {
        let held = {
            let mut state = self.lock();
            state.calls.push(routine);
            if state
                .supported
                .as_ref()
                .is_some_and(|supported| !supported.contains(&routine))
            {
                return Err(ServiceError::rejected(routine, "not supported on this device"));
            }
            if self.mode == ResolveMode::Manual {
                let (tx, rx) = oneshot::channel();
                state.pending.push_back((routine, tx));
                Some(rx)
            } else {
                None
            }
        };
        debug!(routine = %routine, mode = ?self.mode, "Fake routine called");

        match (self.mode, held) {
            (ResolveMode::Delay(delay), _) => tokio::time::sleep(delay).await,
            (ResolveMode::Manual, Some(rx)) => {
                self.call_arrived.notify_one();
                let result = rx.await.map_err(|_| ServiceError::Unavailable)?;
                if let Some(result) = result {
                    return Ok(result);
                }
            }
            _ => {}
        }

        self.scripted(routine)
    }

    async fn supported_routines(&self) -> ServiceResult<Vec<RoutineType>> {
        Ok(self
            .lock()
            .supported
            .clone()
            .unwrap_or_else(|| RoutineType::ALL.to_vec()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::outcome::PowerRoutineResult;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_default_pass() {
        let service = FakeRoutineService::new();
        let result = service.run_routine(RoutineType::Memory).await.unwrap();
        assert_eq!(result, RoutineResult::PASSED);
        assert_eq!(service.calls(), vec![RoutineType::Memory]);
    }

    #[tokio::test]
    async fn test_power_default_is_zeroed() {
        let service = FakeRoutineService::new();
        let result = service.run_routine(RoutineType::BatteryCharge).await.unwrap();
        assert_eq!(
            result.power(),
            Some(&PowerRoutineResult::new(
                StandardRoutineResult::TestPassed,
                0.0,
                0
            ))
        );
    }

    #[tokio::test]
    async fn test_scripted_result_and_error() {
        let service = FakeRoutineService::new().with_result(RoutineType::CpuCache, RoutineResult::FAILED);
        service.set_error(RoutineType::CpuStress, ServiceError::Unavailable);
        assert!(service
            .run_routine(RoutineType::CpuCache)
            .await
            .unwrap()
            .is_failure());
        assert_eq!(
            service.run_routine(RoutineType::CpuStress).await,
            Err(ServiceError::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_supported_defaults_to_all() {
        let service = FakeRoutineService::new();
        assert_eq!(
            service.supported_routines().await.unwrap().len(),
            RoutineType::ALL.len()
        );
        service.set_supported(vec![RoutineType::Memory]);
        assert_eq!(
            service.supported_routines().await.unwrap(),
            vec![RoutineType::Memory]
        );
    }

    #[tokio::test]
    async fn test_unsupported_routine_rejected() {
        let service = FakeRoutineService::new()
            .with_supported(vec![RoutineType::Memory])
            .with_mode(ResolveMode::Manual);
        let err = service.run_routine(RoutineType::CpuCache).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::rejected(RoutineType::CpuCache, "not supported on this device")
        );
        assert_eq!(service.calls(), vec![RoutineType::CpuCache]);
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_mode_holds_call() {
        let service = Arc::new(FakeRoutineService::new().with_mode(ResolveMode::Manual));
        let call = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.run_routine(RoutineType::Memory).await }
        });

        assert_eq!(service.resolve_next().await, RoutineType::Memory);
        assert_eq!(call.await.unwrap().unwrap(), RoutineResult::PASSED);
        assert_eq!(service.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_mode_override() {
        let service = Arc::new(FakeRoutineService::new().with_mode(ResolveMode::Manual));
        let call = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.run_routine(RoutineType::DnsLatency).await }
        });

        service.resolve_next_with(RoutineResult::FAILED).await;
        assert!(call.await.unwrap().unwrap().is_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_mode() {
        let service =
            FakeRoutineService::new().with_mode(ResolveMode::Delay(Duration::from_secs(30)));
        let start = tokio::time::Instant::now();
        service.run_routine(RoutineType::CpuPrime).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
