//! Remaining-time estimate shown while a routine runs
//!
//! Long routines (five minutes or more) report in five-minute steps so the
//! countdown does not jitter; short ones report whole minutes.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MS_PER_MINUTE: i64 = 60_000;
const LARGE_RUNTIME_MINUTES: u32 = 5;

/// Source of the current time in milliseconds
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct FakeClock {
    current_ms: AtomicU64,
}

impl FakeClock {
    /// Create a clock at time zero
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current_ms: AtomicU64::new(0),
        }
    }

    /// Fast-forward time by `duration`
    pub fn fast_forward(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Fast-forward time by whole seconds
    pub fn fast_forward_secs(&self, secs: u64) {
        self.fast_forward(Duration::from_secs(secs));
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

/// Estimated time left for a running routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainingTime {
    /// Whole minutes left
    Minutes(u32),
    /// A short routine is past its estimate
    LessThanAMinute,
    /// A long routine is past its estimate
    FewMoreMinutes,
}

impl RemainingTime {
    /// Minutes shown on the running badge
    ///
    /// A long routine past its estimate keeps the last five-minute step;
    /// a short one shows no number.
    #[must_use]
    pub const fn badge_minutes(self) -> Option<u32> {
        match self {
            Self::Minutes(n) => Some(n),
            Self::FewMoreMinutes => Some(LARGE_RUNTIME_MINUTES),
            Self::LessThanAMinute => None,
        }
    }
}

impl fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes(1) => f.write_str("1 minute left"),
            Self::Minutes(n) => write!(f, "{n} minutes left"),
            Self::LessThanAMinute => f.write_str("Less than a minute left"),
            Self::FewMoreMinutes => f.write_str("A few more minutes"),
        }
    }
}

/// Countdown for a routine with a known expected runtime
#[derive(Debug)]
pub struct RuntimeEstimator<C: Clock> {
    runtime_minutes: u32,
    clock: C,
    started_ms: Option<u64>,
}

impl<C: Clock> RuntimeEstimator<C> {
    /// Create an estimator for a routine expected to take `runtime_minutes`
    #[must_use]
    pub const fn new(runtime_minutes: u32, clock: C) -> Self {
        Self {
            runtime_minutes,
            clock,
            started_ms: None,
        }
    }

    /// Mark the routine as started now
    pub fn start(&mut self) {
        self.started_ms = Some(self.clock.now_ms());
    }

    /// Whether the runtime counts as long
    #[must_use]
    pub const fn is_large(&self) -> bool {
        self.runtime_minutes >= LARGE_RUNTIME_MINUTES
    }

    /// Time elapsed since `start()`
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_ms.map_or(Duration::ZERO, |started| {
            Duration::from_millis(self.clock.now_ms().saturating_sub(started))
        })
    }

    /// Remaining time estimate
    #[must_use]
    pub fn remaining(&self) -> RemainingTime {
        let elapsed_ms = i64::try_from(self.elapsed().as_millis()).unwrap_or(i64::MAX);
        let left_ms = i64::from(self.runtime_minutes) * MS_PER_MINUTE - elapsed_ms;
        let minutes = left_ms.div_euclid(MS_PER_MINUTE);

        let Ok(minutes) = u32::try_from(minutes) else {
            return self.overdue();
        };
        if minutes == 0 {
            return self.overdue();
        }
        if self.is_large() {
            RemainingTime::Minutes(minutes.div_ceil(LARGE_RUNTIME_MINUTES) * LARGE_RUNTIME_MINUTES)
        } else {
            RemainingTime::Minutes(minutes)
        }
    }

    const fn overdue(&self) -> RemainingTime {
        if self.is_large() {
            RemainingTime::FewMoreMinutes
        } else {
            RemainingTime::LessThanAMinute
        }
    }
}
