// SPDX-License-Identifier: MIT

//! Clock abstraction for testable time handling.
//!
//! Every loop, heartbeat, and retention window in the supervisor reads time
//! through this trait instead of calling `Utc::now()` / `Instant::now()`
//! directly, so tests can advance a [`FakeClock`] deterministically instead
//! of sleeping.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// A clock that provides the current time, both monotonic (for elapsed-time
/// measurements) and wall-clock (for timestamps persisted to the store).
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant, used for measuring elapsed durations.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for timestamps written to the store.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time.
///
/// Monotonic and wall-clock components advance together so that elapsed-time
/// checks (timeouts, staleness thresholds) and persisted timestamps stay
/// consistent under test.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

struct FakeClockState {
    instant: Instant,
    utc: DateTime<Utc>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                instant: Instant::now(),
                utc: DateTime::UNIX_EPOCH,
            })),
        }
    }

    /// Advance both clock components by the given duration.
    pub fn advance(&self, duration: std::time::Duration) {
        let mut state = self.inner.lock();
        state.instant += duration;
        state.utc += chrono::Duration::from_std(duration).unwrap_or_default();
    }

    /// Pin the wall-clock component to a specific instant.
    pub fn set_utc(&self, utc: DateTime<Utc>) {
        self.inner.lock().utc = utc;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().instant
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.lock().utc
    }
}
