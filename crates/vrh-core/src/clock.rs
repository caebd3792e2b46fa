//! External clock collaborator
//!
//! Components never read wall time themselves; the ledger reads one timestamp
//! per call from a `Clock` and passes it down explicitly.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Timestamp;

/// Source of "current chain time"
pub trait Clock: Send + Sync {
    /// Current timestamp in seconds
    fn now(&self) -> Timestamp;
}

/// Manually advanced clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move time forward; returns the new timestamp
    pub fn advance(&self, seconds: u64) -> Timestamp {
        self.now.fetch_add(seconds, Ordering::SeqCst) + seconds
    }

    /// Advance to the next multiple of `period`
    pub fn advance_to_boundary(&self, period: u64) -> Timestamp {
        let now = self.now();
        let target = (now / period + 1) * period;
        self.advance(target - now)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}
