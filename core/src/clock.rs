//! Engine clock: the source of "now" for ingestion timestamps and lazy reads.
//!
//! Production code uses `SystemClock`. Tests and the runner's scripted demo
//! use `ManualClock` so every instant is reproducible.

use crate::types::Timestamp;
use chrono::{Duration, Utc};
use std::sync::Mutex;

pub trait WorldClock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Reads the host's UTC wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WorldClock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { current: Mutex::new(start) }
    }

    pub fn set(&self, at: Timestamp) {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *guard = at;
    }

    /// Advance by `by`. Returns the new instant.
    pub fn advance(&self, by: Duration) -> Timestamp {
        let mut guard = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *guard += by;
        *guard
    }
}

impl WorldClock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}
