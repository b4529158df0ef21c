//! Recognition gate.
//!
//! The gate is `Open` while the loop may look for new identities and `Closed`
//! while a welcome is in flight. Closing hands out a [`GatePermit`]; the gate
//! reopens when that permit is dropped, whether the greeting succeeded,
//! failed, or unwound.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Closed,
}

/// Transition counters, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub closed: u64,
    pub reopened: u64,
}

#[derive(Debug)]
struct GateInner {
    state: GateState,
    stats: GateStats,
}

#[derive(Debug)]
pub struct Gate {
    inner: Mutex<GateInner>,
    reopened: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(GateInner {
                state: GateState::Open,
                stats: GateStats::default(),
            }),
            reopened: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        // A panic while holding the lock cannot leave the state half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> GateState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == GateState::Open
    }

    pub fn stats(&self) -> GateStats {
        self.lock().stats
    }

    /// `Open -> Closed`. Returns `None` if a batch is already in flight.
    pub fn try_close(self: &Arc<Self>) -> Option<GatePermit> {
        let mut inner = self.lock();
        if inner.state == GateState::Closed {
            return None;
        }
        inner.state = GateState::Closed;
        inner.stats.closed += 1;
        let batch = inner.stats.closed;
        drop(inner);

        tracing::debug!(batch, "gate closed");
        Some(GatePermit {
            gate: Arc::clone(self),
            batch,
        })
    }

    /// Block until the gate is open or `timeout` elapses. Returns whether it is open.
    pub fn wait_open(&self, timeout: Duration) -> bool {
        let inner = self.lock();
        let (inner, _) = self
            .reopened
            .wait_timeout_while(inner, timeout, |i| i.state == GateState::Closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.state == GateState::Open
    }

    fn reopen(&self, batch: u64) {
        let mut inner = self.lock();
        inner.state = GateState::Open;
        inner.stats.reopened += 1;
        drop(inner);

        self.reopened.notify_all();
        tracing::debug!(batch, "gate reopened");
    }
}

/// Proof that the holder owns the single in-flight batch.
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<Gate>,
    batch: u64,
}

impl GatePermit {
    /// Sequence number of this batch, starting at 1.
    pub fn batch(&self) -> u64 {
        self.batch
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.reopen(self.batch);
    }
}
