//! Admission control for mutating work
//!
//! Every mutation, signal dispatch and background activation holds a
//! [`WorkGuard`] while it runs. Closing the gate rejects new work and waits
//! until every outstanding guard is dropped.

use crate::CoreError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct GateState {
    closed: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

/// Gate in front of all mutating operations
#[derive(Debug, Clone, Default)]
pub struct ShutdownGate {
    state: Arc<GateState>,
}

/// Proof of admission; releases its slot on drop
#[derive(Debug)]
pub struct WorkGuard {
    state: Arc<GateState>,
}

impl ShutdownGate {
    /// Open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one unit of work, unless the gate is closed
    pub fn enter(&self) -> Result<WorkGuard, CoreError> {
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = WorkGuard {
            state: Arc::clone(&self.state),
        };

        if self.state.closed.load(Ordering::SeqCst) {
            return Err(CoreError::RuntimeShutdown);
        }

        Ok(guard)
    }

    /// Whether the gate has been closed
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of admitted units still running
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Reject new work, then wait for admitted work to finish
    pub async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);

        loop {
            let notified = self.state.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }

            notified.await;
        }
    }
}

impl WorkGuard {
    /// Admit follow-up work tied to this unit. Never rejected, since the
    /// caller already holds a slot.
    pub fn extend(&self) -> WorkGuard {
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        WorkGuard {
            state: Arc::clone(&self.state),
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        let previous = self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.state.closed.load(Ordering::SeqCst) {
            self.state.drained.notify_waiters();
        }
    }
}
