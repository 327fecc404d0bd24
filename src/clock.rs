//! Clock/Timer abstraction (spec §2, §4.4, §5): monotonic time, deadlines,
//! and pause-aware waits, injected so the Supervisor and Job Poller are
//! deterministically testable without real sleeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Notify;

use crate::domain::ExecutionId;

/// Source of wall-clock time and delay, abstracted so tests can inject a
/// fake that resolves instantly instead of waiting on real timers.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `Utc::now()` / `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A pause/resume/cancel signal one Execution Supervisor blocks on at an
/// inter-wave boundary (spec §4.2, §5's suspension points). `PAUSE`
/// followed by `CANCEL` is honored even if the Supervisor never observed
/// the pause (spec §8 invariant 7) because `cancel()` forces the gate open
/// unconditionally and latches it that way.
#[derive(Debug)]
pub struct SuspendGate {
    paused: AtomicBool,
    cancelled: AtomicBool,
    notify: Notify,
}

impl SuspendGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// CANCEL supersedes any pending PAUSE (spec §8 invariant 7, §5).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst) && !self.is_cancelled()
    }

    /// Block until resumed or cancelled. Returns immediately if the gate is
    /// not currently paused.
    pub async fn wait_while_paused(&self) {
        while self.is_paused() {
            self.notify.notified().await;
        }
    }
}

impl Default for SuspendGate {
    fn default() -> Self {
        Self {
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }
}

/// Process-wide registry of per-Execution `SuspendGate`s, shared between the
/// Supervisor (which blocks on a gate at a wave boundary) and the Command
/// Gateway (which signals one on PAUSE/RESUME/CANCEL) so both sides observe
/// the same gate instead of each owning their own copy.
#[derive(Debug, Default)]
pub struct SuspendGateRegistry {
    gates: DashMap<ExecutionId, Arc<SuspendGate>>,
}

impl SuspendGateRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return this Execution's gate, creating it on first reference.
    pub fn gate(&self, execution_id: ExecutionId) -> Arc<SuspendGate> {
        self.gates
            .entry(execution_id)
            .or_insert_with(SuspendGate::new)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_while_paused_returns_immediately_when_not_paused() {
        let gate = SuspendGate::new();
        tokio::time::timeout(Duration::from_millis(50), gate.wait_while_paused())
            .await
            .expect("should not block");
    }

    #[tokio::test]
    async fn resume_unblocks_a_paused_waiter() {
        let gate = SuspendGate::new();
        gate.pause();
        let waiter = Arc::clone(&gate);
        let handle = tokio::spawn(async move { waiter.wait_while_paused().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.resume();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("resume should unblock waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_unblocks_even_if_pause_was_never_observed() {
        let gate = SuspendGate::new();
        gate.pause();
        gate.cancel();
        assert!(gate.is_cancelled());
        assert!(!gate.is_paused());
        tokio::time::timeout(Duration::from_millis(50), gate.wait_while_paused())
            .await
            .expect("cancel should force the gate open");
    }
}
