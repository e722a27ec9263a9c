//! The injected timer queue the jitter loop schedules itself on.
//!
//! Modeled as a trait (rather than a process-wide singleton, the way the
//! original Python balancer's `LOW_RESOLUTION_TIMER_QUEUE` is) per REDESIGN
//! FLAGS: tests can swap in a queue that fires immediately instead of
//! waiting out real wall-clock jitter periods.
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A handle to a scheduled, not-yet-fired jitter task. Dropping it does not
/// cancel the task; call [`JitterHandle::abort`] for that.
pub struct JitterHandle {
    inner: JoinHandle<()>,
}

impl JitterHandle {
    /// Cancels the scheduled task if it hasn't fired yet.
    pub fn abort(&self) {
        self.inner.abort();
    }
}

/// A source of delayed task execution. `schedule` fires `task` once, after
/// `delay` has elapsed.
pub trait TimerQueue: Send + Sync {
    /// Schedules `task` to run after `delay`.
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> JitterHandle;
}

/// The default [`TimerQueue`], backed by a spawned `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimerQueue;

impl TimerQueue for TokioTimerQueue {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> JitterHandle {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        JitterHandle { inner: handle }
    }
}
