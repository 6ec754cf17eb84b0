//! Worker tasks, cancellation and debouncing.
//!
//! Every unit of background work (a crawl, a provider query, a session's
//! fan-in loop, a preview) runs as a named [`Task`] on its own thread. Tasks
//! suspend only on channel operations, timers, or joining another task, so a
//! [`CancelToken`] wired into those waits is enough to stop them promptly.

use crate::error::{QuasarError, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Handle to a running task.
///
/// Dropping the handle detaches the task; it keeps running to completion.
pub struct Task<T> {
    name: String,
    handle: JoinHandle<T>,
}

/// Spawn a named task.
pub fn spawn<T, F>(name: impl Into<String>, f: F) -> Result<Task<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let handle = thread::Builder::new().name(name.clone()).spawn(f)?;
    trace!(task = %name, "Spawned task");
    Ok(Task { name, handle })
}

impl<T> Task<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task and take its result.
    pub fn join(self) -> Result<T> {
        let name = self.name;
        self.handle
            .join()
            .map_err(|_| QuasarError::TaskPanicked { name })
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Cooperative cancellation flag that can also be waited on.
///
/// [`signal`](CancelToken::signal) returns a receiver that becomes ready
/// (disconnected) the moment the token is cancelled, so it can sit in a
/// `select!` next to the channels a task is waiting on.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);
        CancelToken {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Cancel the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Receiver that disconnects on cancellation. Never yields a value.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns true if the full duration elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        crossbeam_channel::select! {
            recv(self.signal()) -> _ => false,
            recv(crossbeam_channel::after(duration)) -> _ => !self.is_cancelled(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Runs an action once a burst of triggers has settled.
///
/// Every [`schedule`](Debouncer::schedule) call cancels the previous pending
/// action and arms a fresh timer.
pub struct Debouncer {
    name: String,
    delay: Duration,
    pending: Mutex<Option<CancelToken>>,
}

impl Debouncer {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Debouncer {
            name: name.into(),
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Arm the timer; `action` runs after the delay unless re-armed or
    /// cancelled in the meantime.
    pub fn schedule<F>(&self, action: F) -> Result<Task<bool>>
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancelToken::new();
        if let Some(previous) = self.pending.lock().replace(token.clone()) {
            previous.cancel();
        }

        let delay = self.delay;
        spawn(self.name.clone(), move || {
            if token.sleep(delay) {
                action();
                true
            } else {
                false
            }
        })
    }

    /// Cancel a pending action, if any.
    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            debug!(debouncer = %self.name, "Cancelled pending action");
            pending.cancel();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
