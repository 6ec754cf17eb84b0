//! Result channels and the fan-in multiplexer.
//!
//! A provider answers a query with a [`ResultReceiver`] and keeps the matching
//! [`ResultSender`] for itself (or hands it to a background task). The two
//! ends close independently:
//!
//! - the send-end is closed explicitly with [`ResultSender::close`], which
//!   applies to every clone of that sender;
//! - the receive-end is closed by dropping the [`ResultReceiver`], after which
//!   every send fails with [`SendFailure::Disconnected`].
//!
//! Whoever opens a channel for a query must eventually close its send-end.
//! The consumer's [`FanIn`] only finishes once every channel it waits on has
//! reported [`FanInEvent::Closed`].
//!
//! Channels are bounded; a capacity of 0 makes every send a rendezvous with a
//! receive.

use crate::task::CancelToken;
use crossbeam_channel::{Receiver, Select, SendTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Create a bounded result channel.
pub fn channel<T>(capacity: usize) -> (ResultSender<T>, ResultReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        ResultSender {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        ResultReceiver { rx },
    )
}

/// Create a channel whose send-end is already closed.
///
/// This is the answer to a query a provider cannot serve.
pub fn closed<T>() -> ResultReceiver<T> {
    let (tx, rx) = channel(0);
    tx.close();
    rx
}

/// Why a send did not deliver its item.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The send-end was closed before or during the send
    #[error("send-end of the channel is closed")]
    Closed,

    /// The receive-end was dropped
    #[error("receiver is gone")]
    Disconnected,

    /// The receiver did not take the item within the allowed time
    #[error("timed out waiting for the receiver")]
    TimedOut,
}

/// Outcome of a non-blocking or timed receive.
#[derive(Debug, PartialEq, Eq)]
pub enum TryRecv<T> {
    /// An item was available
    Item(T),
    /// Nothing yet, but the channel is still open
    Empty,
    /// The send-end is closed and the queue is drained
    Closed,
}

/// Producer half of a result channel.
///
/// All clones share one send-end, so closing any clone closes the channel for
/// every producer. A send that is already blocked when the channel is closed
/// still completes if the receiver takes the item.
pub struct ResultSender<T> {
    slot: Arc<Mutex<Option<Sender<T>>>>,
}

impl<T> Clone for ResultSender<T> {
    fn clone(&self) -> Self {
        ResultSender {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> ResultSender<T> {
    // The lock only guards the handle itself; it is released before any
    // blocking send.
    fn handle(&self) -> Option<Sender<T>> {
        self.slot.lock().clone()
    }

    /// Send an item, waiting for space in the queue.
    pub fn send(&self, item: T) -> Result<(), SendFailure> {
        let tx = self.handle().ok_or(SendFailure::Closed)?;
        tx.send(item).map_err(|_| SendFailure::Disconnected)
    }

    /// Send an item, giving up after `timeout`.
    pub fn send_timeout(&self, item: T, timeout: Duration) -> Result<(), SendFailure> {
        let tx = self.handle().ok_or(SendFailure::Closed)?;
        tx.send_timeout(item, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(_) => SendFailure::TimedOut,
            SendTimeoutError::Disconnected(_) => SendFailure::Disconnected,
        })
    }

    /// Close the send-end. Idempotent.
    pub fn close(&self) {
        self.slot.lock().take();
    }

    /// Whether the send-end has been closed.
    pub fn is_closed(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Whether two senders feed the same channel.
    pub fn same_channel(&self, other: &ResultSender<T>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T> std::fmt::Debug for ResultSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer half of a result channel. Dropping it closes the receive-end.
pub struct ResultReceiver<T> {
    rx: Receiver<T>,
}

impl<T> ResultReceiver<T> {
    /// Wait for the next item. `None` means the channel is closed and drained,
    /// and stays `None` for every later call.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Take an item if one is ready.
    pub fn try_recv(&self) -> TryRecv<T> {
        match self.rx.try_recv() {
            Ok(item) => TryRecv::Item(item),
            Err(TryRecvError::Empty) => TryRecv::Empty,
            Err(TryRecvError::Disconnected) => TryRecv::Closed,
        }
    }

    /// Drain the channel until it closes.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.recv())
    }

    /// Close the receive-end. Pending and future sends fail.
    pub fn close(self) {}

    pub(crate) fn as_crossbeam(&self) -> &Receiver<T> {
        &self.rx
    }
}

impl<T> std::fmt::Debug for ResultReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultReceiver")
            .field("queued", &self.rx.len())
            .finish()
    }
}

/// What woke a [`FanIn`] up.
#[derive(Debug)]
pub enum FanInEvent<T> {
    /// A channel delivered an item; keep waiting on it
    Item { source: usize, item: T },
    /// A channel closed and was dropped from the wait set
    Closed { source: usize },
    /// The cancellation token fired; every channel has been abandoned
    Cancelled,
    /// No channels are left to wait on
    Drained,
}

/// Waits on many result channels plus a cancellation signal at once.
///
/// Each channel is tagged with a caller-chosen `source` number that is echoed
/// back in [`FanInEvent`]s.
pub struct FanIn<T> {
    sources: Vec<(usize, ResultReceiver<T>)>,
    token: CancelToken,
}

impl<T> FanIn<T> {
    pub fn new(token: CancelToken) -> Self {
        FanIn {
            sources: Vec::new(),
            token,
        }
    }

    /// Add a channel to the wait set.
    pub fn push(&mut self, source: usize, receiver: ResultReceiver<T>) {
        self.sources.push((source, receiver));
    }

    /// Number of channels still open.
    pub fn open(&self) -> usize {
        self.sources.len()
    }

    /// Block until one channel or the cancellation signal is ready.
    pub fn next(&mut self) -> FanInEvent<T> {
        if self.token.is_cancelled() {
            self.abandon();
            return FanInEvent::Cancelled;
        }
        if self.sources.is_empty() {
            return FanInEvent::Drained;
        }

        let (position, outcome) = {
            let mut select = Select::new();
            let cancel = select.recv(self.token.signal());
            for (_, receiver) in &self.sources {
                select.recv(receiver.as_crossbeam());
            }

            let oper = select.select();
            let index = oper.index();
            if index == cancel {
                let _ = oper.recv(self.token.signal());
                (None, Err(crossbeam_channel::RecvError))
            } else {
                let position = index - 1;
                let outcome = oper.recv(self.sources[position].1.as_crossbeam());
                (Some(position), outcome)
            }
        };

        match (position, outcome) {
            (None, _) => {
                self.abandon();
                FanInEvent::Cancelled
            }
            (Some(position), Ok(item)) => FanInEvent::Item {
                source: self.sources[position].0,
                item,
            },
            (Some(position), Err(_)) => {
                let (source, _) = self.sources.remove(position);
                FanInEvent::Closed { source }
            }
        }
    }

    /// Drop every receive-end.
    fn abandon(&mut self) {
        self.sources.clear();
    }
}
