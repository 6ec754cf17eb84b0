//! Shared index state: the tree per root plus the live subscription slot.
//!
//! One `parking_lot::Mutex` guards everything the crawl and the query tasks
//! share. Critical sections only mutate or read the tree and swap the
//! subscription; every channel send happens after the guard is dropped.
//!
//! ## Subscription lifecycle
//!
//! ```text
//! query ──► snapshot + install (replaying) ──► replay sends ──► finish_replay
//!                                                   │                 │
//! crawl ──► append ──► send to subscriber ◄─────────┘                 ▼
//!   └─────► finish_crawl ──► close, unless still replaying ──► closed by replay
//! ```
//!
//! A newer query evicts the current subscriber by closing its channel.

use crate::node::{FileHit, IndexNode};
use parking_lot::Mutex;
use quasar_core::{Provider, ResultItem, ResultSender, SendFailure};
use std::path::{Path, PathBuf};
use std::sync::Weak;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A query waiting for files the crawl has not reached yet.
struct Subscription {
    id: u64,
    sender: ResultSender<ResultItem>,
    needle: String,
    replaying: bool,
}

struct RootTree {
    path: PathBuf,
    node: IndexNode,
}

struct IndexState {
    roots: Vec<RootTree>,
    subscription: Option<Subscription>,
    active_crawls: usize,
    next_subscription: u64,
    /// Bumped by `reset_roots`; crawls of older epochs no longer append
    epoch: u64,
}

/// What a query gets back when it registers.
pub(crate) struct Registration {
    /// Files that were already indexed, in tree order
    pub(crate) replay: Vec<FileHit>,
    /// Subscription id, if a crawl is still running
    pub(crate) subscription: Option<u64>,
}

/// The live index shared by the crawl tasks and the query tasks.
pub struct LiveIndex {
    state: Mutex<IndexState>,
    origin: Weak<dyn Provider>,
    send_timeout: Duration,
}

impl LiveIndex {
    /// Create an empty index over `roots`.
    ///
    /// Items sent to subscribers carry `origin` as their provider.
    pub fn new(roots: Vec<PathBuf>, origin: Weak<dyn Provider>, send_timeout: Duration) -> Self {
        let roots = roots
            .into_iter()
            .map(|path| RootTree {
                node: IndexNode::directory(path.to_string_lossy()),
                path,
            })
            .collect();

        LiveIndex {
            state: Mutex::new(IndexState {
                roots,
                subscription: None,
                active_crawls: 0,
                next_subscription: 1,
                epoch: 0,
            }),
            origin,
            send_timeout,
        }
    }

    pub fn root_paths(&self) -> Vec<PathBuf> {
        self.state.lock().roots.iter().map(|r| r.path.clone()).collect()
    }

    /// Build the result item for a hit.
    pub fn item(&self, hit: FileHit) -> ResultItem {
        ResultItem::new(hit, self.origin.clone())
    }

    pub fn is_crawling(&self) -> bool {
        self.state.lock().active_crawls > 0
    }

    pub fn has_subscription(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    pub fn file_count(&self) -> usize {
        self.state
            .lock()
            .roots
            .iter()
            .map(|r| r.node.file_count())
            .sum()
    }

    /// Mark one crawl as running. Call before the crawl task starts so a query
    /// issued right after `init_global` already sees the crawl as active.
    pub(crate) fn begin_crawl(&self) {
        self.state.lock().active_crawls += 1;
    }

    /// Mark one crawl as finished. When the last one ends, a subscriber that
    /// is no longer replaying is closed.
    pub(crate) fn finish_crawl(&self) {
        let mut state = self.state.lock();
        state.active_crawls = state.active_crawls.saturating_sub(1);
        if state.active_crawls > 0 {
            return;
        }

        let replaying = state.subscription.as_ref().map_or(false, |s| s.replaying);
        if !replaying {
            if let Some(subscription) = state.subscription.take() {
                debug!(subscription = subscription.id, "Crawl finished, closing live subscription");
                subscription.sender.close();
            }
        }
    }

    /// Empty every root tree and start a new crawl epoch, returned.
    pub(crate) fn reset_roots(&self) -> u64 {
        let mut state = self.state.lock();
        for root in &mut state.roots {
            root.node = IndexNode::directory(root.path.to_string_lossy());
        }
        state.epoch += 1;
        debug!(epoch = state.epoch, "Index reset");
        state.epoch
    }

    /// Append `node` under the directory at `parent` (child positions from the
    /// root) and forward it to the live subscriber if it matches.
    ///
    /// Returns the node's position among its siblings, or `None` if the
    /// parent does not exist or `epoch` has been superseded by a reset.
    pub(crate) fn append_in(
        &self,
        epoch: u64,
        root: usize,
        parent: &[usize],
        path: &Path,
        node: IndexNode,
    ) -> Option<usize> {
        let (position, forward) = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return None;
            }
            let forward = state.subscription.as_ref().and_then(|s| {
                node.matches(&s.needle)
                    .then(|| (s.id, s.sender.clone(), node.kind))
            });

            let siblings = state
                .roots
                .get_mut(root)?
                .node
                .descend_mut(parent)?
                .children
                .as_mut()?;
            siblings.push(node);
            (siblings.len() - 1, forward)
        };

        if let Some((id, sender, kind)) = forward {
            let hit = FileHit {
                path: path.to_path_buf(),
                kind,
            };
            trace!(subscription = id, path = %path.display(), "Forwarding live match");
            if let Err(failure) = sender.send_timeout(self.item(hit), self.send_timeout) {
                self.drop_subscription(id, failure);
            }
        }

        Some(position)
    }

    /// Append in the current epoch.
    #[cfg(test)]
    pub(crate) fn append(
        &self,
        root: usize,
        parent: &[usize],
        path: &Path,
        node: IndexNode,
    ) -> Option<usize> {
        let epoch = self.state.lock().epoch;
        self.append_in(epoch, root, parent, path, node)
    }

    /// Snapshot the current matches for `needle` and, if a crawl is running,
    /// make `sender` the live subscriber, evicting the previous one.
    pub(crate) fn register(&self, needle: &str, sender: &ResultSender<ResultItem>) -> Registration {
        let mut state = self.state.lock();

        let mut replay = Vec::new();
        for root in &state.roots {
            root.node.collect_matches(&root.path, needle, &mut replay);
        }

        if let Some(previous) = state.subscription.take() {
            debug!(subscription = previous.id, "Evicting live subscription");
            previous.sender.close();
        }

        let subscription = if state.active_crawls > 0 {
            let id = state.next_subscription;
            state.next_subscription += 1;
            state.subscription = Some(Subscription {
                id,
                sender: sender.clone(),
                needle: needle.to_string(),
                replaying: true,
            });
            Some(id)
        } else {
            None
        };

        Registration {
            replay,
            subscription,
        }
    }

    /// Called by a query task once its replay is over.
    ///
    /// If the crawl ended during the replay, the subscriber is closed here
    /// since the crawl could not do it.
    pub(crate) fn finish_replay(&self, id: u64) {
        let mut state = self.state.lock();
        let crawling = state.active_crawls > 0;
        let Some(subscription) = state.subscription.as_mut().filter(|s| s.id == id) else {
            return;
        };

        if crawling {
            subscription.replaying = false;
        } else if let Some(subscription) = state.subscription.take() {
            debug!(subscription = id, "Crawl finished during replay, closing");
            subscription.sender.close();
        }
    }

    /// Clear the subscription after a failed send, if it is still `id`.
    pub(crate) fn drop_subscription(&self, id: u64, failure: SendFailure) {
        let mut state = self.state.lock();
        if state.subscription.as_ref().map_or(false, |s| s.id == id) {
            if let Some(subscription) = state.subscription.take() {
                match failure {
                    SendFailure::TimedOut => {
                        warn!(subscription = id, "Live subscriber stalled, dropping it")
                    }
                    _ => debug!(subscription = id, reason = %failure, "Live subscriber gone"),
                }
                subscription.sender.close();
            }
        }
    }

    /// Close any subscriber, e.g. on shutdown.
    pub(crate) fn close_subscription(&self) {
        if let Some(subscription) = self.state.lock().subscription.take() {
            subscription.sender.close();
        }
    }
}

impl std::fmt::Debug for LiveIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LiveIndex")
            .field("roots", &state.roots.iter().map(|r| &r.path).collect::<Vec<_>>())
            .field("active_crawls", &state.active_crawls)
            .field("subscription", &state.subscription.as_ref().map(|s| s.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use quasar_core::{channel, NullProvider, TryRecv};

    fn index(timeout: Duration) -> LiveIndex {
        let origin: Weak<dyn Provider> = Weak::<NullProvider>::new();
        LiveIndex::new(vec![PathBuf::from("/r")], origin, timeout)
    }

    fn path_of(item: &ResultItem) -> PathBuf {
        item.payload::<FileHit>().unwrap().path.clone()
    }

    #[test]
    fn test_append_builds_tree() {
        let index = index(Duration::from_secs(1));
        let docs = index
            .append(0, &[], Path::new("/r/docs"), IndexNode::directory("docs"))
            .unwrap();
        index
            .append(0, &[docs], Path::new("/r/docs/a.txt"), IndexNode::file("a.txt", NodeKind::Text))
            .unwrap();
        assert!(index
            .append(0, &[7], Path::new("/r/x/b.txt"), IndexNode::file("b.txt", NodeKind::Text))
            .is_none());

        let (tx, _rx) = channel(1);
        let registration = index.register("a.t", &tx);
        assert_eq!(registration.subscription, None);
        assert_eq!(registration.replay.len(), 1);
        assert_eq!(registration.replay[0].path, PathBuf::from("/r/docs/a.txt"));
        assert_eq!(index.file_count(), 1);
    }

    #[test]
    fn test_live_match_is_forwarded() {
        let index = index(Duration::from_secs(1));
        index.begin_crawl();

        let (tx, rx) = channel(4);
        let registration = index.register("note", &tx);
        assert_eq!(registration.subscription, Some(1));
        index.finish_replay(1);

        index.append(0, &[], Path::new("/r/notes"), IndexNode::directory("notes"));
        index.append(0, &[], Path::new("/r/Note.md"), IndexNode::file("Note.md", NodeKind::Text));
        index.append(0, &[], Path::new("/r/other"), IndexNode::file("other", NodeKind::Unknown));

        match rx.try_recv() {
            TryRecv::Item(item) => assert_eq!(path_of(&item), PathBuf::from("/r/Note.md")),
            other => panic!("expected a forwarded match, got {:?}", other),
        }

        index.finish_crawl();
        assert!(!index.has_subscription());
        assert!(rx.recv().is_none());
    }

    #[test]
    fn test_dropped_receiver_clears_subscription() {
        let index = index(Duration::from_secs(1));
        index.begin_crawl();

        let (tx, rx) = channel(1);
        index.register("log", &tx);
        index.finish_replay(1);
        drop(rx);

        // Must neither panic nor deadlock, and must clear the slot.
        let position = index.append(0, &[], Path::new("/r/app.log"), IndexNode::file("app.log", NodeKind::Text));
        assert_eq!(position, Some(0));
        assert!(!index.has_subscription());
        assert!(tx.is_closed());

        index.append(0, &[], Path::new("/r/b.log"), IndexNode::file("b.log", NodeKind::Text));
        assert_eq!(index.file_count(), 2);
    }

    #[test]
    fn test_stalled_subscriber_times_out() {
        let index = index(Duration::from_millis(20));
        index.begin_crawl();

        let (tx, rx) = channel(0);
        index.register("a", &tx);
        index.finish_replay(1);

        index.append(0, &[], Path::new("/r/a"), IndexNode::file("a", NodeKind::Unknown));
        assert!(!index.has_subscription());
        assert!(rx.recv().is_none());
    }

    #[test]
    fn test_second_query_evicts_first() {
        let index = index(Duration::from_secs(1));
        index.begin_crawl();

        let (first_tx, first_rx) = channel(1);
        let (second_tx, second_rx) = channel(1);
        assert_eq!(index.register("x", &first_tx).subscription, Some(1));
        assert_eq!(index.register("x", &second_tx).subscription, Some(2));

        assert!(first_rx.recv().is_none());
        assert!(first_tx.is_closed());

        // A stale replay finishing must not touch the new subscriber.
        index.finish_replay(1);
        index.drop_subscription(1, SendFailure::Disconnected);
        assert!(index.has_subscription());
        assert!(!second_tx.is_closed());

        index.finish_replay(2);
        index.finish_crawl();
        assert!(second_rx.recv().is_none());
    }

    #[test]
    fn test_reset_drops_tree_and_stale_appends() {
        let index = index(Duration::from_secs(1));
        let old = index.reset_roots();
        index.append_in(old, 0, &[], Path::new("/r/a.txt"), IndexNode::file("a.txt", NodeKind::Text));
        assert_eq!(index.file_count(), 1);

        let new = index.reset_roots();
        assert_eq!(index.file_count(), 0);

        // A cancelled crawl that has not noticed yet must not refill the tree.
        assert!(index
            .append_in(old, 0, &[], Path::new("/r/a.txt"), IndexNode::file("a.txt", NodeKind::Text))
            .is_none());
        assert_eq!(
            index.append_in(new, 0, &[], Path::new("/r/a.txt"), IndexNode::file("a.txt", NodeKind::Text)),
            Some(0)
        );
        assert_eq!(index.file_count(), 1);
    }

    #[test]
    fn test_crawl_ending_during_replay() {
        let index = index(Duration::from_secs(1));
        index.begin_crawl();

        let (tx, rx) = channel(1);
        index.register("x", &tx);
        index.finish_crawl();

        // Still replaying: the crawl must leave the channel open.
        assert!(!tx.is_closed());
        assert!(index.has_subscription());

        index.finish_replay(1);
        assert!(!index.has_subscription());
        assert!(rx.recv().is_none());
    }
}
