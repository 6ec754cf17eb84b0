//! The per-keystroke query session.
//!
//! A [`Searcher`] owns the provider set and exactly one live session. Every
//! text change supersedes the previous session: its token is cancelled and the
//! generation counter bumped while the state lock is held, so a fan-in task
//! that wakes up afterwards always sees that it is stale and leaves the result
//! list alone.
//!
//! ```text
//! set_text ──► query() on every provider ──► FanIn ──► RankedList ──► SearchEvent
//!    │                                         ▲
//!    └──────────── cancel previous token ──────┘
//! ```

use crate::channel::{FanIn, FanInEvent};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::provider::ProviderSet;
use crate::rank::RankedList;
use crate::task::{self, CancelToken, Debouncer, Task};
use crate::types::{Preview, ResultItem, SearchTerm};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Progress of the current session, as shown next to the search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No active search
    Waiting,
    /// Providers are still streaming
    Searching { results: usize },
    /// Every provider closed its channel
    Complete { results: usize },
    /// The search was stopped before every provider finished
    Stopped { results: usize },
}

/// Notifications for a front end.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    Status(Status),

    /// The ranked list or the selection changed
    ResultsChanged { generation: u64, results: usize },

    /// The debounced preview for the selected item is ready
    Preview { generation: u64, preview: Preview },

    /// The selected item was launched; the session has been closed
    Launched { title: String },

    /// The launch failed; the session stays open
    LaunchFailed { message: String },
}

/// A consistent copy of the session, taken under the state lock.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub term: SearchTerm,
    pub status: Status,
    pub items: Vec<ResultItem>,
    pub selected: Option<usize>,
    pub preview: Preview,
}

pub(crate) struct SessionState {
    pub(crate) generation: u64,
    pub(crate) term: SearchTerm,
    pub(crate) token: CancelToken,
    pub(crate) results: RankedList,
    pub(crate) selected: Option<usize>,
    pub(crate) explicit: bool,
    pub(crate) status: Status,
    pub(crate) preview: Preview,
}

impl SessionState {
    fn new(generation: u64, term: SearchTerm, token: CancelToken) -> Self {
        let status = if term.is_none() {
            Status::Waiting
        } else {
            Status::Searching { results: 0 }
        };
        SessionState {
            generation,
            term,
            token,
            results: RankedList::new(),
            selected: None,
            explicit: false,
            status,
            preview: Preview::Empty,
        }
    }

    /// Whether work captured for `generation` may still touch this state.
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.generation == generation && !self.token.is_cancelled()
    }

    pub(crate) fn selected_item(&self) -> Option<&ResultItem> {
        self.selected.and_then(|index| self.results.get(index))
    }
}

pub(crate) struct Shared {
    pub(crate) providers: ProviderSet,
    pub(crate) generation: AtomicU64,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) fan_in: Mutex<Option<(u64, Task<()>)>>,
    pub(crate) events: Option<Sender<SearchEvent>>,
    pub(crate) preview: Debouncer,
    pub(crate) launching: AtomicBool,
}

impl Shared {
    pub(crate) fn emit(&self, event: SearchEvent) {
        if let Some(events) = &self.events {
            // A front end that stopped listening is not our problem
            let _ = events.send(event);
        }
    }

    /// Cancel the current session and install a fresh one for `term`.
    fn replace_session(&self, term: SearchTerm) -> (u64, CancelToken) {
        let mut state = self.state.lock();
        self.replace_locked(&mut state, term)
    }

    fn replace_locked(&self, state: &mut SessionState, term: SearchTerm) -> (u64, CancelToken) {
        state.token.cancel();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancelToken::new();
        *state = SessionState::new(generation, term, token.clone());
        self.emit(SearchEvent::Status(state.status));
        (generation, token)
    }

    /// Close the session `generation` if it is still the current one.
    pub(crate) fn close_if_current(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        self.replace_locked(&mut state, SearchTerm::none());
        self.preview.cancel();
        true
    }

    fn run_fan_in(self: &Arc<Self>, generation: u64, term: SearchTerm, mut fan_in: FanIn<ResultItem>) {
        loop {
            match fan_in.next() {
                FanInEvent::Item { source, item } => {
                    let top_changed = {
                        let mut state = self.state.lock();
                        if !state.is_live(generation) {
                            debug!(generation, "Session superseded, dropping late result");
                            return;
                        }

                        let index = state.results.insert(item, &term);
                        let results = state.results.len();
                        let top_changed = if !state.explicit {
                            state.selected = Some(0);
                            index == 0
                        } else {
                            // Keep pointing at the item the user picked
                            if let Some(selected) = state.selected.filter(|s| index <= *s) {
                                state.selected = Some(selected + 1);
                            }
                            false
                        };
                        state.status = Status::Searching { results };
                        trace!(generation, source, index, results, "Merged result");
                        self.emit(SearchEvent::Status(state.status));
                        self.emit(SearchEvent::ResultsChanged {
                            generation,
                            results,
                        });
                        top_changed
                    };

                    if top_changed {
                        self.schedule_preview(generation);
                    }
                    std::thread::yield_now();
                }
                FanInEvent::Closed { source } => {
                    trace!(generation, source, "Provider finished");
                }
                FanInEvent::Drained => {
                    let mut state = self.state.lock();
                    if state.is_live(generation) {
                        let results = state.results.len();
                        state.status = Status::Complete { results };
                        debug!(generation, results, "Search complete");
                        self.emit(SearchEvent::Status(state.status));
                    }
                    return;
                }
                FanInEvent::Cancelled => {
                    debug!(generation, "Session cancelled");
                    return;
                }
            }
        }
    }
}

/// Front door for a search UI: text changes, selection, launch.
///
/// Methods take `&self` and may be called from any thread, but they are
/// designed for a single UI thread issuing events in order.
pub struct Searcher {
    shared: Arc<Shared>,
}

impl Searcher {
    /// Create a searcher over `providers`.
    ///
    /// Events are delivered on `events` when given; the channel should be
    /// unbounded since events are sent while the session lock is held.
    pub fn new(
        providers: ProviderSet,
        config: &SessionConfig,
        events: Option<Sender<SearchEvent>>,
    ) -> Self {
        Searcher {
            shared: Arc::new(Shared {
                providers,
                generation: AtomicU64::new(0),
                state: Mutex::new(SessionState::new(0, SearchTerm::none(), CancelToken::new())),
                fan_in: Mutex::new(None),
                events,
                preview: Debouncer::new("preview", config.preview_delay()),
                launching: AtomicBool::new(false),
            }),
        }
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.shared.providers
    }

    /// Handle a change of the search text.
    ///
    /// Returns the generation of the new session.
    #[instrument(skip(self), fields(providers = self.shared.providers.len()))]
    pub fn set_text(&self, text: &str) -> Result<u64> {
        let term = SearchTerm::new(text);
        self.shared.preview.cancel();
        let (generation, token) = self.shared.replace_session(term.clone());
        if term.is_none() {
            return Ok(generation);
        }

        let mut fan_in = FanIn::new(token);
        for (position, receiver) in self.shared.providers.query_all(&term) {
            fan_in.push(position, receiver);
        }

        let shared = Arc::clone(&self.shared);
        let task = task::spawn(format!("fan-in-{}", generation), move || {
            shared.run_fan_in(generation, term, fan_in)
        })?;

        let mut slot = self.shared.fan_in.lock();
        if slot.as_ref().map_or(true, |(current, _)| *current < generation) {
            *slot = Some((generation, task));
        }
        Ok(generation)
    }

    /// Select the row at `index`.
    ///
    /// An explicit selection stops the session from jumping back to the top
    /// result as new items arrive. Returns false if there is no such row.
    pub fn select_index(&self, index: usize, explicit: bool) -> bool {
        let generation = {
            let mut state = self.shared.state.lock();
            if index >= state.results.len() {
                return false;
            }
            state.selected = Some(index);
            state.explicit |= explicit;
            self.shared.emit(SearchEvent::ResultsChanged {
                generation: state.generation,
                results: state.results.len(),
            });
            state.generation
        };

        self.shared.schedule_preview(generation);
        true
    }

    /// Move the selection up or down, clamped to the list.
    pub fn move_selection(&self, delta: isize) -> bool {
        let target = {
            let state = self.shared.state.lock();
            if state.results.is_empty() {
                return false;
            }
            let current = state.selected.unwrap_or(0) as isize;
            (current + delta).clamp(0, state.results.len() as isize - 1) as usize
        };
        self.select_index(target, true)
    }

    /// Stop the current search, keeping the results merged so far.
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if state.token.is_cancelled() || state.term.is_none() {
            return;
        }
        state.token.cancel();
        if let Status::Searching { results } = state.status {
            state.status = Status::Stopped { results };
            self.shared.emit(SearchEvent::Status(state.status));
        }
    }

    /// Cancel the current session and go idle.
    pub fn close(&self) {
        self.shared.preview.cancel();
        self.shared.replace_session(SearchTerm::none());
    }

    /// Wait for the current session's fan-in task to finish.
    pub fn wait(&self) -> Result<()> {
        let task = self.shared.fan_in.lock().take();
        match task {
            Some((_, task)) => task.join(),
            None => Ok(()),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.shared.state.lock();
        Snapshot {
            generation: state.generation,
            term: state.term.clone(),
            status: state.status,
            items: state.results.as_slice().to_vec(),
            selected: state.selected,
            preview: state.preview.clone(),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Drop for Searcher {
    fn drop(&mut self) {
        self.shared.preview.cancel();
        self.shared.state.lock().token.cancel();
    }
}

impl std::fmt::Debug for Searcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Searcher")
            .field("providers", &self.shared.providers)
            .field("generation", &state.generation)
            .field("term", &state.term)
            .field("status", &state.status)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::channel::{channel, ResultSender, SendFailure};
    use crate::provider::Provider;
    use crate::types::ListRow;
    use crossbeam_channel::Receiver;
    use std::sync::Weak;
    use std::time::{Duration, Instant};

    /// A provider whose channels are fed by the test.
    pub(crate) struct Gate {
        pub(crate) me: Weak<Gate>,
        pub(crate) senders: Mutex<Vec<ResultSender<ResultItem>>>,
    }

    impl Gate {
        pub(crate) fn new() -> Arc<Gate> {
            Arc::new_cyclic(|me| Gate {
                me: me.clone(),
                senders: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn item(&self, label: &'static str, score: u64) -> ResultItem {
            let origin: Weak<dyn Provider> = self.me.clone();
            ResultItem::new((label, score), origin)
        }

        /// The send-end handed out by the `n`th query.
        pub(crate) fn sender(&self, n: usize) -> ResultSender<ResultItem> {
            self.senders.lock()[n].clone()
        }
    }

    impl Provider for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn query(&self, _term: &SearchTerm) -> crate::channel::ResultReceiver<ResultItem> {
            let (tx, rx) = channel(4);
            self.senders.lock().push(tx);
            rx
        }

        fn score(&self, item: &ResultItem, _term: &SearchTerm) -> u64 {
            item.payload::<(&'static str, u64)>().map_or(0, |(_, s)| *s)
        }

        fn bind_list_item(&self, item: &ResultItem) -> ListRow {
            let label = item.payload::<(&'static str, u64)>().map_or("?", |(l, _)| *l);
            ListRow::new(label, "gate")
        }

        fn bind_preview(&self, item: &ResultItem) -> Preview {
            Preview::Text {
                content: self.bind_list_item(item).title,
                truncated: false,
            }
        }
    }

    pub(crate) fn labels(snapshot: &Snapshot) -> Vec<&'static str> {
        snapshot
            .items
            .iter()
            .map(|item| item.payload::<(&'static str, u64)>().unwrap().0)
            .collect()
    }

    pub(crate) fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn searcher(providers: &[Arc<Gate>]) -> (Searcher, Receiver<SearchEvent>) {
        let mut set = ProviderSet::new();
        for provider in providers {
            set.push(provider.clone());
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let config = SessionConfig {
            preview_delay_ms: 10,
        };
        (Searcher::new(set, &config, Some(tx)), rx)
    }

    #[test]
    fn test_empty_text_waits() {
        let gate = Gate::new();
        let (searcher, events) = searcher(&[gate.clone()]);

        searcher.set_text("   ").unwrap();
        searcher.wait().unwrap();

        assert!(gate.senders.lock().is_empty());
        assert_eq!(searcher.snapshot().status, Status::Waiting);
        assert!(matches!(
            events.try_recv(),
            Ok(SearchEvent::Status(Status::Waiting))
        ));
    }

    #[test]
    fn test_merge_order_across_providers() {
        let a = Gate::new();
        let b = Gate::new();
        let (searcher, _events) = searcher(&[a.clone(), b.clone()]);
        searcher.set_text("q").unwrap();

        a.sender(0).send(a.item("x", 5)).unwrap();
        a.sender(0).send(a.item("y", 9)).unwrap();
        b.sender(0).send(b.item("z", 7)).unwrap();
        a.sender(0).close();
        b.sender(0).close();
        searcher.wait().unwrap();

        let snapshot = searcher.snapshot();
        assert_eq!(labels(&snapshot), vec!["y", "z", "x"]);
        assert_eq!(snapshot.status, Status::Complete { results: 3 });
        assert_eq!(snapshot.selected, Some(0));
    }

    #[test]
    fn test_superseded_session_never_merges() {
        let gate = Gate::new();
        let (searcher, _events) = searcher(&[gate.clone()]);

        let first = searcher.set_text("fir").unwrap();
        let second = searcher.set_text("fire").unwrap();
        assert!(second > first);

        // The first channel may still buffer, but nothing it carries lands.
        let _ = gate.sender(0).send(gate.item("stale", 100));
        gate.sender(0).close();

        gate.sender(1).send(gate.item("fresh", 1)).unwrap();
        gate.sender(1).close();
        searcher.wait().unwrap();

        let snapshot = searcher.snapshot();
        assert_eq!(snapshot.generation, second);
        assert_eq!(labels(&snapshot), vec!["fresh"]);
    }

    #[test]
    fn test_cancel_mid_fan_in_freezes_list() {
        let gates = [Gate::new(), Gate::new(), Gate::new()];
        let (searcher, _events) = searcher(&gates);
        searcher.set_text("q").unwrap();

        gates[0].sender(0).send(gates[0].item("a", 3)).unwrap();
        gates[0].sender(0).close();
        gates[1].sender(0).send(gates[1].item("b", 4)).unwrap();
        wait_until(|| searcher.snapshot().items.len() == 2);
        let before = labels(&searcher.snapshot());

        searcher.cancel();
        searcher.wait().unwrap();

        // Both still-open channels were abandoned by the fan-in task.
        assert_eq!(
            gates[1].sender(0).send(gates[1].item("late", 9)),
            Err(SendFailure::Disconnected)
        );
        assert_eq!(
            gates[2].sender(0).send(gates[2].item("late", 9)),
            Err(SendFailure::Disconnected)
        );

        let after = searcher.snapshot();
        assert_eq!(labels(&after), before);
        assert_eq!(after.status, Status::Stopped { results: 2 });
    }

    #[test]
    fn test_explicit_selection_is_sticky() {
        let gate = Gate::new();
        let (searcher, _events) = searcher(&[gate.clone()]);
        searcher.set_text("q").unwrap();

        gate.sender(0).send(gate.item("low", 1)).unwrap();
        gate.sender(0).send(gate.item("mid", 5)).unwrap();
        wait_until(|| searcher.snapshot().items.len() == 2);

        assert!(searcher.select_index(1, true));
        assert!(!searcher.select_index(7, true));

        gate.sender(0).send(gate.item("top", 9)).unwrap();
        gate.sender(0).close();
        searcher.wait().unwrap();

        let snapshot = searcher.snapshot();
        assert_eq!(labels(&snapshot), vec!["top", "mid", "low"]);
        // Still pointing at "low", which moved down one row.
        assert_eq!(snapshot.selected, Some(2));
    }

    #[test]
    fn test_preview_follows_selection() {
        let gate = Gate::new();
        let (searcher, events) = searcher(&[gate.clone()]);
        searcher.set_text("q").unwrap();

        gate.sender(0).send(gate.item("only", 2)).unwrap();
        gate.sender(0).close();
        searcher.wait().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let preview = loop {
            match events.recv_deadline(deadline) {
                Ok(SearchEvent::Preview { preview, .. }) => break preview,
                Ok(_) => continue,
                Err(e) => panic!("no preview event: {e}"),
            }
        };

        let expected = Preview::Text {
            content: "only".to_string(),
            truncated: false,
        };
        assert_eq!(preview, expected);
        assert_eq!(searcher.snapshot().preview, expected);
    }

    #[test]
    fn test_close_goes_idle() {
        let gate = Gate::new();
        let (searcher, _events) = searcher(&[gate.clone()]);
        searcher.set_text("q").unwrap();
        searcher.close();
        searcher.wait().unwrap();

        let snapshot = searcher.snapshot();
        assert!(snapshot.term.is_none());
        assert_eq!(snapshot.status, Status::Waiting);
        assert_eq!(gate.sender(0).send(gate.item("x", 1)), Err(SendFailure::Disconnected));
    }
}
