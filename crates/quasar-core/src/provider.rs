//! The provider contract.
//!
//! A provider is one long-lived data source (installed applications, files
//! under a directory, ...). The session talks to every provider only through
//! this trait, so adding a source means implementing [`Provider`] and pushing
//! it into the [`ProviderSet`].
//!
//! ## Implementing a Provider
//!
//! 1. Start any slow warm-up work in `init_global` and return at once.
//! 2. Answer `query` with a channel and stream matches into it from a
//!    background task. The send-end **must** be closed when done; a provider
//!    that never closes its channel keeps the session's fan-in waiting.
//! 3. Build items with a weak handle to yourself (see
//!    [`ResultItem::new`](crate::ResultItem::new)), typically by keeping a
//!    `Weak<Self>` obtained from `Arc::new_cyclic`.
//! 4. Keep `score` pure and cheap; it is called while merging.

use crate::channel::{self, ResultReceiver};
use crate::error::{QuasarError, Result};
use crate::types::{ListRow, Preview, ResultItem, SearchTerm};
use std::sync::Arc;
use tracing::{info, warn};

/// A pluggable source of search results.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: `query` is called from the UI side
/// while `score` runs on the session's fan-in task and `select` on a launch
/// task.
pub trait Provider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Begin asynchronous warm-up (crawling, loading descriptors).
    ///
    /// Must not block. Errors are logged by the caller and are never fatal.
    fn init_global(&self) -> Result<()> {
        Ok(())
    }

    /// Stop background work started by `init_global`.
    fn deinit_global(&self) -> Result<()> {
        Ok(())
    }

    /// Start answering `term`.
    ///
    /// The returned channel carries zero or more items and is eventually
    /// closed by the provider. A term the provider cannot serve (including
    /// [`SearchTerm::none`]) gets an already-closed channel.
    fn query(&self, _term: &SearchTerm) -> ResultReceiver<ResultItem> {
        channel::closed()
    }

    /// Rank `item` against `term`. Larger is better; 0 means "not computed".
    fn score(&self, _item: &ResultItem, _term: &SearchTerm) -> u64 {
        0
    }

    /// Perform the item's action (launch, open).
    ///
    /// May block the calling task while an external operation completes.
    fn select(&self, _item: &ResultItem, _term: &SearchTerm) -> Result<()> {
        Err(QuasarError::Unsupported {
            provider: self.name().to_string(),
            operation: "select",
        })
    }

    /// Describe how `item` appears in the result list.
    fn bind_list_item(&self, _item: &ResultItem) -> ListRow {
        ListRow::default()
    }

    /// Describe the preview pane for `item`.
    ///
    /// Runs on a preview task; may do bounded I/O.
    fn bind_preview(&self, _item: &ResultItem) -> Preview {
        Preview::Empty
    }
}

/// A provider with no data. Every query is answered with a closed channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

impl Provider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }
}

/// The ordered collection of providers owned by the application.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        ProviderSet::default()
    }

    /// Append a provider; query order follows insertion order.
    pub fn push(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.push(provider);
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.iter()
    }

    /// Run `init_global` on every provider.
    ///
    /// Returns the number of providers that failed to start; failures are
    /// logged and the provider stays registered.
    pub fn init_all(&self) -> usize {
        let mut failures = 0;
        for provider in &self.providers {
            match provider.init_global() {
                Ok(()) => info!(provider = provider.name(), "Provider initialized"),
                Err(e) => {
                    failures += 1;
                    warn!(provider = provider.name(), error = %e, "Provider failed to initialize");
                }
            }
        }
        failures
    }

    /// Run `deinit_global` on every provider.
    pub fn deinit_all(&self) {
        for provider in &self.providers {
            if let Err(e) = provider.deinit_global() {
                warn!(provider = provider.name(), error = %e, "Provider failed to shut down");
            }
        }
    }

    /// Fan a term out to every provider.
    ///
    /// Each channel is tagged with the provider's position in the set.
    pub fn query_all(&self, term: &SearchTerm) -> Vec<(usize, ResultReceiver<ResultItem>)> {
        self.providers
            .iter()
            .enumerate()
            .map(|(position, provider)| (position, provider.query(term)))
            .collect()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}
