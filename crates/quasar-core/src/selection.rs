//! Preview and launch of the selected result.
//!
//! Both run off the UI thread. Previews are debounced so that scrolling
//! through the list does not bind a preview for every row passed over.
//! Launches are single-flight: while one `select` call is pending, further
//! launch requests are turned away.

use crate::error::{QuasarError, Result};
use crate::session::{SearchEvent, Searcher, Shared};
use crate::task::{self, Task};
use crate::types::{Preview, ResultItem, SearchTerm};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of [`Searcher::launch`].
#[derive(Debug)]
pub enum LaunchRequest {
    /// The launch task is running; join it for the provider's verdict
    Started(Task<Result<()>>),
    /// Another launch is still pending
    AlreadyRunning,
    /// There is no selected result
    NothingSelected,
}

impl Shared {
    /// Re-arm the preview debouncer for the selection in `generation`.
    pub(crate) fn schedule_preview(self: &Arc<Self>, generation: u64) {
        let shared = Arc::clone(self);
        if let Err(e) = self.preview.schedule(move || shared.bind_preview(generation)) {
            warn!(error = %e, "Failed to start preview task");
        }
    }

    fn bind_preview(&self, generation: u64) {
        let item = {
            let state = self.state.lock();
            if state.generation != generation {
                return;
            }
            match state.selected_item() {
                Some(item) => item.clone(),
                None => return,
            }
        };

        // Provider code runs without the session lock
        let preview = match item.provider() {
            Some(provider) => provider.bind_preview(&item),
            None => Preview::Error {
                message: QuasarError::ProviderGone.to_string(),
            },
        };

        let mut state = self.state.lock();
        let still_selected = state
            .selected_item()
            .map_or(false, |selected| selected.same_item(&item));
        if state.generation != generation || !still_selected {
            debug!(generation, "Selection moved on, discarding preview");
            return;
        }
        state.preview = preview.clone();
        self.emit(SearchEvent::Preview {
            generation,
            preview,
        });
    }

    fn run_launch(&self, generation: u64, item: &ResultItem, term: &SearchTerm) -> Result<()> {
        let outcome = item
            .provider()
            .ok_or(QuasarError::ProviderGone)
            .and_then(|provider| {
                let title = provider.bind_list_item(item).title;
                provider.select(item, term).map(|()| title)
            });

        match outcome {
            Ok(title) => {
                info!(generation, title = %title, "Launched");
                self.emit(SearchEvent::Launched { title });
                self.close_if_current(generation);
                Ok(())
            }
            Err(e) => {
                error!(generation, error = %e, "Launch failed");
                self.emit(SearchEvent::LaunchFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

impl Searcher {
    /// Launch the selected result.
    ///
    /// On success the session is closed; on failure it stays open so the
    /// user can retry or pick another row.
    pub fn launch(&self) -> Result<LaunchRequest> {
        let shared = self.shared();
        let (generation, item, term) = {
            let state = shared.state.lock();
            match state.selected_item() {
                Some(item) => (state.generation, item.clone(), state.term.clone()),
                None => return Ok(LaunchRequest::NothingSelected),
            }
        };

        if shared
            .launching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Launch already pending, ignoring request");
            return Ok(LaunchRequest::AlreadyRunning);
        }

        let worker = Arc::clone(shared);
        let spawned = task::spawn("launch", move || {
            let outcome = worker.run_launch(generation, &item, &term);
            worker.launching.store(false, Ordering::Release);
            outcome
        });

        match spawned {
            Ok(task) => Ok(LaunchRequest::Started(task)),
            Err(e) => {
                shared.launching.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}
