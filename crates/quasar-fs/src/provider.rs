//! The filesystem provider: file names under the indexed roots.

use crate::crawl::crawl_root;
use crate::index::LiveIndex;
use crate::node::{FileHit, NodeKind};
use directories::UserDirs;
use parking_lot::Mutex;
use quasar_core::config::FilesConfig;
use quasar_core::rank::ratio_score;
use quasar_core::task::{self, CancelToken};
use quasar_core::{
    channel, ListRow, Preview, Provider, QuasarError, Result, ResultItem, ResultReceiver,
    ResultSender, SearchTerm,
};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

/// Indexes file names below the configured roots and answers substring
/// queries against them, including files found after the query started.
pub struct FileSystemProvider {
    config: FilesConfig,
    index: Arc<LiveIndex>,
    crawl_token: Mutex<Option<CancelToken>>,
}

impl FileSystemProvider {
    /// Create the provider. Nothing is crawled until `init_global`.
    pub fn new(config: FilesConfig) -> Arc<Self> {
        let roots = if config.roots.is_empty() {
            default_roots()
        } else {
            config.roots.clone()
        };

        Arc::new_cyclic(|me: &Weak<FileSystemProvider>| {
            let origin: Weak<dyn Provider> = me.clone();
            FileSystemProvider {
                index: Arc::new(LiveIndex::new(roots, origin, config.live_send_timeout())),
                config,
                crawl_token: Mutex::new(None),
            }
        })
    }

    pub fn index(&self) -> &LiveIndex {
        &self.index
    }

    fn stop_crawl(&self) {
        if let Some(token) = self.crawl_token.lock().take() {
            token.cancel();
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    match UserDirs::new() {
        Some(dirs) => vec![dirs.home_dir().to_path_buf()],
        None => {
            warn!("Could not determine home directory, nothing to index");
            Vec::new()
        }
    }
}

/// Body of an `fs-query` task.
fn run_query(index: &LiveIndex, needle: &str, sender: ResultSender<ResultItem>) {
    let registration = index.register(needle, &sender);
    let replayed = registration.replay.len();

    for hit in registration.replay {
        if let Err(failure) = sender.send(index.item(hit)) {
            debug!(reason = %failure, "Query consumer gone during replay");
            match registration.subscription {
                Some(id) => index.drop_subscription(id, failure),
                None => sender.close(),
            }
            return;
        }
    }

    match registration.subscription {
        Some(id) => {
            debug!(subscription = id, replayed, "Replay done, following crawl");
            index.finish_replay(id);
        }
        None => {
            debug!(replayed, "Replay done, index complete");
            sender.close();
        }
    }
}

impl Provider for FileSystemProvider {
    fn name(&self) -> &str {
        "files"
    }

    #[instrument(skip(self))]
    fn init_global(&self) -> Result<()> {
        let token = CancelToken::new();
        if let Some(previous) = self.crawl_token.lock().replace(token.clone()) {
            previous.cancel();
        }

        // A re-init crawls from scratch
        let epoch = self.index.reset_roots();
        for (slot, root) in self.index.root_paths().into_iter().enumerate() {
            let index = Arc::clone(&self.index);
            let files = self.config.clone();
            let token = token.clone();
            index.begin_crawl();
            let name = format!("crawl-{}", root.display());
            let spawned = task::spawn(name, move || {
                crawl_root(&index, slot, epoch, &root, &files, &token);
            });
            if let Err(e) = spawned {
                self.index.finish_crawl();
                return Err(e);
            }
        }

        info!(roots = self.index.root_paths().len(), "File crawl started");
        Ok(())
    }

    fn deinit_global(&self) -> Result<()> {
        self.stop_crawl();
        self.index.close_subscription();
        Ok(())
    }

    fn query(&self, term: &SearchTerm) -> ResultReceiver<ResultItem> {
        let Some(text) = term.as_str() else {
            return quasar_core::channel::closed();
        };

        let (sender, receiver) = channel(self.config.channel_capacity);
        let index = Arc::clone(&self.index);
        let needle = text.to_lowercase();
        let worker = sender.clone();
        if let Err(e) = task::spawn("fs-query", move || run_query(&index, &needle, worker)) {
            warn!(error = %e, "Failed to start file query");
            sender.close();
        }
        receiver
    }

    fn score(&self, item: &ResultItem, term: &SearchTerm) -> u64 {
        match (item.payload::<FileHit>(), term.as_str()) {
            (Some(hit), Some(text)) => {
                ratio_score(text.chars().count(), hit.name().chars().count())
            }
            _ => 0,
        }
    }

    fn select(&self, item: &ResultItem, _term: &SearchTerm) -> Result<()> {
        let hit = item
            .payload::<FileHit>()
            .ok_or_else(|| QuasarError::launch("file", "not a file result"))?;
        open::that(&hit.path).map_err(|e| QuasarError::launch(hit.path.display().to_string(), e))
    }

    fn bind_list_item(&self, item: &ResultItem) -> ListRow {
        match item.payload::<FileHit>() {
            Some(hit) => {
                let parent = hit
                    .path
                    .parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                ListRow::new(hit.name(), parent)
            }
            None => ListRow::default(),
        }
    }

    fn bind_preview(&self, item: &ResultItem) -> Preview {
        let Some(hit) = item.payload::<FileHit>() else {
            return Preview::Empty;
        };
        if hit.kind == NodeKind::Image {
            return Preview::Image {
                path: hit.path.clone(),
            };
        }

        match read_head(&hit.path, self.config.preview_bytes) {
            Ok((bytes, truncated)) => Preview::Text {
                content: String::from_utf8_lossy(&bytes).into_owned(),
                truncated,
            },
            Err(e) => Preview::Error {
                message: e.to_string(),
            },
        }
    }
}

impl Drop for FileSystemProvider {
    fn drop(&mut self) {
        self.stop_crawl();
    }
}

impl std::fmt::Debug for FileSystemProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemProvider")
            .field("index", &self.index)
            .finish()
    }
}

/// Read at most `limit` bytes; the flag says whether the file was longer.
fn read_head(path: &std::path::Path, limit: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    file.take(limit as u64 + 1).read_to_end(&mut bytes)?;
    let truncated = bytes.len() > limit;
    bytes.truncate(limit);
    Ok((bytes, truncated))
}
