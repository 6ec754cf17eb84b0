//! Application state management.

use crossbeam_channel::Sender;
use quasar_apps::AppProvider;
use quasar_core::{Config, ProviderSet, SearchEvent, Searcher};
use quasar_fs::FileSystemProvider;
use tracing::{info, warn};

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// The search session over every provider
    pub searcher: Searcher,
}

impl App {
    /// Create the providers, start their warm-up and open a searcher.
    pub fn new(config: Config, events: Option<Sender<SearchEvent>>) -> anyhow::Result<Self> {
        let providers = ProviderSet::new()
            .with(AppProvider::new(config.apps.clone()))
            .with(FileSystemProvider::new(config.files.clone()));

        let failed = providers.init_all();
        if failed > 0 {
            warn!(failed, "Some providers failed to start");
        }

        info!(providers = ?providers, "Application initialized");

        let searcher = Searcher::new(providers, &config.session, events);
        Ok(App { config, searcher })
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.searcher.close();
        self.searcher.providers().deinit_all();
    }
}
