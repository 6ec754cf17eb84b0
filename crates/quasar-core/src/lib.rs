//! # Quasar Core Library
//!
//! This crate provides the query-aggregation engine behind the Quasar
//! launcher: as the user types, every registered provider is asked for
//! matches, the streamed answers are merged into one ranked list, and the
//! chosen result is handed back to its provider to launch.
//!
//! ## Architecture
//!
//! - **Channel** (`channel`): bounded result channels and the fan-in multiplexer
//! - **Task** (`task`): named worker tasks, cancellation tokens, debouncing
//! - **Provider** (`provider`): the contract every data source implements
//! - **Types** (`types`): search terms, result items, list rows, previews
//! - **Rank** (`rank`): score scale and the ranked result list
//! - **Session** (`session`): per-keystroke sessions and their events
//! - **Selection** (`selection`): debounced previews and single-flight launch
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use quasar_core::{Config, ProviderSet, Searcher};
//!
//! let config = Config::load()?;
//! let providers = ProviderSet::new().with(my_provider);
//! providers.init_all();
//!
//! let searcher = Searcher::new(providers, &config.session, None);
//! searcher.set_text("fire")?;
//! searcher.wait()?;
//! for item in searcher.snapshot().items.iter().take(10) {
//!     println!("{:?}", item);
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod provider;
pub mod rank;
pub mod selection;
pub mod session;
pub mod task;
pub mod types;

// Re-export commonly used types
pub use channel::{channel, FanIn, FanInEvent, ResultReceiver, ResultSender, SendFailure, TryRecv};
pub use config::Config;
pub use error::{QuasarError, Result};
pub use provider::{NullProvider, Provider, ProviderSet};
pub use rank::{ratio_score, RankedList, SCORE_SCALE};
pub use selection::LaunchRequest;
pub use session::{SearchEvent, Searcher, Snapshot, Status};
pub use task::{CancelToken, Debouncer, Task};
pub use types::{ListRow, Preview, ResultItem, SearchTerm};
