//! # Quasar Filesystem Provider
//!
//! Indexes file names below one or more roots and serves substring queries
//! against them while the index is still being built.
//!
//! ## Architecture
//!
//! - **Node** (`node`): the index tree and content classification
//! - **Index** (`index`): the locked tree plus the single live subscription
//! - **Crawl** (`crawl`): the background walk of one root
//! - **Provider** (`provider`): the [`quasar_core::Provider`] implementation
//!
//! A query first replays every match already in the tree. If a crawl is
//! still running, its channel then becomes the live subscription and the
//! crawler pushes new matches into it until the crawl ends or a newer query
//! takes the slot.

pub mod crawl;
pub mod index;
pub mod node;
pub mod provider;

pub use crawl::CrawlStats;
pub use index::LiveIndex;
pub use node::{FileHit, IndexNode, NodeKind};
pub use provider::FileSystemProvider;
