//! Background crawl of one indexed root.

use crate::index::LiveIndex;
use crate::node::{IndexNode, NodeKind};
use quasar_core::config::FilesConfig;
use quasar_core::CancelToken;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

/// Counters reported when a crawl ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Walk `path` depth-first and append every entry to root slot `root`.
///
/// The caller must have called [`LiveIndex::begin_crawl`]; this function
/// calls `finish_crawl` when it returns. Entries land in index epoch `epoch`
/// and the walk stops once a reset has superseded it.
#[instrument(skip(index, files, token), fields(root = %path.display()))]
pub(crate) fn crawl_root(
    index: &LiveIndex,
    root: usize,
    epoch: u64,
    path: &Path,
    files: &FilesConfig,
    token: &CancelToken,
) -> CrawlStats {
    let start = Instant::now();
    let mut stats = CrawlStats::default();

    // Child positions from the root down to the directory being filled
    let mut stack: Vec<usize> = Vec::new();

    let mut entries = WalkDir::new(path)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !files.should_skip_name(&entry.file_name().to_string_lossy())
        });

    while let Some(entry) = entries.next() {
        if token.is_cancelled() {
            stats.cancelled = true;
            break;
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                stats.skipped += 1;
                continue;
            }
        };

        stack.truncate(entry.depth() - 1);
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().is_dir();
        let node = if is_dir {
            IndexNode::directory(name)
        } else {
            IndexNode::file(name, NodeKind::from_path(entry.path()))
        };

        match index.append_in(epoch, root, &stack, entry.path(), node) {
            Some(position) if is_dir => {
                stats.directories += 1;
                stack.push(position);
            }
            Some(_) => stats.files += 1,
            None if token.is_cancelled() => {
                stats.cancelled = true;
                break;
            }
            None => {
                warn!(path = %entry.path().display(), "Parent missing from index, skipping");
                stats.skipped += 1;
                if is_dir {
                    entries.skip_current_dir();
                }
            }
        }
    }

    index.finish_crawl();
    info!(
        files = stats.files,
        directories = stats.directories,
        skipped = stats.skipped,
        cancelled = stats.cancelled,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Crawl complete"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FileHit;
    use quasar_core::{channel, NullProvider, Provider};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Weak;
    use std::time::Duration;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("docs/deep")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::create_dir_all(root.join(".config/app")).unwrap();
        fs::write(root.join("docs/report.txt"), "quarterly").unwrap();
        fs::write(root.join("docs/deep/report.png"), [0u8; 4]).unwrap();
        fs::write(root.join(".cache/report.txt"), "hidden").unwrap();
        fs::write(root.join(".config/app/report.toml"), "x = 1").unwrap();
        fs::write(root.join(".hidden-report"), "hidden").unwrap();
        fs::write(root.join("scratch.tmp"), "report").unwrap();
        dir
    }

    fn crawl(dir: &TempDir, files: &FilesConfig) -> (LiveIndex, CrawlStats) {
        let origin: Weak<dyn Provider> = Weak::<NullProvider>::new();
        let index = LiveIndex::new(vec![dir.path().to_path_buf()], origin, Duration::from_secs(1));
        let epoch = index.reset_roots();
        index.begin_crawl();
        let stats = crawl_root(&index, 0, epoch, dir.path(), files, &CancelToken::new());
        (index, stats)
    }

    fn replay(index: &LiveIndex, needle: &str) -> Vec<FileHit> {
        let (tx, _rx) = channel(1);
        index.register(needle, &tx).replay
    }

    #[test]
    fn test_crawl_skips_hidden_except_config() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let dir = tree();
        let mut files = FilesConfig::default();
        files.exclude = vec!["*.tmp".to_string()];

        let (index, stats) = crawl(&dir, &files);
        assert!(!index.is_crawling());
        assert!(!stats.cancelled);
        assert_eq!(stats.files, 3);

        let hits = replay(&index, "report");
        let paths: Vec<PathBuf> = hits.iter().map(|h| h.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                dir.path().join(".config/app/report.toml"),
                dir.path().join("docs/deep/report.png"),
                dir.path().join("docs/report.txt"),
            ]
        );
        assert_eq!(hits[1].kind, NodeKind::Image);
        assert_eq!(hits[2].kind, NodeKind::Text);
    }

    #[test]
    fn test_directories_never_match() {
        let dir = tree();
        let (index, stats) = crawl(&dir, &FilesConfig::default());
        assert_eq!(stats.directories, 4);

        assert!(replay(&index, "docs").is_empty());
        assert!(replay(&index, "deep").is_empty());
    }

    #[test]
    fn test_cancelled_crawl_stops() {
        let dir = tree();
        let origin: Weak<dyn Provider> = Weak::<NullProvider>::new();
        let index = LiveIndex::new(vec![dir.path().to_path_buf()], origin, Duration::from_secs(1));
        let token = CancelToken::new();
        token.cancel();

        index.begin_crawl();
        let stats = crawl_root(&index, 0, 0, dir.path(), &FilesConfig::default(), &token);
        assert!(stats.cancelled);
        assert_eq!(index.file_count(), 0);
        assert!(!index.is_crawling());
    }
}
