//! The installed-applications provider.

use crate::desktop::DesktopEntry;
use crossbeam_channel::Receiver;
use directories::BaseDirs;
use parking_lot::{Mutex, RwLock};
use quasar_core::config::AppsConfig;
use quasar_core::rank::ratio_score;
use quasar_core::task::{self, CancelToken};
use quasar_core::{
    channel, ListRow, Preview, Provider, QuasarError, Result, ResultItem, ResultReceiver,
    SearchTerm,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, warn};

const SYSTEM_FLATPAK_EXPORTS: &str = "/var/lib/flatpak/exports/share";

/// Offers installed applications, read from desktop entries.
pub struct AppProvider {
    me: Weak<AppProvider>,
    config: AppsConfig,
    data_dirs: Vec<PathBuf>,
    entries: Arc<RwLock<Vec<Arc<DesktopEntry>>>>,
    /// Disconnects once the current load has finished
    ready: Mutex<Receiver<()>>,
    load_token: Mutex<Option<CancelToken>>,
}

impl AppProvider {
    /// Create the provider over the standard data directories.
    pub fn new(config: AppsConfig) -> Arc<Self> {
        let data_dirs = data_dirs(&config);
        Self::with_data_dirs(config, data_dirs)
    }

    /// Create the provider over an explicit list of data directories; each
    /// is searched for `applications/*.desktop`.
    pub fn with_data_dirs(config: AppsConfig, data_dirs: Vec<PathBuf>) -> Arc<Self> {
        // Nothing to wait for until a load starts
        let (_, ready) = crossbeam_channel::bounded::<()>(0);
        Arc::new_cyclic(|me| AppProvider {
            me: me.clone(),
            config,
            data_dirs,
            entries: Arc::new(RwLock::new(Vec::new())),
            ready: Mutex::new(ready),
            load_token: Mutex::new(None),
        })
    }

    pub fn data_dirs(&self) -> &[PathBuf] {
        &self.data_dirs
    }

    /// Number of loaded entries, hidden ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Block until the current load has finished.
    pub fn wait_ready(&self) {
        let ready = self.ready.lock().clone();
        let _ = ready.recv();
    }

    fn entry<'a>(&self, item: &'a ResultItem) -> Option<&'a Arc<DesktopEntry>> {
        item.payload::<Arc<DesktopEntry>>()
    }
}

/// Data directories in lookup order: user, `$XDG_DATA_DIRS`, flatpak, extra.
pub fn data_dirs(config: &AppsConfig) -> Vec<PathBuf> {
    let base = BaseDirs::new();
    let mut dirs = Vec::new();

    if let Some(base) = &base {
        dirs.push(base.data_dir().to_path_buf());
    }

    match std::env::var("XDG_DATA_DIRS") {
        Ok(value) if !value.trim().is_empty() => {
            dirs.extend(value.split(':').filter(|d| !d.is_empty()).map(PathBuf::from));
        }
        _ => {
            dirs.push(PathBuf::from("/usr/local/share"));
            dirs.push(PathBuf::from("/usr/share"));
        }
    }

    if config.include_flatpak {
        dirs.push(PathBuf::from(SYSTEM_FLATPAK_EXPORTS));
        if let Some(base) = &base {
            dirs.push(base.data_dir().join("flatpak/exports/share"));
        }
    }

    dirs.extend(config.extra_dirs.iter().cloned());

    let mut seen = HashSet::new();
    dirs.retain(|d| seen.insert(d.clone()));
    dirs
}

/// Load every entry under `<dir>/applications`, first id wins.
fn load_entries(data_dirs: &[PathBuf], token: &CancelToken) -> Vec<Arc<DesktopEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for dir in data_dirs {
        let applications = dir.join("applications");
        let mut paths = match desktop_files(&applications) {
            Ok(paths) => paths,
            Err(e) => {
                debug!(dir = %applications.display(), error = %e, "Skipping data dir");
                continue;
            }
        };
        paths.sort();

        for path in paths {
            if token.is_cancelled() {
                return entries;
            }
            match DesktopEntry::load(&path) {
                Ok(entry) => {
                    if seen.insert(entry.id.clone()) {
                        entries.push(Arc::new(entry));
                    }
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping desktop file"),
            }
        }
    }

    entries
}

fn desktop_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(false, |ext| ext == "desktop") {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn field_score(needle: &str, needle_len: usize, field: &str) -> u64 {
    if field.to_lowercase().contains(needle) {
        ratio_score(needle_len, field.chars().count())
    } else {
        0
    }
}

impl Provider for AppProvider {
    fn name(&self) -> &str {
        "apps"
    }

    #[instrument(skip(self), fields(dirs = self.data_dirs.len()))]
    fn init_global(&self) -> Result<()> {
        let token = CancelToken::new();
        if let Some(previous) = self.load_token.lock().replace(token.clone()) {
            previous.cancel();
        }

        let (done, ready) = crossbeam_channel::bounded::<()>(0);
        *self.ready.lock() = ready;

        let data_dirs = self.data_dirs.clone();
        let entries = Arc::clone(&self.entries);
        task::spawn("apps-init", move || {
            let loaded = load_entries(&data_dirs, &token);
            if token.is_cancelled() {
                debug!("Application load cancelled");
            } else {
                info!(entries = loaded.len(), "Loaded desktop entries");
                *entries.write() = loaded;
            }
            drop(done);
        })?;
        Ok(())
    }

    fn deinit_global(&self) -> Result<()> {
        if let Some(token) = self.load_token.lock().take() {
            token.cancel();
        }
        Ok(())
    }

    fn query(&self, term: &SearchTerm) -> ResultReceiver<ResultItem> {
        let Some(text) = term.as_str() else {
            return quasar_core::channel::closed();
        };

        let (sender, receiver) = channel(self.config.channel_capacity);
        let ready = self.ready.lock().clone();
        let entries = Arc::clone(&self.entries);
        let origin: Weak<dyn Provider> = self.me.clone();
        let needle = text.to_lowercase();
        let worker = sender.clone();

        let spawned = task::spawn("apps-query", move || {
            // Disconnects when the load finishes
            let _ = ready.recv();

            let matches: Vec<Arc<DesktopEntry>> = entries
                .read()
                .iter()
                .filter(|e| e.is_visible())
                .filter(|e| {
                    e.id.to_lowercase().contains(&needle) || e.name.to_lowercase().contains(&needle)
                })
                .cloned()
                .collect();

            for entry in matches {
                if worker.send(ResultItem::new(entry, origin.clone())).is_err() {
                    break;
                }
            }
            worker.close();
        });

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start application query");
            sender.close();
        }
        receiver
    }

    fn score(&self, item: &ResultItem, term: &SearchTerm) -> u64 {
        let (Some(entry), Some(text)) = (self.entry(item), term.as_str()) else {
            return 0;
        };
        let needle = text.to_lowercase();
        let needle_len = text.chars().count();
        field_score(&needle, needle_len, &entry.id).max(field_score(&needle, needle_len, &entry.name))
    }

    fn select(&self, item: &ResultItem, _term: &SearchTerm) -> Result<()> {
        let entry = self
            .entry(item)
            .ok_or_else(|| QuasarError::launch("application", "not an application result"))?;
        let argv = entry
            .command(&self.config.terminal)
            .map_err(|e| QuasarError::launch(&entry.id, e))?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| QuasarError::launch(&entry.id, "empty command line"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| QuasarError::launch(&entry.id, e))?;
        info!(id = %entry.id, pid = child.id(), "Launched application");

        // Reap the child so it does not linger as a zombie
        let id = entry.id.clone();
        task::spawn(format!("reap-{}", id), move || match child.wait() {
            Ok(status) => debug!(id = %id, %status, "Application exited"),
            Err(e) => warn!(id = %id, error = %e, "Failed to wait for application"),
        })?;
        Ok(())
    }

    fn bind_list_item(&self, item: &ResultItem) -> ListRow {
        match self.entry(item) {
            Some(entry) => {
                let row = ListRow::new(&entry.name, &entry.id);
                match &entry.icon {
                    Some(icon) => row.with_icon(icon),
                    None => row,
                }
            }
            None => ListRow::default(),
        }
    }

    fn bind_preview(&self, item: &ResultItem) -> Preview {
        match self.entry(item) {
            Some(entry) => Preview::Status {
                title: entry.name.clone(),
                description: "Launch Application".to_string(),
                icon: entry.icon.clone(),
            },
            None => Preview::Empty,
        }
    }
}

impl std::fmt::Debug for AppProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppProvider")
            .field("data_dirs", &self.data_dirs)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_entry(dir: &Path, file: &str, body: &str) {
        let applications = dir.join("applications");
        fs::create_dir_all(&applications).unwrap();
        fs::write(applications.join(file), body).unwrap();
    }

    fn fixture() -> (TempDir, TempDir) {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_entry(
            first.path(),
            "firefox.desktop",
            "[Desktop Entry]\nName=Firefox\nExec=firefox %u\nIcon=firefox\n",
        );
        write_entry(
            first.path(),
            "fire-daemon.desktop",
            "[Desktop Entry]\nName=Fire Daemon\nExec=fired\nNoDisplay=true\n",
        );
        write_entry(first.path(), "broken.desktop", "[Desktop Entry]\nName=Broken\n");
        write_entry(first.path(), "README", "not a desktop file");
        write_entry(
            second.path(),
            "firefox.desktop",
            "[Desktop Entry]\nName=Shadowed Firefox\nExec=other\n",
        );
        write_entry(
            second.path(),
            "org.example.Campfire.desktop",
            "[Desktop Entry]\nName=Campfire Chat\nExec=campfire\n",
        );
        (first, second)
    }

    fn provider(first: &TempDir, second: &TempDir) -> Arc<AppProvider> {
        let provider = AppProvider::with_data_dirs(
            AppsConfig::default(),
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
        );
        provider.init_global().unwrap();
        provider
    }

    fn names(rx: ResultReceiver<ResultItem>) -> Vec<String> {
        let mut names: Vec<String> = rx
            .iter()
            .map(|item| item.payload::<Arc<DesktopEntry>>().unwrap().name.clone())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_query_waits_for_load() {
        let (first, second) = fixture();
        let provider = provider(&first, &second);

        // Issued right after init; must still see every entry.
        let rx = provider.query(&SearchTerm::new("FIRE"));
        assert_eq!(names(rx), vec!["Campfire Chat", "Firefox"]);
        assert_eq!(provider.len(), 3);

        // Padding around the text does not change the matches
        let rx = provider.query(&SearchTerm::new("  fire "));
        assert_eq!(names(rx), vec!["Campfire Chat", "Firefox"]);
    }

    #[test]
    fn test_first_id_wins() {
        let (first, second) = fixture();
        let provider = provider(&first, &second);
        provider.wait_ready();

        let rx = provider.query(&SearchTerm::new("firefox"));
        assert_eq!(names(rx), vec!["Firefox"]);
    }

    #[test]
    fn test_none_term_is_closed() {
        let (first, second) = fixture();
        let provider = provider(&first, &second);
        assert!(provider.query(&SearchTerm::none()).recv().is_none());
    }

    #[test]
    fn test_score_prefers_tighter_field() {
        let (first, second) = fixture();
        let provider = provider(&first, &second);
        let term = SearchTerm::new("fire");

        let mut items: Vec<ResultItem> = provider.query(&term).iter().collect();
        items.sort_by_key(|item| std::cmp::Reverse(provider.score(item, &term)));
        let top = provider.bind_list_item(&items[0]);
        assert_eq!(top.title, "Firefox");
        assert_eq!(top.icon.as_deref(), Some("firefox"));

        // Id and name are both seven characters long
        assert_eq!(provider.score(&items[0], &term), ratio_score(4, 7));
        assert_eq!(provider.score(&items[0], &SearchTerm::new("zzz")), 0);
    }

    #[test]
    fn test_preview_and_launch() {
        let dir = TempDir::new().unwrap();
        write_entry(dir.path(), "truth.desktop", "[Desktop Entry]\nName=Truth\nExec=true %F\n");
        write_entry(
            dir.path(),
            "missing.desktop",
            "[Desktop Entry]\nName=Missing\nExec=/nonexistent/quasar-test-binary\n",
        );
        let provider = AppProvider::with_data_dirs(AppsConfig::default(), vec![dir.path().to_path_buf()]);
        provider.init_global().unwrap();

        let term = SearchTerm::new("t");
        let items: Vec<ResultItem> = provider.query(&term).iter().collect();
        assert_eq!(items.len(), 1);

        assert_eq!(
            provider.bind_preview(&items[0]),
            Preview::Status {
                title: "Truth".to_string(),
                description: "Launch Application".to_string(),
                icon: None,
            }
        );
        provider.select(&items[0], &term).unwrap();

        let missing: Vec<ResultItem> = provider.query(&SearchTerm::new("missing")).iter().collect();
        let err = provider.select(&missing[0], &term).unwrap_err();
        assert!(matches!(err, QuasarError::Launch { ref target, .. } if target == "missing"));
    }

    #[test]
    fn test_data_dirs_include_extras() {
        let mut config = AppsConfig::default();
        config.extra_dirs = vec![PathBuf::from("/opt/quasar-test/share")];
        config.include_flatpak = false;

        let dirs = data_dirs(&config);
        assert_eq!(dirs.last(), Some(&PathBuf::from("/opt/quasar-test/share")));
        assert!(!dirs.contains(&PathBuf::from(SYSTEM_FLATPAK_EXPORTS)));
    }
}
