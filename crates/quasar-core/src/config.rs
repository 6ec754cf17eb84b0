//! Quasar configuration.
//!
//! One TOML file with a section per concern: `[general]`, `[session]`,
//! `[files]` and `[apps]`. Every key is optional.

use crate::error::{QuasarError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure for Quasar.
///
/// ## Example Configuration File (quasar.toml)
///
/// ```toml
/// [general]
/// log_level = "info"
///
/// [session]
/// preview_delay_ms = 120
///
/// [files]
/// roots = ["/home/me/projects"]
/// allowed_hidden = [".config"]
/// exclude = ["*.tmp", "node_modules"]
///
/// [apps]
/// terminal = "foot -e"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Query session tuning
    pub session: SessionConfig,

    /// Filesystem indexer settings
    pub files: FilesConfig,

    /// Application provider settings
    pub apps: AppsConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            log_level: "info".to_string(),
        }
    }
}

/// Query session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay before the preview of a newly selected item is generated
    pub preview_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            preview_delay_ms: 120,
        }
    }
}

impl SessionConfig {
    pub fn preview_delay(&self) -> Duration {
        Duration::from_millis(self.preview_delay_ms)
    }
}

/// Filesystem indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directories to crawl (empty = home directory)
    pub roots: Vec<PathBuf>,

    /// Hidden names that are still crawled
    pub allowed_hidden: Vec<String>,

    /// Name patterns to skip (`*.tmp`, `~$*`, `*cache*` or exact names)
    pub exclude: Vec<String>,

    /// Capacity of each query's result channel
    pub channel_capacity: usize,

    /// How long the crawler waits on a stalled live subscriber
    pub live_send_timeout_ms: u64,

    /// Maximum number of bytes read for a text preview
    pub preview_bytes: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        FilesConfig {
            roots: Vec::new(),
            allowed_hidden: vec![".config".to_string()],
            exclude: Vec::new(),
            channel_capacity: 1,
            live_send_timeout_ms: 5000,
            preview_bytes: 64 * 1024,
        }
    }
}

impl FilesConfig {
    pub fn live_send_timeout(&self) -> Duration {
        Duration::from_millis(self.live_send_timeout_ms)
    }

    /// Check if a directory entry should be skipped by the crawler.
    pub fn should_skip_name(&self, name: &str) -> bool {
        if name.starts_with('.') && !self.allowed_hidden.iter().any(|h| h == name) {
            return true;
        }

        self.exclude
            .iter()
            .any(|pattern| matches_simple_pattern(name, pattern))
    }
}

/// Application provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppsConfig {
    /// Additional data directories to search for `applications/*.desktop`
    pub extra_dirs: Vec<PathBuf>,

    /// Also search the system and user flatpak export directories
    pub include_flatpak: bool,

    /// Command prefix for entries that need a terminal
    pub terminal: String,

    /// Capacity of each query's result channel
    pub channel_capacity: usize,
}

impl Default for AppsConfig {
    fn default() -> Self {
        AppsConfig {
            extra_dirs: Vec::new(),
            include_flatpak: true,
            terminal: "xterm -e".to_string(),
            channel_capacity: 32,
        }
    }
}

impl Config {
    /// Load `quasar.toml` from the platform config directory, or defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path()?)
    }

    /// Load from `path`. A missing file yields the defaults; a file that
    /// sets only some keys keeps the defaults for the rest.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), "Loading configuration");
        toml::from_str(&contents)
            .map_err(|e| QuasarError::config(format!("{}: {}", path.display(), e)))
    }

    /// Write to the platform config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path()?)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| QuasarError::config(format!("cannot serialize config: {}", e)))?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, contents)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn default_config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "quasar")
            .map(|dirs| dirs.config_dir().join("quasar.toml"))
            .ok_or_else(|| QuasarError::config("no config directory for this platform"))
    }
}

/// Case-insensitive match of a file name against an exclusion pattern.
///
/// A leading `*` matches any prefix, a trailing `*` any suffix, both
/// together any infix. Without a `*` the whole name must match.
pub fn matches_simple_pattern(name: &str, pattern: &str) -> bool {
    let name = name.to_lowercase();
    let pattern = pattern.to_lowercase();

    let (anchored_start, rest) = match pattern.strip_prefix('*') {
        Some(rest) => (false, rest),
        None => (true, pattern.as_str()),
    };
    let (anchored_end, needle) = match rest.strip_suffix('*') {
        Some(needle) => (false, needle),
        None => (true, rest),
    };

    match (anchored_start, anchored_end) {
        (true, true) => name == needle,
        (true, false) => name.starts_with(needle),
        (false, true) => name.ends_with(needle),
        (false, false) => name.contains(needle),
    }
}
