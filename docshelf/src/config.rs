//! Configuration file for Docshelf
//!
//! JSON at `<config_dir>/docshelf/config.json`. Missing or blank fields are
//! filled with defaults and the file is rewritten, so older config files
//! upgrade themselves in place.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RECENTLY_ADDED_DAYS: u32 = 30;
pub const DEFAULT_RECENTLY_ADDED_SYNC_SECS: u64 = 60;
pub const DEFAULT_RECENTLY_OPENED_LIMIT: usize = 20;

const FAVORITES_DIR_NAME: &str = "_favorites";
const TO_READ_DIR_NAME: &str = "_to_read";
const RECENTLY_ADDED_DIR_NAME: &str = "_recently_added";
const RECENTLY_OPENED_DIR_NAME: &str = "_recently_opened";
const LEGACY_RECENT_DIR_NAME: &str = "_recent";

/// Docshelf configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the document collection
    #[serde(default)]
    pub watch_dir: PathBuf,
    /// Directory holding the metadata database
    #[serde(default)]
    pub meta_dir: PathBuf,
    #[serde(default)]
    pub favorites_dir: PathBuf,
    #[serde(default)]
    pub to_read_dir: PathBuf,
    #[serde(default, alias = "recent_dir")]
    pub recently_added_dir: PathBuf,
    #[serde(default, alias = "recent_days")]
    pub recently_added_days: u32,
    /// Minimum seconds between unforced recently-added resyncs
    #[serde(default)]
    pub recently_added_sync_secs: u64,
    #[serde(default)]
    pub recently_opened_dir: PathBuf,
    #[serde(default)]
    pub recently_opened_limit: usize,
    /// Document file patterns
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Program used to open documents
    #[serde(default)]
    pub viewer: String,
}

impl Config {
    /// A config with every field at its default
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        config.ensure_defaults();
        config
    }

    /// Load `path`, or create it with defaults if it does not exist.
    ///
    /// Returns the config and whether the file was created or upgraded.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();

        let (mut config, mut changed) = match std::fs::read_to_string(path) {
            Ok(data) => {
                let config: Config = serde_json::from_str(&data).map_err(|e| {
                    Error::ConfigError(format!("{}: {}", path.display(), e))
                })?;
                (config, false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config found, creating {}", path.display());
                (Config::default(), true)
            }
            Err(e) => return Err(e.into()),
        };

        changed |= config.ensure_defaults();
        if changed {
            config.save(path)?;
        }
        Ok((config, changed))
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data + "\n")?;
        Ok(())
    }

    /// Fill blank fields. Returns true if anything changed.
    pub fn ensure_defaults(&mut self) -> bool {
        let mut changed = false;

        if is_blank(&self.watch_dir) {
            self.watch_dir = default_watch_dir();
            changed = true;
        }
        if is_blank(&self.meta_dir) {
            self.meta_dir = default_meta_dir();
            changed = true;
        }

        let watch = self.watch_dir.clone();
        for (dir, name) in [
            (&mut self.favorites_dir, FAVORITES_DIR_NAME),
            (&mut self.to_read_dir, TO_READ_DIR_NAME),
            (&mut self.recently_added_dir, RECENTLY_ADDED_DIR_NAME),
            (&mut self.recently_opened_dir, RECENTLY_OPENED_DIR_NAME),
        ] {
            if is_blank(dir) {
                *dir = watch.join(name);
                changed = true;
            }
        }

        if self.recently_added_dir.file_name().and_then(|n| n.to_str()) == Some(LEGACY_RECENT_DIR_NAME) {
            self.recently_added_dir.set_file_name(RECENTLY_ADDED_DIR_NAME);
            changed = true;
        }

        if self.recently_added_days == 0 {
            self.recently_added_days = DEFAULT_RECENTLY_ADDED_DAYS;
            changed = true;
        }
        if self.recently_added_sync_secs == 0 {
            self.recently_added_sync_secs = DEFAULT_RECENTLY_ADDED_SYNC_SECS;
            changed = true;
        }
        if self.recently_opened_limit == 0 {
            self.recently_opened_limit = DEFAULT_RECENTLY_OPENED_LIMIT;
            changed = true;
        }
        if self.patterns.iter().all(|p| p.trim().is_empty()) {
            self.patterns = vec!["*.pdf".to_string()];
            changed = true;
        }
        if self.viewer.trim().is_empty() {
            self.viewer = default_viewer();
            changed = true;
        }

        changed
    }

    /// Path of the metadata database
    pub fn db_path(&self) -> PathBuf {
        self.meta_dir.join("metadata.sqlite")
    }

    pub fn recently_added_max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.recently_added_days) * 24 * 60 * 60)
    }

    pub fn recently_added_sync_interval(&self) -> Duration {
        Duration::from_secs(self.recently_added_sync_secs)
    }

    /// All view directories, for excluding them from scans
    pub fn view_dirs(&self) -> [&Path; 4] {
        [
            &self.favorites_dir,
            &self.to_read_dir,
            &self.recently_added_dir,
            &self.recently_opened_dir,
        ]
    }
}

/// Default config file location, honouring `DOCSHELF_CONFIG`
pub fn default_config_path() -> PathBuf {
    if let Some(path) = env_path("DOCSHELF_CONFIG") {
        return path;
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docshelf")
        .join("config.json")
}

fn default_watch_dir() -> PathBuf {
    if let Some(path) = env_path("DOCSHELF_WATCH_DIR") {
        return path;
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("Papers")
}

fn default_meta_dir() -> PathBuf {
    if let Some(path) = env_path("DOCSHELF_META_DIR") {
        return path;
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docshelf")
}

fn default_viewer() -> String {
    if cfg!(target_os = "macos") {
        "open".to_string()
    } else {
        "xdg-open".to_string()
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn with_watch(dir: &Path) -> Config {
        Config {
            watch_dir: dir.to_path_buf(),
            meta_dir: dir.join(".meta"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_fill_view_dirs_under_watch() {
        let mut config = with_watch(Path::new("/lib"));
        assert!(config.ensure_defaults());

        assert_eq!(config.favorites_dir, PathBuf::from("/lib/_favorites"));
        assert_eq!(config.to_read_dir, PathBuf::from("/lib/_to_read"));
        assert_eq!(config.recently_added_dir, PathBuf::from("/lib/_recently_added"));
        assert_eq!(config.recently_opened_dir, PathBuf::from("/lib/_recently_opened"));
        assert_eq!(config.recently_opened_limit, DEFAULT_RECENTLY_OPENED_LIMIT);
        assert_eq!(config.patterns, vec!["*.pdf"]);

        assert!(!config.ensure_defaults());
    }

    #[test]
    fn test_legacy_recent_dir_upgraded() {
        let mut config = with_watch(Path::new("/lib"));
        config.recently_added_dir = PathBuf::from("/lib/_recent");
        config.ensure_defaults();
        assert_eq!(config.recently_added_dir, PathBuf::from("/lib/_recently_added"));
    }

    #[test]
    fn test_load_or_init_creates_then_reads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");

        let (mut created, changed) = Config::load_or_init(&path).unwrap();
        assert!(changed);
        assert!(path.exists());

        created.recently_opened_limit = 7;
        created.save(&path).unwrap();

        let (loaded, changed) = Config::load_or_init(&path).unwrap();
        assert!(!changed);
        assert_eq!(loaded.recently_opened_limit, 7);
    }

    #[test]
    fn test_legacy_keys_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"watch_dir": "/lib", "meta_dir": "/meta", "recent_dir": "/lib/_recent", "recent_days": 7}"#,
        )
        .unwrap();

        let (config, changed) = Config::load_or_init(&path).unwrap();
        assert!(changed);
        assert_eq!(config.recently_added_days, 7);
        assert_eq!(config.recently_added_dir, PathBuf::from("/lib/_recently_added"));
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_or_init(&path),
            Err(Error::ConfigError(_))
        ));
    }
}
