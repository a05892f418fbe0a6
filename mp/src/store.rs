//! Saved-state store
//!
//! A flat JSON object in the user's config directory holding the saved working
//! directory and the debounce interval. Missing or corrupt documents read as
//! empty; unknown keys survive a write.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::orchestrator::{DEFAULT_DEBOUNCE_MS, clamp_debounce_ms};

const WORKING_DIRECTORY_KEY: &str = "working_directory";
const DEBOUNCE_KEY: &str = "debounce_ms";

/// Environment variable naming a default project directory
pub const PROJECT_DIR_ENV: &str = "MAGIC_PROMPT_DIR";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handle on the saved-state document
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    doc: Map<String, Value>,
}

impl ConfigStore {
    /// `$XDG_CONFIG_HOME/magic-prompt/config.json`, else `~/.config/magic-prompt/config.json`
    pub fn default_path() -> Option<PathBuf> {
        let base = match std::env::var_os("XDG_CONFIG_HOME") {
            Some(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
            _ => dirs::home_dir()?.join(".config"),
        };
        Some(base.join("magic-prompt").join("config.json"))
    }

    /// Load the store from its default location
    pub fn open_default() -> Option<Self> {
        Self::default_path().map(Self::load)
    }

    /// Load the document at `path`, degrading to an empty one on any problem
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "ConfigStore::load: called");
        let doc = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    warn!(?path, "ConfigStore::load: document is not an object, ignoring");
                    Map::new()
                }
                Err(e) => {
                    warn!(?path, error = %e, "ConfigStore::load: corrupt document, ignoring");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!(?path, error = %e, "ConfigStore::load: unreadable, ignoring");
                Map::new()
            }
        };
        Self { path, doc }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    /// Saved project directory, if it still exists
    pub fn saved_directory(&self) -> Option<PathBuf> {
        let dir = self.doc.get(WORKING_DIRECTORY_KEY)?.as_str()?;
        let dir = PathBuf::from(dir);
        dir.is_dir().then_some(dir)
    }

    /// Persist `dir` (canonicalized) as the project directory
    pub fn save_directory(&mut self, dir: &Path) -> Result<PathBuf, StoreError> {
        debug!(?dir, "ConfigStore::save_directory: called");
        let canonical = dir
            .canonicalize()
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| StoreError::NotADirectory(dir.to_path_buf()))?;
        self.doc.insert(
            WORKING_DIRECTORY_KEY.to_string(),
            Value::String(canonical.to_string_lossy().to_string()),
        );
        self.save()?;
        Ok(canonical)
    }

    /// Debounce interval in milliseconds, clamped to the supported range
    pub fn debounce_ms(&self) -> u64 {
        self.doc
            .get(DEBOUNCE_KEY)
            .and_then(Value::as_u64)
            .map(clamp_debounce_ms)
            .unwrap_or(DEFAULT_DEBOUNCE_MS)
    }

    /// Persist a debounce interval; returns the clamped value actually stored
    pub fn set_debounce_ms(&mut self, ms: u64) -> Result<u64, StoreError> {
        let clamped = clamp_debounce_ms(ms);
        debug!(ms, clamped, "ConfigStore::set_debounce_ms: called");
        self.doc.insert(DEBOUNCE_KEY.to_string(), Value::from(clamped));
        self.save()?;
        Ok(clamped)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.doc).unwrap_or_else(|_| "{}".to_string())
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(&self.doc)?;
        fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Expand a leading `~` to the home directory
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Pick the project directory
///
/// Order: explicit flag, saved directory, `MAGIC_PROMPT_DIR`, current directory.
/// Only the explicit flag is returned without checking that it exists; the
/// scanner reports that case.
pub fn resolve_working_directory(explicit: Option<&Path>, store: Option<&ConfigStore>) -> PathBuf {
    if let Some(dir) = explicit {
        debug!(?dir, "resolve_working_directory: from flag");
        return dir.to_path_buf();
    }
    if let Some(dir) = store.and_then(ConfigStore::saved_directory) {
        debug!(?dir, "resolve_working_directory: from saved config");
        return dir;
    }
    if let Ok(env_dir) = std::env::var(PROJECT_DIR_ENV) {
        let dir = expand_tilde(&env_dir);
        if dir.is_dir() {
            debug!(?dir, "resolve_working_directory: from environment");
            return dir;
        }
        warn!(?dir, "resolve_working_directory: {} is not a directory", PROJECT_DIR_ENV);
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
