//! Project scanner
//!
//! Walks a project directory in a fixed order (lexicographic by name, parents
//! before children) and produces a bounded `Context`: file counts plus the
//! declaration signatures of recognized source files. Two scans of an
//! unchanged tree produce identical contexts.

mod signatures;

pub use signatures::{Language, MAX_SIGNATURE_CHARS, extract_signatures};

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::progress::LogSink;

/// Bytes inspected for NUL when deciding whether a file is binary
const BINARY_SNIFF_BYTES: usize = 8192;

/// Emit a progress line every this many files
const PROGRESS_EVERY_FILES: usize = 100;

/// Errors that abort a scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Cannot read directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hard caps that keep the composed prompt small
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLimits {
    /// Files visited before the walk stops
    pub max_files: usize,
    /// Files larger than this are counted but not read
    pub max_file_bytes: u64,
    /// Signatures retained across the whole tree
    pub max_signatures: usize,
    /// Cumulative signature text budget in bytes
    pub max_signature_bytes: usize,
    /// Signatures taken from any single file
    pub max_signatures_per_file: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_files: 500,
            max_file_bytes: 100 * 1024,
            max_signatures: 400,
            max_signature_bytes: 24_000,
            max_signatures_per_file: 25,
        }
    }
}

/// Directory names pruned from the walk (hidden directories are always pruned)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRules {
    dirs: BTreeSet<String>,
}

/// Dependency and build output directories skipped by default
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    "__pycache__",
    "bower_components",
    "build",
    "coverage",
    "dist",
    "env",
    "node_modules",
    "out",
    "site-packages",
    "target",
    "vendor",
    "venv",
];

impl Default for IgnoreRules {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_DIRS.iter().copied())
    }
}

impl IgnoreRules {
    pub fn new<I, S>(dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a directory with this name is pruned
    pub fn skips_dir(&self, name: &str) -> bool {
        name.starts_with('.') || self.dirs.contains(name)
    }
}

/// One extracted declaration header and the file it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    /// Path relative to the scan root, '/'-separated
    pub path: String,
    pub text: String,
}

/// Immutable summary of a scanned project
///
/// Built once per scan and shared read-only (behind an `Arc`) by every
/// enrichment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Context {
    root_path: PathBuf,
    total_files: usize,
    signatures: Vec<Signature>,
    truncated: bool,
    error_count: usize,
}

impl Context {
    pub fn new(root_path: PathBuf, total_files: usize, signatures: Vec<Signature>, truncated: bool) -> Self {
        Self {
            root_path,
            total_files,
            signatures,
            truncated,
            error_count: 0,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Files visited, including ones that contributed no signatures
    pub fn total_files(&self) -> usize {
        self.total_files
    }

    /// Signatures in traversal order
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// True when any scan cap stopped the walk early
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Files that could not be read
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Number of distinct files that contributed signatures
    pub fn files_analyzed(&self) -> usize {
        let mut count = 0;
        let mut last: Option<&str> = None;
        for sig in &self.signatures {
            if last != Some(sig.path.as_str()) {
                count += 1;
                last = Some(sig.path.as_str());
            }
        }
        count
    }

    /// Cumulative signature text size in bytes
    pub fn signature_bytes(&self) -> usize {
        self.signatures.iter().map(|s| s.text.len()).sum()
    }
}

/// Scan `root` and build a `Context`
///
/// Blocking. Per-file failures are counted in `error_count` and never abort the
/// walk; only an unreadable root fails the call.
/// Check that `root` is a readable directory and return its canonical path
pub fn check_root(root: &Path) -> Result<PathBuf, ScanError> {
    debug!(?root, "check_root: called");
    if !root.exists() {
        return Err(ScanError::DirectoryNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    fs::canonicalize(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })
}

pub fn scan(root: &Path, ignore: &IgnoreRules, limits: &ScanLimits, log: &dyn LogSink) -> Result<Context, ScanError> {
    debug!(?root, ?limits, "scan: called");
    let root = check_root(root)?;

    let mut total_files = 0usize;
    let mut error_count = 0usize;
    let mut signatures: Vec<Signature> = Vec::new();
    let mut signature_bytes = 0usize;
    let mut truncated = false;

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            e.file_name().to_str().map(|name| !ignore.skips_dir(name)).unwrap_or(false)
        });

    'walk: for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "scan: walk error, skipping entry");
                error_count += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if entry.depth() == 1 {
                log.record(&format!("Scanning {}/", relative_path(&root, entry.path())));
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        if total_files >= limits.max_files {
            debug!(max_files = limits.max_files, "scan: file cap reached");
            truncated = true;
            break;
        }
        total_files += 1;
        if total_files % PROGRESS_EVERY_FILES == 0 {
            log.record(&format!("{} files scanned...", total_files));
        }

        let path = entry.path();
        let Some(content) = read_source(path, limits.max_file_bytes, &mut error_count) else {
            continue;
        };

        let rel = relative_path(&root, path);
        for text in extract_signatures(path, &content, limits.max_signatures_per_file) {
            if signatures.len() >= limits.max_signatures {
                debug!(max_signatures = limits.max_signatures, "scan: signature cap reached");
                truncated = true;
                break 'walk;
            }
            if signature_bytes + text.len() > limits.max_signature_bytes {
                debug!(signature_bytes, "scan: signature byte budget reached");
                truncated = true;
                break 'walk;
            }
            signature_bytes += text.len();
            signatures.push(Signature { path: rel.clone(), text });
        }
    }

    if truncated {
        log.record("Scan limits reached, context truncated");
    }
    if error_count > 0 {
        warn!(error_count, "scan: some files could not be read");
    }
    info!(
        root = %root.display(),
        total_files,
        signatures = signatures.len(),
        truncated,
        "scan: complete"
    );

    Ok(Context {
        root_path: root,
        total_files,
        signatures,
        truncated,
        error_count,
    })
}

/// Read a file as text, or None if it is too large, binary, non-UTF-8 or unreadable
fn read_source(path: &Path, max_bytes: u64, error_count: &mut usize) -> Option<String> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!(?path, error = %e, "read_source: metadata failed");
            *error_count += 1;
            return None;
        }
    };
    if metadata.len() > max_bytes {
        debug!(?path, size = metadata.len(), "read_source: file too large");
        return None;
    }

    let mut bytes = Vec::with_capacity(metadata.len() as usize);
    if let Err(e) = fs::File::open(path).and_then(|mut f| f.read_to_end(&mut bytes)) {
        debug!(?path, error = %e, "read_source: read failed");
        *error_count += 1;
        return None;
    }
    if bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0) {
        debug!(?path, "read_source: binary file");
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
