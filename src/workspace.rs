//! Work directory and per-run temp files.
//!
//! Layout under the work directory (default `<tmp>/markdown_renderer`):
//!
//! ```text
//! markdown_renderer/
//! ├── image_cache/              persistent, see pipeline::cache
//! ├── temp_<pid>_<seq>.html     page of one run
//! └── temp_<pid>_<seq>.png      screenshot of one run
//! ```
//!
//! `seq` comes from a process-wide counter, so concurrent runs in one
//! process never share a file and runs in different processes are told
//! apart by the pid.

use crate::error::PipelineError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Prefix shared by every per-run temp file.
pub const TEMP_PREFIX: &str = "temp_";

/// A prepared work directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    /// Create `dir` and its `image_cache/` subdirectory if needed.
    pub fn prepare(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        let cache = dir.join("image_cache");
        std::fs::create_dir_all(&cache).map_err(|source| PipelineError::Workspace {
            path: cache.clone(),
            source,
        })?;
        let dir = std::path::absolute(&dir).map_err(|source| PipelineError::Workspace {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn image_cache_dir(&self) -> PathBuf {
        self.dir.join("image_cache")
    }

    /// Reserve a fresh pair of temp file names for one run.
    pub fn temp_files(&self) -> TempFiles {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let stem = format!("{}{}_{}", TEMP_PREFIX, std::process::id(), seq);
        TempFiles {
            png: self.dir.join(format!("{stem}.png")),
            html: self.dir.join(format!("{stem}.html")),
        }
    }
}

/// Temp files of one run. Removed when dropped, on success and failure
/// alike; removal problems are logged and never surface as errors.
#[derive(Debug)]
pub struct TempFiles {
    pub png: PathBuf,
    pub html: PathBuf,
}

impl TempFiles {
    fn remove_one(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed temp file {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
        }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        Self::remove_one(&self.png);
        Self::remove_one(&self.html);
    }
}

fn is_leftover(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && (name.ends_with(".png") || name.ends_with(".html"))
}

/// Delete leftover `temp_*.png` / `temp_*.html` files in `dir`.
///
/// Returns the number of files removed. A missing directory counts as clean;
/// files that cannot be removed (locked, permissions) are skipped.
pub fn clean_up_dir(dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!("Cannot list work directory {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_leftover(name) || !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
        }
    }
    removed
}
