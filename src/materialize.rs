//! Handing inline source text to the server.
//!
//! The server only reads files. To query symbols for text that is not on
//! disk, the text is first written somewhere the server can open, and the
//! resulting path is queried like any other. This only works when client
//! and server share a filesystem.
//!
//! # Example
//!
//! ```
//! use whatels_client::{SourceMaterializer, TempDirMaterializer};
//!
//! let materializer = TempDirMaterializer::new().unwrap();
//! let path = materializer.materialize("-module(a).\n").unwrap();
//! assert_eq!(std::fs::read_to_string(&path).unwrap(), "-module(a).\n");
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;

use crate::error::Result;

/// Turns inline source text into a path the server can open.
pub trait SourceMaterializer: Send + Sync {
    /// Write `source` and return its path.
    fn materialize(&self, source: &str) -> Result<PathBuf>;
}

/// Writes each source to a fresh file in a private temporary directory.
///
/// Files live until the materializer is dropped.
pub struct TempDirMaterializer {
    dir: TempDir,
    extension: String,
    next: AtomicU64,
}

impl TempDirMaterializer {
    /// Create a materializer writing `.erl` files.
    pub fn new() -> Result<Self> {
        Self::with_extension("erl")
    }

    /// Create a materializer writing files with the given extension.
    pub fn with_extension(extension: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("whatels-").tempdir()?;
        Ok(Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
            next: AtomicU64::new(0),
        })
    }

    /// Directory holding the materialized files.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl SourceMaterializer for TempDirMaterializer {
    fn materialize(&self, source: &str) -> Result<PathBuf> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .path()
            .join(format!("source-{}.{}", n, self.extension));
        std::fs::write(&path, source)?;
        tracing::debug!("Materialized {} bytes at {}", source.len(), path.display());
        Ok(path)
    }
}
