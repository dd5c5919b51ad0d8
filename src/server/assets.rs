//! Static asset resolution for the visualization frontend.
//!
//! Assets resolve against a single root directory. Request paths are
//! canonicalized before reading, and a resolved path that escapes the
//! root reads as not found, so `..` segments and symlinks cannot
//! reach files outside the asset directory.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Root directory the visualization assets are served from
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read one asset file.
    ///
    /// # Errors
    /// Any unreadable, missing, or out-of-root path surfaces as an
    /// `io::Error`; the service maps all of them to a 404.
    pub fn read(&self, asset_path: &str) -> io::Result<Vec<u8>> {
        let relative = asset_path.trim_start_matches('/');
        let root = self.root.canonicalize()?;
        let resolved = root.join(relative).canonicalize()?;

        if !resolved.starts_with(&root) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("asset path escapes the asset root: {}", asset_path),
            ));
        }
        fs::read(resolved)
    }
}

/// Content type for an asset path, derived from its extension
pub fn content_type_for(asset_path: &str) -> &'static str {
    match Path::new(asset_path).extension().and_then(OsStr::to_str) {
        Some("html") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "text/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
