//! Snapshot file discovery

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

const SNAPSHOT_EXTENSION: &str = "parquet";

/// Resolve `--src` into an ordered list of snapshot files
///
/// A file is used as-is; a directory is searched recursively for parquet
/// files, returned in lexicographic path order.
pub fn enumerate(src: &Path) -> Result<Vec<PathBuf>> {
    if src.is_file() {
        return Ok(vec![src.to_path_buf()]);
    }
    if !src.is_dir() {
        bail!("Source {} is neither a file nor a directory", src.display());
    }

    let root = src
        .to_str()
        .with_context(|| format!("Source path {} is not valid UTF-8", src.display()))?;
    let pattern = format!(
        "{}/**/*.{}",
        glob::Pattern::escape(root.trim_end_matches('/')),
        SNAPSHOT_EXTENSION
    );

    let mut files = glob::glob(&pattern)
        .with_context(|| format!("Invalid source pattern {}", pattern))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to walk source directory")?;
    files.retain(|path| path.is_file());
    files.sort();

    if files.is_empty() {
        bail!("No .{} files found under {}", SNAPSHOT_EXTENSION, src.display());
    }
    Ok(files)
}
