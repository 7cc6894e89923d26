//! Staged filesystem operations.
//!
//! Each helper leaves the target either untouched or fully replaced. Partial
//! work lives under a `.partial` sibling that is removed on failure.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Atomically write `contents` to `path` (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = sibling_with_suffix(path, ".tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// `path` with `suffix` appended to its final component.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Recursively copy the directory `src` to `dst`, creating `dst`.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut copied = 0u64;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Remove `path` if it exists, whether file or directory.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// How the staged content reaches its `.partial` location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// Rename the source, falling back to copy + remove across filesystems.
    Move,
    /// Copy the source, leaving it in place.
    Copy,
}

/// Replace the directory `target` with the content of `src`.
///
/// Stages into `{target}.partial`, removes any previous `target`, then renames
/// the staged directory into place. If staging fails the `.partial` directory
/// is removed and `target` is left as it was.
pub fn replace_dir_staged(src: &Path, target: &Path, mode: StageMode) -> io::Result<()> {
    let staging = sibling_with_suffix(target, ".partial");
    remove_if_exists(&staging)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let staged = match mode {
        StageMode::Move => move_dir(src, &staging),
        StageMode::Copy => copy_dir_recursive(src, &staging).map(|_| ()),
    };
    if let Err(err) = staged {
        if let Err(cleanup) = remove_if_exists(&staging) {
            warn!(path = %staging.display(), err = %cleanup, "failed to remove staging dir");
        }
        return Err(err);
    }

    remove_if_exists(target)?;
    fs::rename(&staging, target)?;
    debug!(target = %target.display(), ?mode, "directory replaced");
    Ok(())
}

fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) => {
            debug!(err = %err, "rename failed, falling back to copy");
            copy_dir_recursive(src, dst)?;
            fs::remove_dir_all(src)
        }
    }
}
