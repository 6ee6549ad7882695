//! Materialize the shared source tree into an isolated folder.
//!
//! Synchronization is a complete replace: a stale destination is removed
//! before the copy, so repeated runs never merge old and new content.
//! Files are copied with their permission bits and fresh timestamps;
//! symlinks inside the tree are followed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::pipeline::paths::{absolute, normalize};

/// What a single [`synchronize`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOperation {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// The destination existed beforehand and was removed.
    pub existed: bool,
    /// The source tree was present; when false nothing was touched.
    pub source_exists: bool,
    pub files_copied: usize,
}

impl SyncOperation {
    fn skipped(source: &Path, destination: &Path) -> Self {
        Self {
            source_path: source.to_path_buf(),
            destination_path: destination.to_path_buf(),
            existed: false,
            source_exists: false,
            files_copied: 0,
        }
    }
}

/// Replace `destination` with a full copy of the `source` directory.
///
/// An absent source is not an error: the destination is left untouched and
/// the returned operation has `source_exists == false`. Any I/O failure is
/// fatal; a partially written destination is removed before the error is
/// returned.
pub fn synchronize(source: &Path, destination: &Path) -> Result<SyncOperation> {
    let mut op = SyncOperation::skipped(source, destination);

    if !source.is_dir() {
        debug!(source = %source.display(), "shared tree absent; skipping synchronization");
        return Ok(op);
    }
    op.source_exists = true;

    ensure_disjoint(source, destination)?;

    if destination.exists() || destination.is_symlink() {
        remove_path(destination).map_err(|err| {
            sync_error(source, destination, "removing the stale destination", err)
        })?;
        op.existed = true;
    }

    match copy_tree(source, destination) {
        Ok(copied) => op.files_copied = copied,
        Err((action, err)) => {
            if destination.exists() {
                if let Err(cleanup) = remove_path(destination) {
                    warn!(
                        destination = %destination.display(),
                        error = %cleanup,
                        "could not remove partial copy"
                    );
                }
            }
            return Err(sync_error(source, destination, action, err));
        }
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        files = op.files_copied,
        replaced = op.existed,
        "synchronized shared tree"
    );
    Ok(op)
}

type CopyFailure = (&'static str, io::Error);

fn copy_tree(source: &Path, destination: &Path) -> std::result::Result<usize, CopyFailure> {
    fs::create_dir_all(destination).map_err(|err| ("creating the destination root", err))?;

    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(true).min_depth(1) {
        let entry = entry.map_err(|err| ("walking the source tree", io::Error::from(err)))?;
        let relative = entry.path().strip_prefix(source).map_err(|_| {
            (
                "walking the source tree",
                io::Error::other("entry outside the source root"),
            )
        })?;
        let target = destination.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|err| ("creating a directory", err))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(|err| ("copying a file", err))?;
            copied += 1;
        } else {
            debug!(path = %entry.path().display(), "skipping special file");
        }
    }
    Ok(copied)
}

fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

// Removing the destination must never reach into the shared tree, and the
// copy must never walk into its own output.
fn ensure_disjoint(source: &Path, destination: &Path) -> Result<()> {
    let source_abs = normalize(&absolute(source));
    let destination_abs = normalize(&absolute(destination));
    if destination_abs.starts_with(&source_abs) || source_abs.starts_with(&destination_abs) {
        return Err(sync_error(
            source,
            destination,
            "checking the destination",
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "source and destination trees overlap",
            ),
        ));
    }
    Ok(())
}

fn sync_error(source: &Path, destination: &Path, action: &'static str, err: io::Error) -> Error {
    Error::Sync {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        action,
        source: err,
    }
}
