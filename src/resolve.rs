//! Turning a glob pattern or a directory into the set of files to follow.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Error;

/// Returns every file directly inside `dir`, sorted.
///
/// Anything that is not a regular file (subdirectories, pipes, sockets,
/// devices) is skipped. Fails with [`Error::Resolution`] if `dir`
/// cannot be listed or is not a directory, and with [`Error::NoMatch`] if it
/// holds no files.
pub fn resolve_directory(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
    let dir = dir.as_ref();
    let resolution = |source: io::Error| Error::Resolution {
        path: dir.to_path_buf(),
        source,
    };

    let meta = fs::metadata(dir).map_err(resolution)?;
    if !meta.is_dir() {
        return Err(resolution(io::Error::other("path is not a directory")));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(resolution)? {
        let entry = entry.map_err(resolution)?;
        let path = entry.path();
        if is_followable(&path) {
            paths.push(path);
        }
    }

    if paths.is_empty() {
        return Err(Error::NoMatch(dir.display().to_string()));
    }
    paths.sort();

    Ok(paths)
}

/// Expands `pattern` with standard glob rules (`*`, `?`, `[...]`, `**`).
///
/// Entries that cannot be read during expansion and matches that are not
/// regular files are skipped.
/// Fails with [`Error::Pattern`] for a malformed pattern and
/// [`Error::NoMatch`] if no file matches.
pub fn resolve_glob(pattern: &str) -> Result<Vec<PathBuf>, Error> {
    let matches = glob::glob(pattern).map_err(|source| Error::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in matches {
        match entry {
            Ok(path) => {
                if is_followable(&path) {
                    paths.push(path);
                }
            }
            Err(e) => {
                debug!(path = %e.path().display(), error = %e.error(), "skipping unreadable glob entry");
            }
        }
    }

    if paths.is_empty() {
        return Err(Error::NoMatch(format!("glob {pattern}")));
    }

    Ok(paths)
}

/// Opening a FIFO without a writer blocks, so only regular files are kept.
/// Paths whose metadata cannot be read are kept so that starting their
/// follower reports the failure.
fn is_followable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if !meta.is_file() => {
            debug!(path = %path.display(), "skipping non-regular file");
            false
        }
        _ => true,
    }
}
