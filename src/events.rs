//! Everything related to watching files for creations, modifications,
//! deletions, etc.
//!
//! Watching is only used to wake followers early. Followers poll on their own
//! as well, so a missed or failed watch costs latency and nothing else.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::follower::Wakeups;

type Routes = Arc<Mutex<HashMap<PathBuf, mpsc::Sender<()>>>>;

/// Routes filesystem events to per-file wake-up channels.
///
/// Internally, `MuxedEvents` contains a [`notify::RecommendedWatcher`] that
/// watches the parent directory of every subscribed file, so that renames,
/// deletions and recreations of the file itself are still observed.
pub struct MuxedEvents {
    inner: notify::RecommendedWatcher,
    watched_directories: HashSet<PathBuf>,
    routes: Routes,
}

impl Debug for MuxedEvents {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        let subscribed = self.routes.lock().map(|routes| routes.len()).unwrap_or(0);
        f.debug_struct("MuxedEvents")
            .field("watched_directories", &self.watched_directories)
            .field("subscribed", &subscribed)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to start watcher: {0}")]
    Start(#[source] notify::Error),
    #[error("Failed to add path to watch: {0}")]
    AddFailure(#[source] notify::Error),
    #[error("Cannot watch {}: {reason}", path.display())]
    Unwatchable { path: PathBuf, reason: &'static str },
    #[error("Error resolving path: {0}")]
    Path(#[from] io::Error),
}

impl MuxedEvents {
    /// Constructs a new `MuxedEvents` instance.
    pub fn new() -> Result<Self, Error> {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let dispatch_routes = Arc::clone(&routes);

        let inner = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => dispatch(&dispatch_routes, &event),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })
        .map_err(Error::Start)?;

        Ok(MuxedEvents {
            inner,
            watched_directories: HashSet::new(),
            routes,
        })
    }

    fn add_directory(&mut self, path: &Path) -> Result<(), Error> {
        if self.watched_directories.contains(path) {
            return Ok(());
        }

        notify::Watcher::watch(&mut self.inner, path, notify::RecursiveMode::NonRecursive)
            .map_err(Error::AddFailure)?;
        debug!(path = %path.display(), "watching directory");

        self.watched_directories.insert(path.to_path_buf());

        Ok(())
    }

    /// Subscribes to events for the given file.
    ///
    /// The returned channel holds at most one pending wake-up; bursts of
    /// events are coalesced. Subscribing the same path again replaces the
    /// previous channel.
    pub fn subscribe(&mut self, path: impl Into<PathBuf>) -> Result<Wakeups, Error> {
        let path = absolutify(path)?;

        if path.is_dir() {
            return Err(Error::Unwatchable {
                path,
                reason: "path is a directory",
            });
        }

        let parent = match path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => {
                return Err(Error::Unwatchable {
                    path,
                    reason: "file needs a parent directory",
                })
            }
        };
        self.add_directory(&parent)?;

        let (tx, rx) = mpsc::channel(1);
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(path, tx);
        }

        Ok(rx)
    }

    /// Returns the number of directories currently being watched.
    pub fn watched_directories(&self) -> usize {
        self.watched_directories.len()
    }
}

fn dispatch(routes: &Routes, event: &notify::Event) {
    let routes = match routes.lock() {
        Ok(routes) => routes,
        Err(poisoned) => poisoned.into_inner(),
    };

    for path in &event.paths {
        if let Some(tx) = routes.get(path) {
            // Full means a wake-up is already pending, closed means the
            // follower is gone. Neither needs handling.
            let _ = tx.try_send(());
        }
    }
}

/// Makes a file path absolute by canonicalizing its directory part. The file
/// itself need not exist.
pub(crate) fn absolutify(path: impl Into<PathBuf>) -> io::Result<PathBuf> {
    let path = path.into();

    let filename = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Filename not found in path"))?;

    let dir = match path.parent() {
        Some(parent) if parent != Path::new("") => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let dir = dir.canonicalize().unwrap_or(dir);

    Ok(dir.join(filename))
}
