//! Everything related to merging the lines of many followed files.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task;

use chrono::{DateTime, Utc};
use futures_util::pin_mut;
use futures_util::stream::{Stream as FuturesStream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::absolutify;
use crate::follower::{FileFollower, FollowLine, SeekInfo};
use crate::{resolve, Config, Error, MuxedEvents};

/// A line captured from one followed file, or an error reading that file.
#[derive(Debug)]
pub struct Line {
    /// The path from where the line was read.
    source: Arc<Path>,
    line: String,
    number: Option<u64>,
    position: Option<SeekInfo>,
    observed_at: DateTime<Utc>,
    error: Option<io::Error>,
}

impl Line {
    fn new(source: Arc<Path>, event: io::Result<FollowLine>) -> Self {
        match event {
            Ok(FollowLine {
                text,
                number,
                position,
                time,
            }) => Line {
                source,
                line: text,
                number: Some(number),
                position: Some(position),
                observed_at: time,
                error: None,
            },
            Err(error) => Line {
                source,
                line: String::new(),
                number: None,
                position: None,
                observed_at: Utc::now(),
                error: Some(error),
            },
        }
    }

    /// Returns a reference to the file from where the line was read.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Returns the captured line, without its line terminator. Empty for
    /// error events.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Returns the 1-based number of this line within its source, or `None`
    /// for error events.
    pub fn number(&self) -> Option<u64> {
        self.number
    }

    /// Returns the position just past this line, usable to resume reading.
    pub fn position(&self) -> Option<SeekInfo> {
        self.position
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Returns the error the source's follower ran into, if this is an error
    /// event.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the internal components that make up a `Line`. Hidden as the
    /// return signature may change.
    #[doc(hidden)]
    pub fn into_inner(self) -> (PathBuf, String) {
        let Line { source, line, .. } = self;

        (source.to_path_buf(), line)
    }
}

/// Multiplexes every line of a fixed set of files into one stream.
///
/// ## Streaming multiplexed lines
///
/// Each file gets its own [`FileFollower`] driven by a spawned task that
/// publishes into a shared bounded channel, which `MuxedLines` reads from:
///   1. Lines of one file arrive in the order they were written.
///   2. Lines of different files interleave in no particular order.
///   3. A file that fails produces [`Line`]s with [`Line::error`] set while
///      the other files carry on.
///   4. A consumer slower than the files makes the tasks wait, nothing is
///      dropped.
///
/// Dropping `MuxedLines` stops all of its tasks.
pub struct MuxedLines {
    lines: mpsc::Receiver<Line>,
    workers: BTreeMap<PathBuf, JoinHandle<()>>,
    shutdown: CancellationToken,
    // Kept alive for as long as followers want wake-ups.
    _events: Option<MuxedEvents>,
}

impl fmt::Debug for MuxedLines {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("MuxedLines")
            .field("sources", &self.workers.keys().collect::<Vec<_>>())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl MuxedLines {
    /// Follows every file matching the glob `pattern`.
    pub async fn open_glob(pattern: &str, config: Config) -> Result<Self, Error> {
        let paths = resolve::resolve_glob(pattern)?;
        Self::from_paths(paths, config).await
    }

    /// Follows every file directly inside `dir`.
    pub async fn open_directory(dir: impl AsRef<Path>, config: Config) -> Result<Self, Error> {
        let paths = resolve::resolve_directory(dir)?;
        Self::from_paths(paths, config).await
    }

    /// Follows the given files.
    ///
    /// Either every follower starts or none does: the first path that cannot
    /// be followed fails the whole call with [`Error::FollowerStart`]. An
    /// empty set fails with [`Error::NoMatch`].
    ///
    /// Must be called from within a tokio runtime.
    pub async fn from_paths<I, P>(paths: I, config: Config) -> Result<Self, Error>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut sources = BTreeSet::new();
        for path in paths {
            let path = path.into();
            let source = absolutify(&path)
                .map_err(|source| Error::FollowerStart { path, source })?;
            sources.insert(source);
        }

        if sources.is_empty() {
            return Err(Error::NoMatch("path set".to_string()));
        }

        let follow_config = config.follow_config();
        let mut followers = Vec::with_capacity(sources.len());
        for source in sources {
            let follower = FileFollower::start(&source, follow_config.clone())
                .await
                .map_err(|e| Error::FollowerStart {
                    path: source.clone(),
                    source: e,
                })?;
            followers.push((source, follower));
        }

        let mut events = match MuxedEvents::new() {
            Ok(events) => Some(events),
            Err(e) => {
                warn!(error = %e, "no filesystem watcher, falling back to polling");
                None
            }
        };

        let (tx, rx) = mpsc::channel(config.capacity());
        let shutdown = CancellationToken::new();
        let mut workers = BTreeMap::new();

        for (source, mut follower) in followers {
            if let Some(events) = events.as_mut() {
                match events.subscribe(&source) {
                    Ok(wakeups) => follower = follower.with_wakeups(wakeups),
                    Err(e) => {
                        warn!(path = %source.display(), error = %e, "failed to watch file, polling instead");
                    }
                }
            }

            let worker = tokio::spawn(forward(
                Arc::from(source.as_path()),
                follower,
                tx.clone(),
                shutdown.child_token(),
            ));
            workers.insert(source, worker);
        }

        Ok(MuxedLines {
            lines: rx,
            workers,
            shutdown,
            _events: events,
        })
    }

    /// Waits for the next line from any of the followed files.
    ///
    /// Returns `None` only once every follower task has stopped.
    pub async fn next_line(&mut self) -> Option<Line> {
        self.lines.recv().await
    }

    /// Returns the followed paths, in sorted order.
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.workers.keys().map(PathBuf::as_path)
    }

    /// Returns the number of followed files.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if no file is followed. Never the case for a
    /// successfully constructed `MuxedLines`.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Returns a token that stops every follower task when cancelled.
    ///
    /// Lines already buffered remain readable, after which the stream ends.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops every follower task and waits for them to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();

        let workers = std::mem::take(&mut self.workers);
        for (source, worker) in workers {
            if let Err(e) = worker.await {
                warn!(path = %source.display(), error = %e, "follower task failed");
            }
        }
    }
}

impl Drop for MuxedLines {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl FuturesStream for MuxedLines {
    type Item = Line;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        self.lines.poll_recv(cx)
    }
}

/// Republishes every event of `follower` onto `tx` until shutdown, until the
/// follower ends, or until the receiving side is gone.
async fn forward(
    source: Arc<Path>,
    follower: FileFollower,
    tx: mpsc::Sender<Line>,
    shutdown: CancellationToken,
) {
    let events = follower.into_stream();
    pin_mut!(events);

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };
        let Some(event) = event else {
            break;
        };

        let line = Line::new(Arc::clone(&source), event);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = tx.send(line) => {
                if res.is_err() {
                    break;
                }
            }
        }
    }

    debug!(path = %source.display(), "follower task exited");
}
