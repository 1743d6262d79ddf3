//! Following a single file: reading appended lines, surviving truncation,
//! rotation and recreation.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use tokio::fs::{metadata, File};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Receiving end of the wake-up channel handed out by
/// [`MuxedEvents::subscribe`](crate::MuxedEvents::subscribe).
pub type Wakeups = mpsc::Receiver<()>;

/// Reference point of a [`SeekInfo`] offset.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// A read position inside a file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SeekInfo {
    pub offset: i64,
    pub whence: Whence,
}

impl SeekInfo {
    /// Position `offset` bytes from the start of the file.
    pub fn start(offset: u64) -> Self {
        SeekInfo {
            offset: i64::try_from(offset).unwrap_or(i64::MAX),
            whence: Whence::Start,
        }
    }

    /// Position `offset` bytes relative to the end of the file.
    pub fn end(offset: i64) -> Self {
        SeekInfo {
            offset,
            whence: Whence::End,
        }
    }

    fn to_seek_from(self) -> io::SeekFrom {
        match self.whence {
            Whence::Start => io::SeekFrom::Start(u64::try_from(self.offset).unwrap_or(0)),
            Whence::Current => io::SeekFrom::Current(self.offset),
            Whence::End => io::SeekFrom::End(self.offset),
        }
    }
}

/// Start parameters for a [`FileFollower`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FollowConfig {
    /// Where to start reading. `None` reads from the beginning.
    pub location: Option<SeekInfo>,
    /// Keep waiting for appended content at EOF instead of ending.
    pub follow: bool,
    /// Reopen the path when the file is rotated, deleted or recreated.
    pub reopen: bool,
    /// Longest sleep at EOF when no wake-up arrives.
    pub poll_interval: Duration,
}

impl Default for FollowConfig {
    fn default() -> Self {
        FollowConfig {
            location: None,
            follow: true,
            reopen: true,
            poll_interval: crate::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One complete line read by a [`FileFollower`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FollowLine {
    /// Line content without the line terminator.
    pub text: String,
    /// 1-based count of lines read from the path.
    pub number: u64,
    /// Offset just past this line in the file currently open.
    pub position: SeekInfo,
    pub time: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct FileId {
    dev: u64,
    ino: u64,
}

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> Option<FileId> {
    use std::os::unix::fs::MetadataExt;

    Some(FileId {
        dev: meta.dev(),
        ino: meta.ino(),
    })
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> Option<FileId> {
    None
}

type LineReader = BufReader<File>;

fn not_regular() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "not a regular file")
}

async fn open(path: &Path) -> io::Result<(LineReader, Option<FileId>)> {
    // Opening a FIFO with no writer never returns.
    if !metadata(path).await?.is_file() {
        return Err(not_regular());
    }

    let file = File::open(path).await?;
    let meta = file.metadata().await?;
    if !meta.is_file() {
        return Err(not_regular());
    }

    Ok((BufReader::new(file), file_id(&meta)))
}

enum Step {
    Line(FollowLine),
    Failed(io::Error),
    Retry,
    Idle,
}

/// Follows one file, yielding its lines as they are appended.
///
/// The sequence is lazy and cannot be restarted. With `follow` set it never
/// ends on its own: an idle file simply yields nothing until it grows.
pub struct FileFollower {
    path: PathBuf,
    config: FollowConfig,
    reader: Option<LineReader>,
    id: Option<FileId>,
    /// Bytes consumed into complete lines of the current file.
    offset: u64,
    /// Bytes of a line whose newline has not been written yet.
    pending: Vec<u8>,
    number: u64,
    /// Set after one extra read past EOF once the path stopped matching the
    /// open handle.
    draining: bool,
    last_error: Option<io::ErrorKind>,
    finished: bool,
    wakeups: Option<Wakeups>,
}

impl std::fmt::Debug for FileFollower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileFollower")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("open", &self.reader.is_some())
            .field("offset", &self.offset)
            .field("number", &self.number)
            .field("finished", &self.finished)
            .finish()
    }
}

impl FileFollower {
    /// Opens `path` and seeks to `config.location`.
    ///
    /// Fails if the file cannot be opened, is not a regular file, or the seek
    /// fails.
    pub async fn start(path: impl Into<PathBuf>, config: FollowConfig) -> io::Result<Self> {
        let path = path.into();
        let (mut reader, id) = open(&path).await?;

        let offset = match config.location {
            Some(location) => reader.seek(location.to_seek_from()).await?,
            None => 0,
        };

        debug!(path = %path.display(), offset, "started follower");

        Ok(FileFollower {
            path,
            config,
            reader: Some(reader),
            id,
            offset,
            pending: Vec::new(),
            number: 0,
            draining: false,
            last_error: None,
            finished: false,
            wakeups: None,
        })
    }

    /// Wakes the follower early from its EOF sleep whenever `wakeups` receives.
    pub fn with_wakeups(mut self, wakeups: Wakeups) -> Self {
        self.wakeups = Some(wakeups);
        self
    }

    /// Returns the path being followed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the next line or error.
    ///
    /// Returns `None` once the follower is finished, which only happens when
    /// `follow` or `reopen` is disabled.
    pub async fn next_line(&mut self) -> Option<io::Result<FollowLine>> {
        loop {
            if self.finished {
                return None;
            }

            match self.step().await {
                Step::Line(line) => return Some(Ok(line)),
                Step::Retry => continue,
                Step::Failed(e) => {
                    if self.finished || self.last_error != Some(e.kind()) {
                        self.last_error = Some(e.kind());
                        return Some(Err(e));
                    }
                }
                Step::Idle => {}
            }

            if self.finished {
                return None;
            }
            self.wait().await;
        }
    }

    /// Converts the follower into a [`Stream`] of its lines.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<FollowLine>> {
        stream::unfold(self, |mut follower| async move {
            let next = follower.next_line().await?;
            Some((next, follower))
        })
    }

    async fn step(&mut self) -> Step {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return self.reopen().await,
        };

        match reader.read_until(b'\n', &mut self.pending).await {
            Ok(0) => self.at_eof().await,
            Ok(_) => {
                self.draining = false;
                if self.pending.ends_with(b"\n") {
                    Step::Line(self.take_line())
                } else {
                    // Partial line, the next read reports EOF.
                    Step::Retry
                }
            }
            Err(e) => Step::Failed(e),
        }
    }

    async fn at_eof(&mut self) -> Step {
        if !self.config.follow {
            self.finished = true;
            return match self.flush_partial() {
                Some(line) => Step::Line(line),
                None => Step::Idle,
            };
        }

        match metadata(&self.path).await {
            Ok(meta) if file_id(&meta) != self.id => {
                if !self.draining {
                    self.draining = true;
                    return Step::Retry;
                }
                if !self.config.reopen {
                    self.finished = true;
                    return Step::Failed(io::Error::other("file was rotated"));
                }
                info!(path = %self.path.display(), "file rotated, reopening");
                self.detach()
            }
            Ok(meta) => {
                let consumed = self.offset + self.pending.len() as u64;
                if meta.len() < consumed {
                    info!(
                        path = %self.path.display(),
                        size = meta.len(),
                        consumed,
                        "file truncated, reading from start"
                    );
                    return self.rewind().await;
                }
                self.last_error = None;
                Step::Idle
            }
            Err(e) => {
                if !self.draining {
                    self.draining = true;
                    return Step::Retry;
                }
                if !self.config.reopen {
                    self.finished = true;
                    return Step::Failed(e);
                }
                debug!(path = %self.path.display(), error = %e, "file went away");
                self.detach()
            }
        }
    }

    /// Closes the current handle, handing back any unterminated last line.
    fn detach(&mut self) -> Step {
        self.reader = None;
        self.draining = false;
        match self.flush_partial() {
            Some(line) => Step::Line(line),
            None => Step::Retry,
        }
    }

    async fn reopen(&mut self) -> Step {
        match open(&self.path).await {
            Ok((reader, id)) => {
                debug!(path = %self.path.display(), "reopened file");
                self.reader = Some(reader);
                self.id = id;
                self.offset = 0;
                self.pending.clear();
                self.last_error = None;
                Step::Retry
            }
            Err(e) => Step::Failed(e),
        }
    }

    async fn rewind(&mut self) -> Step {
        self.pending.clear();
        self.offset = 0;
        self.draining = false;
        match self.reader.as_mut() {
            Some(reader) => match reader.seek(io::SeekFrom::Start(0)).await {
                Ok(_) => Step::Retry,
                Err(e) => Step::Failed(e),
            },
            None => Step::Retry,
        }
    }

    fn flush_partial(&mut self) -> Option<FollowLine> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> FollowLine {
        let raw = std::mem::take(&mut self.pending);
        self.offset += raw.len() as u64;
        self.number += 1;
        self.last_error = None;

        let mut end = raw.len();
        if raw[..end].ends_with(b"\n") {
            end -= 1;
        }
        if raw[..end].ends_with(b"\r") {
            end -= 1;
        }

        FollowLine {
            text: String::from_utf8_lossy(&raw[..end]).into_owned(),
            number: self.number,
            position: SeekInfo::start(self.offset),
            time: Utc::now(),
        }
    }

    async fn wait(&mut self) {
        let interval = self.config.poll_interval;
        match self.wakeups.as_mut() {
            Some(wakeups) => {
                if let Ok(None) = tokio::time::timeout(interval, wakeups.recv()).await {
                    // Watcher is gone, fall back to polling.
                    self.wakeups = None;
                }
            }
            None => tokio::time::sleep(interval).await,
        }
    }
}
