//! Errors returned while setting up a multiplexed tail.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to build a [`MuxedLines`](crate::MuxedLines).
///
/// Every variant is fatal to construction. Failures that happen after the
/// stream is running are delivered as [`Line::error`](crate::Line::error)
/// instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The filesystem query behind path resolution failed.
    #[error("failed to resolve {}: {source}", path.display())]
    Resolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The glob pattern could not be parsed.
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    /// Resolution succeeded but nothing was left to follow.
    #[error("{0}: no files matched")]
    NoMatch(String),
    /// A follower could not be started for one of the paths.
    #[error("failed to start following {}: {source}", path.display())]
    FollowerStart {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
