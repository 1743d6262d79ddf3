//! A library for following every file matched by a glob pattern, or every
//! file in a directory, as one multiplexed stream of lines.
//!
//! Each file gets its own follower which survives truncation, rotation and
//! recreation of the file. The lines of all followers are merged into a
//! single bounded stream, each tagged with its source path, line number and
//! read position.
//!
//! ## Example
//!
//! ```no_run
//! use muxtail::{Config, MuxedLines};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), muxtail::Error> {
//!     let mut lines = MuxedLines::open_glob("/var/log/*.log", Config::default()).await?;
//!
//!     while let Some(line) = lines.next_line().await {
//!         match line.error() {
//!             Some(e) => eprintln!("{}: {}", line.source().display(), e),
//!             None => println!("{}: {}", line.source().display(), line.line()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Caveats
//!
//! The set of followed files is fixed when the `MuxedLines` is built. Files
//! matching the pattern later on are not picked up.

mod config;
mod error;
mod events;
mod follower;
mod reader;
mod resolve;

pub use config::{Config, DEFAULT_CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL};
pub use error::Error;
pub use events::{Error as WatchError, MuxedEvents};
pub use follower::{FileFollower, FollowConfig, FollowLine, SeekInfo, Wakeups, Whence};
pub use reader::{Line, MuxedLines};
pub use resolve::{resolve_directory, resolve_glob};
pub use tokio_util::sync::CancellationToken;

#[cfg(doctest)]
doc_comment::doctest!("../README.md");
