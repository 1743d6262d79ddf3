use std::time::Duration;

use crate::follower::{FollowConfig, SeekInfo};

/// Default capacity of the channel every follower publishes into.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default longest sleep of an idle follower between checks of its file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Settings shared by every follower of a [`MuxedLines`](crate::MuxedLines).
///
/// ```
/// use std::time::Duration;
/// use muxtail::Config;
///
/// let config = Config::default()
///     .start_from_beginning(true)
///     .poll_interval(Duration::from_millis(50));
///
/// assert!(config.start_from_beginning);
/// assert_eq!(config.channel_capacity, muxtail::DEFAULT_CHANNEL_CAPACITY);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Read every file from its first byte instead of only reporting what is
    /// appended after start.
    pub start_from_beginning: bool,
    /// Lines buffered between the followers and the consumer before
    /// followers have to wait.
    pub channel_capacity: usize,
    /// Longest time an idle follower sleeps before checking its file again.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            start_from_beginning: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Config {
    pub fn start_from_beginning(mut self, yes: bool) -> Self {
        self.start_from_beginning = yes;
        self
    }

    /// Sets the channel capacity. Zero is raised to one.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub(crate) fn capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Settings handed to each follower. Following past EOF and reopening
    /// on rotation are always on.
    pub fn follow_config(&self) -> FollowConfig {
        let location = if self.start_from_beginning {
            None
        } else {
            Some(SeekInfo::end(0))
        };

        FollowConfig {
            location,
            follow: true,
            reopen: true,
            poll_interval: self.poll_interval,
        }
    }
}
