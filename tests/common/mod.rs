#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use muxtail::{Config, Line, MuxedLines};
use tokio::time;

pub const TIMEOUT_5_SEC: Duration = Duration::from_secs(5);

pub fn fast_config() -> Config {
    Config::default().poll_interval(Duration::from_millis(10))
}

pub fn append(path: &Path, data: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

/// Reads `n` non-error lines, panicking if they do not all arrive in time.
pub async fn take_lines(lines: &mut MuxedLines, n: usize) -> Vec<Line> {
    let mut taken = Vec::with_capacity(n);
    let fut = async {
        while taken.len() < n {
            let line = lines.next_line().await.expect("stream ended early");
            if !line.is_error() {
                taken.push(line);
            }
        }
    };
    time::timeout(TIMEOUT_5_SEC, fut)
        .await
        .expect("timed out waiting for lines");
    taken
}
