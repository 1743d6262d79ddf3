//! Demonstrates the multiplexed line stream for a glob pattern or directory.
//!
//! Usage:
//!     lines '/path/to/logs/*.log'
//!     lines /path/to/logs --from-beginning
//!
//! Set `RUST_LOG=muxtail=debug` to see follower lifecycle events.

use std::path::Path;

use futures_util::stream::StreamExt;
use tracing_subscriber::EnvFilter;

use muxtail::{Config, MuxedLines};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let target = args.next().ok_or("usage: lines <glob|directory> [--from-beginning]")?;
    let from_beginning = args.any(|arg| arg == "--from-beginning");

    let config = Config::default().start_from_beginning(from_beginning);

    let mut lines = if Path::new(&target).is_dir() {
        MuxedLines::open_directory(&target, config).await?
    } else {
        MuxedLines::open_glob(&target, config).await?
    };

    for source in lines.sources() {
        eprintln!("following {}", source.display());
    }

    while let Some(line) = lines.next().await {
        let source = line.source().display();

        match (line.error(), line.number()) {
            (Some(e), _) => eprintln!("({}) error: {}", source, e),
            (None, Some(number)) => println!("({}:{}) {}", source, number, line.line()),
            (None, None) => {}
        }
    }

    Ok(())
}
