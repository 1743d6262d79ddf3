mod common;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::stream::StreamExt;
use muxtail::{Error, MuxedLines};
use tempfile::tempdir;
use tokio::time;

use common::{append, fast_config, take_lines, TIMEOUT_5_SEC};

#[tokio::test]
pub async fn test_glob_no_match() {
    let res = MuxedLines::open_glob("/no/such/dir/*", fast_config()).await;
    assert!(matches!(res, Err(Error::NoMatch(_))));
}

#[tokio::test]
pub async fn test_missing_directory() {
    let logdir = tempdir().unwrap();
    let res = MuxedLines::open_directory(logdir.path().join("gone"), fast_config()).await;
    assert!(matches!(res, Err(Error::Resolution { .. })));
}

#[tokio::test(flavor = "multi_thread")]
pub async fn test_every_file_delivers() {
    const FILES: usize = 8;

    let logdir = tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..FILES)
        .map(|i| logdir.path().join(format!("{i}.log")))
        .collect();
    for path in &paths {
        append(path, "");
    }

    let mut lines = MuxedLines::open_directory(logdir.path(), fast_config())
        .await
        .unwrap();
    assert_eq!(lines.len(), FILES);

    for (i, path) in paths.iter().enumerate() {
        append(path, &format!("line from {i}\n"));
    }

    let got = take_lines(&mut lines, FILES).await;
    let mut by_file: HashMap<String, String> = got
        .into_iter()
        .map(|line| {
            let name = line.source().file_name().unwrap().to_string_lossy().into_owned();
            (name, line.line().to_string())
        })
        .collect();

    assert_eq!(by_file.len(), FILES);
    for i in 0..FILES {
        assert_eq!(
            by_file.remove(&format!("{i}.log")).unwrap(),
            format!("line from {i}")
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
pub async fn test_thousand_lines_in_order() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("busy.log");
    append(&logfile, "");

    let mut lines = MuxedLines::from_paths([&logfile], fast_config().channel_capacity(16))
        .await
        .unwrap();

    let writer_path = logfile.clone();
    let writer = tokio::task::spawn_blocking(move || {
        for i in 1..=1000 {
            append(&writer_path, &format!("{i}\n"));
        }
    });

    let got = take_lines(&mut lines, 1000).await;
    writer.await.unwrap();

    for (i, line) in got.iter().enumerate() {
        let expected = i as u64 + 1;
        assert_eq!(line.number(), Some(expected));
        assert_eq!(line.line(), expected.to_string());
    }

    // Nothing beyond the thousand lines shows up.
    let extra = time::timeout(Duration::from_millis(100), lines.next_line()).await;
    assert!(extra.is_err());
}

#[tokio::test]
pub async fn test_from_beginning_replays_existing() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("foo.log");
    append(&logfile, "one\ntwo\nthree\n");

    let mut lines =
        MuxedLines::from_paths([&logfile], fast_config().start_from_beginning(true))
            .await
            .unwrap();
    append(&logfile, "four\n");

    let got: Vec<String> = take_lines(&mut lines, 4)
        .await
        .into_iter()
        .map(|line| line.line().to_string())
        .collect();
    assert_eq!(got, vec!["one", "two", "three", "four"]);
}

#[tokio::test]
pub async fn test_from_end_skips_existing() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("foo.log");
    append(&logfile, "one\ntwo\nthree\n");

    let mut lines = MuxedLines::from_paths([&logfile], fast_config())
        .await
        .unwrap();
    append(&logfile, "four\n");

    let got = take_lines(&mut lines, 1).await;
    assert_eq!(got[0].line(), "four");
    assert_eq!(got[0].number(), Some(1));
    assert!(got[0].source().ends_with("foo.log"));
}

#[tokio::test(flavor = "multi_thread")]
pub async fn test_deleted_file_does_not_stop_others() {
    let logdir = tempdir().unwrap();
    let doomed = logdir.path().join("doomed.log");
    let healthy = logdir.path().join("healthy.log");
    append(&doomed, "");
    append(&healthy, "");

    let mut lines = MuxedLines::open_glob(
        &format!("{}/*.log", logdir.path().display()),
        fast_config(),
    )
    .await
    .unwrap();

    std::fs::remove_file(&doomed).unwrap();

    let error = time::timeout(TIMEOUT_5_SEC, async {
        loop {
            let line = lines.next_line().await.expect("stream ended");
            if line.is_error() {
                return line;
            }
        }
    })
    .await
    .expect("no error event for deleted file");
    assert!(error.source().ends_with("doomed.log"));
    assert_eq!(error.error().unwrap().kind(), io::ErrorKind::NotFound);

    append(&healthy, "still here\n");
    let got = take_lines(&mut lines, 1).await;
    assert!(got[0].source().ends_with("healthy.log"));
    assert_eq!(got[0].line(), "still here");
}

#[tokio::test]
pub async fn test_stream_combinators() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("foo.log");
    append(&logfile, "a\nb\nc\n");

    let lines = MuxedLines::from_paths([&logfile], fast_config().start_from_beginning(true))
        .await
        .unwrap();

    let got = time::timeout(
        TIMEOUT_5_SEC,
        lines.map(|line| line.into_inner().1).take(3).collect::<Vec<_>>(),
    )
    .await
    .unwrap();
    assert_eq!(got, vec!["a", "b", "c"]);
}

#[tokio::test]
pub async fn test_shutdown_joins_workers() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("foo.log");
    append(&logfile, "");

    // A capacity of one with an absent consumer leaves the worker blocked on
    // publish, which shutdown must still release.
    let lines = MuxedLines::from_paths([&logfile], fast_config().channel_capacity(1))
        .await
        .unwrap();
    append(&logfile, "a\nb\nc\n");
    time::sleep(Duration::from_millis(100)).await;

    time::timeout(TIMEOUT_5_SEC, lines.shutdown())
        .await
        .expect("shutdown hung");
}

#[cfg(unix)]
#[tokio::test]
pub async fn test_directory_with_fifo_opens() {
    let logdir = tempdir().unwrap();
    let logfile = logdir.path().join("a.log");
    append(&logfile, "");
    let status = std::process::Command::new("mkfifo")
        .arg(logdir.path().join("pipe"))
        .status()
        .unwrap();
    assert!(status.success());

    let mut lines = time::timeout(
        TIMEOUT_5_SEC,
        MuxedLines::open_directory(logdir.path(), fast_config()),
    )
    .await
    .expect("opening a directory holding a fifo hung")
    .unwrap();
    assert_eq!(lines.len(), 1);

    append(&logfile, "hello\n");
    let got = take_lines(&mut lines, 1).await;
    assert_eq!(got[0].line(), "hello");
}

#[tokio::test(flavor = "multi_thread")]
pub async fn test_concurrent_writers_keep_file_order() {
    const FILES: usize = 4;
    const LINES_PER_FILE: u64 = 200;

    let logdir = tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..FILES)
        .map(|i| logdir.path().join(format!("{i}.log")))
        .collect();
    for path in &paths {
        append(path, "");
    }

    let mut lines = MuxedLines::from_paths(&paths, fast_config().channel_capacity(8))
        .await
        .unwrap();

    let writers: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| {
            tokio::task::spawn_blocking(move || {
                for i in 1..=LINES_PER_FILE {
                    append(&path, &format!("{i}\n"));
                }
            })
        })
        .collect();

    let got = take_lines(&mut lines, FILES * LINES_PER_FILE as usize).await;
    for writer in writers {
        writer.await.unwrap();
    }

    let mut by_file: HashMap<PathBuf, Vec<(u64, String)>> = HashMap::new();
    for line in got {
        by_file
            .entry(line.source().to_path_buf())
            .or_default()
            .push((line.number().unwrap(), line.line().to_string()));
    }

    let expected: Vec<(u64, String)> = (1..=LINES_PER_FILE).map(|i| (i, i.to_string())).collect();
    assert_eq!(by_file.len(), FILES);
    for (source, seen) in by_file {
        assert_eq!(seen, expected, "lines of {} out of order", source.display());
    }
}
