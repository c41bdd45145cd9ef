//! Append-only error log.
//!
//! Every failure line goes through one writer task, which stamps the line
//! with the local time when it is appended. The file is only created once
//! the first line arrives.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Timestamp format of each error log line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Handle for sending lines to the error log. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::UnboundedSender<String>,
}

impl ErrorReporter {
    /// Queue a line for the error log.
    pub fn report(&self, message: impl Into<String>) {
        if self.tx.send(message.into()).is_err() {
            error!("error log writer has stopped; dropping message");
        }
    }
}

/// The writer task behind a set of [`ErrorReporter`]s.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    handle: JoinHandle<io::Result<usize>>,
}

impl ErrorLog {
    /// Start the writer task for `path`.
    pub fn spawn(path: impl Into<PathBuf>) -> (ErrorReporter, ErrorLog) {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_lines(path.clone(), rx));

        (ErrorReporter { tx }, ErrorLog { path, handle })
    }

    /// Wait until every reporter is dropped and all lines are handled.
    ///
    /// Returns the number of lines appended, or the first write error. A
    /// failed line never stops the lines after it from being tried.
    pub async fn finish(self) -> io::Result<usize> {
        let result = self
            .handle
            .await
            .map_err(|e| io::Error::other(format!("error log writer failed: {}", e)))?;

        result.map_err(|e| io::Error::new(e.kind(), format!("{}: {}", self.path.display(), e)))
    }
}

async fn append_line(file: &mut Option<File>, path: &Path, line: &str) -> io::Result<()> {
    let mut out = match file.take() {
        Some(out) => out,
        None => OpenOptions::new().create(true).append(true).open(path).await?,
    };

    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    *file = Some(out);
    Ok(())
}

async fn write_lines(path: PathBuf, mut rx: mpsc::UnboundedReceiver<String>) -> io::Result<usize> {
    let mut file: Option<File> = None;
    let mut written = 0;
    let mut first_error: Option<io::Error> = None;

    while let Some(message) = rx.recv().await {
        let line = format!("{} - {}\n", Local::now().format(TIMESTAMP_FORMAT), message);

        match append_line(&mut file, &path, &line).await {
            Ok(()) => written += 1,
            Err(e) => {
                error!("could not write to {}: {}; lost: {}", path.display(), e, message);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    #[tokio::test]
    async fn test_lines_are_stamped_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.log");

        let (reporter, log) = ErrorLog::spawn(&path);
        let other = reporter.clone();
        reporter.report("[skip] device 10.0.0.2 type juniper_junos is not supported for backup");
        other.report("[error] connection to 10.0.0.3 failed (timeout): timed out");
        drop(reporter);
        drop(other);

        assert_eq!(log.finish().await.unwrap(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - [skip] device 10.0.0.2 type juniper_junos is not supported for backup"));

        let stamps: Vec<NaiveDateTime> = lines
            .iter()
            .map(|line| {
                let (stamp, _) = line.split_once(" - ").unwrap();
                NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).unwrap()
            })
            .collect();
        assert!(stamps[0] <= stamps[1]);
    }

    #[tokio::test]
    async fn test_file_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.log");

        let (reporter, log) = ErrorLog::spawn(&path);
        drop(reporter);

        assert_eq!(log.finish().await.unwrap(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let (reporter, log) = ErrorLog::spawn(&path);
        reporter.report("again");
        drop(reporter);
        log.finish().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("earlier run\n"));
        assert!(contents.trim_end().ends_with(" - again"));
    }

    #[tokio::test]
    async fn test_unwritable_path_drains_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("error.log");

        let (reporter, log) = ErrorLog::spawn(&path);
        reporter.report("[error] first");
        reporter.report("[error] second");
        drop(reporter);

        let err = log.finish().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("error.log"));
        assert!(!path.exists());
    }
}
