//! Configuration artifact files.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors raised while storing an artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Output directory could not be created
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Temporary file could not be created or written
    #[error("Failed to write artifact in {dir}: {source}")]
    Write {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Temporary file could not be moved into place
    #[error("Failed to persist artifact {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Blocking writer task did not complete
    #[error("Artifact writer task failed: {0}")]
    Task(String),
}

/// A stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Writes configuration text into an output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store `config` as `{hostname}_{ip}_{YYYYMMDD_HHMMSS}.txt`.
    ///
    /// An existing file is never replaced: the name gets a `-1`, `-2`, ...
    /// suffix until a free one is found.
    pub async fn persist(
        &self,
        hostname: &str,
        ip: &str,
        config: &str,
        captured_at: DateTime<Local>,
    ) -> Result<ArtifactRef, ArtifactError> {
        let dir = self.dir.clone();
        let stem = artifact_stem(hostname, ip, &captured_at);
        let content = config.to_owned();

        tokio::task::spawn_blocking(move || write_noclobber(&dir, &stem, content.as_bytes()))
            .await
            .map_err(|e| ArtifactError::Task(e.to_string()))?
    }
}

/// File name for an artifact captured at `captured_at`.
pub fn artifact_name(hostname: &str, ip: &str, captured_at: &DateTime<Local>) -> String {
    format!("{}.txt", artifact_stem(hostname, ip, captured_at))
}

fn artifact_stem(hostname: &str, ip: &str, captured_at: &DateTime<Local>) -> String {
    format!(
        "{}_{}_{}",
        sanitize(hostname),
        sanitize(ip),
        captured_at.format("%Y%m%d_%H%M%S")
    )
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn write_noclobber(dir: &Path, stem: &str, data: &[u8]) -> Result<ArtifactRef, ArtifactError> {
    fs::create_dir_all(dir).map_err(|source| ArtifactError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let write_error = |source: io::Error| ArtifactError::Write {
        dir: dir.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
    tmp.write_all(data).map_err(write_error)?;
    tmp.as_file().sync_all().map_err(write_error)?;

    let mut suffix = 0u32;
    loop {
        let name = match suffix {
            0 => format!("{}.txt", stem),
            n => format!("{}-{}.txt", stem, n),
        };
        let path = dir.join(name);

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                return Ok(ArtifactRef {
                    path,
                    bytes: data.len(),
                });
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tmp = e.file;
                suffix += 1;
            }
            Err(e) => return Err(ArtifactError::Persist { path, source: e.error }),
        }
    }
}
