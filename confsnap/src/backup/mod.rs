//! Batch configuration backup.
//!
//! [`SessionClient`] fetches one device's configuration, [`ArtifactWriter`]
//! stores it, [`ErrorLog`] records per-device failures, and
//! [`BackupOrchestrator`] drives a whole inventory through them with a
//! bounded worker pool.

mod artifact;
mod client;
mod orchestrator;
mod report;
#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{ArtifactError, ArtifactRef, ArtifactWriter, artifact_name};
pub use client::{DEFAULT_DEVICE_TIMEOUT, SessionClient};
pub use orchestrator::{BackupOrchestrator, RunConfig, RunSummary};
pub use report::{ErrorLog, ErrorReporter};

use std::fmt;

use crate::error::{Error, ErrorKind};

/// Configuration captured from one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedConfig {
    /// Device identity derived from its prompt.
    pub hostname: String,

    /// Output of the retrieval command.
    pub config: String,
}

/// Why a device produced no artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub ip: String,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, ip: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            ip: ip.into(),
            detail: detail.into(),
        }
    }

    /// Classify a library error raised while talking to `ip`.
    pub fn from_error(ip: impl Into<String>, error: &Error) -> Self {
        Self::new(ErrorKind::classify(error), ip, error.to_string())
    }

    /// The line written to the console and the error log.
    pub fn log_message(&self) -> String {
        match self.kind {
            ErrorKind::Unsupported => {
                format!("[skip] device {} is not supported for backup", self.detail)
            }
            ErrorKind::InvalidRecord => {
                format!("[skip] device {} has an invalid record: {}", self.ip, self.detail)
            }
            ErrorKind::Timeout | ErrorKind::AuthFailed => format!(
                "[error] connection to {} failed ({}): {}",
                self.ip, self.kind, self.detail
            ),
            ErrorKind::IoError => {
                format!("[error] could not save config for {}: {}", self.ip, self.detail)
            }
            ErrorKind::Unknown => format!(
                "[exception] unknown error while processing {}: {}",
                self.ip, self.detail
            ),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.log_message())
    }
}

/// Outcome of one device session.
pub type SessionResult = Result<FetchedConfig, Failure>;
