//! Error types for confsnap.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for confsnap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Platform/catalog errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Inventory loading errors
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Server presented a key that differs from the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Server is not in known_hosts and strict checking is enabled
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Channel layer errors (pattern matching, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(std::time::Duration),

    /// Channel closed unexpectedly
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),
}

/// Driver layer errors (command execution, privilege escalation).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Command output matched one of the platform's failure patterns
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Failed to acquire target privilege level
    #[error("Failed to acquire privilege level '{target}'")]
    PrivilegeAcquisitionFailed { target: String },

    /// Device asked for the password again after the enable secret was sent
    #[error("Enable secret rejected while entering '{target}'")]
    SecretRejected { target: String },

    /// Unknown privilege level detected
    #[error("Unknown privilege level from prompt: '{prompt}'")]
    UnknownPrivilege { prompt: String },

    /// Device prompt was empty after stripping decoration
    #[error("Device returned an empty prompt")]
    EmptyPrompt,
}

/// Platform/catalog definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid platform definition
    #[error("Invalid platform definition '{name}': {message}")]
    InvalidDefinition { name: String, message: String },

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Catalog file could not be read
    #[error("Failed to read catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Catalog file is not valid JSON for the expected shape
    #[error("Failed to parse catalog {path}: {source}")]
    CatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Inventory loading errors. All of these are fatal for a run.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// File could not be opened or read
    #[error("Failed to read inventory {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON inventory is malformed
    #[error("Invalid JSON inventory {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// CSV inventory is malformed
    #[error("Invalid CSV inventory {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// File extension is neither `.json` nor `.csv`
    #[error("Unsupported inventory format for {path}: only JSON or CSV files are supported")]
    UnsupportedFormat { path: PathBuf },

    /// A record is missing a required field or carries an unparseable value
    #[error("Invalid device record: {message}")]
    InvalidRecord { message: String },
}

/// Result type alias using confsnap's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Per-device failure classification reported by a backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Device type has no catalog entry; no connection was attempted.
    Unsupported,
    /// Record failed validation; no connection was attempted.
    InvalidRecord,
    /// Connect, read, or per-device deadline timed out.
    Timeout,
    /// The device rejected the credentials.
    AuthFailed,
    /// The artifact could not be written locally.
    IoError,
    /// Any other session fault.
    Unknown,
}

impl ErrorKind {
    /// Map a library error onto the per-device taxonomy.
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::Transport(TransportError::Timeout(_))
            | Error::Channel(ChannelError::PatternTimeout(_)) => ErrorKind::Timeout,
            Error::Transport(TransportError::ConnectionFailed { source, .. })
                if source.kind() == io::ErrorKind::TimedOut =>
            {
                ErrorKind::Timeout
            }
            Error::Transport(TransportError::AuthenticationFailed { .. })
            | Error::Driver(DriverError::SecretRejected { .. }) => ErrorKind::AuthFailed,
            Error::Inventory(InventoryError::InvalidRecord { .. }) => ErrorKind::InvalidRecord,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether this kind is decided before any network activity.
    pub fn is_preflight(self) -> bool {
        matches!(self, ErrorKind::Unsupported | ErrorKind::InvalidRecord)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::InvalidRecord => "invalid_record",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AuthFailed => "auth_failed",
            ErrorKind::IoError => "io_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
