//! # confsnap
//!
//! Batch running-config backup for network device fleets over SSH.
//!
//! confsnap reads a device inventory (JSON or CSV), logs into every device
//! over an interactive SSH shell, captures the output of the device type's
//! retrieval command (`show running-config` for the built-in Cisco types),
//! and stores it as `{hostname}_{ip}_{YYYYMMDD_HHMMSS}.txt`. A device that
//! fails is recorded in an error log and never stops the rest of the batch.
//!
//! ## Features
//!
//! - Async SSH sessions via russh with host key verification
//! - Prompt detection with ANSI stripping and tail search
//! - Enable-mode escalation and terminal preparation per platform
//! - Extensible device-type catalog
//! - Bounded worker pool with cancellation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use confsnap::{
//!     ArtifactWriter, BackupOrchestrator, CommandCatalog, ErrorLog, SessionClient, SshConnector,
//!     load_inventory,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = load_inventory("devices.json")?;
//!
//!     let client = SessionClient::new(Arc::new(CommandCatalog::builtin()), SshConnector::default());
//!     let (reporter, log) = ErrorLog::spawn("error.log");
//!     let orchestrator = BackupOrchestrator::new(client, ArtifactWriter::new("."), reporter);
//!
//!     let summary = orchestrator.run(devices).await;
//!     drop(orchestrator);
//!     log.finish().await?;
//!
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod channel;
pub mod driver;
pub mod error;
pub mod inventory;
pub mod platform;
pub mod transport;

// Re-export main types for convenience
pub use backup::{
    ArtifactWriter, BackupOrchestrator, ErrorLog, ErrorReporter, Failure, FetchedConfig, RunConfig,
    RunSummary, SessionClient, SessionResult,
};
pub use driver::{Connector, DeviceSession, GenericDriver, Response, SshConnector};
pub use error::{Error, ErrorKind};
pub use inventory::{ConnectionParams, DeviceRecord, load_inventory};
pub use platform::{CommandCatalog, Dispatch, PlatformDefinition, PrivilegeLevel};
pub use transport::{AuthMethod, HostKeyVerification, SshConfig, SshOptions};
