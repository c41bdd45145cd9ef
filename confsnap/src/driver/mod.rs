//! Device session drivers.
//!
//! The driver layer opens an interactive session on one device and runs
//! commands on it. [`Connector`] and [`DeviceSession`] are the seam the
//! backup engine talks to; [`SshConnector`] and [`GenericDriver`] are the
//! SSH implementation.

mod generic;
pub(crate) mod response;

pub use generic::{GenericDriver, SshConnector};
pub use response::Response;

use std::future::Future;

use crate::error::Result;
use crate::inventory::ConnectionParams;
use crate::platform::PlatformDefinition;

/// Opens sessions to devices.
pub trait Connector: Send + Sync {
    /// Session type produced by this connector.
    type Session: DeviceSession;

    /// Connect, authenticate, and prepare a session for the platform.
    ///
    /// Transport connect, authentication, privilege escalation, and the
    /// platform's preparation commands are one logical step.
    fn connect(
        &self,
        params: ConnectionParams,
        platform: &PlatformDefinition,
    ) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// An open, prepared session on one device.
pub trait DeviceSession: Send {
    /// Return the device's current prompt, trimmed of surrounding whitespace.
    fn find_prompt(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Send a command and wait for the prompt.
    fn send_command(&mut self, command: &str) -> impl Future<Output = Result<Response>> + Send;

    /// Close the session.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
