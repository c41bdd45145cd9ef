//! Single-device configuration retrieval.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use super::{FetchedConfig, Failure, SessionResult};
use crate::channel::strip_prompt_decoration;
use crate::driver::{Connector, DeviceSession};
use crate::error::{DriverError, ErrorKind, Result};
use crate::inventory::{ConnectionParams, DeviceRecord};
use crate::platform::{CommandCatalog, Dispatch, PlatformDefinition};

/// Upper bound on one device's whole session.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(120);

/// Fetches the running configuration from one device at a time.
///
/// The client holds no per-device state: every call resolves the platform,
/// opens a fresh session, and closes it again before returning.
pub struct SessionClient<C> {
    catalog: Arc<CommandCatalog>,
    connector: C,
    device_timeout: Duration,
}

impl<C: Connector> SessionClient<C> {
    pub fn new(catalog: Arc<CommandCatalog>, connector: C) -> Self {
        Self {
            catalog,
            connector,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
        }
    }

    /// Set the deadline for a whole device session.
    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = timeout;
        self
    }

    /// Retrieve the configuration of the device described by `record`.
    ///
    /// Unsupported device types and invalid records fail without any
    /// connection attempt.
    pub async fn fetch_config(&self, record: &DeviceRecord) -> SessionResult {
        let ip = record.label().to_string();

        let platform = match self.catalog.lookup(record.device_type().unwrap_or_default()) {
            Dispatch::Supported(platform) => platform,
            Dispatch::Unsupported => {
                let detail = format!(
                    "{} type {}",
                    ip,
                    record.device_type().unwrap_or("<unset>")
                );
                return Err(Failure::new(ErrorKind::Unsupported, ip, detail));
            }
        };

        let params = ConnectionParams::from_record(record)
            .map_err(|e| Failure::new(ErrorKind::InvalidRecord, &ip, e.to_string()))?;

        info!("[connect] connecting to {} ...", ip);

        match tokio::time::timeout(self.device_timeout, self.session(params, platform, &ip)).await {
            Ok(result) => result.map_err(|e| Failure::from_error(&ip, &e)),
            Err(_) => Err(Failure::new(
                ErrorKind::Timeout,
                ip,
                format!("device session exceeded {:?}", self.device_timeout),
            )),
        }
    }

    async fn session(
        &self,
        params: ConnectionParams,
        platform: &PlatformDefinition,
        ip: &str,
    ) -> Result<FetchedConfig> {
        let mut session = self.connector.connect(params, platform).await?;
        let fetched = fetch(&mut session, platform, ip).await;

        if let Err(e) = session.close().await {
            debug!("{}: close failed: {}", ip, e);
        }

        fetched
    }
}

async fn fetch<S: DeviceSession>(
    session: &mut S,
    platform: &PlatformDefinition,
    ip: &str,
) -> Result<FetchedConfig> {
    let prompt = session.find_prompt().await?;
    let hostname = strip_prompt_decoration(&prompt);
    if hostname.is_empty() {
        return Err(DriverError::EmptyPrompt.into());
    }

    info!("[login] logged in to {} ({}), fetching config", hostname, ip);

    let response = session.send_command(&platform.command).await?;
    if let Some(message) = response.failure_message {
        return Err(DriverError::CommandFailed {
            command: response.command,
            message,
        }
        .into());
    }

    Ok(FetchedConfig {
        hostname: hostname.to_string(),
        config: response.result,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::backup::testing::{Behavior, FakeConnector, device};
    use crate::driver::Response;
    use crate::inventory::DeviceRecord;

    fn client(connector: FakeConnector) -> SessionClient<FakeConnector> {
        SessionClient::new(Arc::new(CommandCatalog::builtin()), connector)
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let connector = FakeConnector::new().with(
            "10.0.0.1",
            Behavior::answer("\r\nR1#", "hostname R1\n!\nend"),
        );
        let client = client(connector.clone());

        let fetched = assert_ok!(client.fetch_config(&device("10.0.0.1", "cisco_ios")).await);
        assert_eq!(fetched.hostname, "R1");
        assert_eq!(fetched.config, "hostname R1\n!\nend");
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_makes_no_connection() {
        let connector = FakeConnector::new();
        let client = client(connector.clone());

        let failure = client
            .fetch_config(&device("10.0.0.2", "juniper_junos"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Unsupported);
        assert_eq!(failure.detail, "10.0.0.2 type juniper_junos");

        let missing = DeviceRecord::new([("ip", "10.0.0.3")]);
        let failure = client.fetch_config(&missing).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Unsupported);
        assert!(failure.detail.contains("<unset>"));

        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_invalid_record_makes_no_connection() {
        let connector = FakeConnector::new();
        let client = client(connector.clone());

        let record = DeviceRecord::new([("ip", "10.0.0.4"), ("device_type", "cisco_ios")]);
        let failure = client.fetch_config(&record).await.unwrap_err();
        assert_eq!(failure.kind, ErrorKind::InvalidRecord);
        assert!(failure.detail.contains("username"));
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let connector = FakeConnector::new().with("10.0.0.5", Behavior::AuthFail);
        let failure = assert_err!(
            client(connector)
                .fetch_config(&device("10.0.0.5", "cisco_xe"))
                .await
        );
        assert_eq!(failure.kind, ErrorKind::AuthFailed);
        assert_eq!(failure.ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_device_deadline() {
        let connector = FakeConnector::new().with("10.0.0.6", Behavior::Hang);
        let client = client(connector).with_device_timeout(Duration::from_millis(50));

        let start = Instant::now();
        let failure = client
            .fetch_config(&device("10.0.0.6", "cisco_nxos"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Timeout);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_disconnect_is_unknown_and_session_closed() {
        let connector = FakeConnector::new().with("10.0.0.7", Behavior::Disconnect);
        let client = client(connector.clone());

        let failure = client
            .fetch_config(&device("10.0.0.7", "cisco_asa"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Unknown);
        assert!(failure.detail.contains("Channel closed"));
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_unknown() {
        let connector = FakeConnector::new().with("10.0.0.8", Behavior::answer("#\r\n", "x"));
        let failure = client(connector)
            .fetch_config(&device("10.0.0.8", "cisco_ios"))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::Unknown);
        assert!(failure.detail.contains("empty prompt"));
    }

    #[tokio::test]
    async fn test_failure_pattern_in_output() {
        struct Rejecting;
        impl DeviceSession for Rejecting {
            async fn find_prompt(&mut self) -> Result<String> {
                Ok("R9>".to_string())
            }
            async fn send_command(&mut self, command: &str) -> Result<Response> {
                Ok(Response::new(command, "% Invalid input detected", "", "R9>", Duration::ZERO)
                    .with_failure("% Invalid input"))
            }
            async fn close(self) -> Result<()> {
                Ok(())
            }
        }

        let platform = crate::platform::vendors::cisco::ios();
        let err = fetch(&mut Rejecting, &platform, "10.0.0.9").await.unwrap_err();
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Unknown);
        assert!(err.to_string().contains("% Invalid input"));
    }
}
