//! Generic SSH driver that works with any platform definition.

use std::time::Instant;

use log::{debug, warn};
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};

use super::response::{Response, normalize_output};
use super::{Connector, DeviceSession};
use crate::channel::{PtyChannel, PtyConfig, combine_patterns};
use crate::error::{DriverError, PlatformError, Result};
use crate::inventory::ConnectionParams;
use crate::platform::PlatformDefinition;
use crate::transport::{SshConfig, SshOptions, SshTransport};

/// [`Connector`] that opens SSH sessions with [`GenericDriver`].
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    /// Create a connector with run-wide SSH options.
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// Get the connector options.
    pub fn options(&self) -> &SshOptions {
        &self.options
    }
}

impl Connector for SshConnector {
    type Session = GenericDriver;

    async fn connect(
        &self,
        params: ConnectionParams,
        platform: &PlatformDefinition,
    ) -> Result<GenericDriver> {
        for field in params.extras.keys() {
            debug!("{}: ignoring inventory field '{}'", params.host, field);
        }

        let config = SshConfig {
            host: params.host,
            port: params.port,
            username: params.username,
            auth: params.auth,
            timeout: params.timeout.unwrap_or(self.options.timeout),
            terminal_width: platform.terminal_width,
            terminal_height: platform.terminal_height,
            host_key_verification: self.options.host_key_verification.clone(),
            known_hosts_path: self.options.known_hosts_path.clone(),
        };

        GenericDriver::open(config, platform.clone(), params.secret).await
    }
}

/// Interactive SSH session on one device.
///
/// Handles:
/// - prompt detection for every privilege level of the platform
/// - one-step privilege escalation (e.g. Cisco `enable`)
/// - session preparation commands
/// - command execution with output normalization and failure detection
pub struct GenericDriver {
    /// Platform definition.
    platform: PlatformDefinition,

    /// SSH transport.
    transport: SshTransport,

    /// Shell channel.
    channel: PtyChannel,

    /// Combined prompt pattern for all privilege levels.
    prompt_pattern: Regex,

    /// Current privilege level name, if the prompt was recognised.
    current_privilege: Option<String>,
}

impl GenericDriver {
    /// Connect, authenticate, and prepare a session.
    ///
    /// If anything after the transport connect fails, the transport is
    /// closed before the error is returned.
    pub async fn open(
        config: SshConfig,
        platform: PlatformDefinition,
        secret: Option<SecretString>,
    ) -> Result<Self> {
        let prompt_pattern = platform.prompt_pattern()?;
        let timeout = config.timeout;

        let transport = SshTransport::connect(config).await?;
        let channel = match transport.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = transport.close().await;
                return Err(e);
            }
        };

        let mut driver = Self {
            platform,
            transport,
            channel: PtyChannel::new(
                channel,
                PtyConfig {
                    timeout,
                    ..Default::default()
                },
            ),
            prompt_pattern,
            current_privilege: None,
        };

        match driver.prepare(secret.as_ref()).await {
            Ok(()) => Ok(driver),
            Err(e) => {
                let _ = driver.close().await;
                Err(e)
            }
        }
    }

    /// Initial prompt, privilege escalation, then preparation commands.
    async fn prepare(&mut self, secret: Option<&SecretString>) -> Result<()> {
        let (_, prompt) = self.read_until_prompt().await?;
        self.update_privilege(&prompt);
        debug!(
            "{}: initial prompt '{}' ({})",
            self.transport.config().host,
            prompt,
            self.current_privilege.as_deref().unwrap_or("unknown privilege")
        );

        self.acquire_default_privilege(secret).await?;

        for cmd in self.platform.on_open_commands.clone() {
            let response = self.send_command(&cmd).await?;
            if let Some(message) = response.failure_message {
                warn!(
                    "{}: preparation command '{}' failed: {}",
                    self.transport.config().host,
                    cmd,
                    message
                );
            }
        }

        Ok(())
    }

    /// Escalate one step to the platform's default privilege if needed.
    ///
    /// Without an enable secret the session stays where it logged in, and
    /// any command that needs more privilege fails on its own.
    async fn acquire_default_privilege(&mut self, secret: Option<&SecretString>) -> Result<()> {
        let Some(target) = self
            .platform
            .get_privilege(&self.platform.default_privilege)
            .cloned()
        else {
            return Ok(());
        };

        let current = self.current_privilege.clone();
        if current.as_deref() == Some(target.name.as_str()) {
            return Ok(());
        }

        let Some(command) = target.escalate_command.as_deref() else {
            return Ok(());
        };

        if current.is_none() || target.previous_priv != current {
            debug!(
                "{}: no escalation path from {:?} to '{}'",
                self.transport.config().host,
                current,
                target.name
            );
            return Ok(());
        }

        if target.escalate_prompt.is_some() && secret.is_none() {
            debug!(
                "{}: no enable secret, staying at '{}'",
                self.transport.config().host,
                current.as_deref().unwrap_or_default()
            );
            return Ok(());
        }

        self.channel.send(command).await?;

        let prompt = match (&target.escalate_prompt, secret) {
            (Some(auth_pattern), Some(secret)) => {
                let either = combine_patterns([auth_pattern, &self.prompt_pattern])
                    .map_err(PlatformError::from)?;
                let timeout = self.channel.timeout();
                let data = self.channel.read_until_pattern(&either, timeout).await?;

                match escalation_reply(auth_pattern, &data) {
                    EscalationReply::Prompt(prompt) => prompt,
                    EscalationReply::Password => {
                        self.channel.send(secret.expose_secret()).await?;
                        let data = self.channel.read_until_pattern(&either, timeout).await?;

                        match escalation_reply(auth_pattern, &data) {
                            EscalationReply::Prompt(prompt) => prompt,
                            EscalationReply::Password => {
                                return Err(DriverError::SecretRejected {
                                    target: target.name.clone(),
                                }
                                .into());
                            }
                        }
                    }
                }
            }
            _ => self.read_until_prompt().await?.1,
        };

        self.update_privilege(&prompt);
        if self.current_privilege.as_deref() != Some(target.name.as_str()) {
            return Err(DriverError::PrivilegeAcquisitionFailed {
                target: target.name.clone(),
            }
            .into());
        }

        debug!("{}: now at '{}'", self.transport.config().host, target.name);
        Ok(())
    }

    /// Read until the prompt is matched; returns (output, prompt line).
    async fn read_until_prompt(&mut self) -> Result<(String, String)> {
        let timeout = self.channel.timeout();
        let data = self
            .channel
            .read_until_pattern(&self.prompt_pattern, timeout)
            .await?;

        let prompt = last_line(&data);
        let output = String::from_utf8_lossy(&data).into_owned();
        Ok((output, prompt))
    }

    fn update_privilege(&mut self, prompt: &str) {
        self.current_privilege = self
            .platform
            .determine_privilege(prompt)
            .map(|level| level.name.clone());
    }
}

impl DeviceSession for GenericDriver {
    async fn find_prompt(&mut self) -> Result<String> {
        self.channel.send("").await?;
        let (_, prompt) = self.read_until_prompt().await?;
        self.update_privilege(&prompt);
        Ok(prompt)
    }

    async fn send_command(&mut self, command: &str) -> Result<Response> {
        let start = Instant::now();

        self.channel.send(command).await?;
        let (raw_result, prompt) = self.read_until_prompt().await?;
        let elapsed = start.elapsed();

        self.update_privilege(&prompt);

        let result = normalize_output(&raw_result, command);
        let failure = self
            .platform
            .failed_when_contains
            .iter()
            .find(|pattern| result.contains(pattern.as_str()))
            .cloned();

        let response = Response::new(command, result, raw_result, prompt, elapsed);
        Ok(match failure {
            Some(pattern) => response.with_failure(pattern),
            None => response,
        })
    }

    async fn close(mut self) -> Result<()> {
        if let Err(e) = self.channel.close().await {
            debug!("{}: channel close failed: {}", self.transport.config().host, e);
        }
        self.transport.close().await
    }
}

/// Last line of a PTY read, trimmed. This is where the prompt sits.
fn last_line(data: &[u8]) -> String {
    let start = memchr::memrchr(b'\n', data).map_or(0, |pos| pos + 1);
    String::from_utf8_lossy(&data[start..]).trim().to_string()
}

/// What the device showed after an escalation step.
#[derive(Debug, PartialEq, Eq)]
enum EscalationReply {
    /// A password prompt.
    Password,
    /// A device prompt (the last line of the read).
    Prompt(String),
}

fn escalation_reply(auth_pattern: &Regex, data: &[u8]) -> EscalationReply {
    let line = last_line(data);
    if auth_pattern.is_match(line.as_bytes()) {
        EscalationReply::Password
    } else {
        EscalationReply::Prompt(line)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::HostKeyVerification;

    #[test]
    fn test_last_line() {
        assert_eq!(last_line(b"show clock\r\n10:00\r\nR1#"), "R1#");
        assert_eq!(last_line(b"R1> "), "R1>");
        assert_eq!(last_line(b"\r\nPassword: "), "Password:");
        assert_eq!(last_line(b""), "");
    }

    #[test]
    fn test_escalation_reply() {
        let platform = crate::platform::vendors::cisco::ios();
        let auth = platform
            .get_privilege("privilege_exec")
            .and_then(|level| level.escalate_prompt.clone())
            .unwrap();

        assert_eq!(escalation_reply(&auth, b"enable\r\nPassword: "), EscalationReply::Password);
        assert_eq!(
            escalation_reply(&auth, b"\r\nR1#"),
            EscalationReply::Prompt("R1#".to_string())
        );
        // wrong secret: IOS asks again instead of showing a prompt
        assert_eq!(
            escalation_reply(&auth, b"\r\n% Access denied\r\n\r\nPassword: "),
            EscalationReply::Password
        );
    }

    #[test]
    fn test_repeated_password_prompt_matches_combined_pattern() {
        let platform = crate::platform::vendors::cisco::ios();
        let auth = platform
            .get_privilege("privilege_exec")
            .and_then(|level| level.escalate_prompt.clone())
            .unwrap();
        let prompt = platform.prompt_pattern().unwrap();
        let either = combine_patterns([&auth, &prompt]).unwrap();

        // the read after the secret must stop on a second password prompt
        assert!(either.is_match(b"\r\nPassword: "));
        assert!(either.is_match(b"\r\nR1#"));
        assert!(!prompt.is_match(b"\r\nPassword: "));
    }

    #[test]
    fn test_connector_defaults() {
        let connector = SshConnector::default();
        assert_eq!(connector.options().timeout, Duration::from_secs(30));
        assert_eq!(
            connector.options().host_key_verification,
            HostKeyVerification::AcceptNew
        );
    }
}
