//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::Channel;
use russh::client::{self, AuthResult, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::error::{Result, TransportError};

/// SSH transport wrapping russh client.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(config.timeout),
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            known_hosts: KnownHosts {
                host: config.host.clone(),
                port: config.port,
                path: config.known_hosts_path.clone(),
            },
            verification: config.host_key_verification.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("connecting to {}", config.socket_addr());

        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed error check_server_key stored over the
            // generic russh::Error::UnknownKey
            if let Some(hk_err) = host_key_error.lock().ok().and_then(|mut slot| slot.take()) {
                return hk_err;
            }
            match e {
                russh::Error::IO(source) => TransportError::ConnectionFailed {
                    host: config.host.clone(),
                    port: config.port,
                    source,
                },
                other => TransportError::Ssh(other),
            }
        })?;

        tokio::time::timeout(config.timeout, Self::authenticate(&mut session, &config))
            .await
            .map_err(|_| TransportError::Timeout(config.timeout))??;

        debug!(
            "authenticated to {} as '{}' ({})",
            config.socket_addr(),
            config.username,
            config.auth.label()
        );

        Ok(Self { session, config })
    }

    /// Open a new PTY channel with an interactive shell on this connection.
    pub async fn open_channel(&self) -> Result<Channel<Msg>> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel)
    }

    /// The configuration this transport was opened with.
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Run the configured authentication method once.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let user = config.username.as_str();

        let outcome = match &config.auth {
            AuthMethod::None => session.authenticate_none(user).await,
            AuthMethod::Password(password) => {
                session
                    .authenticate_password(user, password.expose_secret())
                    .await
            }
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                    .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();
                session
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                    .await
            }
        };

        match outcome.map_err(TransportError::Ssh)? {
            AuthResult::Success => Ok(()),
            AuthResult::Failure { .. } => Err(TransportError::AuthenticationFailed {
                user: user.to_string(),
            }
            .into()),
        }
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// known_hosts entries for the host being connected to.
struct KnownHosts {
    host: String,
    port: u16,
    /// Alternate file; the user's default file when unset.
    path: Option<PathBuf>,
}

impl KnownHosts {
    fn status(&self, key: &PublicKey) -> std::result::Result<KeyStatus, TransportError> {
        let found = match &self.path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, key, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, key),
        };

        match found {
            Ok(true) => Ok(KeyStatus::Known),
            Ok(false) => Ok(KeyStatus::Unknown),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn(&self, key: &PublicKey) -> std::result::Result<(), TransportError> {
        let learned = match &self.path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, key, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, key),
        };

        learned.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyStatus {
    Known,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyDecision {
    Accept,
    Learn,
    RejectUnknown,
}

/// Decide what to do with a server key that is known or not.
fn key_decision(verification: &HostKeyVerification, status: KeyStatus) -> KeyDecision {
    match (verification, status) {
        (HostKeyVerification::Disabled, _) | (_, KeyStatus::Known) => KeyDecision::Accept,
        (HostKeyVerification::AcceptNew, KeyStatus::Unknown) => KeyDecision::Learn,
        (HostKeyVerification::Strict, KeyStatus::Unknown) => KeyDecision::RejectUnknown,
    }
}

/// russh callbacks for one connection.
struct SshHandler {
    known_hosts: KnownHosts,
    verification: HostKeyVerification,
    /// Detailed host-key error surfaced by connect().
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if self.verification == HostKeyVerification::Disabled {
            return Ok(true);
        }

        let decision = self
            .known_hosts
            .status(server_public_key)
            .map(|status| key_decision(&self.verification, status));

        let accepted = match decision {
            Ok(KeyDecision::Accept) => true,
            Ok(KeyDecision::Learn) => {
                match self.known_hosts.learn(server_public_key) {
                    Ok(()) => debug!("{}: host key recorded", self.known_hosts.host),
                    Err(e) => warn!("{}: could not record host key: {}", self.known_hosts.host, e),
                }
                true
            }
            Ok(KeyDecision::RejectUnknown) => self.reject(TransportError::HostKeyUnknown {
                host: self.known_hosts.host.clone(),
                port: self.known_hosts.port,
            }),
            Err(e) => self.reject(e),
        };

        Ok(accepted)
    }
}
