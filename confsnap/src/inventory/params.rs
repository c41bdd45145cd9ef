//! Typed connection parameters derived from a device record.

use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;

use super::DeviceRecord;
use crate::error::InventoryError;
use crate::transport::AuthMethod;

/// Fields interpreted by [`ConnectionParams`]; everything else is an extra.
const KNOWN_FIELDS: &[&str] = &[
    "ip",
    "host",
    "device_type",
    "port",
    "username",
    "password",
    "secret",
    "key_file",
    "passphrase",
    "timeout",
    "conn_timeout",
];

/// How to reach and log into one device.
///
/// Built from a [`DeviceRecord`] and validated before any connection is
/// attempted. Secrets are wrapped so they never show up in `Debug` output.
#[derive(Debug)]
pub struct ConnectionParams {
    /// Address to connect to (`ip`, falling back to `host`).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Login user.
    pub username: String,

    /// Login authentication.
    pub auth: AuthMethod,

    /// Enable secret for privilege escalation.
    pub secret: Option<SecretString>,

    /// Per-device connect/read timeout overriding the connector default.
    pub timeout: Option<Duration>,

    /// Fields this struct does not interpret, in inventory order.
    pub extras: IndexMap<String, String>,
}

impl ConnectionParams {
    /// Validate a record and extract its connection parameters.
    pub fn from_record(record: &DeviceRecord) -> Result<Self, InventoryError> {
        let host = record
            .ip()
            .or_else(|| record.get("host"))
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| invalid("missing 'ip' field"))?
            .trim()
            .to_string();

        let port = match record.get("port") {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(0) | Err(_) => return Err(invalid(format!("invalid port '{}'", raw))),
                Ok(port) => port,
            },
            None => 22,
        };

        let username = record
            .get("username")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| invalid(format!("missing 'username' for {}", host)))?
            .to_string();

        let auth = if let Some(path) = record.get("key_file") {
            AuthMethod::PrivateKey {
                path: PathBuf::from(path),
                passphrase: record.get("passphrase").map(secret),
            }
        } else if let Some(password) = record.get("password") {
            AuthMethod::Password(secret(password))
        } else {
            AuthMethod::None
        };

        let timeout = record
            .get("timeout")
            .or_else(|| record.get("conn_timeout"))
            .map(parse_timeout)
            .transpose()?;

        let extras = record
            .iter()
            .filter(|(k, _)| !KNOWN_FIELDS.contains(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(Self {
            host,
            port,
            username,
            auth,
            secret: record.get("secret").map(secret),
            timeout,
            extras,
        })
    }
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn parse_timeout(raw: &str) -> Result<Duration, InventoryError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| invalid(format!("invalid timeout '{}'", raw)))
}

fn invalid(message: impl Into<String>) -> InventoryError {
    InventoryError::InvalidRecord {
        message: message.into(),
    }
}
