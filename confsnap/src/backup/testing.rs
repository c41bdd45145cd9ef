//! In-memory connector used by the backup tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::driver::{Connector, DeviceSession, Response};
use crate::error::{ChannelError, Error, Result, TransportError};
use crate::inventory::{ConnectionParams, DeviceRecord};
use crate::platform::PlatformDefinition;

/// What a fake device does when contacted.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    /// Log in, show `prompt`, and answer every command with `output`.
    Answer { prompt: String, output: String },
    /// Reject the credentials.
    AuthFail,
    /// Never finish connecting.
    Hang,
    /// Drop the channel when the retrieval command is sent.
    Disconnect,
    /// Panic inside the session.
    Panic,
}

impl Behavior {
    pub(crate) fn answer(prompt: &str, output: &str) -> Self {
        Behavior::Answer {
            prompt: prompt.to_string(),
            output: output.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeConnector {
    behaviors: HashMap<String, Behavior>,
    fallback: Behavior,
    delay: Duration,
    pub counters: Arc<Counters>,
}

impl FakeConnector {
    /// Every device answers with a prompt built from its address.
    pub(crate) fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            fallback: Behavior::answer("", "hostname lab\n!\nend"),
            delay: Duration::ZERO,
            counters: Arc::new(Counters::default()),
        }
    }

    pub(crate) fn with(mut self, host: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(host.to_string(), behavior);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeSession {
    host: String,
    behavior: Behavior,
    counters: Arc<Counters>,
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(
        &self,
        params: ConnectionParams,
        _platform: &PlatformDefinition,
    ) -> Result<FakeSession> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let behavior = self
            .behaviors
            .get(&params.host)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        let outcome = match behavior {
            Behavior::AuthFail => Err(TransportError::AuthenticationFailed {
                user: params.username.clone(),
            }
            .into()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Timeout(Duration::from_secs(3600)).into())
            }
            behavior => Ok(FakeSession {
                host: params.host.clone(),
                behavior,
                counters: Arc::clone(&self.counters),
            }),
        };

        if outcome.is_err() {
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        outcome
    }
}

impl DeviceSession for FakeSession {
    async fn find_prompt(&mut self) -> Result<String> {
        match &self.behavior {
            Behavior::Answer { prompt, .. } if prompt.is_empty() => {
                Ok(format!("host-{}#", self.host.replace('.', "-")))
            }
            Behavior::Answer { prompt, .. } => Ok(prompt.clone()),
            Behavior::Panic => panic!("fake device {} panicked", self.host),
            _ => Ok(format!("{}#", self.host)),
        }
    }

    async fn send_command(&mut self, command: &str) -> Result<Response> {
        match &self.behavior {
            Behavior::Answer { output, prompt } => Ok(Response::new(
                command,
                output.clone(),
                output.clone(),
                prompt.clone(),
                Duration::from_millis(1),
            )),
            _ => Err(Error::Channel(ChannelError::Closed)),
        }
    }

    async fn close(self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A record with the fields the session client requires.
pub(crate) fn device(ip: &str, device_type: &str) -> DeviceRecord {
    DeviceRecord::new([
        ("ip", ip),
        ("device_type", device_type),
        ("username", "admin"),
        ("password", "pw"),
    ])
}
