//! Batch driver for a whole inventory.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;

use super::{ArtifactRef, ArtifactWriter, ErrorReporter, Failure, SessionClient};
use crate::driver::Connector;
use crate::error::ErrorKind;
use crate::inventory::DeviceRecord;

/// Run-wide settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of devices processed at once (at least 1).
    pub concurrency: usize,

    /// Stop dispatching new devices after this long.
    pub run_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            run_timeout: None,
        }
    }
}

impl RunConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    /// Failures per kind.
    pub failures: BTreeMap<ErrorKind, usize>,
}

impl RunSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn record_success(&mut self) {
        self.succeeded += 1;
    }

    fn record_failure(&mut self, kind: ErrorKind) {
        self.failed += 1;
        *self.failures.entry(kind).or_default() += 1;
    }

    /// Devices whose session was started or skipped after lookup.
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Number of failures of one kind.
    pub fn failures_of(&self, kind: ErrorKind) -> usize {
        self.failures.get(&kind).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} devices: {} succeeded, {} failed",
            self.total, self.succeeded, self.failed
        )?;
        if self.not_attempted > 0 {
            write!(f, ", {} not attempted", self.not_attempted)?;
        }
        if !self.failures.is_empty() {
            let kinds: Vec<String> = self
                .failures
                .iter()
                .map(|(kind, n)| format!("{}={}", kind, n))
                .collect();
            write!(f, " ({})", kinds.join(", "))?;
        }
        Ok(())
    }
}

type Outcome = Result<ArtifactRef, Failure>;

/// Runs every device of an inventory through a [`SessionClient`].
///
/// Devices are pulled from a shared queue by a fixed number of workers.
/// Each device runs in its own task, so a fault in one device (including a
/// panic) is recorded as a failure for that device and nothing else.
pub struct BackupOrchestrator<C> {
    client: Arc<SessionClient<C>>,
    writer: ArtifactWriter,
    reporter: ErrorReporter,
    config: RunConfig,
}

impl<C: Connector + 'static> BackupOrchestrator<C> {
    pub fn new(client: SessionClient<C>, writer: ArtifactWriter, reporter: ErrorReporter) -> Self {
        Self {
            client: Arc::new(client),
            writer,
            reporter,
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Back up every device.
    pub async fn run(&self, devices: Vec<DeviceRecord>) -> RunSummary {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_with_cancel(devices, cancel_rx).await
    }

    /// Back up every device until `cancel` turns true or the run timeout
    /// elapses. Devices already in progress are allowed to finish.
    pub async fn run_with_cancel(
        &self,
        devices: Vec<DeviceRecord>,
        cancel: watch::Receiver<bool>,
    ) -> RunSummary {
        let mut summary = RunSummary::new(devices.len());
        let deadline = self.config.run_timeout.map(|t| Instant::now() + t);
        let workers = self.config.concurrency.max(1).min(devices.len());

        info!(
            "backing up {} devices with {} workers",
            devices.len(),
            workers
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(devices)));
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();

        for id in 0..workers {
            tokio::spawn(worker(
                id,
                Arc::clone(&self.client),
                self.writer.clone(),
                Arc::clone(&queue),
                cancel.clone(),
                deadline,
                tx.clone(),
            ));
        }
        drop(tx);

        while let Some(outcome) = rx.recv().await {
            match outcome {
                Ok(artifact) => {
                    info!("[done] config saved to {}", artifact.path.display());
                    summary.record_success();
                }
                Err(failure) => {
                    let message = failure.log_message();
                    if failure.kind.is_preflight() {
                        warn!("{}", message);
                    } else {
                        error!("{}", message);
                    }
                    self.reporter.report(message);
                    summary.record_failure(failure.kind);
                }
            }
        }

        summary.not_attempted = queue.lock().await.len();
        if summary.not_attempted > 0 {
            let reason = if *cancel.borrow() {
                "run cancelled"
            } else {
                "run timeout reached"
            };
            let message = format!(
                "[skip] {}: {} devices not attempted",
                reason, summary.not_attempted
            );
            warn!("{}", message);
            self.reporter.report(message);
        }

        info!("{}", summary);
        summary
    }
}

fn stopped(cancel: &watch::Receiver<bool>, deadline: Option<Instant>) -> bool {
    *cancel.borrow() || deadline.is_some_and(|d| Instant::now() >= d)
}

async fn worker<C: Connector + 'static>(
    id: usize,
    client: Arc<SessionClient<C>>,
    writer: ArtifactWriter,
    queue: Arc<Mutex<VecDeque<DeviceRecord>>>,
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
    tx: mpsc::UnboundedSender<Outcome>,
) {
    loop {
        if stopped(&cancel, deadline) {
            debug!("worker {}: stopping dispatch", id);
            break;
        }

        let Some(record) = queue.lock().await.pop_front() else {
            break;
        };

        let ip = record.label().to_string();
        let task = tokio::spawn(process(Arc::clone(&client), writer.clone(), record));

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let detail = if e.is_panic() {
                    "device task panicked"
                } else {
                    "device task was cancelled"
                };
                Err(Failure::new(ErrorKind::Unknown, ip, detail))
            }
        };

        if tx.send(outcome).is_err() {
            break;
        }
    }
}

async fn process<C: Connector>(
    client: Arc<SessionClient<C>>,
    writer: ArtifactWriter,
    record: DeviceRecord,
) -> Outcome {
    let fetched = client.fetch_config(&record).await?;
    let ip = record.label();

    writer
        .persist(&fetched.hostname, ip, &fetched.config, Local::now())
        .await
        .map_err(|e| Failure::new(ErrorKind::IoError, ip, e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::backup::ErrorLog;
    use crate::backup::testing::{Behavior, FakeConnector, device};
    use crate::platform::CommandCatalog;

    struct Harness {
        dir: tempfile::TempDir,
        orchestrator: BackupOrchestrator<FakeConnector>,
        log: ErrorLog,
    }

    impl Harness {
        fn new(connector: FakeConnector, config: RunConfig) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let client = SessionClient::new(Arc::new(CommandCatalog::builtin()), connector)
                .with_device_timeout(Duration::from_millis(100));
            let (reporter, log) = ErrorLog::spawn(dir.path().join("error.log"));
            let orchestrator =
                BackupOrchestrator::new(client, ArtifactWriter::new(dir.path().join("configs")), reporter)
                    .with_config(config);
            Self {
                dir,
                orchestrator,
                log,
            }
        }

        fn artifacts(&self) -> Vec<String> {
            artifacts_in(&self.dir.path().join("configs"))
        }

        /// Stop the writer and return the error log lines.
        async fn error_lines(self) -> Vec<String> {
            let Harness {
                dir,
                orchestrator,
                log,
            } = self;
            drop(orchestrator);
            log.finish().await.unwrap();

            match fs::read_to_string(dir.path().join("error.log")) {
                Ok(contents) => contents.lines().map(str::to_string).collect(),
                Err(_) => Vec::new(),
            }
        }
    }

    fn artifacts_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn mixed_fleet() -> (FakeConnector, Vec<DeviceRecord>) {
        let connector = FakeConnector::new()
            .with("10.0.1.2", Behavior::AuthFail)
            .with("10.0.1.3", Behavior::Hang)
            .with("10.0.1.4", Behavior::Disconnect)
            .with("10.0.1.5", Behavior::Panic);

        let devices = vec![
            device("10.0.1.1", "cisco_ios"),
            device("10.0.1.2", "cisco_xe"),
            device("10.0.1.3", "cisco_xr"),
            device("10.0.1.4", "cisco_nxos"),
            device("10.0.1.5", "cisco_asa"),
            device("10.0.1.6", "juniper_junos"),
            DeviceRecord::new([("ip", "10.0.1.7"), ("device_type", "cisco_ios")]),
            device("10.0.1.8", "cisco_asa"),
            device("10.0.1.9", "cisco_xe"),
        ];
        (connector, devices)
    }

    #[tokio::test]
    async fn test_supported_and_unsupported_device() {
        let connector = FakeConnector::new();
        let harness = Harness::new(connector.clone(), RunConfig::default());

        let summary = harness
            .orchestrator
            .run(vec![
                device("10.0.0.1", "cisco_ios"),
                device("10.0.0.2", "juniper_junos"),
            ])
            .await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures_of(ErrorKind::Unsupported), 1);
        assert_eq!(connector.connects(), 1);

        let artifacts = harness.artifacts();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].starts_with("host-10-0-0-1_10.0.0.1_"));
        assert!(artifacts[0].ends_with(".txt"));

        let lines = harness.error_lines().await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("10.0.0.2"));
        assert!(lines[0].contains("juniper_junos"));
    }

    #[tokio::test]
    async fn test_writer_failure_is_io_error() {
        let connector = FakeConnector::new();
        let harness = Harness::new(connector.clone(), RunConfig::default());
        fs::write(harness.dir.path().join("configs"), "x").unwrap();

        let summary = harness
            .orchestrator
            .run(vec![device("10.0.0.1", "cisco_ios")])
            .await;

        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures_of(ErrorKind::IoError), 1);
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 1);
        assert!(harness.artifacts().is_empty());

        let lines = harness.error_lines().await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[error] could not save config for 10.0.0.1"));
    }

    #[tokio::test]
    async fn test_every_device_is_counted() {
        let (connector, devices) = mixed_fleet();
        let harness = Harness::new(connector, RunConfig::default().with_concurrency(3));

        let summary = harness.orchestrator.run(devices).await;

        assert_eq!(summary.total, 9);
        assert_eq!(summary.succeeded + summary.failed, 9);
        assert_eq!(summary.not_attempted, 0);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failures_of(ErrorKind::AuthFailed), 1);
        assert_eq!(summary.failures_of(ErrorKind::Timeout), 1);
        assert_eq!(summary.failures_of(ErrorKind::Unknown), 2);
        assert_eq!(summary.failures_of(ErrorKind::Unsupported), 1);
        assert_eq!(summary.failures_of(ErrorKind::InvalidRecord), 1);

        let artifacts = harness.artifacts();
        assert_eq!(artifacts.len(), 3);
        assert!(!artifacts.iter().any(|a| a.contains("10.0.1.3")));

        let lines = harness.error_lines().await;
        assert_eq!(lines.len(), 6);
        let timeouts: Vec<&String> = lines.iter().filter(|l| l.contains("(timeout)")).collect();
        assert_eq!(timeouts.len(), 1);
        assert!(timeouts[0].contains("10.0.1.3"));
        assert!(lines.iter().any(|l| l.contains("[exception]") && l.contains("10.0.1.5")));
    }

    #[tokio::test]
    async fn test_counts_independent_of_order_and_concurrency() {
        let mut results = Vec::new();

        for (concurrency, rotate) in [(1, 0), (8, 0), (1, 4), (3, 7)] {
            let (connector, mut devices) = mixed_fleet();
            devices.rotate_left(rotate);
            if rotate % 2 == 1 {
                devices.reverse();
            }

            let harness = Harness::new(connector, RunConfig::default().with_concurrency(concurrency));
            let summary = harness.orchestrator.run(devices).await;
            results.push(summary);
        }

        for summary in &results[1..] {
            assert_eq!(summary, &results[0]);
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let connector = FakeConnector::new().with_delay(Duration::from_millis(20));
        let harness = Harness::new(connector.clone(), RunConfig::default().with_concurrency(3));

        let devices = (1..=10)
            .map(|n| device(&format!("10.0.2.{}", n), "cisco_ios"))
            .collect();
        let summary = harness.orchestrator.run(devices).await;

        assert_eq!(summary.succeeded, 10);
        assert!(connector.max_in_flight() <= 3);
        assert!(connector.max_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_same_identity_keeps_both_artifacts() {
        let connector = FakeConnector::new().with("10.0.3.1", Behavior::answer("R1#", "hostname R1"));
        let harness = Harness::new(connector, RunConfig::default().with_concurrency(2));

        let summary = harness
            .orchestrator
            .run(vec![device("10.0.3.1", "cisco_ios"), device("10.0.3.1", "cisco_ios")])
            .await;

        assert_eq!(summary.succeeded, 2);
        let artifacts = harness.artifacts();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.iter().all(|a| a.starts_with("R1_10.0.3.1_")));
    }

    #[tokio::test]
    async fn test_cancelled_run_attempts_nothing() {
        let connector = FakeConnector::new();
        let harness = Harness::new(connector.clone(), RunConfig::default());
        let (_tx, cancel) = watch::channel(true);

        let devices = vec![device("10.0.4.1", "cisco_ios"), device("10.0.4.2", "cisco_ios")];
        let summary = harness.orchestrator.run_with_cancel(devices, cancel).await;

        assert_eq!(summary.attempted(), 0);
        assert_eq!(summary.not_attempted, 2);
        assert_eq!(connector.connects(), 0);
        assert!(harness.artifacts().is_empty());

        let lines = harness.error_lines().await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("run cancelled: 2 devices not attempted"));
    }

    #[tokio::test]
    async fn test_run_timeout_stops_dispatch() {
        let connector = FakeConnector::new();
        let harness = Harness::new(connector, RunConfig::default().with_run_timeout(Duration::ZERO));

        let summary = harness
            .orchestrator
            .run(vec![device("10.0.5.1", "cisco_ios")])
            .await;

        assert_eq!(summary.not_attempted, 1);
        let lines = harness.error_lines().await;
        assert!(lines[0].contains("run timeout reached"));
    }

    #[tokio::test]
    async fn test_empty_inventory() {
        let harness = Harness::new(FakeConnector::new(), RunConfig::default());
        let summary = harness.orchestrator.run(Vec::new()).await;
        assert_eq!(summary, RunSummary::default());
        assert!(harness.error_lines().await.is_empty());
    }

    #[test]
    fn test_summary_display_and_json() {
        let mut summary = RunSummary::new(3);
        summary.record_success();
        summary.record_failure(ErrorKind::Timeout);
        summary.not_attempted = 1;

        assert_eq!(
            summary.to_string(),
            "3 devices: 1 succeeded, 1 failed, 1 not attempted (timeout=1)"
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failures"]["timeout"], 1);
    }

    #[test]
    fn test_run_config() {
        let config = RunConfig::default();
        assert_eq!(config.concurrency, 4);
        assert!(config.run_timeout.is_none());
        assert_eq!(RunConfig::default().with_concurrency(0).concurrency, 1);
    }
}
