//! Usage sync engine
//!
//! Up to four tasks cooperate:
//! - the poller fires a fetch cycle on start, every poll interval, and on
//!   manual refresh; each cycle runs in its own task so a slow request never
//!   delays the next trigger
//! - the ticker recomputes countdowns every UI tick without touching I/O
//! - the writer is the only task that mutates the snapshot; it applies
//!   updates in arrival order, then redraws
//! - the exporter, when an export path is set, writes the newest snapshot
//!   to disk off the writer's path
//!
//! Readers observe the snapshot through a `watch` channel and never see a
//! partially applied update.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::{EngineConfig, MAX_POLL_INTERVAL, MAX_UI_TICK, MIN_POLL_INTERVAL, MIN_UI_TICK};
use crate::detector::{Detection, ModelDetector};
use crate::display::DisplaySink;
use crate::providers::{ClaudeUsageApi, UsageApi};
use crate::storage::snapshot_file::write_snapshot;
use crate::storage::{ClaudeCredentialProvider, CredentialProvider};
use crate::usage::status::ConnectionStateMachine;
use crate::usage::{parse_usage_body, SyncError, UsagePayload, UsageSnapshot};

/// One credential lookup plus one authenticated GET. Never panics and never
/// returns a fault the caller has to handle beyond mapping it to a status.
pub async fn run_fetch_cycle(
    credentials: &dyn CredentialProvider,
    api: &dyn UsageApi,
    now: DateTime<Utc>,
) -> Result<UsagePayload, SyncError> {
    let Some(creds) = credentials.lookup().await else {
        tracing::warn!("No Claude credentials available");
        return Err(SyncError::NoCredential);
    };

    if creds.is_expired(now) {
        tracing::warn!("Claude access token expired at {}", creds.expires_at);
        credentials.invalidate();
        return Err(SyncError::ExpiredCredential);
    }

    let response = api.fetch_usage(&creds.access_token).await.map_err(|err| {
        tracing::warn!("{} request failed: {}", api.name(), err);
        SyncError::TransportFailure(err.to_string())
    })?;

    match response.status {
        200 => parse_usage_body(&response.body).map_err(|err| {
            tracing::warn!("Discarding {} payload: {}", api.name(), err);
            SyncError::MalformedPayload(err.to_string())
        }),
        401 => {
            tracing::warn!("{} rejected the access token", api.name());
            credentials.invalidate();
            Err(SyncError::AuthRejected)
        }
        status => {
            tracing::warn!("{} returned HTTP {}", api.name(), status);
            Err(SyncError::ApiRejected { status })
        }
    }
}

fn apply_cycle(
    snapshot: &mut UsageSnapshot,
    machine: &ConnectionStateMachine,
    detection: Detection,
    outcome: &Result<UsagePayload, SyncError>,
    now: DateTime<Utc>,
) {
    snapshot.active_model = detection.model;
    snapshot.subscription_tier = detection.tier;
    machine.apply(snapshot, outcome, now);
}

/// Single detection and fetch without starting the background tasks
pub async fn fetch_snapshot_once(parts: &EngineParts) -> UsageSnapshot {
    let detection = parts.detector.detect(parts.credentials.as_ref()).await;
    let outcome = run_fetch_cycle(parts.credentials.as_ref(), parts.api.as_ref(), Utc::now()).await;

    let mut snapshot = UsageSnapshot::default();
    apply_cycle(&mut snapshot, &parts.machine, detection, &outcome, Utc::now());
    snapshot
}

/// Collaborators the engine is assembled from
pub struct EngineParts {
    pub credentials: Arc<dyn CredentialProvider>,
    pub api: Arc<dyn UsageApi>,
    pub detector: ModelDetector,
    pub sink: Arc<dyn DisplaySink>,
    pub machine: ConnectionStateMachine,
    pub poll_interval: Duration,
    pub ui_tick: Duration,
    pub export_path: Option<PathBuf>,
}

impl EngineParts {
    /// Keychain/file credentials and the live Anthropic endpoint
    pub fn from_config(config: &EngineConfig, sink: Arc<dyn DisplaySink>) -> Self {
        let credentials = ClaudeCredentialProvider::new()
            .with_credentials_path(config.credentials_path.clone())
            .with_cache_ttl(config.credential_cache_ttl())
            .with_lookup_timeout(config.credential_lookup_timeout());
        let api = ClaudeUsageApi::new(config.request_timeout()).with_base_url(&config.api_base_url);

        Self {
            credentials: Arc::new(credentials),
            api: Arc::new(api),
            detector: ModelDetector::new(
                config.settings_path.clone(),
                config.model_override_path.clone(),
            ),
            sink,
            machine: ConnectionStateMachine::new(config.display_zone(), config.countdown_policy),
            poll_interval: config.poll_interval(),
            ui_tick: config.ui_tick(),
            export_path: config.snapshot_export_path.clone(),
        }
    }
}

enum Update {
    Cycle {
        detection: Detection,
        outcome: Result<UsagePayload, SyncError>,
        done: Option<oneshot::Sender<UsageSnapshot>>,
    },
    Tick,
}

struct FetchCycle {
    credentials: Arc<dyn CredentialProvider>,
    api: Arc<dyn UsageApi>,
    detector: ModelDetector,
}

impl FetchCycle {
    async fn run(&self) -> (Detection, Result<UsagePayload, SyncError>) {
        let detection = self.detector.detect(self.credentials.as_ref()).await;
        let outcome = run_fetch_cycle(self.credentials.as_ref(), self.api.as_ref(), Utc::now()).await;
        (detection, outcome)
    }
}

pub struct UsageSyncEngine {
    snapshot: watch::Receiver<UsageSnapshot>,
    updates: mpsc::UnboundedSender<Update>,
    refresh: Arc<Notify>,
    cycle: Arc<FetchCycle>,
    shutdown: watch::Sender<bool>,
    /// Poller and ticker
    tasks: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    exporter: Option<JoinHandle<()>>,
}

impl UsageSyncEngine {
    /// Spawn the engine tasks on the current tokio runtime. The first fetch
    /// starts immediately.
    pub fn start(parts: EngineParts) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(UsageSnapshot::default());
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refresh = Arc::new(Notify::new());
        let cycle = Arc::new(FetchCycle {
            credentials: parts.credentials,
            api: parts.api,
            detector: parts.detector,
        });

        // Out-of-range periods would panic inside tokio's timers
        let poll_interval = parts.poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        let ui_tick = parts.ui_tick.clamp(MIN_UI_TICK, MAX_UI_TICK);
        tracing::info!(
            "Starting usage sync: poll every {:?}, tick every {:?}",
            poll_interval,
            ui_tick
        );

        let (exports, exporter) = match parts.export_path {
            Some(path) => {
                let (exports_tx, exports_rx) = mpsc::unbounded_channel();
                (Some(exports_tx), Some(tokio::spawn(run_exporter(path, exports_rx))))
            }
            None => (None, None),
        };

        let writer = tokio::spawn(run_writer(
            updates_rx,
            snapshot_tx,
            parts.machine,
            parts.sink,
            exports,
        ));
        let poller = tokio::spawn(run_poller(
            cycle.clone(),
            updates_tx.clone(),
            refresh.clone(),
            poll_interval,
            shutdown_rx.clone(),
        ));
        let ticker = tokio::spawn(run_ticker(updates_tx.clone(), ui_tick, shutdown_rx));

        Self {
            snapshot: snapshot_rx,
            updates: updates_tx,
            refresh,
            cycle,
            shutdown: shutdown_tx,
            tasks: vec![poller, ticker],
            writer: Some(writer),
            exporter,
        }
    }

    pub fn from_config(config: &EngineConfig, sink: Arc<dyn DisplaySink>) -> Self {
        Self::start(EngineParts::from_config(config, sink))
    }

    /// New receiver that is notified after every applied update
    pub fn subscribe(&self) -> watch::Receiver<UsageSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Fetch now and restart the poll timer. Cached credentials are dropped
    /// so a re-login is picked up.
    pub fn manual_refresh(&self) {
        tracing::debug!("Manual refresh requested");
        self.cycle.credentials.invalidate();
        self.refresh.notify_one();
    }

    /// Run one cycle on the caller's task and return the snapshot once the
    /// writer has applied it
    pub async fn refresh_now(&self) -> UsageSnapshot {
        let (detection, outcome) = self.cycle.run().await;
        let (done_tx, done_rx) = oneshot::channel();
        let update = Update::Cycle {
            detection,
            outcome,
            done: Some(done_tx),
        };
        if self.updates.send(update).is_err() {
            return self.snapshot();
        }
        done_rx.await.unwrap_or_else(|_| self.snapshot())
    }

    /// Stop polling and ticking. In-flight fetches are aborted rather than
    /// left to finish; either way their results never reach the snapshot.
    /// A pending export is still written.
    pub async fn shutdown(mut self) {
        tracing::info!("Stopping usage sync");
        let _ = self.shutdown.send(true);

        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
            let _ = writer.await;
        }
        // Ends once the writer's sender is gone and the queue is drained
        if let Some(exporter) = self.exporter.take() {
            let _ = exporter.await;
        }
    }
}

impl Drop for UsageSyncEngine {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        let handles = self.tasks.iter().chain(&self.writer).chain(&self.exporter);
        for task in handles {
            task.abort();
        }
    }
}

async fn run_writer(
    mut updates: mpsc::UnboundedReceiver<Update>,
    snapshot: watch::Sender<UsageSnapshot>,
    machine: ConnectionStateMachine,
    sink: Arc<dyn DisplaySink>,
    exports: Option<mpsc::UnboundedSender<UsageSnapshot>>,
) {
    while let Some(update) = updates.recv().await {
        let now = Utc::now();
        match update {
            Update::Cycle {
                detection,
                outcome,
                done,
            } => {
                snapshot.send_modify(|current| {
                    apply_cycle(current, &machine, detection, &outcome, now)
                });
                let applied = snapshot.borrow().clone();
                sink.redraw(&applied);

                if let Some(exports) = &exports {
                    let _ = exports.send(applied.clone());
                }

                if let Some(done) = done {
                    let _ = done.send(applied);
                }
            }
            Update::Tick => {
                snapshot.send_modify(|current| current.refresh_countdowns(now, machine.policy()));
                sink.redraw(&snapshot.borrow());
            }
        }
    }
}

async fn run_exporter(path: PathBuf, mut pending: mpsc::UnboundedReceiver<UsageSnapshot>) {
    while let Some(mut latest) = pending.recv().await {
        // Only the newest snapshot is worth writing
        while let Ok(newer) = pending.try_recv() {
            latest = newer;
        }

        let path = path.clone();
        match tokio::task::spawn_blocking(move || write_snapshot(&path, &latest)).await {
            Ok(Err(err)) => tracing::warn!("Failed to export usage snapshot: {}", err),
            Err(err) => tracing::warn!("Snapshot export task failed: {}", err),
            Ok(Ok(())) => {}
        }
    }
}

async fn run_poller(
    cycle: Arc<FetchCycle>,
    updates: mpsc::UnboundedSender<Update>,
    refresh: Arc<Notify>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Dropped on return, which aborts any fetch still running
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = refresh.notified() => {
                interval.reset();
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {
                continue;
            }
            _ = shutdown.changed() => {
                tracing::debug!("Usage poller shutting down");
                return;
            }
        }

        let cycle = cycle.clone();
        let updates = updates.clone();
        in_flight.spawn(async move {
            let (detection, outcome) = cycle.run().await;
            let _ = updates.send(Update::Cycle {
                detection,
                outcome,
                done: None,
            });
        });
    }
}

async fn run_ticker(
    updates: mpsc::UnboundedSender<Update>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if updates.send(Update::Tick).is_err() {
                    return;
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
