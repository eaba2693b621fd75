// ── Synchronization loop ──
//
// Drives every mirrored appliance once per tick. A tick works on a copy
// of the published replica map; the copy is swapped in only when every
// appliance has been refreshed, so readers see either the whole tick or
// none of it. Fault alerts are derived from the merged result and
// delivered after the swap.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, TimeDelta, Utc};
use nimbus_api::{EventMode, NimbusClient};
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::error::CoreError;
use crate::faults::{Alert, AlertSink, FaultTracker};
use crate::replica::{ApplyOutcome, FieldChange, Replica};

/// Published replicas, keyed by appliance serial.
pub type ReplicaMap = HashMap<String, Replica>;

/// Health of the loop, for marking values as not recently confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// True when no tick has succeeded within `max_age` of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        self.last_success.is_none_or(|at| now - at > max_age)
    }
}

/// What one successful tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub serials: Vec<String>,
    /// Events that changed a replica (ignored events are not counted).
    pub events_applied: usize,
    pub changes: BTreeMap<String, Vec<FieldChange>>,
    pub alerts: Vec<Alert>,
}

/// State carried between ticks that is not published.
#[derive(Debug, Default)]
struct TickState {
    discovered: Option<Vec<String>>,
    faults: FaultTracker,
}

/// Owns the replicas and the loop that keeps them current.
///
/// The loop is the only writer. Readers call [`replicas`](Self::replicas)
/// for a point-in-time map that later ticks never mutate.
pub struct Synchronizer {
    client: Arc<NimbusClient>,
    config: SyncConfig,
    replicas: ArcSwap<ReplicaMap>,
    tick_state: Mutex<TickState>,
    status: watch::Sender<SyncStatus>,
    sink: Arc<dyn AlertSink>,
}

impl Synchronizer {
    pub fn new(
        client: Arc<NimbusClient>,
        config: SyncConfig,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let (status, _) = watch::channel(SyncStatus::default());
        Ok(Self {
            client,
            config,
            replicas: ArcSwap::from_pointee(ReplicaMap::new()),
            tick_state: Mutex::new(TickState::default()),
            status,
            sink,
        })
    }

    // ── Readers ──────────────────────────────────────────────────────

    /// The client, for sending commands. Commands do not touch the
    /// replicas; their effect shows up on a later tick.
    pub fn client(&self) -> &Arc<NimbusClient> {
        &self.client
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn replicas(&self) -> Arc<ReplicaMap> {
        self.replicas.load_full()
    }

    pub fn replica(&self, serial: &str) -> Option<Replica> {
        self.replicas.load().get(serial).cloned()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    // ── Ticks ────────────────────────────────────────────────────────

    /// Run one tick under the configured deadline.
    ///
    /// On failure the published replicas are untouched and the error is
    /// wrapped in [`CoreError::UpdateFailed`].
    pub async fn tick(&self) -> Result<TickReport, CoreError> {
        let mut state = self.tick_state.lock().await;
        let deadline = self.config.tick_timeout;

        let outcome = match tokio::time::timeout(deadline, self.refresh_all(&mut state)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout {
                timeout_secs: deadline.as_secs(),
            }),
        };

        match outcome {
            Ok((working, mut report)) => {
                for serial in &report.serials {
                    let history = working
                        .get(serial)
                        .and_then(|replica| replica.view().error_history());
                    if let Some(history) = history {
                        report.alerts.extend(state.faults.observe(serial, history));
                    }
                }

                self.replicas.store(Arc::new(working));
                self.status.send_modify(|status| {
                    status.last_success = Some(Utc::now());
                    status.consecutive_failures = 0;
                    status.last_error = None;
                });
                for alert in &report.alerts {
                    self.sink.deliver(alert);
                }

                debug!(
                    appliances = report.serials.len(),
                    events = report.events_applied,
                    alerts = report.alerts.len(),
                    "sync tick complete"
                );
                Ok(report)
            }
            Err(e) => {
                let message = e.to_string();
                self.status.send_modify(|status| {
                    status.last_failure = Some(Utc::now());
                    status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                    status.last_error = Some(message);
                });
                Err(CoreError::update_failed(e))
            }
        }
    }

    async fn refresh_all(
        &self,
        state: &mut TickState,
    ) -> Result<(ReplicaMap, TickReport), CoreError> {
        let serials = self.resolve_serials(state).await?;
        let mut working: ReplicaMap = self.replicas.load().as_ref().clone();
        let mut report = TickReport {
            serials: serials.clone(),
            ..TickReport::default()
        };

        for serial in &serials {
            let replica = working.entry(serial.clone()).or_default();
            match self.config.mode {
                SyncMode::Status => {
                    let snapshot = self.client.get_snapshot(serial).await?;
                    replica.apply_snapshot(&snapshot)?;
                }
                SyncMode::Events => {
                    let page = match replica.last_event_id() {
                        None => {
                            debug!(serial = %serial, "fetching latest events");
                            self.client
                                .get_events(serial, EventMode::Latest, None)
                                .await?
                        }
                        Some(cursor) => {
                            debug!(serial = %serial, cursor, "fetching newer events");
                            self.client
                                .get_events(serial, EventMode::Newer, Some(cursor))
                                .await?
                        }
                    };

                    for event in page.into_oldest_first() {
                        let outcome = replica.apply_event(&event)?;
                        if outcome == ApplyOutcome::Ignored {
                            continue;
                        }
                        report.events_applied += 1;
                        let changes = outcome.changes();
                        if !changes.is_empty() {
                            report
                                .changes
                                .entry(serial.clone())
                                .or_default()
                                .extend_from_slice(changes);
                        }
                    }
                }
            }
        }

        Ok((working, report))
    }

    async fn resolve_serials(&self, state: &mut TickState) -> Result<Vec<String>, CoreError> {
        if !self.config.serials.is_empty() {
            return Ok(self.config.serials.clone());
        }
        if let Some(discovered) = &state.discovered {
            return Ok(discovered.clone());
        }

        let systems = self.client.list_systems().await?;
        let serials: Vec<String> = systems.into_iter().map(|system| system.serial).collect();
        info!(count = serials.len(), "discovered appliances");
        state.discovered = Some(serials.clone());
        Ok(serials)
    }

    // ── Loop ─────────────────────────────────────────────────────────

    /// Tick immediately, then every `interval`, until `cancel` fires.
    ///
    /// Failed ticks are logged and retried on the next interval; the
    /// last good replicas stay published in the meantime.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            mode = %self.config.mode,
            interval_secs = self.config.interval.as_secs(),
            "sync loop started"
        );
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        result = self.tick() => {
                            if let Err(e) = result {
                                let failures = self.status.borrow().consecutive_failures;
                                warn!(error = %e, consecutive_failures = failures, "periodic sync failed");
                            }
                        }
                    }
                }
            }
        }

        info!("sync loop stopped");
    }
}
