//! Periodic polling of the firewall service
//!
//! Four sources are fetched on every cycle: firewall rules, whitelist, traffic
//! counters and active connections. Each source is fetched by its own task and
//! reports its own outcome, so one failing source never holds back or
//! overwrites another. Outcomes travel as [`PollUpdate`] messages to whoever
//! owns the [`DashboardState`]; updates are applied last-write-wins per source.
//!
//! Cycles are not serialised: a slow cycle may still be in flight when the
//! next tick fires. Every request is idempotent, so this is harmless.

use chrono::{DateTime, Local};
use log::{debug, info, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::client::api::FirewallApi;
use crate::client::errors::ApiResult;
use crate::client::models::{ConnectionRecord, TrafficSnapshot, WhitelistEntry};
use crate::connections::ConnectionTable;
use crate::notify::{NotificationCenter, Section};

/// One independently polled data category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Rules,
    Whitelist,
    Traffic,
    Connections,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Rules,
        Source::Whitelist,
        Source::Traffic,
        Source::Connections,
    ];

    pub fn section(self) -> Section {
        match self {
            Source::Rules => Section::Rules,
            Source::Whitelist => Section::Whitelist,
            Source::Traffic => Section::Traffic,
            Source::Connections => Section::Connections,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Data delivered by a successful fetch
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    Rules(Vec<String>),
    Whitelist(Vec<WhitelistEntry>),
    Traffic(TrafficSnapshot),
    Connections(Vec<ConnectionRecord>),
}

impl SourcePayload {
    pub fn source(&self) -> Source {
        match self {
            SourcePayload::Rules(_) => Source::Rules,
            SourcePayload::Whitelist(_) => Source::Whitelist,
            SourcePayload::Traffic(_) => Source::Traffic,
            SourcePayload::Connections(_) => Source::Connections,
        }
    }
}

/// Progress of a single source within a cycle
#[derive(Debug, Clone, PartialEq)]
pub enum PollUpdate {
    Loading(Source),
    Loaded(SourcePayload),
    Failed { source: Source, reason: String },
}

impl PollUpdate {
    pub fn source(&self) -> Source {
        match self {
            PollUpdate::Loading(source) => *source,
            PollUpdate::Loaded(payload) => payload.source(),
            PollUpdate::Failed { source, .. } => *source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed,
}

/// Lifecycle of one source: `Idle -> Loading -> Loaded | Failed -> Loading -> ...`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceStatus {
    pub status: LoadStatus,
    /// Reason of the latest failure, cleared by the next success
    pub error: Option<String>,
    pub last_success: Option<DateTime<Local>>,
}

/// Everything the render layer shows for the polled sources
///
/// A failed fetch leaves the previously loaded data in place.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub rules: Vec<String>,
    pub whitelist: Vec<WhitelistEntry>,
    pub traffic: Option<TrafficSnapshot>,
    pub connections: ConnectionTable,
    statuses: [SourceStatus; 4],
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, source: Source) -> &SourceStatus {
        &self.statuses[source.index()]
    }

    /// Applies one update and mirrors its outcome into the sticky error surface
    pub fn apply(&mut self, update: PollUpdate, notices: &mut NotificationCenter) {
        let source = update.source();
        let status = &mut self.statuses[source.index()];
        match update {
            PollUpdate::Loading(_) => {
                status.status = LoadStatus::Loading;
            }
            PollUpdate::Loaded(payload) => {
                status.status = LoadStatus::Loaded;
                status.error = None;
                status.last_success = Some(Local::now());
                notices.clear_error(source.section());
                match payload {
                    SourcePayload::Rules(rules) => self.rules = rules,
                    SourcePayload::Whitelist(entries) => self.whitelist = entries,
                    SourcePayload::Traffic(snapshot) => self.traffic = Some(snapshot),
                    SourcePayload::Connections(records) => self.connections.replace(records),
                }
            }
            PollUpdate::Failed { reason, .. } => {
                status.status = LoadStatus::Failed;
                notices.set_error(
                    source.section(),
                    format!("Failed to load {}: {}", source.section(), reason),
                );
                status.error = Some(reason);
            }
        }
    }
}

/// Outcome of one fully awaited cycle
#[derive(Debug)]
pub struct PollCycle {
    pub rules: ApiResult<Vec<String>>,
    pub whitelist: ApiResult<Vec<WhitelistEntry>>,
    pub traffic: ApiResult<TrafficSnapshot>,
    pub connections: ApiResult<Vec<ConnectionRecord>>,
}

impl PollCycle {
    pub fn into_updates(self) -> Vec<PollUpdate> {
        vec![
            settle(Source::Rules, self.rules.map(SourcePayload::Rules)),
            settle(Source::Whitelist, self.whitelist.map(SourcePayload::Whitelist)),
            settle(Source::Traffic, self.traffic.map(SourcePayload::Traffic)),
            settle(
                Source::Connections,
                self.connections.map(SourcePayload::Connections),
            ),
        ]
    }

    pub fn failures(&self) -> usize {
        [
            self.rules.is_err(),
            self.whitelist.is_err(),
            self.traffic.is_err(),
            self.connections.is_err(),
        ]
        .iter()
        .filter(|failed| **failed)
        .count()
    }
}

fn settle(source: Source, result: ApiResult<SourcePayload>) -> PollUpdate {
    match result {
        Ok(payload) => PollUpdate::Loaded(payload),
        Err(e) => PollUpdate::Failed {
            source,
            reason: e.to_string(),
        },
    }
}

/// Fetches a single source
pub async fn fetch_source(api: &dyn FirewallApi, source: Source) -> ApiResult<SourcePayload> {
    match source {
        Source::Rules => api.rules().await.map(SourcePayload::Rules),
        Source::Whitelist => api.whitelist().await.map(SourcePayload::Whitelist),
        Source::Traffic => api.traffic().await.map(SourcePayload::Traffic),
        Source::Connections => api.connections().await.map(SourcePayload::Connections),
    }
}

/// Drives the fixed-interval refresh cycle
pub struct Poller {
    api: Arc<dyn FirewallApi>,
    interval: Duration,
}

impl Poller {
    pub fn new(api: Arc<dyn FirewallApi>, interval: Duration) -> Self {
        Self { api, interval }
    }

    /// Runs one cycle with all four fetches in flight at once and waits for all of them
    pub async fn poll_once(&self) -> PollCycle {
        let api = self.api.as_ref();
        let (rules, whitelist, traffic, connections) =
            tokio::join!(api.rules(), api.whitelist(), api.traffic(), api.connections());
        let cycle = PollCycle {
            rules,
            whitelist,
            traffic,
            connections,
        };
        debug!("Poll cycle finished with {} failed source(s)", cycle.failures());
        cycle
    }

    /// Starts one cycle: one task per source, each reporting on `updates`
    pub fn spawn_cycle(&self, updates: &mpsc::Sender<PollUpdate>) -> Vec<JoinHandle<()>> {
        Source::ALL
            .iter()
            .map(|&source| {
                let api = Arc::clone(&self.api);
                let updates = updates.clone();
                tokio::spawn(async move {
                    if updates.send(PollUpdate::Loading(source)).await.is_err() {
                        return;
                    }
                    let result = fetch_source(api.as_ref(), source).await;
                    trace!("{:?} fetch finished (ok: {})", source, result.is_ok());
                    let _ = updates.send(settle(source, result)).await;
                })
            })
            .collect()
    }

    /// Polls once immediately and then every interval until the receiver is dropped
    pub async fn run(self, updates: mpsc::Sender<PollUpdate>) {
        info!("Poller started with interval {:?}", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycle: u64 = 0;
        loop {
            ticker.tick().await;
            if updates.is_closed() {
                break;
            }
            cycle += 1;
            debug!("Starting poll cycle {}", cycle);
            self.spawn_cycle(&updates);
        }
        info!("Poller stopped after {} cycle(s)", cycle);
    }

    pub fn spawn(self, updates: mpsc::Sender<PollUpdate>) -> JoinHandle<()> {
        tokio::spawn(self.run(updates))
    }
}
