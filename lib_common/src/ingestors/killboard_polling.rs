//! # Killboard Polling Ingestor
//!
//! A self-scheduling ingestor for the killboard REST feed, which has no
//! streaming interface. Each iteration:
//!
//! 1.  fetches the latest page from the [`EventSource`];
//! 2.  walks it in upstream order, keeping only identities the [`SeenSet`] has
//!     not recorded yet;
//! 3.  prepends the new events to the [`RollingCache`] as one batch;
//! 4.  publishes each new event to the [`Dispatcher`], in the same order.
//!
//! ## Key Design Principles:
//! - **Serial Iterations**: One fetch in flight at a time. The poller owns its
//!   seen-set outright; nothing else writes to it.
//! - **Fixed Gap**: The interval is measured from the end of one iteration to
//!   the start of the next, not aligned to the wall clock.
//! - **Resilience**: A failed fetch is logged and the iteration ends early with
//!   cache and dispatcher untouched. The loop itself never stops on an error,
//!   only on shutdown.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::dedup::SeenSet;
use crate::core::dispatcher::Dispatcher;
use crate::core::rolling_cache::RollingCache;
use crate::killboard::apicall::{ApiCallKillboard, UpstreamError};
use crate::killboard::model::{EventId, KillEvent};

/// Where a poll iteration gets its page of events from.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetches the most recent page, in upstream order.
    async fn fetch_batch(&self) -> Result<Vec<KillEvent>, UpstreamError>;
}

#[async_trait]
impl EventSource for ApiCallKillboard {
    async fn fetch_batch(&self) -> Result<Vec<KillEvent>, UpstreamError> {
        ApiCallKillboard::fetch_batch(self).await
    }
}

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// An iteration is in progress.
    Polling,
}

/// Running counters, readable while the poller works.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStats {
    /// Current lifecycle state.
    pub state: PollState,
    /// Iterations started.
    pub iterations: u64,
    /// Iterations that ended on a fetch error.
    pub failures: u64,
    /// Events that passed deduplication since startup.
    pub events_discovered: u64,
    /// Completion time of the last successful fetch.
    pub last_success: Option<DateTime<Utc>>,
    /// Message of the most recent fetch error.
    pub last_error: Option<String>,
    /// Identities currently held by the seen-set.
    pub seen: usize,
}

/// Shared, read-mostly view of [`PollStats`].
pub type StatsBoard = Arc<RwLock<PollStats>>;

/// Reads a consistent copy of the stats.
pub fn read_stats(board: &StatsBoard) -> PollStats {
    board.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn update_stats(board: &StatsBoard, f: impl FnOnce(&mut PollStats)) {
    let mut guard = board.write().unwrap_or_else(PoisonError::into_inner);
    f(&mut *guard);
}

/// What one successful iteration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Records on the fetched page.
    pub fetched: usize,
    /// Records that were new, in discovery order.
    pub discovered: Vec<EventId>,
    /// Sum of clients reached over all publishes of this iteration.
    pub delivered: usize,
    /// Sum of per-client drops over all publishes of this iteration.
    pub dropped: usize,
}

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Gap between the end of one iteration and the start of the next.
    pub interval: Duration,
    /// Capacity of the seen-identity set.
    pub seen_capacity: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            seen_capacity: 10_000,
        }
    }
}

/// # Killboard Polling Plugin
///
/// Owns the seen-set and drives the shared cache and dispatcher.
pub struct KillboardPollingPlugin<S = ApiCallKillboard> {
    source: S,
    seen: SeenSet<EventId>,
    cache: Arc<RollingCache<KillEvent>>,
    dispatcher: Arc<Dispatcher<KillEvent>>,
    stats: StatsBoard,
    interval: Duration,
}

impl<S: EventSource> KillboardPollingPlugin<S> {
    /// Creates a poller feeding `cache` and `dispatcher`.
    pub fn new(
        source: S,
        settings: PollerSettings,
        cache: Arc<RollingCache<KillEvent>>,
        dispatcher: Arc<Dispatcher<KillEvent>>,
    ) -> Self {
        Self {
            source,
            seen: SeenSet::new(settings.seen_capacity),
            cache,
            dispatcher,
            stats: StatsBoard::default(),
            interval: settings.interval,
        }
    }

    /// Handle to the live counters.
    pub fn stats(&self) -> StatsBoard {
        Arc::clone(&self.stats)
    }

    /// # Main Execution Loop
    ///
    /// Runs iterations back to back with `interval` of idle time in between,
    /// until `shutdown` is cancelled. An in-flight fetch is abandoned on
    /// shutdown.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs_f64(), "Killboard poller started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        update_stats(&self.stats, |s| s.state = PollState::Idle);
        info!("Killboard poller stopped");
    }

    /// One iteration with failures absorbed and logged.
    async fn tick(&mut self) {
        if let Err(e) = self.poll_once().await {
            warn!(error = %e, "Killboard poll failed, skipping iteration");
        }
    }

    /// # Poll Once
    ///
    /// Executes a single fetch, dedup, cache and publish cycle.
    ///
    /// On a fetch error nothing is cached or published and the error is
    /// returned after being recorded in the stats.
    pub async fn poll_once(&mut self) -> Result<IterationReport, UpstreamError> {
        update_stats(&self.stats, |s| {
            s.state = PollState::Polling;
            s.iterations += 1;
        });

        let batch = match self.source.fetch_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                let message = e.to_string();
                update_stats(&self.stats, |s| {
                    s.state = PollState::Idle;
                    s.failures += 1;
                    s.last_error = Some(message);
                });
                return Err(e);
            }
        };

        let mut report = IterationReport {
            fetched: batch.len(),
            ..IterationReport::default()
        };

        let fresh: Vec<KillEvent> = batch
            .into_iter()
            .filter(|event| self.seen.check_and_insert(&event.id))
            .collect();

        if !fresh.is_empty() {
            self.cache.append(&fresh);
            for event in fresh {
                report.discovered.push(event.id.clone());
                let published = self.dispatcher.publish(event);
                report.delivered += published.delivered;
                report.dropped += published.dropped;
            }
            info!(
                new = report.discovered.len(),
                fetched = report.fetched,
                clients = self.dispatcher.client_count(),
                "New kills discovered"
            );
        } else {
            debug!(fetched = report.fetched, "No new kills");
        }

        let seen = self.seen.len();
        let discovered = report.discovered.len() as u64;
        update_stats(&self.stats, |s| {
            s.state = PollState::Idle;
            s.events_discovered += discovered;
            s.last_success = Some(Utc::now());
            s.seen = seen;
        });

        Ok(report)
    }
}
