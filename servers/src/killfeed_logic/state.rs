//! # Shared Application State
//!
//! Handles shared between the poller and the HTTP/WebSocket routes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use lib_common::core::{Dispatcher, RollingCache};
use lib_common::ingestors::{read_stats, StatsBoard};
use lib_common::killboard::KillEvent;

use crate::killfeed_logic::model::StatusReport;

/// Shared handles every route needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    // Newest-first window served by the snapshot route
    pub cache: Arc<RollingCache<KillEvent>>,
    // Fan-out to live WebSocket sessions
    pub dispatcher: Arc<Dispatcher<KillEvent>>,
    // Counters maintained by the poller
    pub stats: StatsBoard,
    // Cancelled once on process shutdown; live sessions watch it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        cache: Arc<RollingCache<KillEvent>>,
        dispatcher: Arc<Dispatcher<KillEvent>>,
        stats: StatsBoard,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            dispatcher,
            stats,
            shutdown,
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::new(
            read_stats(&self.stats),
            self.cache.len(),
            self.dispatcher.client_count(),
            self.dispatcher.dropped_total(),
        )
    }
}
