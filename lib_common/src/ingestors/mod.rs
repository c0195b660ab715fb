//! # Data Ingestors Module
//!
//! Home of the clients that pull data into the system and push it through the
//! core engine. Each submodule owns the lifecycle of one upstream source.
//!
//! ## Contained Modules:
//! - **`killboard_polling`**: The self-scheduling poller for the Albion
//!   killboard. It fetches, deduplicates, caches and fans out new kills on a
//!   fixed interval.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The self-scheduling REST poller for the killboard feed.
pub mod killboard_polling;

// --- Public API Re-exports ---
pub use killboard_polling::{
    read_stats, EventSource, IterationReport, KillboardPollingPlugin, PollState, PollStats,
    PollerSettings, StatsBoard,
};
