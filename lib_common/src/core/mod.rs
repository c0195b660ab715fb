//! # Core Engine Module
//!
//! The stateful heart of the feed: the pieces that decide what is new, keep
//! the recent window, and fan events out to live clients. All of them are
//! generic over the payload type and safe to share across tasks.
//!
//! ## Core Components:
//!
//! - **`dedup`**: A bounded, insertion-ordered set of identities already
//!   processed. Check-and-record is a single call.
//!
//! - **`rolling_cache`**: The newest-first window of the last N discoveries,
//!   swapped atomically so readers never observe a partial update.
//!
//! - **`dispatcher`**: The zero-copy fan-out. Every client gets a bounded queue;
//!   slow clients lose frames instead of stalling the publisher.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Bounded set of seen identities.
pub mod dedup;
/// Newest-first bounded event window.
pub mod rolling_cache;
/// Fan-out of published frames to registered clients.
pub mod dispatcher;

// --- Public API Re-exports ---
pub use dedup::SeenSet;
pub use dispatcher::{Dispatcher, PublishReport, Subscription};
pub use rolling_cache::RollingCache;
