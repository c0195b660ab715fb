//! # lib_common
//!
//! Shared building blocks for the killfeed relay: the HTTP retrieval layer,
//! the Albion killboard client, the dedup/cache/fan-out engine and the poller
//! that ties them together. Each folder is gated behind a cargo feature of the
//! same name; `full` turns them all on.

#![forbid(unsafe_code)]

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "killboard")]
pub mod killboard;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "ingestors")]
pub mod ingestors;
