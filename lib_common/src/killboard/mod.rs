//! # Albion Killboard Integration Module
//!
//! Client and data model for the Albion Online game-info events API, the
//! upstream source of the live kill feed.
//!
//! ## Contained Modules:
//!
//! - **`apicall`**: The upstream client. Fetches one fixed-size page of recent
//!   kills per call and reports failures as recoverable `UpstreamError`s.
//!
//! - **`model`**: The `KillEvent` record served downstream, and its tolerant
//!   translation from raw upstream JSON.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Client for the game-info events endpoint.
pub mod apicall;
/// Kill event data model and upstream record parsing.
pub mod model;

pub use apicall::{ApiCallKillboard, KillboardOptions, UpstreamError};
pub use model::{EventId, KillEvent};
