//! # Wire Models
//!
//! JSON shapes sent to clients: the live `new_kill` frame and the `/status`
//! body.

use chrono::{DateTime, Utc};
use serde::Serialize;

use lib_common::ingestors::{PollState, PollStats};
use lib_common::killboard::KillEvent;

/// Frame pushed to live clients for each newly discovered kill.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage<'a> {
    pub r#type: &'static str,
    pub message: &'a KillEvent,
}

impl<'a> ServerMessage<'a> {
    pub fn new_kill(event: &'a KillEvent) -> Self {
        Self {
            r#type: "new_kill",
            message: event,
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: PollState,
    pub iterations: u64,
    pub failures: u64,
    pub events_discovered: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Kills currently in the snapshot.
    pub cached: usize,
    /// Ids held by the dedup set.
    pub seen: usize,
    /// Live clients attached right now.
    pub subscribers: usize,
    /// Frames dropped for slow clients since startup.
    pub dropped: u64,
}

impl StatusReport {
    pub fn new(poll: PollStats, cached: usize, subscribers: usize, dropped: u64) -> Self {
        Self {
            state: poll.state,
            iterations: poll.iterations,
            failures: poll.failures,
            events_discovered: poll.events_discovered,
            last_success: poll.last_success,
            last_error: poll.last_error,
            cached,
            seen: poll.seen,
            subscribers,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::killboard::EventId;
    use serde_json::json;

    #[test]
    fn test_new_kill_frame_shape() {
        let event = KillEvent {
            id: EventId::new("42"),
            killer: Some("Alice".to_string()),
            victim: Some("Bob".to_string()),
            killer_guild: None,
            fame: Some(1200),
        };

        let frame = serde_json::to_value(ServerMessage::new_kill(&event)).unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "new_kill",
                "message": {"killer": "Alice", "victim": "Bob", "killer_guild": null, "fame": 1200}
            })
        );
    }

    #[test]
    fn test_status_report_flattens_poll_stats() {
        let poll = PollStats {
            iterations: 3,
            failures: 1,
            events_discovered: 7,
            last_error: Some("upstream returned HTTP 503".to_string()),
            seen: 7,
            ..PollStats::default()
        };

        let body = serde_json::to_value(StatusReport::new(poll, 5, 2, 0)).unwrap();
        assert_eq!(body["state"], "idle");
        assert_eq!(body["iterations"], 3);
        assert_eq!(body["failures"], 1);
        assert_eq!(body["events_discovered"], 7);
        assert_eq!(body["last_success"], serde_json::Value::Null);
        assert_eq!(body["cached"], 5);
        assert_eq!(body["seen"], 7);
        assert_eq!(body["subscribers"], 2);
    }
}
