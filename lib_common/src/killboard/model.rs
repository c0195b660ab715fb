//! # Killboard Event Model
//!
//! Strongly-typed shape of a single kill as served to downstream clients, plus
//! the tolerant translation from the upstream's raw JSON record.
//!
//! The upstream record nests the interesting fields:
//!
//! ```json
//! { "EventId": 123, "TotalVictimKillFame": 4200,
//!   "Killer": { "Name": "A", "GuildName": "G" },
//!   "Victim": { "Name": "B" } }
//! ```
//!
//! Translation never fails. Fields that are missing or of an unexpected type
//! become absent, so one odd record cannot take down the rest of its page.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upstream-assigned identity of a kill. Used only for deduplication.
///
/// Numeric and string ids are both accepted and normalised to their textual
/// form. A record without an id maps to the empty id, which deduplicates like
/// any other value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wraps an id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The textual form of the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the placeholder id given to records without one.
    pub fn is_missing(&self) -> bool {
        self.0.is_empty()
    }

    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => Self(n.to_string()),
            Some(Value::String(s)) => Self(s.clone()),
            _ => Self::default(),
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// # Kill Event
///
/// One kill, immutable once parsed. Serializes to the record shape consumed by
/// the snapshot route and the live channel:
/// `{"killer", "victim", "killer_guild", "fame"}` with `null` for absent values.
/// The id is kept for deduplication and never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillEvent {
    /// Upstream identity.
    #[serde(skip)]
    pub id: EventId,
    /// Name of the killing player.
    pub killer: Option<String>,
    /// Name of the killed player.
    pub victim: Option<String>,
    /// Guild of the killer. Guildless players are reported upstream as `""`,
    /// which is normalised to `None`.
    pub killer_guild: Option<String>,
    /// Total fame awarded for the kill.
    pub fame: Option<u64>,
}

impl KillEvent {
    /// Builds an event from one raw upstream record.
    pub fn from_record(record: &Value) -> Self {
        let killer = record.get("Killer");
        let victim = record.get("Victim");

        Self {
            id: EventId::from_value(record.get("EventId")),
            killer: text_field(killer, "Name"),
            victim: text_field(victim, "Name"),
            killer_guild: text_field(killer, "GuildName").filter(|g| !g.is_empty()),
            fame: record.get("TotalVictimKillFame").and_then(non_negative_integer),
        }
    }
}

fn text_field(parent: Option<&Value>, key: &str) -> Option<String> {
    parent?.get(key)?.as_str().map(str::to_owned)
}

// Fame arrives as an integer, but floats such as `1200.0` show up occasionally.
fn non_negative_integer(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}
