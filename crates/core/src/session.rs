//! Per-identity accumulation of host deliveries into full snapshots.
//!
//! The host hands over three kinds of partial payloads. A [`SessionTracker`]
//! keeps, for every identity, the latest real-time status fields, the
//! deep-merged persistent state, and a pruned window of recent events, and
//! turns each delivery into a complete [`Snapshot`].

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::snapshot::{EventStamp, EventWindow, Snapshot, SourceKind};

/// Reserved payload key holding accumulated persistent fields.
pub const STATE_KEY: &str = "state";

/// One raw delivery from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub identity: String,
    pub source: SourceKind,
    #[serde(default)]
    pub payload: Value,
    /// Delivery time; defaults to the moment of ingestion.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// Event name carried by a journal delivery.
    pub fn event_name(&self) -> Option<&str> {
        self.payload.get("event").and_then(Value::as_str)
    }
}

#[derive(Debug, Default)]
struct Session {
    status: Map<String, Value>,
    state: Value,
    events: EventWindow,
}

/// Accumulates deliveries per identity.
pub struct SessionTracker {
    event_window: Duration,
    sessions: HashMap<String, Session>,
}

impl SessionTracker {
    pub fn new(event_window: Duration) -> Self {
        Self {
            event_window,
            sessions: HashMap::new(),
        }
    }

    /// Fold one delivery into its identity's session and return the merged snapshot.
    pub fn ingest(&mut self, delivery: Delivery) -> Result<Snapshot> {
        let at = delivery.at.unwrap_or_else(Utc::now);
        let Delivery {
            identity,
            source,
            payload,
            ..
        } = delivery;

        let fields = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(CoreError::PayloadNotObject {
                    identity,
                    source_kind: source,
                })
            }
        };

        let session = self.sessions.entry(identity.clone()).or_default();
        match source {
            SourceKind::Status => {
                for (key, value) in fields {
                    session.status.insert(key, value);
                }
            }
            SourceKind::Journal => {
                let name = fields
                    .get("event")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::MissingEventName {
                        identity: identity.clone(),
                    })?
                    .to_string();
                let stamped = fields
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(at);
                debug!(identity = %identity, event = %name, "recorded journal event");
                session.events.push(EventStamp::new(name, stamped));
            }
            SourceKind::State => {
                session.state = deep_merge(&session.state, &Value::Object(fields));
            }
        }

        let window = chrono::Duration::from_std(self.event_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        session.events.prune_before(at - window);

        let mut root = session.status.clone();
        let state = match &session.state {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        root.insert(STATE_KEY.to_string(), state);

        Ok(Snapshot {
            identity,
            source,
            payload: Value::Object(root),
            events: session.events.clone(),
            at,
        })
    }

    /// Drop everything accumulated for `identity`. Returns whether it was tracked.
    pub fn end_session(&mut self, identity: &str) -> bool {
        self.sessions.remove(identity).is_some()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }
}

/// Deep-merge two JSON values: maps merge recursively with `overlay` winning,
/// any other shape in `overlay` replaces `base` entirely.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(bm), Value::Object(om)) => {
            let mut merged = bm.clone();
            for (key, over_val) in om {
                let value = match bm.get(key) {
                    Some(base_val) => deep_merge(base_val, over_val),
                    None => over_val.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}
