//! Telemetry snapshots: one delivered unit of telemetry plus the recent-event window.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of host delivery produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Real-time status fields (bitfields, gauges), merged at the payload root.
    Status,
    /// A discrete named event.
    Journal,
    /// Accumulated persistent fields, nested under the `state` key.
    State,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Status => write!(f, "status"),
            SourceKind::Journal => write!(f, "journal"),
            SourceKind::State => write!(f, "state"),
        }
    }
}

/// A single (event-name, timestamp) pair in the recent-event window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStamp {
    pub name: String,
    pub at: DateTime<Utc>,
}

impl EventStamp {
    pub fn new(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            at,
        }
    }
}

/// Sliding window of recently observed events, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventWindow {
    events: Vec<EventStamp>,
}

impl EventWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stamp: EventStamp) {
        self.events.push(stamp);
    }

    /// Drop every event stamped before `cutoff`.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) {
        self.events.retain(|e| e.at >= cutoff);
    }

    /// Whether `name` occurred no more than `within` before `now`.
    ///
    /// Events stamped after `now` (host clock skew) count as recent.
    pub fn occurred_within(&self, name: &str, within: Duration, now: DateTime<Utc>) -> bool {
        self.events
            .iter()
            .rev()
            .filter(|e| e.name == name)
            .any(|e| match now.signed_duration_since(e.at).to_std() {
                Ok(age) => age <= within,
                // Negative age: stamped in the future.
                Err(_) => true,
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventStamp> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl FromIterator<EventStamp> for EventWindow {
    fn from_iter<I: IntoIterator<Item = EventStamp>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

/// One evaluation input. Read-only for the duration of a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Entity whose match-state this snapshot advances.
    pub identity: String,
    pub source: SourceKind,
    /// Merged payload: status fields at the root, accumulated fields under `state`.
    pub payload: serde_json::Value,
    #[serde(default)]
    pub events: EventWindow,
    /// Evaluation instant; `recent` checks are measured from here.
    pub at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(identity: impl Into<String>, source: SourceKind, payload: serde_json::Value) -> Self {
        Self {
            identity: identity.into(),
            source,
            payload,
            events: EventWindow::new(),
            at: Utc::now(),
        }
    }

    pub fn with_events(mut self, events: EventWindow) -> Self {
        self.events = events;
        self
    }

    pub fn with_time(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    /// Plain dotted-path lookup from the payload root. Numeric segments index
    /// into arrays.
    pub fn lookup(&self, path: &str) -> Option<&serde_json::Value> {
        lookup_path(&self.payload, path)
    }
}

/// Walk `path` (dot separated) through nested objects and arrays.
pub fn lookup_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(root, |node, segment| match node {
        serde_json::Value::Object(map) => map.get(segment),
        serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let snap = Snapshot::new(
            "cmdr",
            SourceKind::Status,
            json!({"Fuel": {"Main": 12.5}, "Pips": [2, 8, 2]}),
        );
        assert_eq!(snap.lookup("Fuel.Main"), Some(&json!(12.5)));
        assert_eq!(snap.lookup("Pips.1"), Some(&json!(8)));
        assert_eq!(snap.lookup("Fuel.Reserve"), None);
        assert_eq!(snap.lookup("Pips.x"), None);
        assert_eq!(snap.lookup(""), None);
    }

    #[test]
    fn occurred_within_measures_from_now() {
        let window: EventWindow = vec![
            EventStamp::new("FSDJump", t(0)),
            EventStamp::new("Docked", t(50)),
        ]
        .into_iter()
        .collect();

        assert!(window.occurred_within("Docked", Duration::from_secs(10), t(55)));
        assert!(!window.occurred_within("FSDJump", Duration::from_secs(10), t(55)));
        assert!(window.occurred_within("FSDJump", Duration::from_secs(60), t(55)));
        assert!(!window.occurred_within("Undocked", Duration::from_secs(600), t(55)));
    }

    #[test]
    fn prune_drops_old_events() {
        let mut window: EventWindow = vec![
            EventStamp::new("A", t(0)),
            EventStamp::new("B", t(30)),
        ]
        .into_iter()
        .collect();
        window.prune_before(t(10));
        assert_eq!(window.len(), 1);
        assert_eq!(window.iter().next().unwrap().name, "B");
    }
}
