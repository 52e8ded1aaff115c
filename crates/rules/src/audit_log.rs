//! In-memory structured audit log of rule match-state transitions.
//!
//! Stores per-rule entries capped at a configurable maximum (default 500)
//! with FIFO eviction. Uses `std::sync::RwLock` so a handle can be read from
//! a diagnostics thread while the pipeline keeps writing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::MatchState;

/// A single recorded transition.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEntry {
    /// Evaluation instant of the snapshot that caused the transition.
    pub timestamp: DateTime<Utc>,
    pub rule_id: String,
    pub identity: String,
    pub from: MatchState,
    pub to: MatchState,
    /// Number of actions handed to the executor.
    pub actions: usize,
    pub message: String,
}

/// Query parameters for filtering audit entries.
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    /// Only entries for this identity.
    pub identity: Option<String>,
    /// Maximum number of entries to return.
    pub limit: Option<u32>,
    /// Only entries at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// In-memory per-rule audit log with FIFO eviction. Cloning shares storage.
#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: Arc<RwLock<HashMap<String, VecDeque<AuditEntry>>>>,
    max_entries_per_rule: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    /// Create a new audit log with the default cap of 500 entries per rule.
    pub fn new() -> Self {
        Self::with_max_entries(500)
    }

    /// Create a new audit log with a custom per-rule entry cap.
    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_rule: max,
        }
    }

    /// Append an entry, evicting the oldest for that rule past the cap.
    pub fn record(&self, entry: AuditEntry) {
        let mut guard = self.entries.write().expect("audit_log lock poisoned");
        let deque = guard.entry(entry.rule_id.clone()).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_rule {
            deque.pop_front();
        }
    }

    /// Entries for a rule, newest first.
    pub fn query(&self, rule_id: &str, params: &AuditQuery) -> Vec<AuditEntry> {
        let guard = self.entries.read().expect("audit_log lock poisoned");
        let Some(deque) = guard.get(rule_id) else {
            return Vec::new();
        };

        let limit = params.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        deque
            .iter()
            .rev()
            .filter(|e| params.identity.as_deref().map_or(true, |id| e.identity == id))
            .filter(|e| params.since.map_or(true, |since| e.timestamp >= since))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Rule ids with at least one entry.
    pub fn rule_ids(&self) -> Vec<String> {
        let guard = self.entries.read().expect("audit_log lock poisoned");
        let mut ids: Vec<String> = guard.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop all entries for a rule.
    pub fn clear(&self, rule_id: &str) {
        self.entries
            .write()
            .expect("audit_log lock poisoned")
            .remove(rule_id);
    }

    /// Total entries across all rules.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("audit_log lock poisoned")
            .values()
            .map(VecDeque::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(rule_id: &str, identity: &str, secs: i64) -> AuditEntry {
        AuditEntry {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            rule_id: rule_id.to_string(),
            identity: identity.to_string(),
            from: MatchState::False,
            to: MatchState::True,
            actions: 1,
            message: "rising".to_string(),
        }
    }

    #[test]
    fn record_and_query_newest_first() {
        let log = AuditLog::new();
        log.record(entry("r1", "a", 0));
        log.record(entry("r1", "a", 1));
        log.record(entry("r2", "a", 2));

        let entries = log.query("r1", &AuditQuery::default());
        assert_eq!(entries.len(), 2);
        assert!(entries[0].timestamp > entries[1].timestamp);
        assert_eq!(log.rule_ids(), vec!["r1".to_string(), "r2".to_string()]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn fifo_eviction() {
        let log = AuditLog::with_max_entries(3);
        for i in 0..5 {
            log.record(entry("r1", "a", i));
        }
        let entries = log.query("r1", &AuditQuery::default());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].timestamp, Utc.timestamp_opt(1_700_000_002, 0).unwrap());
    }

    #[test]
    fn filters_by_identity_since_and_limit() {
        let log = AuditLog::new();
        log.record(entry("r1", "a", 0));
        log.record(entry("r1", "b", 1));
        log.record(entry("r1", "a", 2));
        log.record(entry("r1", "a", 3));

        let only_a = log.query(
            "r1",
            &AuditQuery {
                identity: Some("a".into()),
                ..Default::default()
            },
        );
        assert_eq!(only_a.len(), 3);

        let recent = log.query(
            "r1",
            &AuditQuery {
                since: Some(Utc.timestamp_opt(1_700_000_002, 0).unwrap()),
                limit: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp, Utc.timestamp_opt(1_700_000_003, 0).unwrap());
    }

    #[test]
    fn clear_and_unknown_rule() {
        let log = AuditLog::new();
        log.record(entry("r1", "a", 0));
        log.clear("r1");
        assert!(log.is_empty());
        assert!(log.query("missing", &AuditQuery::default()).is_empty());
    }

    #[test]
    fn clones_share_storage() {
        let log = AuditLog::new();
        let handle = log.clone();
        log.record(entry("r1", "a", 0));
        assert_eq!(handle.len(), 1);
    }
}
