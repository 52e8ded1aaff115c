//! Integration tests that verify the shipped `config/` catalog and rule file
//! load, validate, and drive the engine end to end.

use chrono::{TimeZone, Utc};
use serde_json::json;
use shift_catalog::{derive_all, Catalog};
use shift_core::{EventStamp, SourceKind, Snapshot};
use shift_rules::{parse_rules, Action, InitialMatch, LoadStatus, OnInvalidRule, RuleEngine, RuleLoader, RuleSet, Transition};

/// Resolve the config directory relative to the workspace root.
/// Integration tests run from the crate directory, so we go up two levels.
fn config_dir() -> std::path::PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../config")
}

fn load() -> (Catalog, RuleSet) {
    let catalog = Catalog::load(config_dir().join("signals.yml"))
        .unwrap_or_else(|e| panic!("failed to load signals.yml: {e}"));
    let parsed = RuleLoader::new(config_dir().join("rules.yml"))
        .load()
        .unwrap_or_else(|e| panic!("failed to load rules.yml: {e}"));
    let rules = RuleSet::from_parsed(parsed, &catalog, OnInvalidRule::Reject)
        .unwrap_or_else(|e| panic!("rules.yml failed validation: {e}"));
    (catalog, rules)
}

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[test]
fn shipped_catalog_loads() {
    let (catalog, _) = load();
    assert!(catalog.contains("hardpoints"));
    assert!(catalog.contains("flight_mode"));
    assert_eq!(catalog.fallback_prefix(), "state");
}

#[test]
fn shipped_rules_parse_without_failures() {
    let contents = std::fs::read_to_string(config_dir().join("rules.yml")).unwrap();
    let parsed = parse_rules(&contents).unwrap();
    assert!(parsed.failures.is_empty(), "{:?}", parsed.failures);
    assert_eq!(parsed.rules.len(), 5);
    assert_eq!(parsed.rules[0].then[0], Action::Set(vec!["Shift1".into()]));
    assert_eq!(parsed.rules[0].otherwise, vec![Action::Clear(vec!["Shift1".into()])]);
}

#[test]
fn shipped_rules_validate() {
    let (_, rules) = load();
    assert_eq!(rules.len(), 5);
    assert_eq!(rules.enabled().count(), 4);
    let disabled: Vec<_> = rules
        .report()
        .iter()
        .filter(|r| r.status == LoadStatus::Disabled)
        .map(|r| r.rule_id.as_str())
        .collect();
    assert_eq!(disabled, vec!["heavy-cargo"]);
}

#[test]
fn shipped_rules_drive_engine() {
    let (catalog, rules) = load();
    let mut engine = RuleEngine::new(rules, InitialMatch::Fire);

    let quiet = Snapshot::new("cmdr", SourceKind::Status, json!({ "Flags": 0, "GuiFocus": 0 })).with_time(at(0));
    assert!(engine.evaluate(&derive_all(&catalog, &quiet), &quiet).is_empty());

    let combat = Snapshot::new("cmdr", SourceKind::Status, json!({ "Flags": (1 << 6) | (1 << 3), "GuiFocus": 6 }))
        .with_time(at(5))
        .with_events([EventStamp::new("UnderAttack", at(4))].into_iter().collect());
    let firings = engine.evaluate(&derive_all(&catalog, &combat), &combat);
    let ids: Vec<_> = firings.iter().map(|f| f.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["hardpoints-shift", "map-open", "combat-alert"]);
    assert!(firings.iter().all(|f| f.transition == Transition::Rising));
    assert_eq!(firings[0].actions[0], Action::Set(vec!["Shift1".into()]));

    // Event ages out of the window; only combat-alert falls.
    let later = Snapshot::new("cmdr", SourceKind::Status, json!({ "Flags": (1 << 6) | (1 << 3), "GuiFocus": 6 }))
        .with_time(at(30))
        .with_events([EventStamp::new("UnderAttack", at(4))].into_iter().collect());
    let firings = engine.evaluate(&derive_all(&catalog, &later), &later);
    assert_eq!(firings.len(), 1);
    assert_eq!(firings[0].rule_id, "combat-alert");
    assert_eq!(firings[0].transition, Transition::Falling);
}
