//! Tests for the rule loader module.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;

use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind};
use notify::{Event, EventKind};
use tempfile::TempDir;

use super::watcher::handle_fs_event;
use super::*;

const VALID_RULES_YAML: &str = r#"
rules:
  - id: hardpoints-shift
    title: Hardpoints deployed
    when:
      all:
        - { signal: hardpoints, op: eq, value: deployed }
    then:
      - set: [Shift1]
    else:
      - clear: [Shift1]
  - id: gear-shift
    when: { signal: landing_gear_down, op: eq, value: true }
    then:
      - set: [Shift2]
"#;

fn temp_loader(contents: &str) -> (TempDir, RuleLoader) {
    let dir = TempDir::new().expect("create tempdir");
    let path = dir.path().join("rules.yml");
    fs::write(&path, contents).unwrap();
    let loader = RuleLoader::new(path);
    (dir, loader)
}

#[test]
fn load_rules_from_file() {
    let (_dir, loader) = temp_loader(VALID_RULES_YAML);
    let parsed = loader.load().unwrap();
    assert_eq!(parsed.rules.len(), 2);
    assert!(parsed.failures.is_empty());
    assert_eq!(parsed.rules[0].id, "hardpoints-shift");
    assert_eq!(parsed.rules[1].id, "gear-shift");
}

#[test]
fn missing_file_is_io_error() {
    let loader = RuleLoader::new(PathBuf::from("/nonexistent/dir/rules.yml"));
    assert!(matches!(loader.load().unwrap_err(), RuleError::Io(_)));
}

#[test]
fn invalid_yaml_produces_error_not_panic() {
    let result = parse_rules("this: is: not: valid: yaml: [[[");
    assert!(matches!(result.unwrap_err(), RuleError::Parse(_)));
}

#[test]
fn rules_must_be_a_list() {
    let result = parse_rules("rules: { id: x }");
    assert!(matches!(result.unwrap_err(), RuleError::Validation(_)));
}

#[test]
fn empty_document_has_no_rules() {
    assert!(parse_rules("rules:").unwrap().rules.is_empty());
    assert!(parse_rules("rules: []").unwrap().rules.is_empty());
}

#[test]
fn bad_entries_are_reported_not_fatal() {
    let yaml = r#"
rules:
  - id: good
    when: { signal: docked, op: exists }
  - title: no id here
    when: { signal: docked, op: exists }
  - id: good
    when: { signal: docked, op: exists }
  - id: broken
    when: { signal: docked, op: between }
"#;
    let parsed = parse_rules(yaml).unwrap();
    assert_eq!(parsed.rules.len(), 1);

    let failed: Vec<_> = parsed.failures.iter().map(|f| f.rule_id.as_str()).collect();
    assert_eq!(failed, vec!["#1", "good", "broken"]);
    assert!(parsed
        .failures
        .iter()
        .all(|f| matches!(f.status, LoadStatus::Failed { .. })));
}

#[test]
fn watcher_bumps_generation_only_for_rules_file() {
    let generation = AtomicU64::new(0);
    let target = PathBuf::from("/etc/shift/rules.yml");

    let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
        .add_path(PathBuf::from("/etc/shift/rules.yml"));
    handle_fs_event(&modify, &target, &generation);
    assert_eq!(generation.load(std::sync::atomic::Ordering::Acquire), 1);

    let other = Event::new(EventKind::Create(CreateKind::File))
        .add_path(PathBuf::from("/etc/shift/signals.yml"));
    handle_fs_event(&other, &target, &generation);
    assert_eq!(generation.load(std::sync::atomic::Ordering::Acquire), 1);

    let access = Event::new(EventKind::Access(AccessKind::Read))
        .add_path(PathBuf::from("/etc/shift/rules.yml"));
    handle_fs_event(&access, &target, &generation);
    assert_eq!(generation.load(std::sync::atomic::Ordering::Acquire), 1);
}

#[test]
fn generation_starts_at_zero() {
    let (_dir, loader) = temp_loader(VALID_RULES_YAML);
    assert_eq!(loader.generation(), 0);
    assert_eq!(loader.generation_handle().load(std::sync::atomic::Ordering::Acquire), 0);
}
