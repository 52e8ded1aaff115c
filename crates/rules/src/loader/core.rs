//! Core [`RuleLoader`] struct: file-backed rule loading with optional hot-reload.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde_yaml::Value;
use tracing::{info, warn};

use crate::schema::Rule;

use super::error::{LoadResult, Result, RuleError};
use super::watcher::handle_fs_event;

/// Rules that survived parsing, plus the entries that did not.
#[derive(Debug, Clone, Default)]
pub struct ParsedRules {
    /// Parsed rules in file order.
    pub rules: Vec<Rule>,
    /// Entries that failed the raw or typed pass.
    pub failures: Vec<LoadResult>,
}

/// Parse a rules document via two-pass deserialization.
///
/// First pass: read the raw `rules` sequence and check each entry has a
/// unique, non-empty `id`. Second pass: deserialize each entry into a typed
/// [`Rule`]. A malformed document is an error; a malformed rule is reported
/// in [`ParsedRules::failures`] so the caller's policy can decide.
pub fn parse_rules(contents: &str) -> Result<ParsedRules> {
    let doc: Value = serde_yaml::from_str(contents)?;

    let entries = match &doc {
        Value::Null => return Ok(ParsedRules::default()),
        Value::Mapping(map) => match map.get("rules") {
            None | Some(Value::Null) => return Ok(ParsedRules::default()),
            Some(Value::Sequence(seq)) => seq,
            Some(_) => {
                return Err(RuleError::Validation(
                    "`rules` must be a list".to_string(),
                ))
            }
        },
        _ => {
            return Err(RuleError::Validation(
                "rules document must be a mapping with a `rules` list".to_string(),
            ))
        }
    };

    let mut parsed = ParsedRules::default();
    let mut seen = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        // First pass: envelope (id only).
        let id = match entry.as_mapping().and_then(|m| m.get("id")) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                parsed.failures.push(LoadResult::failed(
                    format!("#{index}"),
                    "rule id must be a non-empty string",
                ));
                continue;
            }
        };

        if !seen.insert(id.clone()) {
            parsed
                .failures
                .push(LoadResult::failed(id, "duplicate rule id"));
            continue;
        }

        // Second pass: typed rule.
        match serde_yaml::from_value::<Rule>(entry.clone()) {
            Ok(rule) => parsed.rules.push(rule),
            Err(e) => parsed
                .failures
                .push(LoadResult::failed(id, format!("failed to parse rule: {e}"))),
        }
    }

    Ok(parsed)
}

/// File-backed rule loader with optional hot-reload.
///
/// Holds the rules file path and a generation counter that the watcher bumps
/// on every relevant change.
pub struct RuleLoader {
    /// Path to the rules YAML file.
    path: PathBuf,
    /// Bumped once per observed change to `path`.
    generation: Arc<AtomicU64>,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            generation: Arc::new(AtomicU64::new(0)),
            _watcher: None,
        }
    }

    /// Read and parse the rules file.
    pub fn load(&self) -> Result<ParsedRules> {
        let contents = fs::read_to_string(&self.path)?;
        let parsed = parse_rules(&contents)?;
        info!(
            path = %self.path.display(),
            rules = parsed.rules.len(),
            failed = parsed.failures.len(),
            "parsed rules file"
        );
        for failure in &parsed.failures {
            warn!(rule_id = %failure.rule_id, status = %failure.status, "rule entry rejected by parser");
        }
        Ok(parsed)
    }

    /// Start a filesystem watcher with 500ms debounce.
    ///
    /// The rules file's parent directory is watched (editors often replace
    /// files by rename); only events naming the rules file bump the generation.
    pub fn watch(&mut self) -> Result<()> {
        let generation = Arc::clone(&self.generation);
        let target = self.path.clone();

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => handle_fs_event(&event, &target, &generation),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })?;

        let dir = watch_dir(&self.path);
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let _ = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.path.display(), "watching rules file for changes");
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Current change generation. Starts at 0.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Shared handle to the generation counter.
    pub fn generation_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
