//! Validated, ordered rule sets.

use serde::{Deserialize, Serialize};
use shift_catalog::Catalog;
use tracing::{info, warn};

use crate::loader::{LoadResult, LoadStatus, ParsedRules, Result, RuleError};
use crate::schema::Rule;
use crate::validation::validate_rule;

/// What to do with a rule that fails to parse or validate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnInvalidRule {
    /// One bad rule rejects the whole set.
    #[default]
    Reject,
    /// Drop the bad rule with a warning and keep the rest.
    Skip,
}

/// Rules in application order, every one validated against the catalog.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    report: Vec<LoadResult>,
}

impl RuleSet {
    /// Validate `rules` against `catalog`.
    pub fn new(rules: Vec<Rule>, catalog: &Catalog, policy: OnInvalidRule) -> Result<Self> {
        Self::from_parsed(
            ParsedRules {
                rules,
                failures: Vec::new(),
            },
            catalog,
            policy,
        )
    }

    /// Build from loader output. Parser failures count as invalid rules.
    pub fn from_parsed(parsed: ParsedRules, catalog: &Catalog, policy: OnInvalidRule) -> Result<Self> {
        let mut report = Vec::with_capacity(parsed.rules.len() + parsed.failures.len());

        for failure in parsed.failures {
            reject_or_skip(policy, failure, &mut report)?;
        }

        let mut rules = Vec::with_capacity(parsed.rules.len());
        for rule in parsed.rules {
            let result = validate_rule(&rule, catalog);
            for w in &result.warnings {
                warn!(rule_id = %rule.id, path = %w.path, "{}", w.message);
            }
            if !result.valid {
                reject_or_skip(policy, LoadResult::failed(rule.id.clone(), result.summary()), &mut report)?;
                continue;
            }

            let status = if rule.enabled {
                LoadStatus::Loaded
            } else {
                LoadStatus::Disabled
            };
            info!(rule_id = %rule.id, title = %rule.display_name(), status = %status, "rule ready");
            report.push(LoadResult {
                rule_id: rule.id.clone(),
                status,
            });
            rules.push(rule);
        }

        Ok(Self { rules, report })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Enabled rules, in order.
    pub fn enabled(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.enabled)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Per-rule load outcomes, including skipped rules.
    pub fn report(&self) -> &[LoadResult] {
        &self.report
    }
}

fn reject_or_skip(policy: OnInvalidRule, failure: LoadResult, report: &mut Vec<LoadResult>) -> Result<()> {
    let reason = match &failure.status {
        LoadStatus::Failed { error } => error.clone(),
        other => other.to_string(),
    };
    match policy {
        OnInvalidRule::Reject => Err(RuleError::InvalidRule {
            rule_id: failure.rule_id,
            reason,
        }),
        OnInvalidRule::Skip => {
            warn!(rule_id = %failure.rule_id, error = %reason, "skipping invalid rule");
            report.push(failure);
            Ok(())
        }
    }
}
