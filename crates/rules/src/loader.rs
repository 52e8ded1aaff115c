//! Rule file loader with hot-reload via `notify` watcher.
//!
//! Reads a single `rules.yml` document, parses each rule in two passes and
//! reports per-rule outcomes. The watcher bumps a generation counter when the
//! file changes; callers poll the counter and rebuild their rule set.

mod core;
mod error;
mod watcher;

#[cfg(test)]
mod tests;

pub use self::core::{parse_rules, ParsedRules, RuleLoader};
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
