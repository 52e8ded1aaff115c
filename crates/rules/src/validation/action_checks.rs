//! Action list checks: empty token lists, missing actions.

use super::ValidationResult;
use crate::schema::{Action, Rule};

pub(super) fn validate_actions(rule: &Rule, result: &mut ValidationResult) {
    if rule.then.is_empty() && rule.otherwise.is_empty() {
        result.warn("then", "rule has no `then` or `else` actions and will never do anything");
    }
    check_list(&rule.then, "then", result);
    check_list(&rule.otherwise, "else", result);
}

fn check_list(actions: &[Action], path: &str, result: &mut ValidationResult) {
    for (i, action) in actions.iter().enumerate() {
        let action_path = format!("{path}[{i}].{}", action.kind());
        match action {
            Action::Set(tokens) | Action::Clear(tokens) => {
                if tokens.is_empty() {
                    result.warn(&action_path, format!("`{}` with no tokens does nothing", action.kind()));
                }
                for (j, token) in tokens.iter().enumerate() {
                    if token.trim().is_empty() {
                        result.error(format!("{action_path}[{j}]"), "token must not be empty");
                    }
                }
            }
            Action::Log(message) => {
                if message.trim().is_empty() {
                    result.warn(&action_path, "empty log message");
                }
            }
        }
    }
}
