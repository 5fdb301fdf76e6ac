//! Step-completion heuristic.
//!
//! There is no ground truth for "the task is done"; the policy below is a
//! conservative guess and every threshold is configuration.

use serde::{Deserialize, Serialize};

use crate::core::text::lowercase_prefix;
use crate::core::types::Directive;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionPolicy {
    /// Phrase a reply uses to declare the task done.
    pub acknowledgement: String,
    /// How many leading characters of the task the acknowledgement must quote.
    pub task_reference_chars: usize,
    /// Replies shorter than this never complete a step implicitly.
    pub min_reply_chars: usize,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            acknowledgement: "Task completed successfully for:".to_string(),
            task_reference_chars: 20,
            min_reply_chars: 50,
        }
    }
}

impl CompletionPolicy {
    /// True if `reply` carries the acknowledgement phrase and references `task`.
    pub fn acknowledges(&self, task: &str, reply: &str) -> bool {
        let reply_lower = reply.to_lowercase();
        let phrase = self.acknowledgement.trim().to_lowercase();
        if phrase.is_empty() || !reply_lower.contains(&phrase) {
            return false;
        }
        let reference = lowercase_prefix(task, self.task_reference_chars);
        reply_lower.contains(reference.trim_end())
    }

    /// Judge a reply that arrived for `task`.
    ///
    /// `failed_command_pending` is set when the most recent command result of the
    /// step carried an error; such a step only completes on an explicit
    /// acknowledgement.
    pub fn reply_completes(
        &self,
        task: &str,
        reply: &str,
        directive: &Directive,
        failed_command_pending: bool,
    ) -> bool {
        if self.acknowledges(task, reply) {
            return true;
        }
        let trimmed = reply.trim();
        *directive == Directive::None
            && !failed_command_pending
            && trimmed.chars().count() >= self.min_reply_chars
            && !looks_like_error(trimmed)
    }
}

fn looks_like_error(reply: &str) -> bool {
    reply
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("error"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_reply() -> String {
        "X is a layered system. ".repeat(9)
    }

    #[test]
    fn acknowledgement_must_reference_task() {
        let policy = CompletionPolicy::default();
        assert!(policy.acknowledges(
            "create directory reports",
            "Done. Task completed successfully for: create directory reports"
        ));
        assert!(!policy.acknowledges(
            "create directory reports",
            "Task completed successfully for: something else"
        ));
    }

    #[test]
    fn long_reply_without_directive_completes() {
        let policy = CompletionPolicy::default();
        assert!(policy.reply_completes("explain X", &long_reply(), &Directive::None, false));
    }

    #[test]
    fn short_reply_does_not_complete() {
        let policy = CompletionPolicy::default();
        assert!(!policy.reply_completes("explain X", "Thinking...", &Directive::None, false));
    }

    #[test]
    fn error_reply_does_not_complete() {
        let policy = CompletionPolicy::default();
        let reply = format!("Error: {}", long_reply());
        assert!(!policy.reply_completes("explain X", &reply, &Directive::None, false));
    }

    #[test]
    fn failed_command_blocks_implicit_completion() {
        let policy = CompletionPolicy::default();
        assert!(!policy.reply_completes("explain X", &long_reply(), &Directive::None, true));
        let ack = format!("{} Task completed successfully for: explain X", long_reply());
        assert!(policy.reply_completes("explain X", &ack, &Directive::None, true));
    }

    #[test]
    fn threshold_is_configurable() {
        let policy = CompletionPolicy {
            min_reply_chars: 5,
            ..CompletionPolicy::default()
        };
        assert!(policy.reply_completes("explain X", "Short but ok", &Directive::None, false));
    }
}
