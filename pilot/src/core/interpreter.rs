//! Directive extraction from free-text generation replies.
//!
//! Detection is marker based and can misfire on prose that merely mentions a
//! marker. Callers treat the result as a suggestion that still passes the
//! approval gate.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::text::excerpt;
use crate::core::types::Directive;

/// Token that introduces a suggested command; the rest of the line is the command.
pub const COMMAND_MARKER: &str = "COMMAND:";
/// Phrase that introduces a quoted question for the operator.
pub const QUESTION_PHRASE: &str = "ask the user";
/// Question used when the reply asks for input without a quoted fragment.
pub const GENERIC_QUESTION: &str = "Please clarify how to proceed.";

const GENERIC_EXCERPT_CHARS: usize = 200;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)COMMAND:[ \t]*([^\r\n]*)").expect("command marker pattern is valid")
});

static TRAILING_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bthis command will\b").expect("trailing clause pattern is valid")
});

static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bask the user\b").expect("question phrase pattern is valid")
});

static DEFAULT_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\((?:default|suggested)(?: answer)?:\s*([^)]*)\)")
        .expect("default answer pattern is valid")
});

/// Derive exactly one directive from a reply.
///
/// A command suggestion always wins over a question, wherever each appears.
/// Only the first marker of each kind is considered.
pub fn interpret_reply(reply: &str) -> Directive {
    if let Some(command) = find_command(reply) {
        return Directive::SuggestCommand(command);
    }
    if let Some((question, default_answer)) = find_question(reply) {
        return Directive::AskUser {
            question,
            default_answer,
        };
    }
    Directive::None
}

/// Extract the command line following the first command marker.
pub fn find_command(reply: &str) -> Option<String> {
    let caps = COMMAND_RE.captures(reply)?;
    let mut line = caps.get(1)?.as_str().trim();
    if let Some(clause) = TRAILING_CLAUSE_RE.find(line) {
        line = line[..clause.start()].trim_end();
    }
    if line.len() >= 2 && line.starts_with('`') && line.ends_with('`') {
        line = line.trim_matches('`').trim();
    }
    (!line.is_empty()).then(|| line.to_string())
}

/// Extract the question (and optional default answer) after the first question phrase.
pub fn find_question(reply: &str) -> Option<(String, Option<String>)> {
    let phrase = QUESTION_RE.find(reply)?;
    let rest = &reply[phrase.end()..];

    let quoted = rest
        .char_indices()
        .find(|(_, c)| *c == '\'' || *c == '"')
        .and_then(|(open, quote)| {
            let body_start = open + quote.len_utf8();
            let close = rest[body_start..].find(quote)? + body_start;
            Some((rest[body_start..close].trim(), close + quote.len_utf8()))
        })
        .filter(|(fragment, _)| !fragment.is_empty());

    match quoted {
        Some((fragment, after)) => {
            let default_answer = DEFAULT_ANSWER_RE
                .captures(&rest[after..])
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty());
            Some((fragment.to_string(), default_answer))
        }
        None => Some((
            format!(
                "{GENERIC_QUESTION}\n\n{}",
                excerpt(reply, GENERIC_EXCERPT_CHARS)
            ),
            None,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_marker_takes_rest_of_line() {
        let reply = "Sure.\nCOMMAND: mkdir reports\nThat creates it.";
        assert_eq!(
            interpret_reply(reply),
            Directive::SuggestCommand("mkdir reports".to_string())
        );
    }

    #[test]
    fn command_marker_is_case_insensitive() {
        assert_eq!(
            find_command("command:   ls -la"),
            Some("ls -la".to_string())
        );
    }

    #[test]
    fn trailing_explanation_is_cut() {
        assert_eq!(
            find_command("COMMAND: g++ main.cpp -o app This command will compile it"),
            Some("g++ main.cpp -o app".to_string())
        );
    }

    #[test]
    fn wrapping_backticks_are_stripped() {
        assert_eq!(
            find_command("COMMAND: `python script.py`"),
            Some("python script.py".to_string())
        );
    }

    #[test]
    fn empty_command_is_not_a_suggestion() {
        assert_eq!(find_command("COMMAND:\nnothing here"), None);
        assert_eq!(interpret_reply("COMMAND:   "), Directive::None);
    }

    #[test]
    fn command_wins_over_earlier_question() {
        let reply = "I could ask the user 'which dir?' but instead:\nCOMMAND: ls";
        assert_eq!(
            interpret_reply(reply),
            Directive::SuggestCommand("ls".to_string())
        );
    }

    #[test]
    fn question_fragment_is_extracted() {
        let reply = "Before continuing, ask the user 'What is the target file path?'.";
        assert_eq!(
            interpret_reply(reply),
            Directive::AskUser {
                question: "What is the target file path?".to_string(),
                default_answer: None,
            }
        );
    }

    #[test]
    fn question_default_answer_is_captured() {
        let reply = r#"Please ask the user "Which compiler?" (default: gcc) first."#;
        assert_eq!(
            interpret_reply(reply),
            Directive::AskUser {
                question: "Which compiler?".to_string(),
                default_answer: Some("gcc".to_string()),
            }
        );
    }

    #[test]
    fn question_without_fragment_falls_back_to_generic() {
        let reply = "I need to ask the user about the layout";
        match interpret_reply(reply) {
            Directive::AskUser {
                question,
                default_answer,
            } => {
                assert!(question.starts_with(GENERIC_QUESTION));
                assert!(question.contains("layout"));
                assert_eq!(default_answer, None);
            }
            other => panic!("expected AskUser, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_has_no_directive() {
        assert_eq!(
            interpret_reply("X is a system that does many things."),
            Directive::None
        );
    }
}
