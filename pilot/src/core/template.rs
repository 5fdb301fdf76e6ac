//! Placeholder substitution for OS-template commands.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::command_line::{join_arguments, quote_argument};

/// Placeholder replaced by every argument, quoted and space-joined.
pub const ARGS_ALL_PLACEHOLDER: &str = "%ARGS_ALL%";

static POSITIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%ARG\[(\d+)\]%").expect("positional placeholder pattern is valid")
});

/// Substitute `%ARG[i]%` and `%ARGS_ALL%` placeholders in `template`.
///
/// `%ARG[i]%` is 0-indexed; a placeholder past the end of `args` becomes an
/// empty string. Substituted arguments are quoted with `quote_argument`, so the
/// output never contains a placeholder that came from the template. Argument
/// text is inserted after the scan and is never re-scanned.
pub fn substitute(template: &str, args: &[String]) -> String {
    let all = join_arguments(args);
    let mut out = String::with_capacity(template.len() + all.len());
    for (i, segment) in template.split(ARGS_ALL_PLACEHOLDER).enumerate() {
        if i > 0 {
            out.push_str(&all);
        }
        let replaced = POSITIONAL_RE.replace_all(segment, |caps: &Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| args.get(index))
                .map(|arg| quote_argument(arg))
                .unwrap_or_default()
        });
        out.push_str(&replaced);
    }
    out
}

/// True if `text` still contains any recognised placeholder.
pub fn has_placeholders(text: &str) -> bool {
    text.contains(ARGS_ALL_PLACEHOLDER) || POSITIONAL_RE.is_match(text)
}
