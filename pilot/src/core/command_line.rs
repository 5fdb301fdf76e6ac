//! Raw command-line splitting and argument quoting.
//!
//! `split_command_line` and `quote_argument` are inverses: joining arguments
//! with `join_arguments` and splitting the result yields the same list.

/// A raw command line split into the command name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommandLine {
    pub name: String,
    pub args: Vec<String>,
}

/// Split a raw line into whitespace-separated tokens.
///
/// A `"` toggles within-quotes mode; whitespace inside quotes belongs to the
/// current token. Inside quotes, `\"` and `\\` are escapes for a literal quote
/// and backslash; any other backslash is kept as is. A quoted empty span
/// (`""`) produces an empty token.
pub fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    // Set when the current token saw a quote, so `""` survives as an empty token.
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            '\\' if in_quotes => match chars.peek() {
                Some('"') | Some('\\') => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                _ => current.push('\\'),
            },
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    tokens
}

/// Split a raw line into the command name and its argument list.
///
/// Returns `None` when the line holds no tokens.
pub fn parse_command_line(line: &str) -> Option<ParsedCommandLine> {
    let mut tokens = split_tokens(line).into_iter();
    let name = tokens.next()?;
    Some(ParsedCommandLine {
        name,
        args: tokens.collect(),
    })
}

/// Quote a single argument for substitution into a command line.
///
/// Arguments that are empty or contain whitespace or `"` are wrapped in
/// double quotes with inner `"` and `\` escaped; anything else is returned
/// unchanged.
pub fn quote_argument(arg: &str) -> String {
    let needs_quotes = arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"');
    if !needs_quotes {
        return arg.to_string();
    }
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Quote every argument and join them with single spaces.
pub fn join_arguments<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| quote_argument(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
