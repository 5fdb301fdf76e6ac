//! Small text helpers shared by prompts and interpreters.

/// Return at most `max_chars` characters of `text`, appending `...` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Lowercased prefix of `text` holding at most `max_chars` characters.
pub fn lowercase_prefix(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect::<String>().to_lowercase()
}
