//! Pattern utilities for prompt detection.

use regex::bytes::Regex;

/// Compile a prompt pattern string into a multi-line regex.
///
/// - Anchors to end of line if no anchor is specified
/// - Enables multi-line mode so `^`/`$` match at line boundaries
pub fn compile_prompt_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let pattern = if pattern.ends_with('$') {
        pattern.to_string()
    } else {
        format!("{}\\s?$", pattern)
    };

    let pattern = if pattern.starts_with("(?") {
        pattern
    } else {
        format!("(?m){}", pattern)
    };

    Regex::new(&pattern)
}

/// Combine several patterns into one alternation.
pub fn combine_patterns<'a>(
    patterns: impl IntoIterator<Item = &'a Regex>,
) -> Result<Regex, regex::Error> {
    let combined = patterns
        .into_iter()
        .map(|p| format!("(?:{})", p.as_str()))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&combined)
}

/// Strip prompt decoration (`#`, `>`, whitespace) from both ends.
pub fn strip_prompt_decoration(prompt: &str) -> &str {
    prompt.trim_matches(|c: char| c == '#' || c == '>' || c.is_whitespace())
}
