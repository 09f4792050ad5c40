/// Quote a string for use as a single shell word
/// Converts: foo'bar -> 'foo'\''bar'
///
/// # Examples
///
/// ```
/// use configo::utils::shell::escape;
///
/// assert_eq!(escape("git"), "'git'");
/// assert_eq!(escape("VS Code"), "'VS Code'");
/// assert_eq!(escape("foo'bar"), "'foo'\\''bar'");
/// ```
pub fn escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// First line of command output, trimmed. `None` when there is no text.
pub fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
