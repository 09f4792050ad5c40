use std::path::{Path, PathBuf};

/// Expand a leading `~` or `~/` to the current user's home directory.
///
/// Paths without a leading tilde are returned unchanged. Returns `None` when
/// the path is not valid UTF-8 or `HOME` is needed but unset.
///
/// # Examples
///
/// ```
/// use configo::utils::path::expand_tilde;
///
/// let path = expand_tilde("/etc/hosts").unwrap();
/// assert_eq!(path.to_str(), Some("/etc/hosts"));
/// ```
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_str()?;

    let Some(after_tilde) = path_str.strip_prefix('~') else {
        return Some(path.to_path_buf());
    };

    // ~user is not expanded
    if !after_tilde.is_empty() && !after_tilde.starts_with('/') {
        return Some(path.to_path_buf());
    }

    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(after_tilde.trim_start_matches('/')))
}
