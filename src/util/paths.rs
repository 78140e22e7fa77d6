/// Builds the slash-separated path of a published document relative to the
/// publish root: `[base_path/][language/]file`.
///
/// Leading and trailing slashes on every segment are ignored and empty
/// segments are skipped, so `"/v1/"`, `"v1"` and `"v1/"` are equivalent.
pub fn relative_feed_path(base_path: &str, language: Option<&str>, file: &str) -> String {
    [base_path, language.unwrap_or(""), file]
        .iter()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins a base URL and a relative publish path with exactly one slash.
pub fn join_url(base_url: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}
