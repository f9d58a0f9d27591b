//! Mensago server paths
//!
//! Paths are space-separated components rooted at `/`, e.g.
//! `/ wsp 5a56260b-aa5c-4013-9217-a78f094432c3 messages`.

/// Returns the last component of a path
pub fn basename(path: &str) -> &str {
    path.trim().rsplit(' ').next().unwrap_or("")
}

/// Returns the path with its last component removed
pub fn parent(path: &str) -> String {
    let trimmed = path.trim();
    match trimmed.rsplit_once(' ') {
        Some((head, _)) => head.trim_end().to_string(),
        None => String::new(),
    }
}

/// Splits a string holding several paths, such as a server listing
pub fn split(paths: &str) -> Vec<String> {
    let mut parts = paths.trim().split(" /");
    let mut out = Vec::new();
    match parts.next() {
        Some(first) if !first.is_empty() => out.push(first.to_string()),
        _ => {}
    }
    // Only the first path keeps its leading slash after splitting
    out.extend(parts.map(|p| format!("/{}", p)));
    out
}
