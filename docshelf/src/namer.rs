//! Human-readable, collision-free names for links in view directories
//!
//! A document with a title is shown as `[year][Title].ext` (year `-` when
//! unknown); otherwise its own basename is used. Collisions within one pass
//! get `__2`, `__3`, ... inserted before the extension.

use std::collections::HashSet;
use std::path::Path;

/// Pick a link name for `base_name` not already present in `used`.
///
/// The caller owns the accumulator and inserts the returned name; names
/// handed out against the same set are pairwise distinct.
pub fn link_name(base_name: &str, title: &str, year: &str, used: &HashSet<String>) -> String {
    let (_, ext) = split_extension(base_name);
    let core = link_core(base_name, title, year);

    let mut name = format!("{}{}", core, ext);
    let mut suffix = 2;
    while used.contains(&name) {
        name = format!("{}__{}{}", core, suffix, ext);
        suffix += 1;
    }
    name
}

/// Replace path separators and spaces with `_` after trimming.
pub fn sanitize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Everything before the extension: `[year][title]` or the sanitized stem
fn link_core(base_name: &str, title: &str, year: &str) -> String {
    let title = sanitize(title);
    if title.is_empty() {
        let (stem, _) = split_extension(base_name);
        let stem = sanitize(stem);
        if stem.is_empty() {
            "_".to_string()
        } else {
            stem
        }
    } else {
        let year = sanitize(year);
        let year = if year.is_empty() { "-".to_string() } else { year };
        format!("[{}][{}]", year, title)
    }
}

/// Split `name` into stem and extension (extension keeps its leading dot).
fn split_extension(name: &str) -> (&str, &str) {
    let ext_len = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.len() + 1)
        .unwrap_or(0);
    name.split_at(name.len() - ext_len)
}
