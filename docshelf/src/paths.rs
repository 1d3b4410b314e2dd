//! Path canonicalization and relative-path helpers
//!
//! Every path that reaches the metadata store or a view directory goes
//! through [`canonical_path`] first, so two spellings of the same file
//! always compare equal.

use std::path::{Component, Path, PathBuf};

/// Resolve a path to its absolute, symlink-resolved form.
///
/// Paths that do not exist (the old side of a rename, a deleted file) are
/// resolved through their nearest existing ancestor; the missing tail is
/// appended unchanged.
pub fn canonical_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let absolute = absolute_path(path.as_ref());

    if let Ok(resolved) = std::fs::canonicalize(&absolute) {
        return resolved;
    }

    let mut tail = Vec::new();
    let mut cursor = absolute.as_path();
    while let Some(parent) = cursor.parent() {
        if let Some(name) = cursor.file_name() {
            tail.push(name.to_os_string());
        }
        if let Ok(resolved) = std::fs::canonicalize(parent) {
            let mut out = resolved;
            for name in tail.iter().rev() {
                out.push(name);
            }
            return out;
        }
        cursor = parent;
    }

    absolute
}

/// Canonical path as the string key used by the store.
pub fn canonical_key<P: AsRef<Path>>(path: P) -> String {
    canonical_path(path).to_string_lossy().into_owned()
}

/// Make a path absolute against the current directory and fold `.`/`..`.
pub fn absolute_path(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    clean_path(&joined)
}

/// Lexically normalize a path (no filesystem access).
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Express `target` relative to directory `base`. Both must be absolute.
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();

    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Append a trailing separator so prefix tests respect directory boundaries.
///
/// `"/a/b"` becomes `"/a/b/"`, which is not a prefix of `"/a/bc.pdf"`.
pub fn dir_prefix(dir: &str) -> String {
    let sep = std::path::MAIN_SEPARATOR;
    if dir.is_empty() {
        return sep.to_string();
    }
    if dir.ends_with(sep) {
        dir.to_string()
    } else {
        format!("{}{}", dir, sep)
    }
}
