//! Document scanner for the watch directory

use crate::error::Result;
use crate::paths::canonical_path;
use glob::Pattern;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A document found on disk
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Canonical path to the file
    pub path: PathBuf,
    /// File modification time
    pub modified: SystemTime,
}

/// Walks a directory tree looking for documents
#[derive(Debug, Clone)]
pub struct Scanner {
    /// Root directory to scan
    root: PathBuf,
    /// File name patterns (glob), e.g. `*.pdf`
    patterns: Vec<Pattern>,
    /// Directories never descended into (view directories)
    skip_dirs: Vec<PathBuf>,
}

impl Scanner {
    /// Create a new scanner
    pub fn new<P: AsRef<Path>>(root: P, patterns: &[&str]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Scanner {
            root: root.as_ref().to_path_buf(),
            patterns,
            skip_dirs: Vec::new(),
        })
    }

    /// Never descend into `dir`
    pub fn skip_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.skip_dirs.push(canonical_path(dir));
        self
    }

    /// Scan for all matching documents. A missing root yields nothing.
    pub fn scan(&self) -> impl Iterator<Item = ScanResult> + '_ {
        WalkDir::new(canonical_path(&self.root))
            .follow_links(false)
            .into_iter()
            .filter_entry(move |e| !self.is_skipped(e.path(), e.depth()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(move |e| self.matches(e.path()))
            .filter_map(|e| {
                let modified = e.metadata().ok()?.modified().ok()?;
                Some(ScanResult {
                    path: e.path().to_path_buf(),
                    modified,
                })
            })
    }

    /// Scan for documents modified after `since`
    pub fn scan_since(&self, since: SystemTime) -> impl Iterator<Item = ScanResult> + '_ {
        self.scan().filter(move |r| r.modified > since)
    }

    /// Check if a file name matches any pattern (case-insensitive)
    fn matches(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return true;
        }

        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        let options = glob::MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        self.patterns.iter().any(|p| p.matches_with(filename, options))
    }

    /// Hidden entries and view directories are skipped
    fn is_skipped(&self, path: &Path, depth: usize) -> bool {
        if depth == 0 {
            return false;
        }

        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with('.') {
            return true;
        }

        self.skip_dirs.iter().any(|d| d == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        File::create(path).unwrap().write_all(b"%PDF").unwrap();
    }

    fn names(results: &[ScanResult]) -> Vec<String> {
        let mut names: Vec<String> = results
            .iter()
            .map(|r| r.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_scanner_basic() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("subdir")).unwrap();

        touch(&dir.path().join("file1.pdf"));
        touch(&dir.path().join("file2.txt"));
        touch(&dir.path().join("subdir/file3.PDF"));

        let scanner = Scanner::new(dir.path(), &["*.pdf"]).unwrap();
        let results: Vec<_> = scanner.scan().collect();

        assert_eq!(names(&results), vec!["file1.pdf", "file3.PDF"]);
    }

    #[test]
    fn test_scanner_skips_hidden_and_view_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        fs::create_dir_all(dir.path().join("_favorites")).unwrap();

        touch(&dir.path().join("keep.pdf"));
        touch(&dir.path().join(".hidden.pdf"));
        touch(&dir.path().join(".cache/inner.pdf"));
        touch(&dir.path().join("_favorites/copy.pdf"));

        let scanner = Scanner::new(dir.path(), &["*.pdf"])
            .unwrap()
            .skip_dir(dir.path().join("_favorites"));
        let results: Vec<_> = scanner.scan().collect();

        assert_eq!(names(&results), vec!["keep.pdf"]);
    }

    #[test]
    fn test_scanner_multiple_patterns() {
        let dir = tempdir().unwrap();

        touch(&dir.path().join("paper.pdf"));
        touch(&dir.path().join("book.epub"));
        touch(&dir.path().join("data.json"));

        let scanner = Scanner::new(dir.path(), &["*.pdf", "*.epub"]).unwrap();
        assert_eq!(scanner.scan().count(), 2);
    }

    #[test]
    fn test_scan_since_filters_old_files() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("new.pdf"));

        let scanner = Scanner::new(dir.path(), &["*.pdf"]).unwrap();
        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        let future = SystemTime::now() + std::time::Duration::from_secs(3600);

        assert_eq!(scanner.scan_since(past).count(), 1);
        assert_eq!(scanner.scan_since(future).count(), 0);
    }

    #[test]
    fn test_scanner_missing_root() {
        let scanner = Scanner::new("/no/such/library", &["*.pdf"]).unwrap();
        assert_eq!(scanner.scan().count(), 0);
    }
}
