//! Symlink directories as materialized views
//!
//! A view directory is owned by a [`LinkDir`]. Each pass compares the
//! symlinks already present against a freshly computed [`DesiredLinks`]
//! mapping and converges: wrong or unwanted links are removed, missing
//! ones are created, correct ones are left alone (same inode, same mtime).
//! Regular files and directories inside a view are never touched.
//!
//! There is no locking here. Callers must not run two passes against the
//! same directory at once.

mod sources;

pub use sources::{FlagFilter, FlagSource, LinkSource, RecentlyAddedSource};

use crate::error::{Error, Result};
use crate::namer::link_name;
use crate::paths::{absolute_path, canonical_path, clean_path, relative_path};
use crate::store::DocumentRecord;
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Target state for one pass: link name -> canonical target path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredLinks {
    links: BTreeMap<String, PathBuf>,
    used: HashSet<String>,
}

impl DesiredLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a link under an exact name, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, target: impl AsRef<Path>) {
        let name = name.into();
        self.used.insert(name.clone());
        self.links.insert(name, clean_path(target.as_ref()));
    }

    /// Name `target` with the link namer and insert it. Returns the name.
    pub fn insert_named(&mut self, target: &Path, title: &str, year: &str) -> String {
        let base = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = link_name(&base, title, year, &self.used);
        self.insert(name.clone(), target);
        name
    }

    /// Add a stored record, unless its file has vanished or is a directory.
    pub fn insert_record(&mut self, record: &DocumentRecord) -> Option<String> {
        let trimmed = record.path.trim();
        if trimmed.is_empty() {
            return None;
        }
        let target = canonical_path(trimmed);
        match std::fs::metadata(&target) {
            Ok(meta) if !meta.is_dir() => {}
            Ok(_) => {
                tracing::debug!("Skipping directory {} in view", target.display());
                return None;
            }
            Err(e) => {
                tracing::debug!("Skipping missing target {}: {}", target.display(), e);
                return None;
            }
        }
        Some(self.insert_named(&target, record.title.trim(), record.year.trim()))
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.links.get(name).map(|p| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Links in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.links.iter().map(|(n, p)| (n.as_str(), p.as_path()))
    }
}

/// What one reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Links created
    pub created: usize,
    /// Links removed
    pub removed: usize,
    /// Links already correct and left untouched
    pub unchanged: usize,
    /// Links that could not be removed: (name, error)
    pub failed_removals: Vec<(String, String)>,
}

impl ReconcileReport {
    /// Number of filesystem changes made
    pub fn mutations(&self) -> usize {
        self.created + self.removed
    }
}

/// A directory whose contents converge to a desired link set
pub trait View {
    /// Bring the directory in line with `desired`.
    fn reconcile(&self, desired: &DesiredLinks) -> Result<ReconcileReport>;
}

/// A view backed by a plain directory of symlinks
#[derive(Debug, Clone)]
pub struct LinkDir {
    dir: PathBuf,
}

impl LinkDir {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        LinkDir {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The configured directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the directory to an absolute path, creating it if missing.
    pub fn prepare(&self) -> Result<PathBuf> {
        let absolute = absolute_path(&self.dir);
        let configuration = |source| Error::Configuration {
            path: absolute.clone(),
            source,
        };
        std::fs::create_dir_all(&absolute).map_err(configuration)?;
        std::fs::canonicalize(&absolute).map_err(configuration)
    }

    /// Snapshot of the symlinks currently in the directory: name -> target.
    ///
    /// Relative targets are resolved against the directory. Non-symlink
    /// entries and names that are not valid UTF-8 are skipped.
    pub fn existing_links(&self) -> Result<BTreeMap<String, PathBuf>> {
        let dir = self.prepare()?;
        read_links(&dir)
    }
}

impl View for LinkDir {
    fn reconcile(&self, desired: &DesiredLinks) -> Result<ReconcileReport> {
        let dir = self.prepare()?;
        let existing = read_links(&dir)?;
        let mut report = ReconcileReport::default();

        for (name, target) in &existing {
            if desired.get(name) == Some(target.as_path()) {
                continue;
            }
            let link = dir.join(name);
            match std::fs::remove_file(&link) {
                Ok(()) => {
                    report.removed += 1;
                    tracing::debug!("Removed link {}", link.display());
                }
                Err(e) => {
                    tracing::warn!("Failed to remove link {}: {}", link.display(), e);
                    report.failed_removals.push((name.clone(), e.to_string()));
                }
            }
        }

        for (name, target) in desired.iter() {
            if existing.get(name).map(|t| t.as_path()) == Some(target) {
                report.unchanged += 1;
                continue;
            }
            let link = dir.join(name);
            if is_symlink(&link) {
                if let Err(e) = std::fs::remove_file(&link) {
                    tracing::warn!("Failed to remove stale link {}: {}", link.display(), e);
                }
            }
            let relative = relative_path(target, &dir);
            make_symlink(&relative, &link).map_err(|source| Error::Link {
                path: link.clone(),
                source,
            })?;
            report.created += 1;
            tracing::debug!("Linked {} -> {}", link.display(), relative.display());
        }

        Ok(report)
    }
}

fn read_links(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| Error::Configuration {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut links = BTreeMap::new();
    for entry in entries.flatten() {
        let is_link = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
        if !is_link {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!("Ignoring non UTF-8 link name in {}", dir.display());
            continue;
        };
        let Ok(target) = std::fs::read_link(entry.path()) else {
            continue;
        };
        let target = if target.is_absolute() {
            target
        } else {
            dir.join(target)
        };
        links.insert(name, clean_path(&target));
    }
    Ok(links)
}

/// Names of every symlink in `dir`, UTF-8 or not
pub(crate) fn link_names(dir: &Path) -> Result<Vec<OsString>> {
    let entries = std::fs::read_dir(dir).map_err(|source| Error::Configuration {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_symlink()).unwrap_or(false))
        .map(|e| e.file_name())
        .collect())
}

pub(crate) fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use tempfile::tempdir;

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempdir().unwrap();
            let root = std::fs::canonicalize(tmp.path()).unwrap();
            std::fs::create_dir_all(root.join("papers")).unwrap();
            Fixture { _tmp: tmp, root }
        }

        fn paper(&self, name: &str) -> PathBuf {
            let path = self.root.join("papers").join(name);
            std::fs::write(&path, b"%PDF-1.4").unwrap();
            path
        }

        fn view(&self) -> LinkDir {
            LinkDir::new(self.root.join("view"))
        }
    }

    fn resolved(view: &LinkDir) -> BTreeMap<String, PathBuf> {
        view.existing_links().unwrap()
    }

    #[test]
    fn test_creates_directory_and_links() {
        let fx = Fixture::new();
        let a = fx.paper("a.pdf");
        let view = fx.view();

        let mut desired = DesiredLinks::new();
        desired.insert("A.pdf", &a);

        let report = view.reconcile(&desired).unwrap();
        assert_eq!(report.created, 1);

        let link = fx.root.join("view").join("A.pdf");
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("../papers/a.pdf"));
        assert_eq!(std::fs::canonicalize(&link).unwrap(), a);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let fx = Fixture::new();
        let view = fx.view();
        let mut desired = DesiredLinks::new();
        desired.insert("a.pdf", fx.paper("a.pdf"));
        desired.insert("b.pdf", fx.paper("b.pdf"));

        view.reconcile(&desired).unwrap();
        let inode_before = std::fs::symlink_metadata(fx.root.join("view/a.pdf"))
            .unwrap()
            .ino();

        let second = view.reconcile(&desired).unwrap();
        assert_eq!(second.mutations(), 0);
        assert_eq!(second.unchanged, 2);

        let inode_after = std::fs::symlink_metadata(fx.root.join("view/a.pdf"))
            .unwrap()
            .ino();
        assert_eq!(inode_before, inode_after);
    }

    #[test]
    fn test_converges_to_desired_set() {
        let fx = Fixture::new();
        let a = fx.paper("a.pdf");
        let b = fx.paper("b.pdf");
        let c = fx.paper("c.pdf");
        let view = fx.view();

        let mut first = DesiredLinks::new();
        first.insert("one.pdf", &a);
        first.insert("two.pdf", &b);
        view.reconcile(&first).unwrap();

        let mut second = DesiredLinks::new();
        second.insert("one.pdf", &c);
        second.insert("three.pdf", &b);
        let report = view.reconcile(&second).unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(report.created, 2);
        let links = resolved(&view);
        assert_eq!(links.len(), 2);
        assert_eq!(links["one.pdf"], c);
        assert_eq!(links["three.pdf"], b);
    }

    #[test]
    fn test_non_symlinks_preserved() {
        let fx = Fixture::new();
        let view = fx.view();
        let dir = view.prepare().unwrap();
        std::fs::write(dir.join("notes.txt"), b"keep me").unwrap();
        std::fs::create_dir(dir.join("sub")).unwrap();

        view.reconcile(&DesiredLinks::new()).unwrap();

        assert_eq!(std::fs::read(dir.join("notes.txt")).unwrap(), b"keep me");
        assert!(dir.join("sub").is_dir());
    }

    #[test]
    fn test_absolute_existing_links_are_recognized() {
        let fx = Fixture::new();
        let a = fx.paper("a.pdf");
        let view = fx.view();
        let dir = view.prepare().unwrap();
        std::os::unix::fs::symlink(&a, dir.join("a.pdf")).unwrap();

        let mut desired = DesiredLinks::new();
        desired.insert("a.pdf", &a);

        let report = view.reconcile(&desired).unwrap();
        assert_eq!(report.mutations(), 0);
    }

    #[test]
    fn test_creation_blocked_by_regular_file() {
        let fx = Fixture::new();
        let view = fx.view();
        let dir = view.prepare().unwrap();
        std::fs::write(dir.join("a.pdf"), b"squatter").unwrap();

        let mut desired = DesiredLinks::new();
        desired.insert("a.pdf", fx.paper("a.pdf"));

        let err = view.reconcile(&desired).unwrap_err();
        assert!(matches!(err, Error::Link { .. }));
        assert_eq!(std::fs::read(dir.join("a.pdf")).unwrap(), b"squatter");
    }

    #[test]
    fn test_removal_failure_is_reported_and_pass_continues() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let view = fx.view();
        let dir = view.prepare().unwrap();
        let a = fx.paper("a.pdf");
        std::os::unix::fs::symlink(&a, dir.join("stale.pdf")).unwrap();

        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        // Permission bits do not bind root
        if std::fs::write(dir.join("write-check"), b"").is_ok() {
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = view.reconcile(&DesiredLinks::new());
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
        let report = report.unwrap();

        assert_eq!(report.removed, 0);
        assert_eq!(report.failed_removals.len(), 1);
        assert_eq!(report.failed_removals[0].0, "stale.pdf");
        assert!(dir.join("stale.pdf").symlink_metadata().is_ok());
    }

    #[test]
    fn test_unremovable_stale_link_fails_creation() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let view = fx.view();
        let dir = view.prepare().unwrap();
        let a = fx.paper("a.pdf");
        let b = fx.paper("b.pdf");
        std::os::unix::fs::symlink(&a, dir.join("doc.pdf")).unwrap();

        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        if std::fs::write(dir.join("write-check"), b"").is_ok() {
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let mut desired = DesiredLinks::new();
        desired.insert("doc.pdf", &b);
        let result = view.reconcile(&desired);
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            Err(Error::Link { path, .. }) => assert_eq!(path, dir.join("doc.pdf")),
            other => panic!("expected link error, got {:?}", other),
        }
        assert_eq!(std::fs::canonicalize(dir.join("doc.pdf")).unwrap(), a);
    }

    #[test]
    fn test_unusable_directory_is_configuration_error() {
        let fx = Fixture::new();
        let blocker = fx.root.join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let view = LinkDir::new(blocker.join("view"));
        let err = view.reconcile(&DesiredLinks::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_insert_record_drops_missing_and_directories() {
        let fx = Fixture::new();
        let a = fx.paper("a.pdf");

        let mut desired = DesiredLinks::new();
        let mut present = DocumentRecord::new(a.to_string_lossy());
        present.title = "Alpha".to_string();
        present.year = "2001".to_string();

        assert_eq!(
            desired.insert_record(&present).as_deref(),
            Some("[2001][Alpha].pdf")
        );
        assert!(desired
            .insert_record(&DocumentRecord::new(fx.root.join("papers/gone.pdf").to_string_lossy()))
            .is_none());
        assert!(desired
            .insert_record(&DocumentRecord::new(fx.root.join("papers").to_string_lossy()))
            .is_none());
        assert_eq!(desired.len(), 1);
    }
}
