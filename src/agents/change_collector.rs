use crate::artifacts::{ArtifactResult, ManifestPaths};
use crate::error::{GomodError, Result};
use crate::golang::manifest::restore_replace_directives;
use crate::ports::{FileStore, RepoStatus};
use std::collections::HashSet;
use tracing::debug;

/// What changed in the working tree, in status-reader order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTreeDelta {
    pub modified: Vec<String>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
}

impl From<RepoStatus> for WorkingTreeDelta {
    fn from(status: RepoStatus) -> Self {
        Self {
            modified: dedup(status.modified),
            added: dedup(status.not_added),
            deleted: dedup(status.deleted),
        }
    }
}

impl WorkingTreeDelta {
    /// Modified then added paths; both need re-reading.
    pub fn changed(&self) -> impl Iterator<Item = &String> {
        self.modified.iter().chain(self.added.iter())
    }

    pub fn is_changed(&self, path: &str) -> bool {
        self.changed().any(|p| p == path)
    }
}

fn dedup(paths: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    pub vendor_mode: bool,
    pub import_paths: bool,
}

/// Turns a working tree delta into the ordered artifact list.
pub struct ChangeCollector<'a> {
    files: &'a dyn FileStore,
    paths: &'a ManifestPaths,
}

impl<'a> ChangeCollector<'a> {
    pub fn new(files: &'a dyn FileStore, paths: &'a ManifestPaths) -> Self {
        Self { files, paths }
    }

    /// Returns `None` when the lock file did not change.
    ///
    /// Order: lock file, rewritten sources, vendor files, deletions, manifest.
    pub fn collect(
        &self,
        delta: &WorkingTreeDelta,
        options: CollectOptions,
        requested_manifest: &str,
    ) -> Result<Option<Vec<ArtifactResult>>> {
        if !delta.is_changed(&self.paths.lock_file) {
            debug!(lock_file = self.paths.lock_file.as_str(), "lock file unchanged");
            return Ok(None);
        }

        let mut results = vec![self.read_artifact(&self.paths.lock_file)?];

        if options.import_paths {
            for path in delta.changed().filter(|p| self.paths.is_source_file(p)) {
                results.push(self.read_artifact(path)?);
            }
        }

        if options.vendor_mode {
            for path in delta.changed().filter(|p| self.paths.is_vendor_file(p)) {
                results.push(self.read_artifact(path)?);
            }
        }

        // deleted files are never read back
        for path in delta.deleted.iter().filter(|p| self.is_artifact(p, options)) {
            results.push(ArtifactResult::deleted(path.as_str()));
        }

        if let Some(manifest) = self.final_manifest()? {
            if manifest != requested_manifest {
                debug!("manifest changed by the toolchain");
                results.push(ArtifactResult::file(self.paths.manifest.as_str(), manifest));
            }
        }

        debug!(count = results.len(), "collected artifacts");
        Ok(Some(results))
    }

    fn is_artifact(&self, path: &str, options: CollectOptions) -> bool {
        (options.vendor_mode && self.paths.is_vendor_file(path))
            || (options.import_paths && self.paths.is_source_file(path))
    }

    fn read_artifact(&self, path: &str) -> Result<ArtifactResult> {
        let contents = self.files.read_file(path)?.ok_or_else(|| {
            GomodError::Filesystem(format!("'{path}' is reported changed but cannot be read"))
        })?;
        Ok(ArtifactResult::file(path, contents))
    }

    fn final_manifest(&self) -> Result<Option<String>> {
        let Some(bytes) = self.files.read_file(&self.paths.manifest)? else {
            return Ok(None);
        };
        let content = String::from_utf8(bytes).map_err(|e| {
            GomodError::Filesystem(format!("'{}' is not valid UTF-8: {e}", self.paths.manifest))
        })?;
        Ok(Some(restore_replace_directives(&content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryFiles {
        files: HashMap<String, Vec<u8>>,
        reads: Mutex<Vec<String>>,
    }

    impl MemoryFiles {
        fn with(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                    .collect(),
                reads: Mutex::new(Vec::new()),
            }
        }
    }

    impl FileStore for MemoryFiles {
        fn read_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
            self.reads.lock().unwrap().push(path.to_string());
            Ok(self.files.get(path).cloned())
        }

        fn write_file(&self, _path: &str, _contents: &[u8]) -> Result<()> {
            unreachable!("collector never writes")
        }
    }

    fn delta(modified: &[&str], added: &[&str], deleted: &[&str]) -> WorkingTreeDelta {
        let owned = |v: &[&str]| -> Vec<String> { v.iter().map(|s| s.to_string()).collect() };
        WorkingTreeDelta::from(RepoStatus {
            modified: owned(modified),
            not_added: owned(added),
            deleted: owned(deleted),
        })
    }

    #[test]
    fn unchanged_lock_file_means_nothing_to_do() {
        let files = MemoryFiles::with(&[("go.mod", "module a")]);
        let paths = ManifestPaths::for_manifest("go.mod");
        let result = ChangeCollector::new(&files, &paths)
            .collect(&delta(&["README.md"], &[], &[]), CollectOptions::default(), "module a")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn vendor_artifacts_keep_status_order() {
        let files = MemoryFiles::with(&[
            ("go.sum", "sum"),
            ("go.mod", "module a"),
            ("vendor/a.go", "A"),
            ("vendor/b.go", "B"),
        ]);
        let paths = ManifestPaths::for_manifest("go.mod");
        let options = CollectOptions {
            vendor_mode: true,
            import_paths: false,
        };
        let result = ChangeCollector::new(&files, &paths)
            .collect(
                &delta(&["go.sum", "vendor/a.go"], &["vendor/b.go"], &["vendor/c.go"]),
                options,
                "module a",
            )
            .unwrap()
            .unwrap();

        assert_eq!(
            result,
            vec![
                ArtifactResult::file("go.sum", "sum"),
                ArtifactResult::file("vendor/a.go", "A"),
                ArtifactResult::file("vendor/b.go", "B"),
                ArtifactResult::deleted("vendor/c.go"),
            ]
        );
        assert!(!files.reads.lock().unwrap().contains(&"vendor/c.go".to_string()));
    }

    #[test]
    fn rewritten_manifest_comes_last_without_markers() {
        let files = MemoryFiles::with(&[
            ("go.sum", "sum"),
            ("go.mod", "module a\n// gomodup-replace replace x => ../x\nrequire b v2.0.0\n"),
            ("main.go", "package main"),
        ]);
        let paths = ManifestPaths::for_manifest("go.mod");
        let options = CollectOptions {
            vendor_mode: false,
            import_paths: true,
        };
        let result = ChangeCollector::new(&files, &paths)
            .collect(
                &delta(&["go.sum", "main.go", "go.mod"], &[], &[]),
                options,
                "module a\nreplace x => ../x\n",
            )
            .unwrap()
            .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result[1], ArtifactResult::file("main.go", "package main"));
        assert_eq!(
            result[2],
            ArtifactResult::file("go.mod", "module a\nreplace x => ../x\nrequire b v2.0.0\n")
        );
    }

    #[test]
    fn unrelated_deletions_are_not_reported() {
        let files = MemoryFiles::with(&[("go.sum", "sum"), ("go.mod", "module a")]);
        let paths = ManifestPaths::for_manifest("go.mod");
        let result = ChangeCollector::new(&files, &paths)
            .collect(
                &delta(&["go.sum", "README.md"], &[], &["docs/guide.md", "vendor/old.go"]),
                CollectOptions::default(),
                "module a",
            )
            .unwrap()
            .unwrap();
        assert_eq!(result, vec![ArtifactResult::file("go.sum", "sum")]);

        let options = CollectOptions {
            vendor_mode: true,
            import_paths: false,
        };
        let result = ChangeCollector::new(&files, &paths)
            .collect(
                &delta(&["go.sum"], &[], &["docs/guide.md", "vendor/old.go"]),
                options,
                "module a",
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            result,
            vec![
                ArtifactResult::file("go.sum", "sum"),
                ArtifactResult::deleted("vendor/old.go"),
            ]
        );
    }

    #[test]
    fn missing_changed_file_is_a_filesystem_error() {
        let files = MemoryFiles::with(&[]);
        let paths = ManifestPaths::for_manifest("go.mod");
        let err = ChangeCollector::new(&files, &paths)
            .collect(&delta(&["go.sum"], &[], &[]), CollectOptions::default(), "")
            .unwrap_err();
        assert!(matches!(err, GomodError::Filesystem(_)));
    }

    #[test]
    fn delta_deduplicates_paths() {
        let delta = delta(&["go.sum", "go.sum"], &["a"], &[]);
        assert_eq!(delta.modified, vec!["go.sum"]);
        assert_eq!(delta.changed().count(), 2);
    }
}
