//! Bookkeeping for the sandbox's file selection.
//!
//! The config tracks which files of the artifact's working set belong in the
//! sandbox. `include`/`exclude`/`only` move files between the two sets by
//! glob pattern; `require` marks files as mandatory and records the ones
//! that are absent; `download` queues a deferred fetch. The config never
//! touches the filesystem beyond reading directory listings; applying the
//! selection is [`SandboxDir`](crate::sandbox::dir::SandboxDir)'s job.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{HarnessError, Result};

/// Cap on the snapshot size; a working set past this is a configuration
/// error, not something to copy around.
pub const DEFAULT_FILE_LIMIT: usize = 10_000;

/// A deferred fetch: `source` is resolved into `dest` (relative to the
/// sandbox directory) the first time the sandbox is synchronized after the
/// download call, at most once per distinct source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadSpec {
    pub dest: PathBuf,
    pub source: String,
}

/// The sandbox's live file selection.
#[derive(Debug, Default)]
pub struct SandboxConfig {
    included: BTreeSet<PathBuf>,
    excluded: BTreeSet<PathBuf>,
    missing_required: Vec<PathBuf>,
    downloads: Vec<DownloadSpec>,
    file_limit: usize,
}

impl SandboxConfig {
    /// Snapshot the working set under `root`: every file is included.
    pub fn snapshot(root: &Path) -> Result<Self> {
        Self::snapshot_with_limit(root, DEFAULT_FILE_LIMIT)
    }

    pub fn snapshot_with_limit(root: &Path, file_limit: usize) -> Result<Self> {
        let mut config = SandboxConfig {
            file_limit,
            ..Default::default()
        };
        config.included = walk_files(root, file_limit)?.into_iter().collect();
        Ok(config)
    }

    /// Files currently selected into the sandbox, relative to the root.
    pub fn included(&self) -> &BTreeSet<PathBuf> {
        &self.included
    }

    pub fn excluded(&self) -> &BTreeSet<PathBuf> {
        &self.excluded
    }

    /// Paths declared mandatory but absent, in declaration order.
    pub fn missing_required(&self) -> &[PathBuf] {
        &self.missing_required
    }

    pub fn downloads(&self) -> &[DownloadSpec] {
        &self.downloads
    }

    /// Add every file under `root` matching one of `patterns` to the
    /// selection, removing it from the excluded set if present.
    pub fn include(&mut self, root: &Path, patterns: &[&str]) -> Result<()> {
        let matched = self.expand(root, patterns)?;
        for path in matched {
            self.excluded.remove(&path);
            self.included.insert(path);
        }
        Ok(())
    }

    /// Remove every matching file from the selection.
    pub fn exclude(&mut self, root: &Path, patterns: &[&str]) -> Result<()> {
        let matched = self.expand(root, patterns)?;
        for path in matched {
            self.included.remove(&path);
            self.excluded.insert(path);
        }
        Ok(())
    }

    /// Keep exactly the matching files; everything else known to the config
    /// moves to the excluded set.
    pub fn only(&mut self, root: &Path, patterns: &[&str]) -> Result<()> {
        let matched = self.expand(root, patterns)?;
        let mut all: BTreeSet<PathBuf> = self.included.iter().cloned().collect();
        all.extend(self.excluded.iter().cloned());
        self.excluded = all.difference(&matched).cloned().collect();
        self.included = matched;
        Ok(())
    }

    /// Declare literal paths mandatory. Present paths are (re)included;
    /// absent ones are recorded so the run can fail naming all of them.
    /// Returns the paths found missing by this call.
    pub fn require(&mut self, root: &Path, paths: &[&str]) -> Vec<PathBuf> {
        let mut newly_missing = Vec::new();
        for path in paths {
            let relative = PathBuf::from(path);
            if root.join(&relative).is_file() {
                self.excluded.remove(&relative);
                self.included.insert(relative);
            } else {
                newly_missing.push(relative.clone());
                self.missing_required.push(relative);
            }
        }
        newly_missing
    }

    /// Queue a deferred fetch of `source` into `dest`.
    pub fn download(&mut self, dest: impl Into<PathBuf>, source: impl Into<String>) {
        self.downloads.push(DownloadSpec {
            dest: dest.into(),
            source: source.into(),
        });
    }

    fn expand(&self, root: &Path, patterns: &[&str]) -> Result<BTreeSet<PathBuf>> {
        let limit = if self.file_limit == 0 {
            DEFAULT_FILE_LIMIT
        } else {
            self.file_limit
        };
        let glob_set = build_glob_set(root, patterns)?;
        let files = walk_files(root, limit)?;
        Ok(files
            .into_iter()
            .filter(|path| glob_set.is_match(path))
            .collect())
    }
}

/// Compile `patterns` into a glob set. A pattern with no `/` that starts
/// with `*` also matches recursively; a pattern naming a directory expands
/// to everything under it.
fn build_glob_set(root: &Path, patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut add = |pattern: &str| -> Result<()> {
        let glob = Glob::new(pattern)
            .map_err(|e| HarnessError::Sandbox(format!("bad sandbox pattern '{pattern}': {e}")))?;
        builder.add(glob);
        Ok(())
    };
    for pattern in patterns {
        add(pattern)?;
        if !pattern.contains('/') && pattern.starts_with('*') {
            add(&format!("**/{pattern}"))?;
        }
        if root.join(pattern).is_dir() {
            add(&format!("{}/**", pattern.trim_end_matches('/')))?;
        }
    }
    builder
        .build()
        .map_err(|e| HarnessError::Sandbox(format!("bad sandbox pattern set: {e}")))
}

/// All regular files under `root`, as paths relative to it. Exceeding
/// `limit` files is a configuration error.
fn walk_files(root: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| {
            HarnessError::Sandbox(format!("cannot list {}: {e}", dir.display()))
        })?;
        for entry in entries {
            let entry = entry
                .map_err(|e| HarnessError::Sandbox(format!("cannot list {}: {e}", dir.display())))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| {
                HarnessError::Sandbox(format!("cannot stat {}: {e}", path.display()))
            })?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                if files.len() >= limit {
                    return Err(HarnessError::Config(format!(
                        "working set under {} exceeds the {limit}-file sandbox limit",
                        root.display()
                    )));
                }
                let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                files.push(relative);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn working_set(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            writeln!(File::create(&path).unwrap(), "{file}").unwrap();
        }
        dir
    }

    fn names(set: &BTreeSet<PathBuf>) -> Vec<String> {
        set.iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_snapshot_includes_every_file() {
        let dir = working_set(&["a.txt", "b.txt", "sub/c.txt"]);
        let config = SandboxConfig::snapshot(dir.path()).unwrap();
        assert_eq!(names(config.included()), vec!["a.txt", "b.txt", "sub/c.txt"]);
        assert!(config.excluded().is_empty());
    }

    #[test]
    fn test_exclude_moves_files_out() {
        let dir = working_set(&["a.txt", "b.txt"]);
        let mut config = SandboxConfig::snapshot(dir.path()).unwrap();
        config.exclude(dir.path(), &["b.txt"]).unwrap();
        assert_eq!(names(config.included()), vec!["a.txt"]);
        assert_eq!(names(config.excluded()), vec!["b.txt"]);
    }

    #[test]
    fn test_bare_star_pattern_matches_recursively() {
        let dir = working_set(&["top.txt", "sub/nested.txt", "keep.rs"]);
        let mut config = SandboxConfig::snapshot(dir.path()).unwrap();
        config.exclude(dir.path(), &["*.txt"]).unwrap();
        assert_eq!(names(config.included()), vec!["keep.rs"]);
        assert_eq!(names(config.excluded()), vec!["sub/nested.txt", "top.txt"]);
    }

    #[test]
    fn test_directory_pattern_expands_to_its_files() {
        let dir = working_set(&["a.txt", "data/one.csv", "data/deep/two.csv"]);
        let mut config = SandboxConfig::snapshot(dir.path()).unwrap();
        config.exclude(dir.path(), &["data"]).unwrap();
        assert_eq!(names(config.included()), vec!["a.txt"]);
        assert_eq!(
            names(config.excluded()),
            vec!["data/deep/two.csv", "data/one.csv"]
        );
    }

    #[test]
    fn test_only_keeps_exactly_the_matches() {
        let dir = working_set(&["a.txt", "b.txt", "c.rs"]);
        let mut config = SandboxConfig::snapshot(dir.path()).unwrap();
        config.only(dir.path(), &["a.txt"]).unwrap();
        assert_eq!(names(config.included()), vec!["a.txt"]);
        assert_eq!(names(config.excluded()), vec!["b.txt", "c.rs"]);
    }

    #[test]
    fn test_include_reverses_an_exclude() {
        let dir = working_set(&["a.txt", "b.txt"]);
        let mut config = SandboxConfig::snapshot(dir.path()).unwrap();
        config.exclude(dir.path(), &["*.txt"]).unwrap();
        config.include(dir.path(), &["a.txt"]).unwrap();
        assert_eq!(names(config.included()), vec!["a.txt"]);
        assert_eq!(names(config.excluded()), vec!["b.txt"]);
    }

    #[test]
    fn test_require_records_every_missing_path() {
        let dir = working_set(&["present.txt"]);
        let mut config = SandboxConfig::snapshot(dir.path()).unwrap();
        let missing = config.require(dir.path(), &["ghost-one.txt", "present.txt", "ghost-two.txt"]);
        assert_eq!(missing.len(), 2);
        assert_eq!(
            config.missing_required(),
            &[PathBuf::from("ghost-one.txt"), PathBuf::from("ghost-two.txt")]
        );
    }

    #[test]
    fn test_require_reincludes_an_excluded_file() {
        let dir = working_set(&["data.txt"]);
        let mut config = SandboxConfig::snapshot(dir.path()).unwrap();
        config.exclude(dir.path(), &["data.txt"]).unwrap();
        let missing = config.require(dir.path(), &["data.txt"]);
        assert!(missing.is_empty());
        assert_eq!(names(config.included()), vec!["data.txt"]);
        assert!(config.excluded().is_empty());
    }

    #[test]
    fn test_file_limit_is_a_configuration_error() {
        let dir = working_set(&["a.txt", "b.txt", "c.txt"]);
        let err = SandboxConfig::snapshot_with_limit(dir.path(), 2).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
        assert!(err.to_string().contains("2-file"));
    }

    #[test]
    fn test_downloads_are_queued_in_order() {
        let mut config = SandboxConfig::default();
        config.download("data.csv", "https://example.org/data.csv");
        config.download("words.txt", "https://example.org/words.txt");
        assert_eq!(config.downloads().len(), 2);
        assert_eq!(config.downloads()[0].dest, PathBuf::from("data.csv"));
    }
}
