use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use super::ProjectError;
use crate::sync::file::FileEntry;

pub const IGNORE_FILE_NAME: &str = ".shopifyignore";

const DEFAULT_PATTERNS: &[&str] = &[".DS_Store", "*.swp", "*~", ".gitkeep"];

/// Glob-based ignore predicate over asset keys.
///
/// A pattern containing `/` is matched against the whole key (`config/*.json`); a pattern
/// without one also matches the file name anywhere in the tree (`*.swp`). A trailing `/`
/// ignores everything below a directory.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    keys: GlobSet,
    names: GlobSet,
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self {
            keys: GlobSet::empty(),
            names: GlobSet::empty(),
        }
    }
}

impl IgnoreFilter {
    pub fn new<I, S>(patterns: I) -> Result<Self, ProjectError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys = GlobSetBuilder::new();
        let mut names = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            let pattern = pattern.trim_start_matches('/');
            if let Some(dir) = pattern.strip_suffix('/') {
                keys.add(glob(&format!("{dir}/**"))?);
            } else if pattern.contains('/') {
                keys.add(glob(pattern)?);
            } else {
                keys.add(glob(pattern)?);
                names.add(glob(pattern)?);
            }
        }
        Ok(Self {
            keys: keys.build().map_err(ProjectError::Ignore)?,
            names: names.build().map_err(ProjectError::Ignore)?,
        })
    }

    /// Built-in patterns plus the project's ignore file, when there is one.
    pub fn from_root(root: &Path) -> Result<Self, ProjectError> {
        let path = root.join(IGNORE_FILE_NAME);
        let custom = if path.is_file() {
            std::fs::read_to_string(&path)?
        } else {
            String::new()
        };
        Self::new(DEFAULT_PATTERNS.iter().copied().chain(custom.lines()))
    }

    pub fn is_ignored(&self, file: &FileEntry) -> bool {
        self.matches_key(file.relative_path())
    }

    pub fn matches_key(&self, key: &str) -> bool {
        if self.keys.is_match(key) {
            return true;
        }
        let name = key.rsplit('/').next().unwrap_or(key);
        self.names.is_match(name)
    }
}

fn glob(pattern: &str) -> Result<Glob, ProjectError> {
    Glob::new(pattern).map_err(ProjectError::Ignore)
}
