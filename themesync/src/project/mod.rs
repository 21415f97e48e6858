pub mod ignore;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::sync::file::FileEntry;
pub use ignore::IgnoreFilter;

/// Top-level directories of a theme; anything else under the root is not synced.
pub const THEME_DIRS: &[&str] = &[
    "assets",
    "blocks",
    "config",
    "layout",
    "locales",
    "sections",
    "snippets",
    "templates",
];

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to walk theme directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("invalid ignore pattern: {0}")]
    Ignore(#[source] globset::Error),
}

/// Local theme checkout: enumerates files by category and answers the ignore predicate.
#[derive(Debug, Clone)]
pub struct ThemeProject {
    root: PathBuf,
    ignore: IgnoreFilter,
}

impl ThemeProject {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let root = root.into();
        let ignore = IgnoreFilter::from_root(&root)?;
        Ok(Self { root, ignore })
    }

    pub fn with_ignore(root: impl Into<PathBuf>, ignore: IgnoreFilter) -> Self {
        Self {
            root: root.into(),
            ignore,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry for an asset key, whether or not it exists locally. `None` when the key does not
    /// resolve to a path inside the root (`..` segments, absolute keys).
    pub fn file(&self, key: &str) -> Option<FileEntry> {
        FileEntry::under_root(self.root.join(key), &self.root)
    }

    pub fn is_ignored(&self, file: &FileEntry) -> bool {
        self.ignore.is_ignored(file)
    }

    /// Liquid templates, including `assets/*.liquid` which the store renders too.
    pub fn liquid_files(&self) -> Result<Vec<FileEntry>, ProjectError> {
        Ok(self
            .all_files()?
            .into_iter()
            .filter(FileEntry::is_liquid)
            .collect())
    }

    pub fn json_files(&self) -> Result<Vec<FileEntry>, ProjectError> {
        Ok(self
            .all_files()?
            .into_iter()
            .filter(|file| file.is_json() && !is_asset(file))
            .collect())
    }

    /// Static files under `assets/`, served as-is.
    pub fn asset_files(&self) -> Result<Vec<FileEntry>, ProjectError> {
        Ok(self
            .all_files()?
            .into_iter()
            .filter(|file| is_asset(file) && !file.is_liquid())
            .collect())
    }

    pub fn all_files(&self) -> Result<Vec<FileEntry>, ProjectError> {
        let mut files = Vec::new();
        for dir in THEME_DIRS {
            let dir = self.root.join(dir);
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&dir).follow_links(false).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() {
                    files.push(FileEntry::new(entry.path(), &self.root));
                }
            }
        }
        Ok(files)
    }
}

fn is_asset(file: &FileEntry) -> bool {
    file.relative_path().starts_with("assets/")
}
