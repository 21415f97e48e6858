use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Component, Path, PathBuf};

const TEXT_EXTENSIONS: &[&str] = &[
    "liquid", "json", "js", "css", "scss", "svg", "txt", "html", "md", "xml", "csv",
];

/// A local theme file addressed by its key relative to the project root.
///
/// Two entries are equal when their keys are equal, whatever roots they were built from.
#[derive(Debug, Clone)]
pub struct FileEntry {
    path: PathBuf,
    relative_path: String,
}

impl FileEntry {
    pub fn new(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Self {
        let path = absolute(path.as_ref());
        let root = absolute(root.as_ref());
        let relative_path = match path.strip_prefix(&root) {
            Ok(relative) => asset_key(relative),
            Err(_) => path.to_string_lossy().replace('\\', "/"),
        };
        Self {
            path,
            relative_path,
        }
    }

    /// Like [`FileEntry::new`], but `None` when the normalized path is the root itself or
    /// lies outside it.
    pub fn under_root(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Option<Self> {
        let path = absolute(path.as_ref());
        let root = absolute(root.as_ref());
        let relative_path = asset_key(path.strip_prefix(&root).ok()?);
        if relative_path.is_empty() {
            return None;
        }
        Some(Self {
            path,
            relative_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remote asset key, always `/`-separated.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .is_ok_and(|metadata| metadata.is_file())
    }

    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    pub async fn read_to_string(&self) -> io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }

    pub async fn write(&self, content: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await
    }

    pub async fn remove(&self) -> io::Result<()> {
        tokio::fs::remove_file(&self.path).await
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }

    pub fn is_text(&self) -> bool {
        self.extension()
            .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn is_json(&self) -> bool {
        self.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    pub fn is_liquid(&self) -> bool {
        self.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("liquid"))
    }

    /// MD5 of the content as the remote store computes it: JSON is re-serialized compactly
    /// first, falling back to the raw bytes when it does not parse.
    pub async fn checksum(&self) -> io::Result<String> {
        let content = self.read().await?;
        Ok(checksum_of(&content, self.is_json()))
    }
}

pub(crate) fn checksum_of(content: &[u8], json: bool) -> String {
    if json
        && let Ok(value) = serde_json::from_slice::<serde_json::Value>(content)
        && let Ok(normalized) = serde_json::to_vec(&value)
    {
        return format!("{:x}", md5::compute(normalized));
    }
    format!("{:x}", md5::compute(content))
}

impl PartialEq for FileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
    }
}

impl Eq for FileEntry {}

impl Hash for FileEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.relative_path.hash(state);
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_path)
    }
}

fn absolute(path: &Path) -> PathBuf {
    let joined = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn asset_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn relative_path_is_computed_against_root() {
        let entry = FileEntry::new("/theme/sections/header.liquid", "/theme");
        assert_eq!(entry.relative_path(), "sections/header.liquid");
        assert_eq!(entry.path(), Path::new("/theme/sections/header.liquid"));
    }

    #[test]
    fn mixed_relative_and_absolute_inputs_agree() {
        let cwd = std::env::current_dir().unwrap();
        let relative = FileEntry::new("theme/assets/app.js", "theme");
        let absolute = FileEntry::new(cwd.join("theme/assets/app.js"), cwd.join("theme"));
        let dotted = FileEntry::new("theme/./snippets/../assets/app.js", "./theme");

        assert_eq!(relative.relative_path(), "assets/app.js");
        assert_eq!(relative, absolute);
        assert_eq!(relative, dotted);
    }

    #[test]
    fn entries_from_different_roots_compare_by_key() {
        let a = FileEntry::new("/one/config/settings_schema.json", "/one");
        let b = FileEntry::new("/two/config/settings_schema.json", "/two");
        assert_eq!(a, b);
        assert_ne!(a, FileEntry::new("/one/config/other.json", "/one"));
    }

    #[test]
    fn under_root_rejects_keys_that_escape() {
        let root = Path::new("/theme");
        let inside = FileEntry::under_root(root.join("snippets/../sections/a.liquid"), root);
        assert_eq!(inside.unwrap().relative_path(), "sections/a.liquid");

        assert!(FileEntry::under_root(root.join("snippets/../../escaped.liquid"), root).is_none());
        assert!(FileEntry::under_root(root.join("/etc/passwd"), root).is_none());
        assert!(FileEntry::under_root(root.join(".."), root).is_none());
        assert!(FileEntry::under_root(root, root).is_none());
    }

    #[tokio::test]
    async fn write_creates_parents_and_remove_deletes() {
        let dir = tempdir().unwrap();
        let entry = FileEntry::new(dir.path().join("templates/customers/login.json"), dir.path());
        assert!(!entry.exists().await);

        entry.write(b"{}").await.unwrap();
        assert!(entry.exists().await);
        assert_eq!(entry.read_to_string().await.unwrap(), "{}");

        entry.remove().await.unwrap();
        assert!(!entry.exists().await);
    }

    #[test]
    fn classifies_by_extension() {
        let liquid = FileEntry::new("/t/assets/theme.css.liquid", "/t");
        assert!(liquid.is_text());
        assert!(liquid.is_liquid());
        assert!(!liquid.is_json());

        let json = FileEntry::new("/t/locales/en.default.json", "/t");
        assert!(json.is_text());
        assert!(json.is_json());

        let image = FileEntry::new("/t/assets/logo.PNG", "/t");
        assert!(!image.is_text());
    }

    #[tokio::test]
    async fn checksum_is_md5_of_raw_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snippets/a.liquid");
        let entry = FileEntry::new(&path, dir.path());
        entry.write(b"hello").await.unwrap();

        assert_eq!(
            entry.checksum().await.unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[tokio::test]
    async fn json_checksum_ignores_formatting_but_keeps_key_order() {
        let dir = tempdir().unwrap();
        let pretty = FileEntry::new(dir.path().join("config/a.json"), dir.path());
        let compact = FileEntry::new(dir.path().join("config/b.json"), dir.path());
        pretty.write(b"{\n  \"b\": 1,\n  \"a\": [1, 2]\n}\n").await.unwrap();
        compact.write(b"{\"b\":1,\"a\":[1,2]}").await.unwrap();

        assert_eq!(pretty.checksum().await.unwrap(), compact.checksum().await.unwrap());
        assert_eq!(
            compact.checksum().await.unwrap(),
            format!("{:x}", md5::compute(b"{\"b\":1,\"a\":[1,2]}"))
        );
    }

    #[tokio::test]
    async fn invalid_json_falls_back_to_raw_bytes() {
        let dir = tempdir().unwrap();
        let entry = FileEntry::new(dir.path().join("templates/index.json"), dir.path());
        entry.write(b"{ not json").await.unwrap();

        assert_eq!(
            entry.checksum().await.unwrap(),
            format!("{:x}", md5::compute(b"{ not json"))
        );
    }
}
