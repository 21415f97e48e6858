use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use theme_core::AssetSummary;

use super::file::FileEntry;

/// Last-known remote checksum per asset key, shared by every worker.
#[derive(Debug, Default)]
pub struct ChecksumRegistry {
    inner: Mutex<HashMap<String, String>>,
}

impl ChecksumRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges descriptors into the map; the last descriptor for a key wins. Descriptors without
    /// a checksum are skipped.
    pub fn update<'a, I>(&self, descriptors: I)
    where
        I: IntoIterator<Item = &'a AssetSummary>,
    {
        let mut map = self.lock();
        for descriptor in descriptors {
            if let Some(checksum) = &descriptor.checksum {
                map.insert(descriptor.key.clone(), checksum.clone());
            }
        }
    }

    /// Replaces the whole map with the given listing.
    pub fn replace<'a, I>(&self, descriptors: I)
    where
        I: IntoIterator<Item = &'a AssetSummary>,
    {
        let fresh: HashMap<String, String> = descriptors
            .into_iter()
            .filter_map(|d| d.checksum.clone().map(|checksum| (d.key.clone(), checksum)))
            .collect();
        *self.lock() = fresh;
    }

    pub fn insert(&self, key: impl Into<String>, checksum: impl Into<String>) {
        self.lock().insert(key.into(), checksum.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.lock().remove(key)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, file: &FileEntry) -> bool {
        self.lock().contains_key(file.relative_path())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // The map stays consistent even if a holder panicked mid-insert.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(key: &str, checksum: Option<&str>) -> AssetSummary {
        AssetSummary {
            key: key.to_string(),
            checksum: checksum.map(str::to_string),
            content_type: None,
            size: None,
        }
    }

    #[test]
    fn update_merges_and_last_write_wins() {
        let registry = ChecksumRegistry::new();
        registry.insert("assets/a.css", "old");
        registry.update(&[
            summary("assets/a.css", Some("first")),
            summary("layout/theme.liquid", Some("t")),
            summary("assets/a.css", Some("second")),
        ]);

        assert_eq!(registry.get("assets/a.css").as_deref(), Some("second"));
        assert_eq!(registry.get("layout/theme.liquid").as_deref(), Some("t"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn replace_drops_keys_missing_from_listing() {
        let registry = ChecksumRegistry::new();
        registry.insert("assets/gone.js", "x");
        registry.replace(&[summary("assets/kept.js", Some("y"))]);

        assert_eq!(registry.get("assets/gone.js"), None);
        assert_eq!(registry.get("assets/kept.js").as_deref(), Some("y"));
    }

    #[test]
    fn descriptors_without_checksum_are_skipped() {
        let registry = ChecksumRegistry::new();
        registry.update(&[summary("assets/folder", None)]);
        assert!(registry.is_empty());
    }

    #[test]
    fn contains_matches_by_relative_path() {
        let registry = ChecksumRegistry::new();
        registry.insert("snippets/card.liquid", "abc");

        assert!(registry.contains(&FileEntry::new("/x/snippets/card.liquid", "/x")));
        assert!(!registry.contains(&FileEntry::new("/x/snippets/other.liquid", "/x")));

        assert_eq!(registry.remove("snippets/card.liquid").as_deref(), Some("abc"));
        assert!(!registry.contains(&FileEntry::new("/x/snippets/card.liquid", "/x")));
    }

    #[test]
    fn keys_are_sorted() {
        let registry = ChecksumRegistry::new();
        registry.insert("b", "1");
        registry.insert("a", "2");
        assert_eq!(registry.keys(), vec!["a".to_string(), "b".to_string()]);
    }
}
