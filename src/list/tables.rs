//! Case-insensitive host sets and key/value tables

use ahash::{AHashMap, AHashSet};

/// Set of hosts or domains, compared without regard to ASCII case
#[derive(Debug, Clone, Default)]
pub struct HostSet {
    hosts: AHashSet<String>,
}

impl HostSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a host; returns false if it was already present
    pub fn insert(&mut self, host: &str) -> bool {
        self.hosts.insert(host.to_ascii_lowercase())
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(&host.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }
}

/// Key/value table with case-insensitive keys
///
/// Inserting an existing key replaces its value.
#[derive(Debug, Clone, Default)]
pub struct KvTable {
    entries: AHashMap<String, String>,
}

impl KvTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) -> Option<String> {
        self.entries
            .insert(key.to_ascii_lowercase(), value.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_case_insensitive() {
        let mut hosts = HostSet::new();
        assert!(hosts.insert("Example.COM"));
        assert!(!hosts.insert("example.com"));

        assert!(hosts.contains("EXAMPLE.com"));
        assert!(!hosts.contains("example.org"));
        assert_eq!(hosts.len(), 1);
    }

    #[test]
    fn test_kv_replace() {
        let mut table = KvTable::new();
        assert!(table.insert("User", "alice").is_none());
        assert_eq!(table.insert("user", "bob"), Some("alice".to_string()));

        assert_eq!(table.get("USER"), Some("bob"));
        assert_eq!(table.len(), 1);
        assert!(table.get("nobody").is_none());
    }
}
