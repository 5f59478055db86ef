//! # Descriptor store: in-memory catalog of discovered modules.
//!
//! Keeps descriptors in discovery order. Each qualified name has one *primary*
//! entry (reachable by name); descriptors that lost a duplicate tie-break are
//! kept for reporting but are not addressable.

use std::collections::HashMap;

use super::descriptor::{ModuleDescriptor, ModuleState};

#[derive(Debug, Default)]
pub struct DescriptorStore {
    entries: Vec<ModuleDescriptor>,
    index: HashMap<String, usize>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a descriptor. Returns `false` if the name already had a primary
    /// entry, in which case the new one is stored as a non-addressable duplicate.
    pub fn insert(&mut self, desc: ModuleDescriptor) -> bool {
        let pos = self.entries.len();
        let fresh = !self.index.contains_key(desc.qualified_name());
        if fresh {
            self.index.insert(desc.qualified_name().to_string(), pos);
        }
        self.entries.push(desc);
        fresh
    }

    /// Replaces the primary entry with the same name. Returns `false` if unknown.
    pub fn update(&mut self, desc: ModuleDescriptor) -> bool {
        match self.index.get(desc.qualified_name()) {
            Some(&pos) => {
                self.entries[pos] = desc;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.index.get(name).map(|&pos| &self.entries[pos])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModuleDescriptor> {
        self.index.get(name).map(|&pos| &mut self.entries[pos])
    }

    /// Forgets the primary entry for `name`.
    pub fn remove(&mut self, name: &str) -> Option<ModuleDescriptor> {
        let pos = self.index.remove(name)?;
        let removed = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// All descriptors in discovery order, duplicates included.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.iter()
    }

    /// Point-in-time copy.
    pub fn snapshot(&self) -> Vec<ModuleDescriptor> {
        self.entries.clone()
    }

    /// Primary entries currently in `state`.
    pub fn names_in(&self, state: ModuleState) -> Vec<String> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(pos, d)| d.state() == state && self.index.get(d.qualified_name()) == Some(pos))
            .map(|(_, d)| d.qualified_name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_kept_but_not_addressable() {
        let mut store = DescriptorStore::new();
        assert!(store.insert(ModuleDescriptor::new("a/x.rs", "x", 1)));
        assert!(!store.insert(ModuleDescriptor::new("b/x.rs", "x", 1)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("x").map(|d| d.path().to_path_buf()), Some("a/x.rs".into()));
    }

    #[test]
    fn remove_reindexes_following_entries() {
        let mut store = DescriptorStore::new();
        store.insert(ModuleDescriptor::new("a.rs", "a", 0));
        store.insert(ModuleDescriptor::new("b.rs", "b", 0));
        store.insert(ModuleDescriptor::new("c.rs", "c", 0));

        assert!(store.remove("a").is_some());
        assert!(store.get("a").is_none());
        assert_eq!(store.get("c").map(|d| d.qualified_name()), Some("c"));
        assert_eq!(store.names_in(ModuleState::Discovered), vec!["b", "c"]);
    }
}
