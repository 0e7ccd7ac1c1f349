//! Process-local schema IDs
//!
//! IDs are handed out sequentially from 1 and never reused within a process.
//! They are not persisted.

use std::collections::HashMap;

/// Bidirectional name <-> ID map
#[derive(Debug)]
pub struct SchemaIdMap {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
    next_id: u32,
}

impl SchemaIdMap {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_id: HashMap::new(),
            next_id: 1,
        }
    }

    /// Assign IDs to `names` in iteration order
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut map = Self::new();
        for name in names {
            map.assign(name);
        }
        map
    }

    /// ID for `name`, allocating the next one if it has none yet
    pub fn assign(&mut self, name: impl Into<String>) -> u32 {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_id.insert(id, name.clone());
        self.by_name.insert(name, id);
        id
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All assignments, ordered by ID
    pub fn entries(&self) -> Vec<(u32, String)> {
        let mut entries: Vec<_> =
            self.by_id.iter().map(|(id, name)| (*id, name.clone())).collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }
}

impl Default for SchemaIdMap {
    fn default() -> Self {
        Self::new()
    }
}
