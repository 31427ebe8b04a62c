// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, btree_map};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace of persisted key material.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Pairwise ratchet sessions, keyed by protocol address.
    Session,

    /// Group sender-key records, keyed by sender-key name.
    SenderKey,

    /// One-time pre-keys, keyed by their numeric id.
    PreKey,

    /// Forward and reverse mappings between phone-number and linked-identifier users.
    LidMapping,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Session => "session",
            Category::SenderKey => "sender-key",
            Category::PreKey => "pre-key",
            Category::LidMapping => "lid-mapping",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of writes to apply to a key store.
///
/// A `None` value marks the entry for removal. Later writes to the same id replace earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyPatch(BTreeMap<Category, BTreeMap<String, Option<Vec<u8>>>>);

impl KeyPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `id`.
    pub fn insert(&mut self, category: Category, id: impl Into<String>, value: Vec<u8>) {
        self.0
            .entry(category)
            .or_default()
            .insert(id.into(), Some(value));
    }

    /// Removes whatever is stored under `id`.
    pub fn remove(&mut self, category: Category, id: impl Into<String>) {
        self.0.entry(category).or_default().insert(id.into(), None);
    }

    /// Applies all writes of `other` on top of this patch.
    pub fn merge(&mut self, other: KeyPatch) {
        for (category, writes) in other.0 {
            self.0.entry(category).or_default().extend(writes);
        }
    }

    /// Number of entries touched by this patch.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, category: Category, id: &str) -> Option<&Option<Vec<u8>>> {
        self.0.get(&category).and_then(|writes| writes.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &str, Option<&[u8]>)> {
        self.0.iter().flat_map(|(category, writes)| {
            writes
                .iter()
                .map(move |(id, value)| (*category, id.as_str(), value.as_deref()))
        })
    }
}

impl IntoIterator for KeyPatch {
    type Item = (Category, BTreeMap<String, Option<Vec<u8>>>);

    type IntoIter = btree_map::IntoIter<Category, BTreeMap<String, Option<Vec<u8>>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, KeyPatch};

    #[test]
    fn later_writes_win() {
        let mut patch = KeyPatch::new();
        patch.insert(Category::Session, "alice.1", vec![1]);
        patch.insert(Category::PreKey, "7", vec![7]);

        let mut other = KeyPatch::new();
        other.remove(Category::Session, "alice.1");
        other.insert(Category::Session, "bob.0", vec![2]);

        patch.merge(other);

        assert_eq!(patch.len(), 3);
        assert_eq!(patch.get(Category::Session, "alice.1"), Some(&None));
        assert_eq!(patch.get(Category::Session, "bob.0"), Some(&Some(vec![2])));
        assert_eq!(patch.get(Category::PreKey, "7"), Some(&Some(vec![7])));
    }

    #[test]
    fn category_names() {
        assert_eq!(Category::Session.to_string(), "session");
        assert_eq!(Category::SenderKey.to_string(), "sender-key");
        assert_eq!(Category::PreKey.to_string(), "pre-key");
        assert_eq!(Category::LidMapping.to_string(), "lid-mapping");
    }
}
