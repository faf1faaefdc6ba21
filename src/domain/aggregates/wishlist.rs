//! Wishlist Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::LineKey;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    #[serde(default)]
    entries: Vec<WishlistEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEntry {
    #[serde(flatten)]
    pub key: LineKey,
    pub added_at: DateTime<Utc>,
}

impl Wishlist {
    pub fn new() -> Self { Self::default() }

    pub fn from_entries(entries: impl IntoIterator<Item = WishlistEntry>) -> Self {
        let mut list = Self::new();
        for entry in entries {
            if !list.contains(&entry.key) { list.entries.push(entry); }
        }
        list
    }

    pub fn entries(&self) -> &[WishlistEntry] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn contains(&self, key: &LineKey) -> bool { self.entries.iter().any(|e| &e.key == key) }

    /// Adding a present entry keeps its first `added_at`; returns true if new.
    pub fn add(&mut self, key: LineKey) -> bool {
        if self.contains(&key) { return false; }
        self.entries.push(WishlistEntry { key, added_at: Utc::now() });
        true
    }

    pub fn remove(&mut self, key: &LineKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.key != key);
        self.entries.len() != before
    }

    /// Flips presence and returns whether the entry is present afterwards.
    pub fn toggle(&mut self, key: LineKey) -> bool {
        if self.remove(&key) { false } else { self.add(key) }
    }

    pub fn clear(&mut self) { self.entries.clear(); }
}
