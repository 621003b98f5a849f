/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Process-global cache of per-collection property indexes, keyed by the
//! ctag (tree identity) the index was computed against. Entries are
//! immutable once stored: a write produces a new tree and therefore a new
//! key, so stale reads are impossible by construction.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;

pub type IndexKey = String;

/// Values recorded for one member: index key to the raw property values
/// seen under that key. A key that is present with no values means the
/// property path exists but carries no text.
pub type IndexValues = AHashMap<IndexKey, Vec<String>>;

/// The index of one collection snapshot.
pub struct IndexEntry {
    /// The key set this index covers; a filter needing keys outside this
    /// set cannot be decided from the index.
    pub keys: Vec<IndexKey>,
    /// Member name to recorded values.
    pub members: AHashMap<String, IndexValues>,
}

struct Inner {
    entries: AHashMap<String, Arc<IndexEntry>>,
    order: VecDeque<String>,
}

/// LRU-bounded cache of [`IndexEntry`] by ctag.
pub struct IndexCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl IndexCache {
    pub fn new(capacity: usize) -> Self {
        IndexCache {
            inner: Mutex::new(Inner {
                entries: AHashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, ctag: &str) -> Option<Arc<IndexEntry>> {
        let mut inner = self.inner.lock().expect("index cache poisoned");
        let entry = inner.entries.get(ctag).cloned()?;
        if let Some(pos) = inner.order.iter().position(|key| key == ctag) {
            inner.order.remove(pos);
            inner.order.push_back(ctag.to_string());
        }
        Some(entry)
    }

    pub fn insert(&self, ctag: String, entry: IndexEntry) -> Arc<IndexEntry> {
        let entry = Arc::new(entry);
        let mut inner = self.inner.lock().expect("index cache poisoned");
        if inner.entries.insert(ctag.clone(), entry.clone()).is_none() {
            inner.order.push_back(ctag);
        }
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(keys: &[&str]) -> IndexEntry {
        IndexEntry {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            members: AHashMap::new(),
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = IndexCache::new(2);
        cache.insert("t1".to_string(), entry(&["P=UID"]));
        cache.insert("t2".to_string(), entry(&["P=UID"]));

        // Touch t1 so t2 becomes the eviction candidate.
        assert!(cache.get("t1").is_some());
        cache.insert("t3".to_string(), entry(&["P=UID"]));

        assert!(cache.get("t1").is_some());
        assert!(cache.get("t2").is_none());
        assert!(cache.get("t3").is_some());
    }
}
