use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};

pub const THREAD_LISTS_TAG: &str = "threads";

pub fn thread_tag(thread_id: uuid::Uuid) -> String {
    format!("thread:{}", thread_id)
}

/// Read-path cache for serialized response payloads.
///
/// Entries are served for at most the configured TTL after they were
/// stored; an expired entry is dropped on the read that finds it. Each
/// entry is filed under one or more tags so writers can evict every
/// payload derived from the data they touched. Each tag also carries an
/// epoch that invalidation bumps; an entry stored against an older epoch is
/// never served, even if it reached the map after the invalidation ran.
pub trait ResponseCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: String, value: Value, tags: &[String]);
    fn invalidate_tag(&self, tag: &str);
    fn clear(&self);
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    tags: Vec<(String, u64)>,
}

pub struct MemoryResponseCache {
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
    tag_index: DashMap<String, HashSet<String>>,
    epochs: DashMap<String, u64>,
}

impl MemoryResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            tag_index: DashMap::new(),
            epochs: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        {
            let entry = self.entries.get(key)?;
            let current = entry
                .tags
                .iter()
                .all(|(tag, epoch)| self.epoch(tag) == *epoch);
            if current && now.saturating_duration_since(entry.stored_at) < self.ttl {
                return Some(entry.value.clone());
            }
        }
        self.remove_key(key);
        None
    }

    fn epoch(&self, tag: &str) -> u64 {
        self.epochs.get(tag).map(|epoch| *epoch).unwrap_or(0)
    }

    fn tag_epochs(&self, tags: &[String]) -> Vec<(String, u64)> {
        tags.iter().map(|tag| (tag.clone(), self.epoch(tag))).collect()
    }

    fn put_at(&self, key: String, value: Value, tags: &[String], now: Instant) {
        let tags = self.tag_epochs(tags);
        self.store(key, value, tags, now);
    }

    fn store(&self, key: String, value: Value, tags: Vec<(String, u64)>, now: Instant) {
        self.remove_key(&key);
        for (tag, _) in &tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                tags,
            },
        );
    }

    fn remove_key(&self, key: &str) {
        let Some((_, entry)) = self.entries.remove(key) else {
            return;
        };
        for (tag, _) in entry.tags {
            let now_empty = match self.tag_index.get_mut(&tag) {
                Some(mut keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.tag_index.remove_if(&tag, |_, keys| keys.is_empty());
            }
        }
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    fn put(&self, key: String, value: Value, tags: &[String]) {
        self.put_at(key, value, tags, Instant::now());
    }

    fn invalidate_tag(&self, tag: &str) {
        *self.epochs.entry(tag.to_string()).or_insert(0) += 1;
        let Some((_, keys)) = self.tag_index.remove(tag) else {
            return;
        };
        for key in keys {
            self.remove_key(&key);
        }
    }

    fn clear(&self) {
        self.entries.clear();
        self.tag_index.clear();
    }
}
