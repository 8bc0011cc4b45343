//! Window store: where buckets live between requests.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::bucket::Bucket;

/// Storage for admission buckets.
///
/// The in-memory map is the only implementation shipped here. A shared
/// cache client can implement this trait to enforce quotas across
/// instances without touching the evaluator.
pub trait WindowStore: Send + Sync {
    /// Current bucket for `key`, expired or not.
    fn get(&self, key: &str) -> Option<Bucket>;

    /// Insert or replace the bucket stored under its own key.
    fn upsert(&self, bucket: Bucket);

    /// Atomically read, transform and write back the bucket for `key`.
    ///
    /// `f` runs while the key is locked, so two concurrent updates to the
    /// same key never observe the same prior state.
    fn update(&self, key: &str, f: &mut dyn FnMut(Option<Bucket>) -> Bucket) -> Bucket;

    /// Remove every bucket that is reclaimable at `now`. Returns how many
    /// were removed.
    ///
    /// Buckets carrying a violation streak outlive their window so the
    /// streak survives until the caller's next request.
    fn sweep(&self, now: i64) -> usize;

    /// Number of stored buckets, expired ones included.
    fn len(&self) -> usize;

    /// Whether the store holds no buckets.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every bucket.
    fn clear(&self);
}

/// Process-local store sharded by key hash.
///
/// Each shard has its own lock; `update` holds the shard lock for the
/// duration of the read-modify-write.
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    buckets: DashMap<String, Bucket>,
}

impl InMemoryWindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store sized for roughly `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: DashMap::with_capacity(capacity),
        }
    }
}

impl WindowStore for InMemoryWindowStore {
    fn get(&self, key: &str) -> Option<Bucket> {
        self.buckets.get(key).map(|b| b.clone())
    }

    fn upsert(&self, bucket: Bucket) {
        self.buckets.insert(bucket.key.clone(), bucket);
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<Bucket>) -> Bucket) -> Bucket {
        match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let next = f(Some(entry.get().clone()));
                *entry.get_mut() = next.clone();
                next
            }
            Entry::Vacant(entry) => {
                let next = f(None);
                entry.insert(next.clone());
                next
            }
        }
    }

    fn sweep(&self, now: i64) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let keep = !bucket.is_reclaimable(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn clear(&self) {
        self.buckets.clear();
    }
}
