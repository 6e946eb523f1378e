// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Time-bounded in-memory caches with an injectable clock.
//
// Used for the pipeline's in-flight path set, the companion address cache,
// and the verified IPP endpoint paths.  Entries expire on read; nothing runs
// in the background.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Source of monotonic time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.  Intended for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Map whose entries expire `ttl` after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, (V, Instant)>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace, restarting the entry's lifetime.
    pub fn insert(&self, key: K, value: V) {
        let expires = self.clock.now() + self.ttl;
        self.lock().insert(key, (value, expires));
    }

    /// Insert only when no live entry exists.  Returns `true` if this call
    /// took the slot.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let now = self.clock.now();
        let mut entries = self.lock();
        if let Some((_, expires)) = entries.get(&key) {
            if *expires > now {
                return false;
            }
        }
        entries.insert(key, (value, now + self.ttl));
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key).map(|(value, _)| value)
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        before - entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock().values().filter(|(_, expires)| *expires > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, (V, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> (TtlCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock(Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn entries_expire_after_ttl() {
        let (cache, clock) = cache(60);
        cache.insert("a".into(), 1);
        assert_eq!(cache.get(&"a".into()), Some(1));

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"a".into()), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a".into()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_if_absent_claims_once() {
        let (cache, clock) = cache(10);
        assert!(cache.insert_if_absent("path".into(), 0));
        assert!(!cache.insert_if_absent("path".into(), 0));

        // An expired claim can be taken again.
        clock.advance(Duration::from_secs(11));
        assert!(cache.insert_if_absent("path".into(), 0));
    }

    #[test]
    fn remove_releases_claim() {
        let (cache, _clock) = cache(10);
        assert!(cache.insert_if_absent("path".into(), 0));
        cache.remove(&"path".into());
        assert!(cache.insert_if_absent("path".into(), 0));
    }

    #[test]
    fn purge_counts_expired_entries() {
        let (cache, clock) = cache(5);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        clock.advance(Duration::from_secs(3));
        cache.insert("c".into(), 3);
        clock.advance(Duration::from_secs(3));
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }
}
