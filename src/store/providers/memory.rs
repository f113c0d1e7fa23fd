//! In-process key-value store
//!
//! DashMap-backed store for single-process deployments and tests. Expiry is
//! checked on every read, so an expired entry is never observed even if the
//! background sweeper has not run yet. Read-modify-write operations (`incr`,
//! the window batch) run under the shard lock of their key.

use crate::store::errors::{StoreError, StoreResult};
use crate::store::traits::{KeyValueStore, StoreCapabilities, WindowSnapshot};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    /// Kept ordered by (score, member)
    SortedSet(Vec<(f64, String)>),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn text(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value: StoredValue::Text(value),
            expires_at: ttl.and_then(|ttl| expiry_after(Instant::now(), ttl)),
        }
    }

    fn empty_set() -> Self {
        Self {
            value: StoredValue::SortedSet(Vec::new()),
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn type_mismatch(key: &str, expected: &str) -> StoreError {
    StoreError::TypeMismatch(format!("key '{key}' does not hold {expected}"))
}

/// In-memory store with lazy expiry and an optional background sweeper
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store and start sweeping expired entries every `interval`
    ///
    /// Without a tokio runtime no sweeper is started; lazy expiry still holds.
    pub fn with_sweeper(interval: Duration) -> Self {
        let store = Self::new();
        if tokio::runtime::Handle::try_current().is_ok() {
            store.spawn_sweeper(interval);
        } else {
            debug!("No tokio runtime available, memory store sweeper not started");
        }
        store
    }

    /// Spawn the sweeper task; it exits once every handle to the store is gone
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let entries: Weak<DashMap<String, StoredEntry>> = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    debug!("Memory store dropped, sweeper exiting");
                    break;
                };
                let removed = purge(&entries);
                if removed > 0 {
                    debug!(removed = removed, "Swept expired memory store entries");
                }
            }
        })
    }

    /// Remove every expired entry now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    /// Entries currently held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `read` against a live entry; expired entries are removed and
    /// reported as absent
    fn read_live<R>(&self, key: &str, read: impl FnOnce(&StoredEntry) -> R) -> Option<R> {
        let now = Instant::now();
        // The shard guard must be released before removal.
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => return Some(read(entry.value())),
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    /// Run `mutate` against the live sorted set at `key`, creating it when
    /// absent or expired
    fn mutate_set<R>(
        &self,
        key: &str,
        mutate: impl FnOnce(&mut StoredEntry) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = StoredEntry::empty_set();
                }
                if !matches!(entry.value, StoredValue::SortedSet(_)) {
                    return Err(type_mismatch(key, "a sorted set"));
                }
                mutate(entry)
            }
            MapEntry::Vacant(vacant) => {
                let mut entry = StoredEntry::empty_set();
                let result = mutate(&mut entry)?;
                vacant.insert(entry);
                Ok(result)
            }
        }
    }
}

fn purge(entries: &DashMap<String, StoredEntry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before.saturating_sub(entries.len())
}

fn member_order(a: &(f64, String), score: f64, member: &str) -> Ordering {
    a.0.total_cmp(&score).then_with(|| a.1.as_str().cmp(member))
}

fn insert_member(set: &mut Vec<(f64, String)>, score: f64, member: &str) {
    set.retain(|(_, existing)| existing != member);
    let position = set.partition_point(|item| member_order(item, score, member) == Ordering::Less);
    set.insert(position, (score, member.to_string()));
}

/// Expiry deadline; a TTL past the clock's range never expires
fn expiry_after(now: Instant, ttl: Duration) -> Option<Instant> {
    now.checked_add(ttl)
}

fn window_floor(now_ms: u64, window_ms: u64) -> f64 {
    now_ms.saturating_sub(window_ms) as f64
}

fn snapshot_of(set: &[(f64, String)], floor: f64) -> WindowSnapshot {
    let mut inside = set.iter().filter(|(score, _)| *score > floor);
    let oldest_ms = inside.next().map(|(score, _)| *score as u64);
    let count = oldest_ms.map_or(0, |_| 1 + inside.count() as u64);
    WindowSnapshot { count, oldest_ms }
}

/// Redis-style glob matching: `*`, `?` and `\` escapes
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(b'?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some(b'\\') if pattern.get(p + 1) == Some(&text[t]) => {
                p += 2;
                t += 1;
                continue;
            }
            Some(literal) if *literal != b'\\' && *literal == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, matched)) => {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|byte| *byte == b'*')
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.read_live(key, |entry| entry.value.clone()) {
            None => Ok(None),
            Some(StoredValue::Text(value)) => Ok(Some(value)),
            Some(StoredValue::SortedSet(_)) => Err(type_mismatch(key, "a string")),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.entries
            .insert(key.to_string(), StoredEntry::text(value.to_string(), ttl));
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = StoredEntry::text("1".to_string(), None);
                    return Ok(1);
                }
                match &mut entry.value {
                    StoredValue::Text(text) => {
                        let current: i64 = text
                            .parse()
                            .map_err(|_| type_mismatch(key, "an integer"))?;
                        let next = current.checked_add(1).ok_or_else(|| {
                            StoreError::BackendError(format!("increment of '{key}' overflows"))
                        })?;
                        *text = next.to_string();
                        Ok(next)
                    }
                    StoredValue::SortedSet(_) => Err(type_mismatch(key, "an integer")),
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(StoredEntry::text("1".to_string(), None));
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(occupied) if occupied.get().is_expired(now) => {
                occupied.remove();
                Ok(false)
            }
            MapEntry::Occupied(mut occupied) => {
                occupied.get_mut().expires_at = expiry_after(now, ttl);
                Ok(true)
            }
            MapEntry::Vacant(_) => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read_live(key, |_| ()).is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        Ok(self
            .read_live(key, |entry| {
                entry
                    .expires_at
                    .map(|at| at.saturating_duration_since(Instant::now()))
            })
            .flatten())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|item| !item.value().is_expired(now) && glob_match(pattern, item.key()))
            .map(|item| item.key().clone())
            .collect())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<()> {
        self.mutate_set(key, |entry| {
            if let StoredValue::SortedSet(set) = &mut entry.value {
                insert_member(set, score, member);
            }
            Ok(())
        })
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        let now = Instant::now();
        let MapEntry::Occupied(mut occupied) = self.entries.entry(key.to_string()) else {
            return Ok(0);
        };
        if occupied.get().is_expired(now) {
            occupied.remove();
            return Ok(0);
        }
        let StoredValue::SortedSet(set) = &mut occupied.get_mut().value else {
            return Err(type_mismatch(key, "a sorted set"));
        };
        let before = set.len();
        set.retain(|(score, _)| *score < min || *score > max);
        let removed = (before - set.len()) as u64;
        if set.is_empty() {
            occupied.remove();
        }
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.read_live(key, |entry| match &entry.value {
            StoredValue::SortedSet(set) => Ok(set.len() as u64),
            StoredValue::Text(_) => Err(type_mismatch(key, "a sorted set")),
        })
        .unwrap_or(Ok(0))
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<(String, f64)>> {
        self.read_live(key, |entry| match &entry.value {
            StoredValue::SortedSet(set) => {
                let len = set.len() as i64;
                let start = if start < 0 { (start + len).max(0) } else { start };
                let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
                if len == 0 || start > stop || start >= len {
                    return Ok(Vec::new());
                }
                Ok(set[start as usize..=stop as usize]
                    .iter()
                    .map(|(score, member)| (member.clone(), *score))
                    .collect())
            }
            StoredValue::Text(_) => Err(type_mismatch(key, "a sorted set")),
        })
        .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn record_window_hit(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        member: &str,
    ) -> StoreResult<WindowSnapshot> {
        let floor = window_floor(now_ms, window_ms);
        self.mutate_set(key, |entry| {
            let StoredValue::SortedSet(set) = &mut entry.value else {
                return Err(type_mismatch(key, "a sorted set"));
            };
            set.retain(|(score, _)| *score > floor);
            insert_member(set, now_ms as f64, member);
            let snapshot = snapshot_of(set, floor);
            entry.expires_at = expiry_after(Instant::now(), Duration::from_millis(window_ms));
            Ok(snapshot)
        })
    }

    async fn window_snapshot(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> StoreResult<WindowSnapshot> {
        let floor = window_floor(now_ms, window_ms);
        self.read_live(key, |entry| match &entry.value {
            StoredValue::SortedSet(set) => Ok(snapshot_of(set, floor)),
            StoredValue::Text(_) => Err(type_mismatch(key, "a sorted set")),
        })
        .unwrap_or(Ok(WindowSnapshot::default()))
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            ordered_sets: true,
            key_enumeration: true,
            distributed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.exists("k").await.unwrap());
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_absent_without_sweep() {
        let store = MemoryStore::new();
        store
            .set("short", "lived", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(!store.exists("short").await.unwrap());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_preserves_ttl() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert!(store
            .expire("counter", Duration::from_secs(60))
            .await
            .unwrap());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.incr("counter").await.unwrap(), 2);

        let remaining = store.ttl("counter").await.unwrap().unwrap();
        assert_eq!(remaining, Duration::from_secs(50));

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.ttl("counter").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_on_text_is_type_mismatch() {
        let store = MemoryStore::new();
        store.set("word", "hello", None).await.unwrap();
        assert!(matches!(
            store.incr("word").await,
            Err(StoreError::TypeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_is_noop() {
        let store = MemoryStore::new();
        assert!(!store.expire("ghost", Duration::from_secs(1)).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_incr_is_atomic() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.incr("hits").await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get("hits").await.unwrap(), Some("50".to_string()));
    }

    #[tokio::test]
    async fn test_sorted_set_operations() {
        let store = MemoryStore::new();
        store.zadd("z", 3.0, "c").await.unwrap();
        store.zadd("z", 1.0, "a").await.unwrap();
        store.zadd("z", 2.0, "b").await.unwrap();
        store.zadd("z", 0.5, "c").await.unwrap();

        assert_eq!(store.zcard("z").await.unwrap(), 3);
        let first = store.zrange_with_scores("z", 0, 0).await.unwrap();
        assert_eq!(first, vec![("c".to_string(), 0.5)]);
        let all = store.zrange_with_scores("z", 0, -1).await.unwrap();
        assert_eq!(all.len(), 3);

        assert_eq!(store.zrem_range_by_score("z", 0.0, 1.0).await.unwrap(), 2);
        assert_eq!(store.zcard("z").await.unwrap(), 1);
        assert_eq!(store.zrem_range_by_score("z", 0.0, 10.0).await.unwrap(), 1);
        assert!(!store.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn test_window_hit_trims_old_entries() {
        let store = MemoryStore::new();
        let window_ms = 1_000;
        store
            .record_window_hit("w", 10_000, window_ms, "a")
            .await
            .unwrap();
        store
            .record_window_hit("w", 10_500, window_ms, "b")
            .await
            .unwrap();
        let snapshot = store
            .record_window_hit("w", 11_200, window_ms, "c")
            .await
            .unwrap();

        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.oldest_ms, Some(10_500));

        let peek = store.window_snapshot("w", 11_600, window_ms).await.unwrap();
        assert_eq!(peek.count, 1);
        assert_eq!(peek.oldest_ms, Some(11_200));
        assert_eq!(store.zcard("w").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let store = MemoryStore::new();
        let snapshot = store
            .record_window_hit("huge", 5_000, u64::MAX, "a")
            .await
            .unwrap();
        assert_eq!(snapshot.count, 1);
        assert_eq!(store.ttl("huge").await.unwrap(), None);

        store.set("k", "v", Some(Duration::MAX)).await.unwrap();
        assert!(store.expire("k", Duration::MAX).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_keys_matches_glob() {
        let store = MemoryStore::new();
        store.set("cache:weather:1", "x", None).await.unwrap();
        store.set("cache:weather:2", "x", None).await.unwrap();
        store.set("cache:docs:1", "x", None).await.unwrap();

        let mut keys = store.keys("cache:weather:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache:weather:1", "cache:weather:2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store
            .set("a", "1", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.set("b", "2", None).await.unwrap();
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", ""));
        assert!(glob_match("cache:*", "cache:a:b"));
        assert!(glob_match("h?llo", "hello"));
        assert!(glob_match("a*b*c", "a-x-b-y-c"));
        assert!(glob_match(r"lit\*", "lit*"));
        assert!(!glob_match(r"lit\*", "litx"));
        assert!(!glob_match("cache:*", "ratelimit:chat:1"));
        assert!(!glob_match("a?", "a"));
    }
}
