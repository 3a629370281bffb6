//! Response cache and in-flight deduplication.
//!
//! The cache is a bounded LRU keyed by request fingerprint, with a soft
//! per-kind TTL and a pin floor: entries whose fingerprint corresponds to
//! state still live in the world (the current room, say) are never evicted.
//! The in-flight table guarantees at most one concurrent generation per
//! fingerprint; late arrivals wait on the first caller's result.

use crate::context::Fingerprint;
use crate::router::RequestKind;
use crate::validate::ValidatedResponse;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

struct CacheEntry {
    value: ValidatedResponse,
    kind: RequestKind,
    inserted_at: Instant,
    last_used: u64,
    pinned: bool,
}

struct CacheInner {
    entries: HashMap<Fingerprint, CacheEntry>,
    use_counter: u64,
}

/// Bounded LRU response cache with per-kind TTL and pinning.
pub struct ResponseCache {
    inner: RwLock<CacheInner>,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                use_counter: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Fetch a live entry, refreshing its LRU position.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<ValidatedResponse> {
        let mut inner = self.inner.write().expect("cache lock");
        inner.use_counter += 1;
        let counter = inner.use_counter;
        let entry = inner.entries.get_mut(fingerprint)?;
        if entry.inserted_at.elapsed() >= entry.kind.cache_ttl() {
            inner.entries.remove(fingerprint);
            return None;
        }
        entry.last_used = counter;
        Some(entry.value.clone())
    }

    /// Insert a validated response, evicting the least-recently-used
    /// unpinned entry when full. If every entry is pinned the insert still
    /// happens; the pin floor wins over the capacity bound.
    pub fn insert(&self, fingerprint: Fingerprint, kind: RequestKind, value: ValidatedResponse) {
        let mut inner = self.inner.write().expect("cache lock");
        inner.use_counter += 1;
        let counter = inner.use_counter;

        if !inner.entries.contains_key(&fingerprint) && inner.entries.len() >= self.capacity {
            let victim = inner
                .entries
                .iter()
                .filter(|(_, e)| !e.pinned)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(fp, _)| *fp);
            if let Some(victim) = victim {
                inner.entries.remove(&victim);
            }
        }

        inner.entries.insert(
            fingerprint,
            CacheEntry {
                value,
                kind,
                inserted_at: Instant::now(),
                last_used: counter,
                pinned: false,
            },
        );
    }

    /// Replace the pinned set: fingerprints corresponding to live world
    /// state. Everything else becomes evictable again.
    pub fn set_pinned(&self, pinned: &HashSet<Fingerprint>) {
        let mut inner = self.inner.write().expect("cache lock");
        for (fingerprint, entry) in inner.entries.iter_mut() {
            entry.pinned = pinned.contains(fingerprint);
        }
    }

    /// Drop an entry outright (e.g. an NPC whose state meaningfully moved).
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        let mut inner = self.inner.write().expect("cache lock");
        inner.entries.remove(fingerprint);
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("cache lock").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result payload distributed to in-flight waiters.
pub type InFlightResult = (ValidatedResponse, bool);

/// The in-flight table: fingerprint → waiters for the one running
/// generation.
#[derive(Default)]
pub struct InFlight {
    waiters: Mutex<HashMap<Fingerprint, Vec<oneshot::Sender<InFlightResult>>>>,
}

/// What `InFlight::claim` decided for a caller.
pub enum Claim {
    /// This caller runs the generation and must later call `complete`.
    Leader,
    /// Another generation with this fingerprint is running; await the
    /// receiver instead.
    Follower(oneshot::Receiver<InFlightResult>),
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a fingerprint. The first caller becomes the leader; everyone
    /// else is parked on the leader's result.
    pub fn claim(&self, fingerprint: Fingerprint) -> Claim {
        let mut waiters = self.waiters.lock().expect("inflight lock");
        match waiters.get_mut(&fingerprint) {
            Some(list) => {
                let (tx, rx) = oneshot::channel();
                list.push(tx);
                Claim::Follower(rx)
            }
            None => {
                waiters.insert(fingerprint, Vec::new());
                Claim::Leader
            }
        }
    }

    /// Resolve a fingerprint, waking every follower with the same result.
    pub fn complete(&self, fingerprint: &Fingerprint, result: InFlightResult) {
        let list = {
            let mut waiters = self.waiters.lock().expect("inflight lock");
            waiters.remove(fingerprint).unwrap_or_default()
        };
        for tx in list {
            // A follower that gave up waiting is not an error.
            let _ = tx.send(result.clone());
        }
    }

    /// Number of distinct fingerprints currently generating.
    pub fn len(&self) -> usize {
        self.waiters.lock().expect("inflight lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::SummaryContent;
    use sha2::{Digest, Sha256};

    fn fingerprint(tag: &str) -> Fingerprint {
        // Same construction as the assembler, without needing one.
        let digest = Sha256::digest(tag.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        // Fingerprint's internals are private to context.rs; round-trip
        // through the public constructor used in tests.
        crate::context::test_fingerprint(bytes)
    }

    fn response(text: &str) -> ValidatedResponse {
        ValidatedResponse::Summary(SummaryContent {
            summary: text.into(),
        })
    }

    #[test]
    fn test_cache_hit_returns_equal_value() {
        let cache = ResponseCache::new(4);
        let fp = fingerprint("a");
        cache.insert(fp, RequestKind::Summarization, response("hello"));
        assert_eq!(cache.get(&fp), Some(response("hello")));
    }

    #[test]
    fn test_lru_eviction_prefers_oldest_unpinned() {
        let cache = ResponseCache::new(2);
        let a = fingerprint("a");
        let b = fingerprint("b");
        let c = fingerprint("c");
        cache.insert(a, RequestKind::RoomDescription, response("a"));
        cache.insert(b, RequestKind::RoomDescription, response("b"));
        // Touch `a` so `b` is the LRU victim.
        cache.get(&a);
        cache.insert(c, RequestKind::RoomDescription, response("c"));

        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
    }

    #[test]
    fn test_pinned_entries_survive_eviction() {
        let cache = ResponseCache::new(2);
        let a = fingerprint("a");
        let b = fingerprint("b");
        let c = fingerprint("c");
        cache.insert(a, RequestKind::RoomDescription, response("a"));
        cache.insert(b, RequestKind::RoomDescription, response("b"));
        cache.set_pinned(&HashSet::from([a]));
        // `a` is older but pinned; `b` takes the eviction.
        cache.insert(c, RequestKind::RoomDescription, response("c"));

        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn test_invalidate() {
        let cache = ResponseCache::new(4);
        let fp = fingerprint("npc");
        cache.insert(fp, RequestKind::NpcDialogue, response("hi"));
        cache.invalidate(&fp);
        assert!(cache.get(&fp).is_none());
    }

    #[tokio::test]
    async fn test_inflight_followers_see_leader_result() {
        let inflight = InFlight::new();
        let fp = fingerprint("shared");

        assert!(matches!(inflight.claim(fp), Claim::Leader));
        let Claim::Follower(rx1) = inflight.claim(fp) else {
            panic!("second claim should follow");
        };
        let Claim::Follower(rx2) = inflight.claim(fp) else {
            panic!("third claim should follow");
        };

        inflight.complete(&fp, (response("done"), false));
        assert_eq!(rx1.await.unwrap().0, response("done"));
        assert_eq!(rx2.await.unwrap().0, response("done"));
        assert!(inflight.is_empty());

        // After completion the fingerprint can be claimed fresh.
        assert!(matches!(inflight.claim(fp), Claim::Leader));
    }
}
