use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tourguide_core_types::{Scope, Tour, TourData, TourId};
use tourguide_policy_center::CachePolicy;
use tracing::{debug, warn};

use crate::errors::CacheError;
use crate::fetcher::FlowFetcher;

/// One cached tour definition.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: TourData,
    /// Scope the entry was fetched under.
    pub scope: Scope,
    pub expires_at: Instant,
}

type FetchOutcome = Option<Result<(), CacheError>>;

/// Tour definitions keyed by id, expiring a fixed time after their last
/// write and bounded in count.
pub struct FlowCache {
    fetcher: Arc<dyn FlowFetcher>,
    ttl: Duration,
    capacity: usize,
    entries: DashMap<TourId, CacheEntry>,
    in_flight: Mutex<HashMap<TourId, watch::Receiver<FetchOutcome>>>,
}

/// Releases in-flight claims even when the owning load is dropped mid-fetch.
struct InFlightGuard<'a> {
    cache: &'a FlowCache,
    ids: &'a [TourId],
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.cache.in_flight.lock();
        for id in self.ids {
            in_flight.remove(id);
        }
    }
}

impl FlowCache {
    pub fn new(fetcher: Arc<dyn FlowFetcher>, policy: &CachePolicy) -> Self {
        Self::with_limits(fetcher, policy.ttl(), policy.capacity)
    }

    pub fn with_limits(fetcher: Arc<dyn FlowFetcher>, ttl: Duration, capacity: usize) -> Self {
        Self {
            fetcher,
            ttl,
            capacity: capacity.max(1),
            entries: DashMap::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch-and-merge.
    ///
    /// Expired entries are swept first. Ids already cached only get their
    /// expiry refreshed. Ids another load is already fetching are awaited
    /// instead of fetched again. Everything else goes out in one batch,
    /// after evicting the entries closest to expiry to make room.
    pub async fn load(&self, ids: &[TourId], scope: &Scope) -> Result<(), CacheError> {
        let now = Instant::now();
        self.sweep_expired(now);

        let mut requested: Vec<TourId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !requested.contains(id) {
                requested.push(id.clone());
            }
        }

        let mut missing = Vec::new();
        for id in &requested {
            match self.entries.get_mut(id) {
                Some(mut entry) => {
                    entry.expires_at = now + self.ttl;
                    debug!(target: "flow-cache", tour = %id, "expiry refreshed");
                }
                None => missing.push(id.clone()),
            }
        }

        let (tx, rx) = watch::channel::<FetchOutcome>(None);
        let mut owned = Vec::new();
        let mut waiting = Vec::new();
        {
            let mut in_flight = self.in_flight.lock();
            for id in missing {
                match in_flight.get(&id) {
                    Some(pending) => waiting.push((id, pending.clone())),
                    None => {
                        in_flight.insert(id.clone(), rx.clone());
                        owned.push(id);
                    }
                }
            }
        }

        if !owned.is_empty() {
            let guard = InFlightGuard {
                cache: self,
                ids: &owned,
            };
            self.make_room(owned.len(), &requested);
            let outcome = match self.fetcher.load_flows(&owned, scope).await {
                Ok(flows) => {
                    self.merge(flows, scope, &owned);
                    Ok(())
                }
                Err(err) => {
                    warn!(target: "flow-cache", %err, count = owned.len(), "flow fetch failed");
                    Err(CacheError::Fetch(err))
                }
            };
            tx.send_replace(Some(outcome.clone()));
            drop(guard);
            outcome?;
        }

        for (id, mut pending) in waiting {
            debug!(target: "flow-cache", tour = %id, "joining in-flight fetch");
            let outcome = pending
                .wait_for(Option::is_some)
                .await
                .map(|value| (*value).clone())
                .map_err(|_| CacheError::Abandoned(id.0.clone()))?;
            if let Some(Err(err)) = outcome {
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &TourId) -> Option<TourData> {
        self.entry(id).map(|entry| entry.data)
    }

    /// The cached definition as a [`Tour`] named `id`.
    pub fn get_tour(&self, id: &TourId) -> Option<Tour> {
        self.get(id).map(|data| data.into_tour(id.clone()))
    }

    pub fn entry(&self, id: &TourId) -> Option<CacheEntry> {
        let now = Instant::now();
        let expired = match self.entries.get(id) {
            Some(entry) if entry.expires_at > now => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(id);
        }
        None
    }

    pub fn contains(&self, id: &TourId) -> bool {
        self.entry(id).is_some()
    }

    /// Writes one definition directly, as a completed fetch would.
    pub fn insert(&self, id: TourId, data: TourData, scope: &Scope) {
        if !self.entries.contains_key(&id) {
            self.make_room(1, std::slice::from_ref(&id));
        }
        let scope = if data.scope.0.is_empty() {
            scope.clone()
        } else {
            data.scope.clone()
        };
        self.entries.insert(
            id,
            CacheEntry {
                data,
                scope,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, id: &TourId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn sweep_expired(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            debug!(target: "flow-cache", swept, "expired entries removed");
        }
    }

    /// Evicts the entries closest to expiry until `incoming` more fit.
    /// Ids in `protected` are never evicted, so a batch larger than the
    /// capacity leaves the cache temporarily over it.
    fn make_room(&self, incoming: usize, protected: &[TourId]) {
        while self.entries.len() + incoming > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|entry| !protected.contains(entry.key()))
                .min_by_key(|entry| entry.expires_at)
                .map(|entry| entry.key().clone());
            match victim {
                Some(id) => {
                    self.entries.remove(&id);
                    debug!(target: "flow-cache", tour = %id, "evicted");
                }
                None => break,
            }
        }
    }

    /// Stores the fetched definitions of `owned`, the ids room was made
    /// for. Anything else in the response is dropped.
    fn merge(&self, flows: HashMap<TourId, TourData>, scope: &Scope, owned: &[TourId]) {
        let expires_at = Instant::now() + self.ttl;
        for id in owned {
            if !flows.contains_key(id) {
                debug!(target: "flow-cache", tour = %id, "flow missing from response");
            }
        }
        for (id, data) in flows {
            if !owned.contains(&id) {
                debug!(target: "flow-cache", tour = %id, "unrequested flow ignored");
                continue;
            }
            let tag = if data.scope.0.is_empty() {
                scope.clone()
            } else {
                data.scope.clone()
            };
            self.entries.insert(
                id,
                CacheEntry {
                    data,
                    scope: tag,
                    expires_at,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::time::advance;
    use tourguide_core_types::{SelectorDescriptor, Step};

    use super::*;
    use crate::errors::FetchError;

    #[derive(Default)]
    struct MockFetcher {
        calls: Mutex<Vec<Vec<TourId>>>,
        fail: AtomicBool,
        delay: Option<Duration>,
        /// Sent along with every response.
        unsolicited: Option<TourId>,
    }

    impl MockFetcher {
        fn calls(&self) -> Vec<Vec<TourId>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl FlowFetcher for MockFetcher {
        async fn load_flows(
            &self,
            ids: &[TourId],
            _scope: &Scope,
        ) -> Result<HashMap<TourId, TourData>, FetchError> {
            self.calls.lock().push(ids.to_vec());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Transport("connection reset".into()));
            }
            Ok(ids
                .iter()
                .chain(self.unsolicited.iter())
                .map(|id| {
                    let step = Step::new(format!("{id}-1"), "/", SelectorDescriptor::single("body"));
                    (id.clone(), TourData::new(vec![step], Scope::default()))
                })
                .collect())
        }
    }

    fn id(raw: &str) -> TourId {
        TourId::new(raw)
    }

    fn cache(fetcher: &Arc<MockFetcher>, capacity: usize) -> FlowCache {
        FlowCache::with_limits(
            Arc::clone(fetcher) as Arc<dyn FlowFetcher>,
            Duration::from_secs(15 * 60),
            capacity,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_load_within_ttl_fetches_once() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 20);
        let scope = Scope::new("prod");

        cache.load(&[id("a")], &scope).await.unwrap();
        cache.load(&[id("a")], &scope).await.unwrap();
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(cache.entry(&id("a")).unwrap().scope, scope);

        advance(Duration::from_secs(15 * 60 + 1)).await;
        assert!(cache.get(&id("a")).is_none());
        cache.load(&[id("a")], &scope).await.unwrap();
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_a_present_id_refreshes_expiry() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 20);
        let scope = Scope::new("prod");

        cache.load(&[id("a")], &scope).await.unwrap();
        advance(Duration::from_secs(10 * 60)).await;
        cache.load(&[id("a")], &scope).await.unwrap();
        advance(Duration::from_secs(10 * 60)).await;

        assert!(cache.get(&id("a")).is_some());
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_missing_ids_into_one_fetch() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 20);
        let scope = Scope::new("prod");

        cache.load(&[id("a")], &scope).await.unwrap();
        cache
            .load(&[id("a"), id("b"), id("c"), id("b")], &scope)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), vec![vec![id("a")], vec![id("b"), id("c")]]);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get_tour(&id("c")).unwrap().id, id("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_soonest_to_expire_first() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 3);
        let scope = Scope::new("prod");

        for name in ["a", "b", "c"] {
            cache.load(&[id(name)], &scope).await.unwrap();
            advance(Duration::from_secs(60)).await;
        }
        cache.load(&[id("d")], &scope).await.unwrap();
        assert!(!cache.contains(&id("a")));
        for name in ["b", "c", "d"] {
            assert!(cache.contains(&id(name)), "{name} should survive");
        }

        // Refreshed ids in the same request are protected too.
        cache.load(&[id("b"), id("e")], &scope).await.unwrap();
        assert!(!cache.contains(&id("c")));
        assert!(cache.contains(&id("b")));
        assert!(cache.contains(&id("e")));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_batch_keeps_every_new_entry() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 2);
        let scope = Scope::new("prod");

        cache.load(&[id("old")], &scope).await.unwrap();
        cache
            .load(&[id("x"), id("y"), id("z")], &scope)
            .await
            .unwrap();
        assert!(!cache.contains(&id("old")));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_share_one_fetch() {
        let fetcher = Arc::new(MockFetcher {
            delay: Some(Duration::from_millis(200)),
            ..MockFetcher::default()
        });
        let cache = cache(&fetcher, 20);
        let scope = Scope::new("prod");

        let first_ids = [id("a")];
        let second_ids = [id("a"), id("b")];
        let (first, second) = tokio::join!(
            cache.load(&first_ids, &scope),
            cache.load(&second_ids, &scope)
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(fetcher.calls(), vec![vec![id("a")], vec![id("b")]]);
        assert!(cache.contains(&id("a")) && cache.contains(&id("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_surfaced_and_stores_nothing() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 20);
        let scope = Scope::new("prod");
        cache.load(&[id("a")], &scope).await.unwrap();

        fetcher.fail.store(true, Ordering::SeqCst);
        let err = cache.load(&[id("b")], &scope).await.unwrap_err();
        assert!(matches!(err, CacheError::Fetch(FetchError::Transport(_))));
        assert!(err.is_retryable());
        assert_eq!(cache.len(), 1);

        fetcher.fail.store(false, Ordering::SeqCst);
        cache.load(&[id("b")], &scope).await.unwrap();
        assert_eq!(fetcher.calls().len(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_at_capacity_keeps_the_eviction() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 2);
        let scope = Scope::new("prod");
        cache.load(&[id("a")], &scope).await.unwrap();
        advance(Duration::from_secs(60)).await;
        cache.load(&[id("b")], &scope).await.unwrap();

        fetcher.fail.store(true, Ordering::SeqCst);
        assert!(cache.load(&[id("c")], &scope).await.is_err());
        // Room for the batch was made before the fetch went out.
        assert!(!cache.contains(&id("a")));
        assert!(cache.contains(&id("b")));
        assert!(!cache.contains(&id("c")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrequested_flows_in_a_response_are_dropped() {
        let fetcher = Arc::new(MockFetcher {
            unsolicited: Some(id("extra")),
            ..MockFetcher::default()
        });
        let cache = cache(&fetcher, 2);
        let scope = Scope::new("prod");

        cache.load(&[id("a")], &scope).await.unwrap();
        cache.load(&[id("b")], &scope).await.unwrap();
        assert!(!cache.contains(&id("extra")));
        assert!(cache.contains(&id("a")) && cache.contains(&id("b")));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.len(), cache.capacity());
    }

    #[tokio::test(start_paused = true)]
    async fn insert_invalidate_and_clear() {
        let fetcher = Arc::new(MockFetcher::default());
        let cache = cache(&fetcher, 20);
        let data = TourData::new(Vec::new(), Scope::new("staging"));
        cache.insert(id("t"), data, &Scope::new("prod"));
        assert_eq!(cache.entry(&id("t")).unwrap().scope, Scope::new("staging"));
        assert!(cache.invalidate(&id("t")));
        assert!(!cache.invalidate(&id("t")));

        cache.insert(id("u"), TourData::default(), &Scope::new("prod"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(fetcher.calls().is_empty());
    }
}
