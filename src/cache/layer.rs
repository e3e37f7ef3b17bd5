//! Cache layer that orchestrates caching logic with network fetching.

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{Cacheable, ListingRef, QueryKey};
use crate::error::{Result, TaskError};
use crate::producer::Producer;

type SharedFetch = Shared<BoxFuture<'static, Result<()>>>;

/// A running listing fetch and the number of readers waiting on it.
struct Flight {
  id: u64,
  fetch: SharedFetch,
  joiners: usize,
}

/// Network fetches currently running, by listing hash.
#[derive(Default)]
struct InFlight {
  next_id: u64,
  fetches: HashMap<String, Flight>,
}

/// Cache layer that manages caching logic and network fetching.
///
/// Reads are cache-first: a listing or entity already present in storage is
/// replayed without touching the network. Writes always run their request,
/// then merge the response. Presence is the only freshness signal.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  inflight: Arc<Mutex<InFlight>>,
  watchers: Arc<Mutex<HashMap<String, watch::Sender<Option<Value>>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn watch_key(entity_type: &str, key: &str) -> String {
  format!("{entity_type}:{key}")
}

fn decode<T: Cacheable>(raw: Value) -> Result<T> {
  serde_json::from_value(raw).map_err(|e| TaskError::decode(T::entity_type(), e))
}

fn validated_key<T: Cacheable>(entity: &T) -> Result<String> {
  let key = entity.cache_key();
  if key.trim().is_empty() {
    return Err(TaskError::merge(format!(
      "{} without a key cannot be cached",
      T::entity_type()
    )));
  }
  Ok(key)
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self::from_arc(Arc::new(storage))
  }

  pub fn from_arc(storage: Arc<dyn CacheStorage>) -> Self {
    Self {
      storage,
      inflight: Arc::default(),
      watchers: Arc::default(),
    }
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  /// Synchronously look up a cached listing.
  ///
  /// A listing that cannot be decoded counts as absent.
  pub fn probe_list<T: Cacheable, K: QueryKey + ?Sized>(&self, key: &K) -> Result<Option<Vec<T>>> {
    self.probe_listing_hash(&key.cache_hash())
  }

  fn probe_listing_hash<T: Cacheable>(&self, hash: &str) -> Result<Option<Vec<T>>> {
    let raw = match self.storage.get_listing(T::entity_type(), hash) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Ok(None),
      Err(e @ TaskError::Decode { .. }) => {
        debug!(error = %e, "unreadable cached listing");
        return Ok(None);
      }
      Err(e) => return Err(e),
    };

    match raw.into_iter().map(decode::<T>).collect::<Result<Vec<T>>>() {
      Ok(entities) => Ok(Some(entities)),
      Err(e) => {
        debug!(error = %e, "cached listing failed to decode");
        Ok(None)
      }
    }
  }

  /// Synchronously look up a cached entity.
  ///
  /// Records missing fields of a complete entity, or failing to decode, count
  /// as absent.
  pub fn probe_one<T: Cacheable>(&self, key: &str) -> Result<Option<T>> {
    let raw = match self.storage.get_entity(T::entity_type(), key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Ok(None),
      Err(e @ TaskError::Decode { .. }) => {
        debug!(key, error = %e, "unreadable cached entity");
        return Ok(None);
      }
      Err(e) => return Err(e),
    };

    if !T::check_schema(&raw) {
      debug!(key, "cached entity is incomplete");
      return Ok(None);
    }
    match decode::<T>(raw) {
      Ok(entity) => Ok(Some(entity)),
      Err(e) => {
        debug!(key, error = %e, "cached entity failed to decode");
        Ok(None)
      }
    }
  }

  /// Largest entity key cached under any page of the listing family of `key`.
  pub fn max_listed_key<T: Cacheable, K: QueryKey + ?Sized>(&self, key: &K) -> Result<Option<String>> {
    self
      .storage
      .max_listed_key(T::entity_type(), &key.family())
  }

  /// Fetch a listing with cache-first strategy.
  ///
  /// At subscription time:
  /// 1. Probe the cache with `key` - if present, replay it
  /// 2. Otherwise run `fetcher`, merge the result under `key`
  /// 3. Emit the merged listing as now stored
  ///
  /// Concurrent misses for the same key share one fetch.
  pub fn fetch_list<T, K, F, Fut>(&self, key: &K, fetcher: F) -> Producer<Vec<T>>
  where
    T: Cacheable,
    K: QueryKey + ?Sized,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
  {
    let layer = self.clone();
    let listing = ListingRef::of(key);

    Producer::defer(move || {
      match layer.probe_listing_hash::<T>(&listing.hash) {
        Ok(Some(cached)) => {
          debug!(listing = %listing.description, count = cached.len(), "cache hit");
          return Producer::value(cached);
        }
        Ok(None) => debug!(listing = %listing.description, "cache miss"),
        Err(e) => return Producer::fail(e),
      }

      Producer::from_future(async move {
        layer.load_listing(&listing, fetcher).await?;
        layer
          .probe_listing_hash::<T>(&listing.hash)?
          .ok_or_else(|| {
            TaskError::merge(format!("{} unreadable after merge", listing.description))
          })
      })
    })
  }

  /// Run `fetcher` for a listing, or join the fetch already running for it.
  async fn load_listing<T, F, Fut>(&self, listing: &ListingRef, fetcher: F) -> Result<()>
  where
    T: Cacheable,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
  {
    let (id, fetch) = {
      let mut inflight = lock(&self.inflight);
      if let Some(flight) = inflight.fetches.get_mut(&listing.hash) {
        debug!(listing = %listing.description, "joining in-flight fetch");
        flight.joiners += 1;
        (flight.id, flight.fetch.clone())
      } else {
        let layer = self.clone();
        let target = listing.clone();
        let fetch = async move {
          let entities = fetcher().await.inspect_err(|e| {
            warn!(listing = %target.description, category = e.category(), error = %e, "fetch failed");
          })?;
          layer.merge_listing(&target, &entities)
        }
        .boxed()
        .shared();

        inflight.next_id += 1;
        let id = inflight.next_id;
        inflight.fetches.insert(
          listing.hash.clone(),
          Flight {
            id,
            fetch: fetch.clone(),
            joiners: 1,
          },
        );
        (id, fetch)
      }
    };

    let _registered = InFlightEntry {
      inflight: &self.inflight,
      hash: &listing.hash,
      id,
    };
    fetch.await
  }

  fn merge_listing<T: Cacheable>(&self, listing: &ListingRef, entities: &[T]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(entities.len());
    for entity in entities {
      let key = validated_key(entity)?;
      if !seen.insert(key.clone()) {
        continue;
      }
      let data = serde_json::to_value(entity).map_err(|e| TaskError::decode(T::entity_type(), e))?;
      rows.push((key, data));
    }

    let merged = self
      .storage
      .store_listing(T::entity_type(), listing, &rows)
      .inspect_err(|e| warn!(listing = %listing.description, error = %e, "merge failed"))?;
    for ((key, _), value) in rows.iter().zip(merged) {
      self.notify(T::entity_type(), key, Some(value));
    }
    Ok(())
  }

  /// Fetch a single entity with cache-first strategy.
  pub fn fetch_one<T, F, Fut>(&self, key: &str, fetcher: F) -> Producer<T>
  where
    T: Cacheable,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let layer = self.clone();
    let key = key.to_string();

    Producer::defer(move || {
      match layer.probe_one::<T>(&key) {
        Ok(Some(cached)) => {
          debug!(key = %key, "cache hit");
          return Producer::value(cached);
        }
        Ok(None) => debug!(key = %key, "cache miss"),
        Err(e) => return Producer::fail(e),
      }

      Producer::from_future(async move {
        let entity = fetcher().await.inspect_err(|e| {
          warn!(key = %key, category = e.category(), error = %e, "fetch failed");
        })?;
        if entity.cache_key() != key {
          return Err(TaskError::merge(format!(
            "requested {key} but received {}",
            entity.cache_key()
          )));
        }
        layer.merge_entity(&entity)
      })
    })
  }

  /// Run a request that yields a whole entity (create, fork) and merge it.
  pub fn write_one<T, Fut>(&self, request: Fut) -> Producer<T>
  where
    T: Cacheable,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let layer = self.clone();
    Producer::from_future(async move {
      let entity = request.await.inspect_err(|e| {
        warn!(entity = T::entity_type(), category = e.category(), error = %e, "write failed");
      })?;
      layer.merge_entity(&entity)
    })
  }

  /// Run a request that yields a partial update of `key` and merge it.
  ///
  /// Emits the merged entity. When `key` is not cached, the patch becomes its
  /// record, which single-entity reads still treat as incomplete.
  pub fn write_patch<T, P, Fut>(&self, key: &str, request: Fut) -> Producer<T>
  where
    T: Cacheable,
    P: Serialize + Send + 'static,
    Fut: Future<Output = Result<P>> + Send + 'static,
  {
    let layer = self.clone();
    let key = key.to_string();
    Producer::from_future(async move {
      let patch = request.await.inspect_err(|e| {
        warn!(key = %key, category = e.category(), error = %e, "write failed");
      })?;
      layer.merge_patch::<T, P>(&key, &patch)
    })
  }

  /// Run a delete request, then drop `key` from the cache. Emits `()` once.
  pub fn write_remove<T, Fut>(&self, key: &str, request: Fut) -> Producer<()>
  where
    T: Cacheable,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    let layer = self.clone();
    let key = key.to_string();
    Producer::from_future(async move {
      request.await.inspect_err(|e| {
        warn!(key = %key, category = e.category(), error = %e, "delete failed");
      })?;
      let removed = layer.storage.remove_entity(T::entity_type(), &key)?;
      debug!(key = %key, removed, "removed from cache");
      layer.notify(T::entity_type(), &key, None);
      Ok(())
    })
  }

  /// Merge a whole entity into its canonical record and return the result.
  pub fn merge_entity<T: Cacheable>(&self, entity: &T) -> Result<T> {
    let key = validated_key(entity)?;
    let data = serde_json::to_value(entity).map_err(|e| TaskError::decode(T::entity_type(), e))?;
    let merged = self.storage.store_entity(T::entity_type(), &key, &data)?;
    self.notify(T::entity_type(), &key, Some(merged.clone()));
    decode(merged)
  }

  /// Merge a partial update into the canonical record of `key`, creating
  /// the record if it is not cached.
  pub fn merge_patch<T: Cacheable, P: Serialize>(&self, key: &str, patch: &P) -> Result<T> {
    if key.trim().is_empty() {
      return Err(TaskError::merge("patch without a target key"));
    }
    let mut patch = serde_json::to_value(patch).map_err(|e| TaskError::decode("patch", e))?;

    let merged = match self.storage.merge_entity(T::entity_type(), key, &patch)? {
      Some(merged) => merged,
      None => {
        let Some(fields) = patch.as_object_mut() else {
          return Err(TaskError::merge(format!("patch for {key} is not an object")));
        };
        fields.insert(T::key_field().to_string(), Value::String(key.to_string()));
        debug!(key, "patched entity was not cached");
        self.storage.store_entity(T::entity_type(), key, &patch)?
      }
    };
    self.notify(T::entity_type(), key, Some(merged.clone()));
    decode(merged)
  }

  /// Watch the canonical record of `key`.
  pub fn observe<T: Cacheable>(&self, key: &str) -> EntityWatch<T> {
    let id = watch_key(T::entity_type(), key);
    let mut watchers = lock(&self.watchers);
    watchers.retain(|_, tx| tx.receiver_count() > 0);
    let rx = match watchers.get(&id) {
      Some(tx) => tx.subscribe(),
      None => {
        let current = self
          .storage
          .get_entity(T::entity_type(), key)
          .ok()
          .flatten();
        let (tx, rx) = watch::channel(current);
        watchers.insert(id, tx);
        rx
      }
    };

    EntityWatch {
      rx,
      _entity: PhantomData,
    }
  }

  fn notify(&self, entity_type: &str, key: &str, value: Option<Value>) {
    let id = watch_key(entity_type, key);
    let mut watchers = lock(&self.watchers);
    if let Some(tx) = watchers.get(&id) {
      if tx.receiver_count() == 0 {
        watchers.remove(&id);
      } else {
        tx.send_replace(value);
      }
    }
  }
}

/// One reader's share of an in-flight fetch.
///
/// The fetch is deregistered, and dropped if unfinished, when its last reader
/// finishes or gives up.
struct InFlightEntry<'a> {
  inflight: &'a Mutex<InFlight>,
  hash: &'a str,
  id: u64,
}

impl Drop for InFlightEntry<'_> {
  fn drop(&mut self) {
    let mut inflight = lock(self.inflight);
    let Some(flight) = inflight.fetches.get_mut(self.hash) else {
      return;
    };
    if flight.id != self.id {
      return;
    }
    flight.joiners = flight.joiners.saturating_sub(1);
    if flight.joiners == 0 {
      inflight.fetches.remove(self.hash);
    }
  }
}

/// Live view of one cached entity.
pub struct EntityWatch<T> {
  rx: watch::Receiver<Option<Value>>,
  _entity: PhantomData<fn() -> T>,
}

impl<T: Cacheable> EntityWatch<T> {
  /// Current canonical value, `None` if absent or removed.
  pub fn current(&self) -> Option<T> {
    self
      .rx
      .borrow()
      .clone()
      .and_then(|raw| serde_json::from_value(raw).ok())
  }

  /// Wait for the next merge or removal and return the new value.
  pub async fn changed(&mut self) -> Result<Option<T>> {
    self
      .rx
      .changed()
      .await
      .map_err(|_| TaskError::storage("cache layer dropped"))?;
    Ok(self.current())
  }

  pub fn has_changed(&self) -> bool {
    self.rx.has_changed().unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use serde::Deserialize;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Item {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
  }

  impl Cacheable for Item {
    fn cache_key(&self) -> String {
      self.id.clone()
    }

    fn entity_type() -> &'static str {
      "item"
    }

    fn key_field() -> &'static str {
      "id"
    }

    fn required_fields() -> &'static [&'static str] {
      &["id", "label"]
    }
  }

  struct Key(&'static str);

  impl QueryKey for Key {
    fn cache_hash(&self) -> String {
      self.0.to_string()
    }

    fn family(&self) -> String {
      self.0.to_string()
    }

    fn description(&self) -> String {
      format!("items {}", self.0)
    }
  }

  fn item(id: &str, label: &str) -> Item {
    Item {
      id: id.to_string(),
      label: Some(label.to_string()),
    }
  }

  fn counting_fetch(
    calls: &Arc<AtomicUsize>,
    items: Vec<Item>,
  ) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<Item>>> {
    let calls = calls.clone();
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      async move { Ok(items) }.boxed()
    }
  }

  #[tokio::test]
  async fn test_fill_then_hit() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let first = layer
      .fetch_list(&Key("a"), counting_fetch(&calls, vec![item("1", "one")]))
      .first()
      .await
      .unwrap();
    let second = layer
      .fetch_list(&Key("a"), counting_fetch(&calls, vec![item("2", "two")]))
      .first()
      .await
      .unwrap();

    assert_eq!(first, vec![item("1", "one")]);
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_probe_happens_at_subscription() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let calls = Arc::new(AtomicUsize::new(0));

    // Built before the cache was filled, consumed after.
    let late = layer.fetch_list(&Key("a"), counting_fetch(&calls, vec![]));
    layer
      .fetch_list(&Key("a"), counting_fetch(&calls, vec![item("1", "one")]))
      .first()
      .await
      .unwrap();

    assert_eq!(late.first().await.unwrap(), vec![item("1", "one")]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fetch_error_leaves_cache_empty() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let result = layer
      .fetch_list(&Key("a"), || async {
        Err::<Vec<Item>, _>(TaskError::remote(503, "unavailable"))
      })
      .first()
      .await;

    assert_eq!(result, Err(TaskError::remote(503, "unavailable")));
    assert_eq!(layer.probe_list::<Item, _>(&Key("a")).unwrap(), None);
  }

  #[tokio::test]
  async fn test_blank_key_is_a_merge_error() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let result = layer
      .fetch_list(&Key("a"), || async { Ok(vec![item("", "nameless")]) })
      .first()
      .await;

    assert!(matches!(result, Err(TaskError::Merge { .. })));
    assert_eq!(layer.probe_list::<Item, _>(&Key("a")).unwrap(), None);
  }

  #[tokio::test]
  async fn test_concurrent_misses_share_one_fetch() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let (release, gate) = tokio::sync::oneshot::channel::<()>();

    let counter = calls.clone();
    let mut first = layer
      .fetch_list(&Key("a"), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
          let _ = gate.await;
          Ok(vec![item("1", "one")])
        }
      })
      .subscribe();
    // Let the first fetch register itself.
    tokio::task::yield_now().await;

    let mut second = layer
      .fetch_list(&Key("a"), counting_fetch(&calls, vec![item("2", "two")]))
      .subscribe();
    tokio::task::yield_now().await;

    release.send(()).unwrap();
    assert_eq!(first.next().await, Some(Ok(vec![item("1", "one")])));
    assert_eq!(second.next().await, Some(Ok(vec![item("1", "one")])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_reader_joins_fetch_after_first_reader_left() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let (release, gate) = tokio::sync::oneshot::channel::<()>();

    let counter = calls.clone();
    let first = layer
      .fetch_list(&Key("a"), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
          let _ = gate.await;
          Ok(vec![item("1", "one")])
        }
      })
      .subscribe();
    tokio::task::yield_now().await;

    let mut second = layer
      .fetch_list(&Key("a"), counting_fetch(&calls, vec![item("2", "two")]))
      .subscribe();
    tokio::task::yield_now().await;

    drop(first);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut third = layer
      .fetch_list(&Key("a"), counting_fetch(&calls, vec![item("3", "three")]))
      .subscribe();
    tokio::task::yield_now().await;

    release.send(()).unwrap();
    assert_eq!(second.next().await, Some(Ok(vec![item("1", "one")])));
    assert_eq!(third.next().await, Some(Ok(vec![item("1", "one")])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(lock(&layer.inflight).fetches.is_empty());
  }

  #[tokio::test]
  async fn test_cancelled_read_aborts_fetch() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let merged = Arc::new(AtomicUsize::new(0));
    let flag = merged.clone();

    let sub = layer
      .fetch_list(&Key("a"), move || async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        flag.fetch_add(1, Ordering::SeqCst);
        Ok(vec![item("1", "one")])
      })
      .subscribe();
    tokio::task::yield_now().await;
    drop(sub);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(merged.load(Ordering::SeqCst), 0);
    assert!(lock(&layer.inflight).fetches.is_empty());
    assert_eq!(layer.probe_list::<Item, _>(&Key("a")).unwrap(), None);
  }

  #[tokio::test]
  async fn test_incomplete_cached_entity_is_a_miss() {
    let layer = CacheLayer::new(MemoryStorage::new());
    layer
      .merge_entity(&Item {
        id: "1".to_string(),
        label: None,
      })
      .unwrap();
    assert_eq!(layer.probe_one::<Item>("1").unwrap(), None);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let fetched = layer
      .fetch_one("1", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(item("1", "full")) }
      })
      .first()
      .await
      .unwrap();

    assert_eq!(fetched, item("1", "full"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(layer.probe_one::<Item>("1").unwrap(), Some(item("1", "full")));
  }

  #[tokio::test]
  async fn test_fetch_one_rejects_mismatched_key() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let result = layer
      .fetch_one("1", || async { Ok(item("2", "other")) })
      .first()
      .await;

    assert!(matches!(result, Err(TaskError::Merge { .. })));
    assert!(layer.storage().get_entity("item", "2").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_write_patch_merges_into_listing_entity() {
    let layer = CacheLayer::new(MemoryStorage::new());
    layer
      .fetch_list(&Key("a"), || async { Ok(vec![item("1", "old")]) })
      .first()
      .await
      .unwrap();

    let patched: Item = layer
      .write_patch("1", async { Ok(serde_json::json!({"label": "new"})) })
      .first()
      .await
      .unwrap();

    assert_eq!(patched, item("1", "new"));
    assert_eq!(
      layer.probe_list::<Item, _>(&Key("a")).unwrap(),
      Some(vec![item("1", "new")])
    );
  }

  #[tokio::test]
  async fn test_write_patch_on_unknown_entity_stores_partial() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let patched: Item = layer
      .write_patch("9", async { Ok(serde_json::json!({"label": "x"})) })
      .first()
      .await
      .unwrap();

    assert_eq!(patched, item("9", "x"));
    assert_eq!(
      layer.storage().get_entity("item", "9").unwrap(),
      Some(serde_json::json!({"id": "9", "label": "x"}))
    );
  }

  #[tokio::test]
  async fn test_partial_patch_stays_a_miss() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let patched: Item = layer
      .write_patch("9", async { Ok(serde_json::json!({})) })
      .first()
      .await
      .unwrap();

    assert_eq!(patched.id, "9");
    assert_eq!(layer.probe_one::<Item>("9").unwrap(), None);
  }

  #[tokio::test]
  async fn test_non_object_patch_is_a_merge_error() {
    let layer = CacheLayer::new(MemoryStorage::new());
    let result = layer
      .write_patch::<Item, _, _>("9", async { Ok(serde_json::json!("label")) })
      .first()
      .await;

    assert!(matches!(result, Err(TaskError::Merge { .. })));
  }

  #[tokio::test]
  async fn test_write_remove_emits_unit_and_forgets() {
    let layer = CacheLayer::new(MemoryStorage::new());
    layer
      .fetch_list(&Key("a"), || async { Ok(vec![item("1", "x"), item("2", "y")]) })
      .first()
      .await
      .unwrap();

    let emitted = layer
      .write_remove::<Item, _>("1", async { Ok(()) })
      .collect()
      .await
      .unwrap();

    assert_eq!(emitted, vec![()]);
    assert_eq!(layer.probe_one::<Item>("1").unwrap(), None);
    assert_eq!(
      layer.probe_list::<Item, _>(&Key("a")).unwrap(),
      Some(vec![item("2", "y")])
    );
  }

  #[tokio::test]
  async fn test_observer_sees_merges_and_removal() {
    let layer = CacheLayer::new(MemoryStorage::new());
    layer.merge_entity(&item("1", "first")).unwrap();

    let mut watch = layer.observe::<Item>("1");
    assert_eq!(watch.current(), Some(item("1", "first")));

    layer
      .write_patch::<Item, _, _>("1", async { Ok(serde_json::json!({"label": "second"})) })
      .first()
      .await
      .unwrap();
    assert_eq!(watch.changed().await.unwrap(), Some(item("1", "second")));

    layer
      .write_remove::<Item, _>("1", async { Ok(()) })
      .first()
      .await
      .unwrap();
    assert_eq!(watch.changed().await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_observe_drops_unwatched_senders() {
    let layer = CacheLayer::new(MemoryStorage::new());
    layer.merge_entity(&item("1", "one")).unwrap();
    layer.merge_entity(&item("2", "two")).unwrap();

    let first = layer.observe::<Item>("1");
    drop(first);
    let second = layer.observe::<Item>("2");

    assert_eq!(second.current(), Some(item("2", "two")));
    assert_eq!(lock(&layer.watchers).len(), 1);
  }
}
