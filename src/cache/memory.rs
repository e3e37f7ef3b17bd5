//! Process-local cache storage.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::storage::CacheStorage;
use super::traits::{merge_object, ListingRef};
use crate::error::Result;

#[derive(Debug)]
struct MemoryListing {
  entity_type: String,
  family: String,
  keys: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
  entities: HashMap<(String, String), Value>,
  listings: HashMap<String, MemoryListing>,
}

impl MemoryState {
  fn upsert(&mut self, entity_type: &str, key: &str, incoming: &Value) -> Result<Value> {
    let slot = (entity_type.to_string(), key.to_string());
    let merged = match self.entities.get(&slot) {
      Some(current) => {
        let mut current = current.clone();
        merge_object(&mut current, incoming)?;
        current
      }
      None => incoming.clone(),
    };
    self.entities.insert(slot, merged.clone());
    Ok(merged)
  }
}

/// In-memory storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  state: Mutex<MemoryState>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn state(&self) -> MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CacheStorage for MemoryStorage {
  fn get_listing(&self, entity_type: &str, listing: &str) -> Result<Option<Vec<Value>>> {
    let state = self.state();
    let Some(found) = state
      .listings
      .get(listing)
      .filter(|l| l.entity_type == entity_type)
    else {
      return Ok(None);
    };

    let entities = found
      .keys
      .iter()
      .filter_map(|key| {
        state
          .entities
          .get(&(entity_type.to_string(), key.clone()))
          .cloned()
      })
      .collect();
    Ok(Some(entities))
  }

  fn store_listing(
    &self,
    entity_type: &str,
    listing: &ListingRef,
    entities: &[(String, Value)],
  ) -> Result<Vec<Value>> {
    let mut state = self.state();

    // Merge into scratch copies first so a rejected record leaves the store as it was.
    let mut merged = Vec::with_capacity(entities.len());
    for (key, data) in entities {
      let slot = (entity_type.to_string(), key.clone());
      let value = match state.entities.get(&slot) {
        Some(current) => {
          let mut current = current.clone();
          merge_object(&mut current, data)?;
          current
        }
        None => data.clone(),
      };
      merged.push(value);
    }

    for ((key, _), value) in entities.iter().zip(&merged) {
      state
        .entities
        .insert((entity_type.to_string(), key.clone()), value.clone());
    }
    state.listings.insert(
      listing.hash.clone(),
      MemoryListing {
        entity_type: entity_type.to_string(),
        family: listing.family.clone(),
        keys: entities.iter().map(|(key, _)| key.clone()).collect(),
      },
    );

    Ok(merged)
  }

  fn get_entity(&self, entity_type: &str, key: &str) -> Result<Option<Value>> {
    Ok(
      self
        .state()
        .entities
        .get(&(entity_type.to_string(), key.to_string()))
        .cloned(),
    )
  }

  fn store_entity(&self, entity_type: &str, key: &str, data: &Value) -> Result<Value> {
    self.state().upsert(entity_type, key, data)
  }

  fn merge_entity(&self, entity_type: &str, key: &str, patch: &Value) -> Result<Option<Value>> {
    let mut state = self.state();
    if !state
      .entities
      .contains_key(&(entity_type.to_string(), key.to_string()))
    {
      return Ok(None);
    }
    state.upsert(entity_type, key, patch).map(Some)
  }

  fn remove_entity(&self, entity_type: &str, key: &str) -> Result<bool> {
    let mut state = self.state();
    let removed = state
      .entities
      .remove(&(entity_type.to_string(), key.to_string()))
      .is_some();

    for listing in state
      .listings
      .values_mut()
      .filter(|l| l.entity_type == entity_type)
    {
      listing.keys.retain(|k| k != key);
    }

    Ok(removed)
  }

  fn max_listed_key(&self, entity_type: &str, family: &str) -> Result<Option<String>> {
    let state = self.state();
    Ok(
      state
        .listings
        .values()
        .filter(|l| l.entity_type == entity_type && l.family == family)
        .flat_map(|l| l.keys.iter())
        .max()
        .cloned(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn listing(hash: &str, family: &str) -> ListingRef {
    ListingRef {
      hash: hash.to_string(),
      family: family.to_string(),
      description: hash.to_string(),
    }
  }

  #[test]
  fn test_listing_is_scoped_by_entity_type() {
    let storage = MemoryStorage::new();
    storage
      .store_listing(
        "task",
        &listing("l1", "f"),
        &[("t1".to_string(), json!({"_id": "t1"}))],
      )
      .unwrap();

    assert!(storage.get_listing("task", "l1").unwrap().is_some());
    assert!(storage.get_listing("project", "l1").unwrap().is_none());
  }

  #[test]
  fn test_listing_sees_later_entity_merges() {
    let storage = MemoryStorage::new();
    storage
      .store_listing(
        "task",
        &listing("l1", "f"),
        &[("t1".to_string(), json!({"_id": "t1", "isDone": false}))],
      )
      .unwrap();
    storage
      .merge_entity("task", "t1", &json!({"isDone": true}))
      .unwrap();

    let cached = storage.get_listing("task", "l1").unwrap().unwrap();
    assert_eq!(cached, vec![json!({"_id": "t1", "isDone": true})]);
  }

  #[test]
  fn test_rejected_listing_leaves_store_untouched() {
    let storage = MemoryStorage::new();
    storage
      .store_entity("task", "t1", &json!({"_id": "t1"}))
      .unwrap();

    let result = storage.store_listing(
      "task",
      &listing("l1", "f"),
      &[
        ("t2".to_string(), json!({"_id": "t2"})),
        ("t1".to_string(), json!("not an object")),
      ],
    );

    assert!(result.is_err());
    assert!(storage.get_entity("task", "t2").unwrap().is_none());
    assert!(storage.get_listing("task", "l1").unwrap().is_none());
  }

  #[test]
  fn test_remove_entity_drops_listing_refs() {
    let storage = MemoryStorage::new();
    storage
      .store_listing(
        "task",
        &listing("l1", "f"),
        &[
          ("t1".to_string(), json!({"_id": "t1"})),
          ("t2".to_string(), json!({"_id": "t2"})),
        ],
      )
      .unwrap();

    assert!(storage.remove_entity("task", "t1").unwrap());
    assert_eq!(
      storage.get_listing("task", "l1").unwrap(),
      Some(vec![json!({"_id": "t2"})])
    );
  }

  #[test]
  fn test_max_listed_key() {
    let storage = MemoryStorage::new();
    storage
      .store_listing(
        "task",
        &listing("p1", "created"),
        &[("a".to_string(), json!({})), ("c".to_string(), json!({}))],
      )
      .unwrap();
    storage
      .store_listing(
        "task",
        &listing("p2", "created"),
        &[("b".to_string(), json!({}))],
      )
      .unwrap();

    assert_eq!(
      storage.max_listed_key("task", "created").unwrap(),
      Some("c".to_string())
    );
    assert_eq!(storage.max_listed_key("task", "involved").unwrap(), None);
  }
}
