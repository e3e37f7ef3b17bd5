//! Core traits and types for the caching system.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Trait for entities that can be cached.
///
/// Implementors provide a unique cache key and the list of fields a complete
/// record carries, so that partially known records can be told apart from
/// full ones.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Unique identifier for this entity (e.g. task id)
  fn cache_key(&self) -> String;

  /// Entity type name for storage organization (e.g. "task")
  fn entity_type() -> &'static str;

  /// Wire name of the field holding the key (e.g. "_id")
  fn key_field() -> &'static str;

  /// Wire field names that every complete record has.
  fn required_fields() -> &'static [&'static str] {
    &[]
  }

  /// Whether a cached raw record has the shape of a complete entity.
  fn check_schema(raw: &Value) -> bool {
    raw
      .as_object()
      .is_some_and(|obj| Self::required_fields().iter().all(|f| obj.contains_key(*f)))
  }
}

/// A lookup key for a cached listing.
pub trait QueryKey {
  /// Stable, fixed-length key used by the storage backend.
  fn cache_hash(&self) -> String;

  /// The key without its page, shared by every page of one listing.
  fn family(&self) -> String;

  /// Human readable description for logs.
  fn description(&self) -> String;
}

/// Resolved identity of a listing, as handed to storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRef {
  pub hash: String,
  pub family: String,
  pub description: String,
}

impl ListingRef {
  pub fn of<K: QueryKey + ?Sized>(key: &K) -> Self {
    Self {
      hash: key.cache_hash(),
      family: key.family(),
      description: key.description(),
    }
  }
}

/// Shallow merge of `incoming` into `target`; incoming fields win.
pub fn merge_object(target: &mut Value, incoming: &Value) -> crate::Result<()> {
  let (Some(target), Some(incoming)) = (target.as_object_mut(), incoming.as_object()) else {
    return Err(crate::TaskError::merge("only JSON objects can be merged"));
  };
  for (field, value) in incoming {
    target.insert(field.clone(), value.clone());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde::Deserialize;
  use serde_json::json;

  #[derive(Clone, Serialize, Deserialize)]
  struct Note {
    id: String,
  }

  impl Cacheable for Note {
    fn cache_key(&self) -> String {
      self.id.clone()
    }

    fn entity_type() -> &'static str {
      "note"
    }

    fn key_field() -> &'static str {
      "id"
    }

    fn required_fields() -> &'static [&'static str] {
      &["id", "body"]
    }
  }

  #[test]
  fn test_check_schema_requires_all_fields() {
    assert!(Note::check_schema(&json!({"id": "n1", "body": ""})));
    assert!(!Note::check_schema(&json!({"id": "n1"})));
    assert!(!Note::check_schema(&json!(["id", "body"])));
  }

  #[test]
  fn test_merge_object_keeps_untouched_fields() {
    let mut target = json!({"id": "t1", "note": "", "content": "write docs"});
    merge_object(&mut target, &json!({"note": "hello"})).unwrap();
    assert_eq!(
      target,
      json!({"id": "t1", "note": "hello", "content": "write docs"})
    );
  }

  #[test]
  fn test_merge_object_rejects_non_objects() {
    let mut target = json!({"id": "t1"});
    assert!(merge_object(&mut target, &json!("oops")).is_err());
  }
}
