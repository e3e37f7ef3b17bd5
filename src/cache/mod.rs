//! Generic caching layer with cache-first reads and write-back merges.
//!
//! This module provides a task-agnostic caching mechanism that:
//! - Keeps one canonical record per entity key and merges every update into it
//! - Stores listings (full or paginated) as ordered references to records
//! - Treats presence as freshness: a cached listing is served without refetching
//! - De-duplicates concurrent fetches of the same listing

mod layer;
mod memory;
mod storage;
mod traits;

pub use layer::{CacheLayer, EntityWatch};
pub use memory::MemoryStorage;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{merge_object, Cacheable, ListingRef, QueryKey};
