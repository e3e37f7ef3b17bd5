//! Cache-first client for a remote task service.
//!
//! [`tasks::TaskApi`] serves listing and single-task reads from a local cache
//! when present, falling back to the remote service and merging what it
//! returns. Writes always reach the remote service first and are merged into
//! the cache before they are reported.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod producer;
pub mod tasks;

pub use error::{Result, TaskError};
pub use producer::{Producer, Subscription};
