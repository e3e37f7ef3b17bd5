//! Task domain: records, listing keys, the remote port and the cache-first API.

mod api;
mod cache;
pub mod dirty;
mod fetch;
mod http;
mod types;

pub use api::TaskApi;
pub use cache::TaskQueryKey;
pub use fetch::TaskFetch;
pub use http::HttpTaskFetch;
pub use types::{
  CreateTaskOptions, DetailType, ForkTaskOptions, InvolveUpdate, MoveTaskOptions, MyTasksQuery,
  Nullable, OrgTasksQuery, ProjectRef, ProjectTasksQuery, StageTasksQuery, Task, TaskPatch,
  TasklistQuery,
};
