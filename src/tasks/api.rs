//! Cache-first task operations.
//!
//! Reads probe the cache when subscribed and only reach the remote service on
//! a miss. Writes always reach the remote service, then merge its response.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::cache::{CacheLayer, EntityWatch};
use crate::config::ReadsConfig;
use crate::producer::Producer;

use super::cache::TaskQueryKey;
use super::dirty;
use super::fetch::TaskFetch;
use super::types::{
  CreateTaskOptions, DetailType, ForkTaskOptions, InvolveUpdate, MoveTaskOptions, MyTasksQuery,
  OrgTasksQuery, ProjectTasksQuery, StageTasksQuery, Task, TaskPatch, TasklistQuery,
};

/// Task reads and writes over a shared cache.
#[derive(Clone)]
pub struct TaskApi {
  fetch: Arc<dyn TaskFetch>,
  cache: CacheLayer,
  reads: ReadsConfig,
}

impl TaskApi {
  pub fn new(fetch: Arc<dyn TaskFetch>, cache: CacheLayer) -> Self {
    Self::with_reads(fetch, cache, ReadsConfig::default())
  }

  pub fn with_reads(fetch: Arc<dyn TaskFetch>, cache: CacheLayer, reads: ReadsConfig) -> Self {
    Self {
      fetch,
      cache,
      reads,
    }
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  // --------------------------------------------------------------------------
  // Reads
  // --------------------------------------------------------------------------

  pub fn get_tasklist_undone(&self, tasklist_id: &str) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::TasklistUndone {
      tasklist_id: tasklist_id.to_string(),
    };
    let fetch = Arc::clone(&self.fetch);
    let tasklist_id = tasklist_id.to_string();
    let query = TasklistQuery {
      is_done: false,
      ..Default::default()
    };

    self.cache.fetch_list(&key, move || async move {
      fetch.get_by_tasklist(&tasklist_id, &query).await
    })
  }

  pub fn get_tasklist_done(&self, tasklist_id: &str, page: u32) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::TasklistDone {
      tasklist_id: tasklist_id.to_string(),
      page,
    };
    let fetch = Arc::clone(&self.fetch);
    let tasklist_id = tasklist_id.to_string();
    let query = TasklistQuery {
      is_done: true,
      page: Some(page),
      limit: Some(self.reads.done_page_size),
    };

    self.cache.fetch_list(&key, move || async move {
      fetch.get_by_tasklist(&tasklist_id, &query).await
    })
  }

  pub fn get_my_due_tasks(&self, user_id: &str) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::MyDue {
      user_id: user_id.to_string(),
    };
    self.my_tasks(&key, true)
  }

  pub fn get_my_tasks(&self, user_id: &str) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::My {
      user_id: user_id.to_string(),
    };
    self.my_tasks(&key, false)
  }

  fn my_tasks(&self, key: &TaskQueryKey, has_due_date: bool) -> Producer<Vec<Task>> {
    let fetch = Arc::clone(&self.fetch);
    let query = MyTasksQuery {
      count: self.reads.my_tasks_count,
      page: 1,
      has_due_date,
      is_done: false,
    };

    self.cache.fetch_list(key, move || async move {
      fetch
        .get_tasks_me(&query)
        .await
        .map(dirty::rectify_my_tasks)
    })
  }

  pub fn get_org_my_due_tasks(&self, user_id: &str, org_id: &str, page: u32) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::OrgMyDue {
      user_id: user_id.to_string(),
      org_id: org_id.to_string(),
      page,
    };
    self.org_tasks(
      &key,
      org_id,
      OrgTasksQuery {
        page,
        is_done: false,
        has_due_date: Some(true),
      },
    )
  }

  pub fn get_org_my_tasks(&self, user_id: &str, org_id: &str, page: u32) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::OrgMy {
      user_id: user_id.to_string(),
      org_id: org_id.to_string(),
      page,
    };
    self.org_tasks(
      &key,
      org_id,
      OrgTasksQuery {
        page,
        is_done: false,
        has_due_date: Some(false),
      },
    )
  }

  pub fn get_org_my_done_tasks(&self, user_id: &str, org_id: &str, page: u32) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::OrgMyDone {
      user_id: user_id.to_string(),
      org_id: org_id.to_string(),
      page,
    };
    self.org_tasks(
      &key,
      org_id,
      OrgTasksQuery {
        page,
        is_done: true,
        has_due_date: None,
      },
    )
  }

  fn org_tasks(&self, key: &TaskQueryKey, org_id: &str, query: OrgTasksQuery) -> Producer<Vec<Task>> {
    let fetch = Arc::clone(&self.fetch);
    let org_id = org_id.to_string();

    self.cache.fetch_list(key, move || async move {
      fetch
        .get_org_tasks_me(&org_id, &query)
        .await
        .map(dirty::rectify_my_tasks)
    })
  }

  /// Tasks the user created in an organization.
  ///
  /// Later pages are requested relative to the largest task id already cached
  /// for this organization.
  pub fn get_org_my_created_tasks(
    &self,
    user_id: &str,
    org_id: &str,
    page: u32,
  ) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::OrgMyCreated {
      user_id: user_id.to_string(),
      org_id: org_id.to_string(),
      page,
    };
    let fetch = Arc::clone(&self.fetch);
    let cache = self.cache.clone();
    let cursor_key = key.clone();
    let org_id = org_id.to_string();

    self.cache.fetch_list(&key, move || async move {
      let max_id = cache.max_listed_key::<Task, _>(&cursor_key)?;
      fetch
        .get_org_tasks_created(&org_id, page, max_id)
        .await
        .map(dirty::rectify_my_tasks)
    })
  }

  /// Tasks the user is involved in within an organization. Paged like
  /// [`TaskApi::get_org_my_created_tasks`].
  pub fn get_org_my_involves_tasks(
    &self,
    user_id: &str,
    org_id: &str,
    page: u32,
  ) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::OrgMyInvolves {
      user_id: user_id.to_string(),
      org_id: org_id.to_string(),
      page,
    };
    let fetch = Arc::clone(&self.fetch);
    let cache = self.cache.clone();
    let cursor_key = key.clone();
    let org_id = org_id.to_string();

    self.cache.fetch_list(&key, move || async move {
      let max_id = cache.max_listed_key::<Task, _>(&cursor_key)?;
      fetch
        .get_org_tasks_involves(&org_id, page, max_id)
        .await
        .map(dirty::rectify_my_tasks)
    })
  }

  pub fn get_project_tasks(&self, project_id: &str, query: ProjectTasksQuery) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::ProjectTasks {
      project_id: project_id.to_string(),
      page: query.page.unwrap_or(1),
    };
    let fetch = Arc::clone(&self.fetch);
    let project_id = project_id.to_string();

    self.cache.fetch_list(&key, move || async move {
      fetch.get_project_tasks(&project_id, &query).await
    })
  }

  pub fn get_project_done_tasks(
    &self,
    project_id: &str,
    query: ProjectTasksQuery,
  ) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::ProjectDoneTasks {
      project_id: project_id.to_string(),
      page: query.page.unwrap_or(1),
    };
    let fetch = Arc::clone(&self.fetch);
    let project_id = project_id.to_string();

    self.cache.fetch_list(&key, move || async move {
      fetch.get_project_done_tasks(&project_id, &query).await
    })
  }

  /// Undone tasks of a stage. The listing is not paged.
  pub fn get_stage_tasks(&self, stage_id: &str, query: StageTasksQuery) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::StageTasks {
      stage_id: stage_id.to_string(),
    };
    let fetch = Arc::clone(&self.fetch);
    let stage_id = stage_id.to_string();

    self.cache.fetch_list(&key, move || async move {
      fetch.get_stage_tasks(&stage_id, &query).await
    })
  }

  pub fn get_stage_done_tasks(&self, stage_id: &str, query: StageTasksQuery) -> Producer<Vec<Task>> {
    let key = TaskQueryKey::StageDoneTasks {
      stage_id: stage_id.to_string(),
      page: query.page.unwrap_or(1),
    };
    let fetch = Arc::clone(&self.fetch);
    let stage_id = stage_id.to_string();

    self.cache.fetch_list(&key, move || async move {
      fetch.get_stage_done_tasks(&stage_id, &query).await
    })
  }

  /// A single task. A cached record that is not a complete task is refetched.
  pub fn get(&self, task_id: &str, detail: Option<DetailType>) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();

    self
      .cache
      .fetch_one(task_id, move || async move { fetch.get(&id, detail).await })
  }

  /// Live view of a task's canonical record.
  pub fn observe(&self, task_id: &str) -> EntityWatch<Task> {
    self.cache.observe(task_id)
  }

  // --------------------------------------------------------------------------
  // Writes
  // --------------------------------------------------------------------------

  pub fn create(&self, options: CreateTaskOptions) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    self
      .cache
      .write_one(async move { fetch.create(&options).await })
  }

  pub fn fork(&self, task_id: &str, options: ForkTaskOptions) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self
      .cache
      .write_one(async move { fetch.fork(&id, &options).await })
  }

  /// Delete a task remotely, then drop it and its listing entries from the
  /// cache. Emits `()` once.
  pub fn delete(&self, task_id: &str) -> Producer<()> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self
      .cache
      .write_remove::<Task, _>(task_id, async move { fetch.delete(&id).await })
  }

  pub fn move_task(&self, task_id: &str, options: MoveTaskOptions) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self.patch(task_id, async move { fetch.move_task(&id, &options).await })
  }

  pub fn update_content(&self, task_id: &str, content: &str) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    let content = content.to_string();
    self.patch(task_id, async move {
      fetch.update_content(&id, &content).await
    })
  }

  pub fn update_due_date(&self, task_id: &str, due_date: DateTime<Utc>) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self.patch(task_id, async move {
      fetch.update_due_date(&id, due_date).await
    })
  }

  pub fn update_executor(&self, task_id: &str, executor_id: &str) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    let executor_id = executor_id.to_string();
    self.patch(task_id, async move {
      fetch.update_executor(&id, &executor_id).await
    })
  }

  pub fn update_involve_members(
    &self,
    task_id: &str,
    member_ids: Vec<String>,
    kind: InvolveUpdate,
  ) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self.patch(task_id, async move {
      fetch.update_involve_members(&id, &member_ids, kind).await
    })
  }

  pub fn update_note(&self, task_id: &str, note: &str) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    let note = note.to_string();
    self.patch(task_id, async move { fetch.update_note(&id, &note).await })
  }

  pub fn update_status(&self, task_id: &str, is_done: bool) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self.patch(task_id, async move {
      fetch.update_status(&id, is_done).await
    })
  }

  pub fn update(&self, task_id: &str, patch: TaskPatch) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self.patch(task_id, async move { fetch.update(&id, &patch).await })
  }

  pub fn archive(&self, task_id: &str) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self.patch(task_id, async move { fetch.archive(&id).await })
  }

  pub fn unarchive(&self, task_id: &str, stage_id: &str) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    let stage_id = stage_id.to_string();
    self.patch(task_id, async move {
      fetch.unarchive(&id, &stage_id).await
    })
  }

  pub fn update_tags(&self, task_id: &str, tag_ids: Vec<String>) -> Producer<Task> {
    let fetch = Arc::clone(&self.fetch);
    let id = task_id.to_string();
    self.patch(task_id, async move {
      fetch.update_tags(&id, &tag_ids).await
    })
  }

  fn patch<Fut>(&self, task_id: &str, request: Fut) -> Producer<Task>
  where
    Fut: std::future::Future<Output = crate::Result<TaskPatch>> + Send + 'static,
  {
    self.cache.write_patch::<Task, TaskPatch, _>(task_id, request)
  }
}
