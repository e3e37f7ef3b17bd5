//! The remote task service, one method per operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

use super::types::{
  CreateTaskOptions, DetailType, ForkTaskOptions, InvolveUpdate, MoveTaskOptions, MyTasksQuery,
  OrgTasksQuery, ProjectTasksQuery, StageTasksQuery, Task, TaskPatch, TasklistQuery,
};

#[cfg(test)]
use mockall::automock;

/// Remote access port for tasks.
///
/// Each call performs exactly one remote operation. Retries, if any, belong
/// to implementations; callers see a single outcome.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskFetch: Send + Sync {
  async fn get_by_tasklist(&self, tasklist_id: &str, query: &TasklistQuery) -> Result<Vec<Task>>;

  async fn get_tasks_me(&self, query: &MyTasksQuery) -> Result<Vec<Task>>;

  async fn get_org_tasks_me(&self, org_id: &str, query: &OrgTasksQuery) -> Result<Vec<Task>>;

  async fn get_org_tasks_created(
    &self,
    org_id: &str,
    page: u32,
    max_id: Option<String>,
  ) -> Result<Vec<Task>>;

  async fn get_org_tasks_involves(
    &self,
    org_id: &str,
    page: u32,
    max_id: Option<String>,
  ) -> Result<Vec<Task>>;

  async fn get_project_tasks(&self, project_id: &str, query: &ProjectTasksQuery)
    -> Result<Vec<Task>>;

  async fn get_project_done_tasks(
    &self,
    project_id: &str,
    query: &ProjectTasksQuery,
  ) -> Result<Vec<Task>>;

  async fn get_stage_tasks(&self, stage_id: &str, query: &StageTasksQuery) -> Result<Vec<Task>>;

  async fn get_stage_done_tasks(&self, stage_id: &str, query: &StageTasksQuery)
    -> Result<Vec<Task>>;

  async fn get(&self, task_id: &str, detail: Option<DetailType>) -> Result<Task>;

  async fn create(&self, options: &CreateTaskOptions) -> Result<Task>;

  async fn fork(&self, task_id: &str, options: &ForkTaskOptions) -> Result<Task>;

  async fn delete(&self, task_id: &str) -> Result<()>;

  async fn move_task(&self, task_id: &str, options: &MoveTaskOptions) -> Result<TaskPatch>;

  async fn update_content(&self, task_id: &str, content: &str) -> Result<TaskPatch>;

  async fn update_due_date(&self, task_id: &str, due_date: DateTime<Utc>) -> Result<TaskPatch>;

  async fn update_executor(&self, task_id: &str, executor_id: &str) -> Result<TaskPatch>;

  async fn update_involve_members(
    &self,
    task_id: &str,
    member_ids: &[String],
    kind: InvolveUpdate,
  ) -> Result<TaskPatch>;

  async fn update_note(&self, task_id: &str, note: &str) -> Result<TaskPatch>;

  async fn update_status(&self, task_id: &str, is_done: bool) -> Result<TaskPatch>;

  async fn update(&self, task_id: &str, patch: &TaskPatch) -> Result<TaskPatch>;

  async fn archive(&self, task_id: &str) -> Result<TaskPatch>;

  async fn unarchive(&self, task_id: &str, stage_id: &str) -> Result<TaskPatch>;

  async fn update_tags(&self, task_id: &str, tag_ids: &[String]) -> Result<TaskPatch>;
}
