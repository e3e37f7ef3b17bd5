//! Task records and request option types, shaped like the service's JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A field the service may clear: `None` when absent from the payload,
/// `Some(None)` when sent as `null`.
pub type Nullable<T> = Option<Option<T>>;

/// Keeps an explicit `null` apart from a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<Nullable<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

/// Embedded project reference, as returned by the "my tasks" endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default)]
  pub name: String,
}

/// A task.
///
/// Listing endpoints return partial records, so everything beyond the id is
/// optional and omitted when unknown. Omitted fields never overwrite what the
/// cache already knows. Fields the service clears with `null` are [`Nullable`]
/// so the `null` survives into the cache.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  #[serde(rename = "_id")]
  pub id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_done: Option<bool>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub note: Nullable<String>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date: Nullable<DateTime<Utc>>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub start_date: Nullable<DateTime<Utc>>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub priority: Nullable<i32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag_ids: Option<Vec<String>>,
  #[serde(
    rename = "_executorId",
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub executor_id: Nullable<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub involve_members: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_archived: Option<bool>,
  #[serde(
    rename = "_tasklistId",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub tasklist_id: Option<String>,
  #[serde(rename = "_stageId", default, skip_serializing_if = "Option::is_none")]
  pub stage_id: Option<String>,
  #[serde(
    rename = "_projectId",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub project_id: Option<String>,
  #[serde(
    rename = "_creatorId",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub creator_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project: Option<ProjectRef>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub accomplished: Nullable<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated: Option<DateTime<Utc>>,
}

/// Partial update of a task, as sent to and returned by update endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_done: Option<bool>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub note: Nullable<String>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date: Nullable<DateTime<Utc>>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub start_date: Nullable<DateTime<Utc>>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub priority: Nullable<i32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag_ids: Option<Vec<String>>,
  #[serde(
    rename = "_executorId",
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub executor_id: Nullable<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub involve_members: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_archived: Option<bool>,
  #[serde(
    rename = "_tasklistId",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub tasklist_id: Option<String>,
  #[serde(rename = "_stageId", default, skip_serializing_if = "Option::is_none")]
  pub stage_id: Option<String>,
  #[serde(
    rename = "_projectId",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub project_id: Option<String>,
  #[serde(
    default,
    deserialize_with = "nullable",
    skip_serializing_if = "Option::is_none"
  )]
  pub accomplished: Nullable<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated: Option<DateTime<Utc>>,
}

/// How much of a task to return from a single get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailType {
  Complete,
}

impl DetailType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Complete => "complete",
    }
  }
}

/// Query for the tasks of a tasklist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TasklistQuery {
  pub is_done: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub page: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<u32>,
}

/// Query for the current user's tasks across projects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTasksQuery {
  pub count: u32,
  pub page: u32,
  pub has_due_date: bool,
  pub is_done: bool,
}

/// Query for the current user's tasks inside one organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgTasksQuery {
  pub page: u32,
  pub is_done: bool,
  #[serde(rename = "hasDuedate", skip_serializing_if = "Option::is_none")]
  pub has_due_date: Option<bool>,
}

/// Query for the tasks of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTasksQuery {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub page: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub count: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fields: Option<String>,
}

/// Query for the tasks of a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTasksQuery {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub page: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub limit: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fields: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskOptions {
  pub content: String,
  #[serde(rename = "_tasklistId")]
  pub tasklist_id: String,
  #[serde(rename = "_stageId", skip_serializing_if = "Option::is_none")]
  pub stage_id: Option<String>,
  #[serde(rename = "_executorId", skip_serializing_if = "Option::is_none")]
  pub executor_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag_ids: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub involve_members: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkTaskOptions {
  #[serde(rename = "_stageId")]
  pub stage_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub update_assign: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskOptions {
  #[serde(rename = "_stageId")]
  pub stage_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub with_tags: Option<bool>,
}

/// How an involved-members update applies its member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvolveUpdate {
  /// Replace the whole list
  Replace,
  Add,
  Remove,
}

impl InvolveUpdate {
  /// Request body field for this kind of update.
  pub fn field(self) -> &'static str {
    match self {
      Self::Replace => "involveMembers",
      Self::Add => "addInvolvers",
      Self::Remove => "delInvolvers",
    }
  }
}
