use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::eyre;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::Config;
use crate::error::{Result, TaskError};

use super::fetch::TaskFetch;
use super::types::{
  CreateTaskOptions, DetailType, ForkTaskOptions, InvolveUpdate, MoveTaskOptions, MyTasksQuery,
  OrgTasksQuery, ProjectTasksQuery, StageTasksQuery, Task, TaskPatch, TasklistQuery,
};

/// Task service client over HTTP
#[derive(Clone)]
pub struct HttpTaskFetch {
  client: reqwest::Client,
  base: Url,
  token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CursorQuery<'a> {
  page: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingParams<'a> {
  is_done: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  page: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  count: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  limit: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  fields: Option<&'a str>,
}

impl<'a> ListingParams<'a> {
  fn project(is_done: bool, query: &'a ProjectTasksQuery) -> Self {
    Self {
      is_done,
      page: query.page,
      count: query.count,
      limit: None,
      fields: query.fields.as_deref(),
    }
  }

  fn stage(is_done: bool, query: &'a StageTasksQuery) -> Self {
    Self {
      is_done,
      page: query.page,
      count: None,
      limit: query.limit,
      fields: query.fields.as_deref(),
    }
  }
}

impl HttpTaskFetch {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let token = Config::get_api_token()?;
    Self::with_token(&config.api.url, token)
  }

  pub fn with_token(base_url: &str, token: impl Into<String>) -> color_eyre::Result<Self> {
    let base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API url {}: {}", base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("API url {} cannot hold paths", base_url));
    }

    let client = reqwest::Client::builder()
      .user_agent(concat!("taskdeck/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token: token.into(),
    })
  }

  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    // Checked in the constructor
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
    self
      .client
      .request(method, self.endpoint(segments))
      .bearer_auth(&self.token)
  }

  async fn send(&self, request: RequestBuilder) -> Result<Response> {
    let response = request
      .send()
      .await
      .map_err(|e| TaskError::transport(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TaskError::remote(status.as_u16(), error_message(&body, status)))
  }

  async fn fetch_json<R: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<R> {
    self
      .send(request)
      .await?
      .json()
      .await
      .map_err(|e| TaskError::decode(what, e))
  }

  async fn put_patch(&self, task_id: &str, field: &str, body: Value) -> Result<TaskPatch> {
    let request = self.request(Method::PUT, &["tasks", task_id, field]).json(&body);
    self.fetch_json(request, "task update").await
  }
}

/// Pull a readable message out of an error body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
    .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
    .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string())
}

#[async_trait]
impl TaskFetch for HttpTaskFetch {
  async fn get_by_tasklist(&self, tasklist_id: &str, query: &TasklistQuery) -> Result<Vec<Task>> {
    let request = self
      .request(Method::GET, &["tasklists", tasklist_id, "tasks"])
      .query(query);
    self.fetch_json(request, "tasklist tasks").await
  }

  async fn get_tasks_me(&self, query: &MyTasksQuery) -> Result<Vec<Task>> {
    let request = self.request(Method::GET, &["tasks", "me"]).query(query);
    self.fetch_json(request, "my tasks").await
  }

  async fn get_org_tasks_me(&self, org_id: &str, query: &OrgTasksQuery) -> Result<Vec<Task>> {
    let request = self
      .request(Method::GET, &["organizations", org_id, "tasks", "me"])
      .query(query);
    self.fetch_json(request, "organization tasks").await
  }

  async fn get_org_tasks_created(
    &self,
    org_id: &str,
    page: u32,
    max_id: Option<String>,
  ) -> Result<Vec<Task>> {
    let query = CursorQuery {
      page,
      max_id: max_id.as_deref(),
    };
    let request = self
      .request(Method::GET, &["organizations", org_id, "tasks", "me", "created"])
      .query(&query);
    self.fetch_json(request, "created tasks").await
  }

  async fn get_org_tasks_involves(
    &self,
    org_id: &str,
    page: u32,
    max_id: Option<String>,
  ) -> Result<Vec<Task>> {
    let query = CursorQuery {
      page,
      max_id: max_id.as_deref(),
    };
    let request = self
      .request(Method::GET, &["organizations", org_id, "tasks", "me", "involves"])
      .query(&query);
    self.fetch_json(request, "involved tasks").await
  }

  async fn get_project_tasks(
    &self,
    project_id: &str,
    query: &ProjectTasksQuery,
  ) -> Result<Vec<Task>> {
    let query = ListingParams::project(false, query);
    let request = self
      .request(Method::GET, &["projects", project_id, "tasks"])
      .query(&query);
    self.fetch_json(request, "project tasks").await
  }

  async fn get_project_done_tasks(
    &self,
    project_id: &str,
    query: &ProjectTasksQuery,
  ) -> Result<Vec<Task>> {
    let query = ListingParams::project(true, query);
    let request = self
      .request(Method::GET, &["projects", project_id, "tasks"])
      .query(&query);
    self.fetch_json(request, "project done tasks").await
  }

  async fn get_stage_tasks(&self, stage_id: &str, query: &StageTasksQuery) -> Result<Vec<Task>> {
    let query = ListingParams::stage(false, query);
    let request = self
      .request(Method::GET, &["stages", stage_id, "tasks"])
      .query(&query);
    self.fetch_json(request, "stage tasks").await
  }

  async fn get_stage_done_tasks(
    &self,
    stage_id: &str,
    query: &StageTasksQuery,
  ) -> Result<Vec<Task>> {
    let query = ListingParams::stage(true, query);
    let request = self
      .request(Method::GET, &["stages", stage_id, "tasks"])
      .query(&query);
    self.fetch_json(request, "stage done tasks").await
  }

  async fn get(&self, task_id: &str, detail: Option<DetailType>) -> Result<Task> {
    let mut request = self.request(Method::GET, &["tasks", task_id]);
    if let Some(detail) = detail {
      request = request.query(&[("detailType", detail.as_str())]);
    }
    self.fetch_json(request, "task").await
  }

  async fn create(&self, options: &CreateTaskOptions) -> Result<Task> {
    let request = self.request(Method::POST, &["tasks"]).json(options);
    self.fetch_json(request, "created task").await
  }

  async fn fork(&self, task_id: &str, options: &ForkTaskOptions) -> Result<Task> {
    let request = self
      .request(Method::PUT, &["tasks", task_id, "fork"])
      .json(options);
    self.fetch_json(request, "forked task").await
  }

  async fn delete(&self, task_id: &str) -> Result<()> {
    self
      .send(self.request(Method::DELETE, &["tasks", task_id]))
      .await?;
    Ok(())
  }

  async fn move_task(&self, task_id: &str, options: &MoveTaskOptions) -> Result<TaskPatch> {
    let request = self
      .request(Method::PUT, &["tasks", task_id, "move"])
      .json(options);
    self.fetch_json(request, "task move").await
  }

  async fn update_content(&self, task_id: &str, content: &str) -> Result<TaskPatch> {
    self
      .put_patch(task_id, "content", json!({ "content": content }))
      .await
  }

  async fn update_due_date(&self, task_id: &str, due_date: DateTime<Utc>) -> Result<TaskPatch> {
    self
      .put_patch(task_id, "dueDate", json!({ "dueDate": due_date }))
      .await
  }

  async fn update_executor(&self, task_id: &str, executor_id: &str) -> Result<TaskPatch> {
    self
      .put_patch(task_id, "_executorId", json!({ "_executorId": executor_id }))
      .await
  }

  async fn update_involve_members(
    &self,
    task_id: &str,
    member_ids: &[String],
    kind: InvolveUpdate,
  ) -> Result<TaskPatch> {
    let mut body = serde_json::Map::new();
    body.insert(kind.field().to_string(), json!(member_ids));
    self
      .put_patch(task_id, "involveMembers", Value::Object(body))
      .await
  }

  async fn update_note(&self, task_id: &str, note: &str) -> Result<TaskPatch> {
    self.put_patch(task_id, "note", json!({ "note": note })).await
  }

  async fn update_status(&self, task_id: &str, is_done: bool) -> Result<TaskPatch> {
    self
      .put_patch(task_id, "isDone", json!({ "isDone": is_done }))
      .await
  }

  async fn update(&self, task_id: &str, patch: &TaskPatch) -> Result<TaskPatch> {
    let request = self.request(Method::PUT, &["tasks", task_id]).json(patch);
    self.fetch_json(request, "task update").await
  }

  async fn archive(&self, task_id: &str) -> Result<TaskPatch> {
    let request = self.request(Method::PUT, &["tasks", task_id, "archive"]);
    self.fetch_json(request, "task archive").await
  }

  async fn unarchive(&self, task_id: &str, stage_id: &str) -> Result<TaskPatch> {
    let request = self
      .request(Method::DELETE, &["tasks", task_id, "archive"])
      .query(&[("_stageId", stage_id)]);
    self.fetch_json(request, "task unarchive").await
  }

  async fn update_tags(&self, task_id: &str, tag_ids: &[String]) -> Result<TaskPatch> {
    self
      .put_patch(task_id, "tagIds", json!({ "tagIds": tag_ids }))
      .await
  }
}
