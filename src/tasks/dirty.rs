//! Fix-ups for known inconsistencies in "my tasks" payloads.

use std::collections::HashSet;

use super::types::Task;

/// Executor id the service uses for "nobody".
const PLACEHOLDER_EXECUTOR: &str = "0";

/// Normalize a "my tasks" style listing before it is cached.
///
/// Returns the same tasks in the same order; only fields are touched.
pub fn rectify_my_tasks(tasks: Vec<Task>) -> Vec<Task> {
  tasks.into_iter().map(rectify_task).collect()
}

fn rectify_task(mut task: Task) -> Task {
  if task.project_id.is_none() {
    task.project_id = task.project.as_ref().map(|p| p.id.clone());
  }

  // A placeholder means nobody is assigned, which clears any cached executor.
  if task
    .executor_id
    .as_ref()
    .and_then(|id| id.as_deref())
    .is_some_and(|id| id.trim().is_empty() || id == PLACEHOLDER_EXECUTOR)
  {
    task.executor_id = Some(None);
  }

  task.involve_members = task.involve_members.map(dedupe);
  task.tag_ids = task.tag_ids.map(dedupe);
  task
}

fn dedupe(ids: Vec<String>) -> Vec<String> {
  let mut seen = HashSet::new();
  ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
