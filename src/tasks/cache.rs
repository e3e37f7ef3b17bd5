//! Caching implementations for task types.

use sha2::{Digest, Sha256};

use crate::cache::{Cacheable, QueryKey};

use super::types::Task;

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Task {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn entity_type() -> &'static str {
    "task"
  }

  fn key_field() -> &'static str {
    "_id"
  }

  fn required_fields() -> &'static [&'static str] {
    &[
      "_id",
      "content",
      "isDone",
      "note",
      "tagIds",
      "involveMembers",
      "isArchived",
      "created",
      "updated",
    ]
  }
}

// ============================================================================
// Query key types
// ============================================================================

/// Listing keys for task queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskQueryKey {
  /// Undone tasks of a tasklist
  TasklistUndone { tasklist_id: String },
  /// One page of done tasks of a tasklist
  TasklistDone { tasklist_id: String, page: u32 },
  /// The user's undone tasks that have a due date
  MyDue { user_id: String },
  /// The user's undone tasks
  My { user_id: String },
  OrgMyDue {
    user_id: String,
    org_id: String,
    page: u32,
  },
  OrgMy {
    user_id: String,
    org_id: String,
    page: u32,
  },
  OrgMyDone {
    user_id: String,
    org_id: String,
    page: u32,
  },
  OrgMyCreated {
    user_id: String,
    org_id: String,
    page: u32,
  },
  OrgMyInvolves {
    user_id: String,
    org_id: String,
    page: u32,
  },
  ProjectTasks { project_id: String, page: u32 },
  ProjectDoneTasks { project_id: String, page: u32 },
  StageTasks { stage_id: String },
  StageDoneTasks { stage_id: String, page: u32 },
}

impl TaskQueryKey {
  fn page(&self) -> Option<u32> {
    match self {
      Self::TasklistUndone { .. } | Self::MyDue { .. } | Self::My { .. } | Self::StageTasks { .. } => {
        None
      }
      Self::TasklistDone { page, .. }
      | Self::OrgMyDue { page, .. }
      | Self::OrgMy { page, .. }
      | Self::OrgMyDone { page, .. }
      | Self::OrgMyCreated { page, .. }
      | Self::OrgMyInvolves { page, .. }
      | Self::ProjectTasks { page, .. }
      | Self::ProjectDoneTasks { page, .. }
      | Self::StageDoneTasks { page, .. } => Some(*page),
    }
  }
}

impl QueryKey for TaskQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self.page() {
      Some(page) => format!("{}:page={}", self.family(), page),
      None => self.family(),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  fn family(&self) -> String {
    match self {
      Self::TasklistUndone { tasklist_id } => format!("tasklist_undone:{}", tasklist_id),
      Self::TasklistDone { tasklist_id, .. } => format!("tasklist_done:{}", tasklist_id),
      Self::MyDue { user_id } => format!("my_due:{}", user_id),
      Self::My { user_id } => format!("my:{}", user_id),
      Self::OrgMyDue {
        user_id, org_id, ..
      } => format!("org_my_due:{}:{}", org_id, user_id),
      Self::OrgMy {
        user_id, org_id, ..
      } => format!("org_my:{}:{}", org_id, user_id),
      Self::OrgMyDone {
        user_id, org_id, ..
      } => format!("org_my_done:{}:{}", org_id, user_id),
      Self::OrgMyCreated {
        user_id, org_id, ..
      } => format!("org_my_created:{}:{}", org_id, user_id),
      Self::OrgMyInvolves {
        user_id, org_id, ..
      } => format!("org_my_involves:{}:{}", org_id, user_id),
      Self::ProjectTasks { project_id, .. } => format!("project:{}", project_id),
      Self::ProjectDoneTasks { project_id, .. } => format!("project_done:{}", project_id),
      Self::StageTasks { stage_id } => format!("stage:{}", stage_id),
      Self::StageDoneTasks { stage_id, .. } => format!("stage_done:{}", stage_id),
    }
  }

  fn description(&self) -> String {
    match self.page() {
      Some(page) => format!("{} (page {})", self.family(), page),
      None => self.family(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_pages_hash_apart_but_share_family() {
    let first = TaskQueryKey::TasklistDone {
      tasklist_id: "l1".to_string(),
      page: 1,
    };
    let second = TaskQueryKey::TasklistDone {
      tasklist_id: "l1".to_string(),
      page: 2,
    };

    assert_ne!(first.cache_hash(), second.cache_hash());
    assert_eq!(first.family(), second.family());
    assert_eq!(first.cache_hash().len(), 64);
  }

  #[test]
  fn test_scopes_do_not_collide() {
    let undone = TaskQueryKey::TasklistUndone {
      tasklist_id: "x".to_string(),
    };
    let stage = TaskQueryKey::StageTasks {
      stage_id: "x".to_string(),
    };
    assert_ne!(undone.cache_hash(), stage.cache_hash());
  }

  #[test]
  fn test_complete_task_schema() {
    let complete = json!({
      "_id": "t1",
      "content": "c",
      "isDone": false,
      "note": "",
      "tagIds": [],
      "involveMembers": ["u1"],
      "isArchived": false,
      "created": "2017-01-01T00:00:00Z",
      "updated": "2017-01-01T00:00:00Z"
    });
    assert!(Task::check_schema(&complete));

    let listed = json!({"_id": "t1", "content": "c", "isDone": false});
    assert!(!Task::check_schema(&listed));
  }
}
