//! Command line subcommands and how each maps onto the task API

use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;

use taskdeck::config::Config;
use taskdeck::tasks::{
  CreateTaskOptions, DetailType, ForkTaskOptions, InvolveUpdate, MoveTaskOptions,
  ProjectTasksQuery, StageTasksQuery, Task, TaskApi,
};
use taskdeck::Producer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrgFacet {
  /// Undone tasks with a due date
  Due,
  /// Undone tasks
  Todo,
  Done,
  Created,
  Involves,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InvolveMode {
  Replace,
  Add,
  Remove,
}

impl From<InvolveMode> for InvolveUpdate {
  fn from(mode: InvolveMode) -> Self {
    match mode {
      InvolveMode::Replace => InvolveUpdate::Replace,
      InvolveMode::Add => InvolveUpdate::Add,
      InvolveMode::Remove => InvolveUpdate::Remove,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
  /// List your undone tasks
  #[command(visible_alias = "my")]
  Mine {
    /// Only tasks with a due date
    #[arg(long)]
    due: bool,
  },
  /// List the tasks of a tasklist
  Tasklist {
    id: String,
    #[arg(long)]
    done: bool,
    #[arg(long, default_value_t = 1)]
    page: u32,
  },
  /// List the tasks of a project
  Project {
    id: String,
    #[arg(long)]
    done: bool,
    #[arg(long)]
    page: Option<u32>,
  },
  /// List the tasks of a stage
  Stage {
    id: String,
    #[arg(long)]
    done: bool,
    #[arg(long)]
    page: Option<u32>,
  },
  /// List your tasks inside an organization
  Org {
    org: String,
    #[arg(value_enum)]
    facet: OrgFacet,
    #[arg(long, default_value_t = 1)]
    page: u32,
  },
  /// Show one task
  #[command(visible_alias = "show")]
  Get {
    id: String,
    /// Ask for the complete record
    #[arg(long)]
    complete: bool,
  },
  /// Create a task in a tasklist
  Create {
    tasklist: String,
    content: String,
    #[arg(long)]
    stage: Option<String>,
    #[arg(long)]
    executor: Option<String>,
    #[arg(long)]
    due: Option<DateTime<Utc>>,
    #[arg(long)]
    note: Option<String>,
  },
  /// Copy a task into a stage
  Fork {
    id: String,
    stage: String,
  },
  Note {
    id: String,
    note: String,
  },
  Content {
    id: String,
    content: String,
  },
  /// Mark a task done
  Done { id: String },
  /// Mark a task not done
  Undone { id: String },
  Due {
    id: String,
    date: DateTime<Utc>,
  },
  Executor {
    id: String,
    user: String,
  },
  /// Change who is involved in a task
  Involve {
    id: String,
    #[arg(value_enum)]
    mode: InvolveMode,
    #[arg(required = true)]
    members: Vec<String>,
  },
  /// Replace a task's tags
  Tags {
    id: String,
    tags: Vec<String>,
  },
  Archive { id: String },
  /// Restore an archived task into a stage
  Unarchive {
    id: String,
    stage: String,
  },
  /// Move a task to another stage
  Move {
    id: String,
    stage: String,
    #[arg(long)]
    with_tags: bool,
  },
  #[command(visible_alias = "rm")]
  Delete { id: String },
}

/// Run one command and print its result as JSON.
pub async fn run(command: Command, api: &TaskApi, config: &Config) -> Result<()> {
  match command {
    Command::Mine { due } => {
      let user = config.user_id()?;
      if due {
        print_list(api.get_my_due_tasks(user)).await
      } else {
        print_list(api.get_my_tasks(user)).await
      }
    }
    Command::Tasklist { id, done, page } => {
      if done {
        print_list(api.get_tasklist_done(&id, page)).await
      } else {
        print_list(api.get_tasklist_undone(&id)).await
      }
    }
    Command::Project { id, done, page } => {
      let query = ProjectTasksQuery {
        page,
        ..Default::default()
      };
      if done {
        print_list(api.get_project_done_tasks(&id, query)).await
      } else {
        print_list(api.get_project_tasks(&id, query)).await
      }
    }
    Command::Stage { id, done, page } => {
      let query = StageTasksQuery {
        page,
        ..Default::default()
      };
      if done {
        print_list(api.get_stage_done_tasks(&id, query)).await
      } else {
        print_list(api.get_stage_tasks(&id, query)).await
      }
    }
    Command::Org { org, facet, page } => {
      let user = config.user_id()?;
      let tasks = match facet {
        OrgFacet::Due => api.get_org_my_due_tasks(user, &org, page),
        OrgFacet::Todo => api.get_org_my_tasks(user, &org, page),
        OrgFacet::Done => api.get_org_my_done_tasks(user, &org, page),
        OrgFacet::Created => api.get_org_my_created_tasks(user, &org, page),
        OrgFacet::Involves => api.get_org_my_involves_tasks(user, &org, page),
      };
      print_list(tasks).await
    }
    Command::Get { id, complete } => {
      let detail = complete.then_some(DetailType::Complete);
      print_one(api.get(&id, detail)).await
    }
    Command::Create {
      tasklist,
      content,
      stage,
      executor,
      due,
      note,
    } => {
      let options = CreateTaskOptions {
        content,
        tasklist_id: tasklist,
        stage_id: stage,
        executor_id: executor,
        due_date: due,
        note,
        ..Default::default()
      };
      print_one(api.create(options)).await
    }
    Command::Fork { id, stage } => {
      let options = ForkTaskOptions {
        stage_id: stage,
        update_assign: None,
      };
      print_one(api.fork(&id, options)).await
    }
    Command::Note { id, note } => print_one(api.update_note(&id, &note)).await,
    Command::Content { id, content } => print_one(api.update_content(&id, &content)).await,
    Command::Done { id } => print_one(api.update_status(&id, true)).await,
    Command::Undone { id } => print_one(api.update_status(&id, false)).await,
    Command::Due { id, date } => print_one(api.update_due_date(&id, date)).await,
    Command::Executor { id, user } => print_one(api.update_executor(&id, &user)).await,
    Command::Involve { id, mode, members } => {
      print_one(api.update_involve_members(&id, members, mode.into())).await
    }
    Command::Tags { id, tags } => print_one(api.update_tags(&id, tags)).await,
    Command::Archive { id } => print_one(api.archive(&id)).await,
    Command::Unarchive { id, stage } => print_one(api.unarchive(&id, &stage)).await,
    Command::Move {
      id,
      stage,
      with_tags,
    } => {
      let options = MoveTaskOptions {
        stage_id: stage,
        with_tags: with_tags.then_some(true),
      };
      print_one(api.move_task(&id, options)).await
    }
    Command::Delete { id } => {
      api.delete(&id).first().await?;
      print_json(&serde_json::json!({ "deleted": id }))
    }
  }
}

async fn print_list(tasks: Producer<Vec<Task>>) -> Result<()> {
  print_json(&tasks.first().await?)
}

async fn print_one(task: Producer<Task>) -> Result<()> {
  print_json(&task.first().await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let text =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to encode output: {}", e))?;
  println!("{}", text);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  fn parse(args: &[&str]) -> Command {
    let mut argv = vec!["taskdeck"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
  }

  #[test]
  fn test_mine_defaults() {
    assert_eq!(parse(&["mine"]), Command::Mine { due: false });
    assert_eq!(parse(&["my", "--due"]), Command::Mine { due: true });
  }

  #[test]
  fn test_tasklist_page_defaults_to_first() {
    assert_eq!(
      parse(&["tasklist", "l1", "--done"]),
      Command::Tasklist {
        id: "l1".to_string(),
        done: true,
        page: 1,
      }
    );
  }

  #[test]
  fn test_org_facet() {
    assert_eq!(
      parse(&["org", "o1", "involves", "--page", "3"]),
      Command::Org {
        org: "o1".to_string(),
        facet: OrgFacet::Involves,
        page: 3,
      }
    );
  }

  #[test]
  fn test_due_date_is_parsed() {
    let Command::Due { id, date } = parse(&["due", "t1", "2017-03-01T10:00:00Z"]) else {
      panic!("expected due command");
    };
    assert_eq!(id, "t1");
    assert_eq!(date.to_rfc3339(), "2017-03-01T10:00:00+00:00");
  }

  #[test]
  fn test_involve_needs_members() {
    let argv = ["taskdeck", "involve", "t1", "add"];
    assert!(Cli::try_parse_from(argv).is_err());

    assert_eq!(
      parse(&["involve", "t1", "remove", "u1", "u2"]),
      Command::Involve {
        id: "t1".to_string(),
        mode: InvolveMode::Remove,
        members: vec!["u1".to_string(), "u2".to_string()],
      }
    );
  }

  #[test]
  fn test_delete_alias() {
    assert_eq!(
      parse(&["rm", "t1"]),
      Command::Delete {
        id: "t1".to_string()
      }
    );
  }

  #[test]
  fn test_unknown_command_is_rejected() {
    assert!(Cli::try_parse_from(["taskdeck", "frobnicate"]).is_err());
  }
}
