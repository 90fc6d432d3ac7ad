//! Offline stand-in for the task service.
//!
//! Mirrors the server's response contract
//! closely enough to develop and test
//! against: the same codes, the same
//! defaults, the same side effects.

use std::collections::{
  BTreeMap,
  VecDeque
};

use anyhow::anyhow;
use chrono::Utc;
use docket_shared::{
  ApiResponse,
  Executor,
  NewTask,
  QueryType,
  Task,
  TaskListFilter,
  TaskPage,
  TaskPatch,
  TaskStatus,
  UserRef
};
use parking_lot::Mutex;
use tracing::{
  debug,
  info,
  instrument
};

use crate::api::TaskApi;
use crate::datastore::DataStore;

pub const NOT_FOUND: &str = "404";
pub const BAD_REQUEST: &str = "400";
pub const TODO_NOT_FOUND: &str =
  "TODO_NOT_FOUND";
pub const STATUS_INVALID: &str =
  "TEAM_TASK_OPERATE_STATUS_INVALID";

/// Status the server gives executors that
/// arrive without one.
pub const DEFAULT_EXECUTOR_STATUS:
  TaskStatus = TaskStatus::ToReceive;

#[derive(Debug, Clone)]
enum InjectedFailure {
  Response {
    code:    String,
    message: String
  },
  Transport(String)
}

#[derive(Debug, Default)]
struct MockState {
  tasks:    Vec<Task>,
  failures: VecDeque<InjectedFailure>,
  calls:    BTreeMap<&'static str, usize>
}

impl MockState {
  fn enter<T>(
    &mut self,
    op: &'static str
  ) -> Option<anyhow::Result<ApiResponse<T>>>
  {
    *self.calls.entry(op).or_insert(0) += 1;
    let failure = self.failures.pop_front()?;
    debug!(op, ?failure, "injected failure");
    Some(match failure {
      | InjectedFailure::Response {
        code,
        message
      } => {
        Ok(ApiResponse::failure(code, message))
      }
      | InjectedFailure::Transport(msg) => {
        Err(anyhow!(msg))
      }
    })
  }

  fn find_mut(
    &mut self,
    id: &str
  ) -> Option<&mut Task> {
    self.tasks.iter_mut().find(|t| t.id == id)
  }

  fn next_id(&self) -> String {
    let max = self
      .tasks
      .iter()
      .filter_map(|t| {
        t.id.strip_prefix('T')?.parse::<u64>().ok()
      })
      .max()
      .unwrap_or(0);
    format!("T{}", max + 1)
  }
}

#[derive(Debug)]
pub struct MockTaskApi {
  state:        Mutex<MockState>,
  store:        Option<DataStore>,
  current_user: String
}

fn now_stamp() -> String {
  Utc::now()
    .format("%Y-%m-%d %H:%M:%S")
    .to_string()
}

fn with_default_status(
  executors: Vec<Executor>
) -> Vec<Executor> {
  executors
    .into_iter()
    .map(|mut e| {
      if e.status.is_none() {
        e.status =
          Some(DEFAULT_EXECUTOR_STATUS);
      }
      e
    })
    .collect()
}

fn set_status(task: &mut Task, status: TaskStatus) {
  if task.status == status {
    return;
  }
  if status == TaskStatus::Completed {
    task.finish_time = Some(now_stamp());
    task.progress_percent = 100;
  } else if task.status
    == TaskStatus::Completed
  {
    task.finish_time = None;
  }
  task.status = status;
}

impl MockTaskApi {
  pub fn in_memory(tasks: Vec<Task>) -> Self {
    Self {
      state:        Mutex::new(MockState {
        tasks,
        ..MockState::default()
      }),
      store:        None,
      current_user: "me".to_string()
    }
  }

  /// Backs the mock with a datastore;
  /// every accepted change is written
  /// through.
  #[instrument(skip(store))]
  pub fn open(
    store: DataStore
  ) -> anyhow::Result<Self> {
    let tasks = store.load_tasks()?;
    info!(
      count = tasks.len(),
      "loaded offline tasks"
    );
    Ok(Self {
      state:        Mutex::new(MockState {
        tasks,
        ..MockState::default()
      }),
      store:        Some(store),
      current_user: "me".to_string()
    })
  }

  pub fn with_current_user(
    mut self,
    user_id: impl Into<String>
  ) -> Self {
    self.current_user = user_id.into();
    self
  }

  /// The next call, whatever it is,
  /// answers with `code`.
  pub fn fail_next(
    &self,
    code: impl Into<String>,
    message: impl Into<String>
  ) {
    self.state.lock().failures.push_back(
      InjectedFailure::Response {
        code:    code.into(),
        message: message.into()
      }
    );
  }

  /// The next call errors before any
  /// response arrives.
  pub fn fail_next_transport(
    &self,
    message: impl Into<String>
  ) {
    self.state.lock().failures.push_back(
      InjectedFailure::Transport(
        message.into()
      )
    );
  }

  pub fn calls(&self, op: &str) -> usize {
    self
      .state
      .lock()
      .calls
      .get(op)
      .copied()
      .unwrap_or(0)
  }

  pub fn tasks(&self) -> Vec<Task> {
    self.state.lock().tasks.clone()
  }

  pub fn task(&self, id: &str) -> Option<Task> {
    self
      .state
      .lock()
      .tasks
      .iter()
      .find(|t| t.id == id)
      .cloned()
  }

  fn persist(
    &self,
    tasks: &[Task]
  ) -> anyhow::Result<()> {
    if let Some(store) = self.store.as_ref() {
      store.save_tasks(tasks)?;
    }
    Ok(())
  }

  fn matches(
    &self,
    task: &Task,
    filter: &TaskListFilter
  ) -> bool {
    let status_ok = match filter
      .statuses
      .as_deref()
    {
      | Some(list) if !list.is_empty() => {
        list.contains(&task.status)
      }
      | _ => task.status != TaskStatus::Deleted
    };
    if !status_ok {
      return false;
    }

    if task.parent_id != filter.parent_id {
      return false;
    }

    if let Some(ids) =
      filter.assignee_ids.as_deref()
      && !ids.is_empty()
      && !task
        .executors
        .iter()
        .any(|e| ids.contains(&e.user_id))
    {
      return false;
    }

    if let Some(project) =
      filter.project_id.as_deref()
      && task.project_id.as_deref()
        != Some(project)
    {
      return false;
    }

    match filter.query_type {
      | QueryType::All => true,
      | QueryType::AssignedByMe => {
        task.owner_id == self.current_user
      }
      | QueryType::ExecutedByMe => {
        task.has_executor(&self.current_user)
      }
    }
  }
}

impl TaskApi for MockTaskApi {
  #[instrument(skip(self))]
  async fn fetch_task_list(
    &self,
    filter: TaskListFilter
  ) -> anyhow::Result<ApiResponse<TaskPage>>
  {
    let mut state = self.state.lock();
    if let Some(out) = state.enter("fetch_task_list")
    {
      return out;
    }

    let matching: Vec<&Task> = state
      .tasks
      .iter()
      .filter(|t| self.matches(t, &filter))
      .collect();
    let total = matching.len();
    let page = filter.page.max(1);
    let page_size = filter.page_size.max(1);
    let start = (page as usize - 1)
      * page_size as usize;
    let list: Vec<Task> = matching
      .into_iter()
      .skip(start)
      .take(page_size as usize)
      .cloned()
      .collect();
    debug!(
      total,
      returned = list.len(),
      page,
      "listed tasks"
    );

    Ok(ApiResponse::ok(TaskPage {
      list,
      total,
      page,
      page_size
    }))
  }

  #[instrument(skip(self))]
  async fn fetch_task(
    &self,
    id: &str
  ) -> anyhow::Result<ApiResponse<Task>> {
    let mut state = self.state.lock();
    if let Some(out) = state.enter("fetch_task") {
      return out;
    }
    Ok(match state.find_mut(id) {
      | Some(task) => ApiResponse::ok(task.clone()),
      | None => ApiResponse::failure(
        NOT_FOUND,
        "task not found"
      )
    })
  }

  #[instrument(skip(self, new_task), fields(title_len = new_task.title.len()))]
  async fn create_task(
    &self,
    new_task: NewTask
  ) -> anyhow::Result<ApiResponse<Task>> {
    let mut state = self.state.lock();
    if let Some(out) = state.enter("create_task")
    {
      return out;
    }
    if new_task.title.trim().is_empty() {
      return Ok(ApiResponse::failure(
        BAD_REQUEST,
        "title is required"
      ));
    }
    if let Some(parent) =
      new_task.parent_id.as_deref()
      && state.find_mut(parent).is_none()
    {
      return Ok(ApiResponse::failure(
        NOT_FOUND,
        "parent task not found"
      ));
    }

    let stamp = now_stamp();
    let task = Task {
      id:               state.next_id(),
      parent_id:        new_task.parent_id,
      owner_id:         new_task.owner_id,
      owner_name:       new_task.owner_name,
      title:            new_task.title.trim().to_string(),
      description:      new_task.description,
      status:           TaskStatus::Pending,
      is_important:     false,
      executors:        with_default_status(
        new_task.executors
      ),
      progress_percent: 0,
      progress_note:    None,
      project_id:       new_task.project_id,
      deadline:         new_task.deadline,
      finish_time:      None,
      created:          Some(stamp.clone()),
      modified:         Some(stamp)
    };
    state.tasks.push(task.clone());
    self.persist(&state.tasks)?;
    info!(id = %task.id, "created task");
    Ok(ApiResponse::ok(task))
  }

  #[instrument(skip(self, patch), fields(id = %patch.id))]
  async fn update_task(
    &self,
    patch: TaskPatch
  ) -> anyhow::Result<ApiResponse<Task>> {
    let mut state = self.state.lock();
    if let Some(out) = state.enter("update_task")
    {
      return out;
    }
    let Some(task) = state.find_mut(&patch.id)
    else {
      return Ok(ApiResponse::failure(
        NOT_FOUND,
        "task not found"
      ));
    };

    if let Some(title) = patch.title {
      if title.trim().is_empty() {
        return Ok(ApiResponse::failure(
          BAD_REQUEST,
          "title is required"
        ));
      }
      task.title = title;
    }
    if let Some(description) = patch.description
    {
      task.description = description;
    }
    if let Some(important) = patch.is_important
    {
      task.is_important = important;
    }
    if let Some(percent) = patch.progress_percent
    {
      task.progress_percent = percent.min(100);
    }
    if let Some(note) = patch.progress_note {
      task.progress_note = Some(note);
    }
    if let Some(executors) = patch.executors {
      task.executors =
        with_default_status(executors);
    }
    if let Some(status) = patch.status {
      set_status(task, status);
    }
    task.modified = Some(now_stamp());

    let updated = task.clone();
    self.persist(&state.tasks)?;
    debug!(id = %updated.id, "updated task");
    Ok(ApiResponse::ok(updated))
  }

  #[instrument(skip(self))]
  async fn update_executor_status(
    &self,
    task_id: &str,
    executor_id: &str,
    status: TaskStatus
  ) -> anyhow::Result<ApiResponse<()>> {
    let mut state = self.state.lock();
    if let Some(out) =
      state.enter("update_executor_status")
    {
      return out;
    }
    let Some(task) = state.find_mut(task_id)
    else {
      return Ok(ApiResponse::failure(
        NOT_FOUND,
        "task not found"
      ));
    };
    let Some(executor) =
      task.executor_mut(executor_id)
    else {
      return Ok(ApiResponse::failure(
        NOT_FOUND,
        "executor not found"
      ));
    };
    executor.status = Some(status);

    // task follows its executors into and
    // out of completed
    let all_done = task.executors.iter().all(
      |e| e.status == Some(TaskStatus::Completed)
    );
    if all_done {
      set_status(task, TaskStatus::Completed);
    } else if task.status
      == TaskStatus::Completed
    {
      set_status(task, TaskStatus::InProgress);
    }
    task.modified = Some(now_stamp());

    self.persist(&state.tasks)?;
    Ok(ApiResponse::ok_empty())
  }

  #[instrument(skip(self))]
  async fn cancel_task(
    &self,
    id: &str
  ) -> anyhow::Result<ApiResponse<()>> {
    let mut state = self.state.lock();
    if let Some(out) = state.enter("cancel_task")
    {
      return out;
    }
    let Some(task) = state.find_mut(id) else {
      return Ok(ApiResponse::failure(
        NOT_FOUND,
        "task not found"
      ));
    };
    match task.status {
      | TaskStatus::Completed => {
        return Ok(ApiResponse::failure(
          BAD_REQUEST,
          "completed tasks cannot be cancelled"
        ));
      }
      | TaskStatus::Deleted => {
        return Ok(ApiResponse::failure(
          STATUS_INVALID,
          "deleted tasks cannot be cancelled"
        ));
      }
      | _ => {}
    }
    set_status(task, TaskStatus::Cancelled);
    for executor in &mut task.executors {
      executor.status = Some(TaskStatus::Cancelled);
    }
    task.modified = Some(now_stamp());

    self.persist(&state.tasks)?;
    info!(id, "cancelled task");
    Ok(ApiResponse::ok_empty())
  }

  #[instrument(skip(self))]
  async fn delete_task(
    &self,
    id: &str
  ) -> anyhow::Result<ApiResponse<()>> {
    let mut state = self.state.lock();
    if let Some(out) = state.enter("delete_task")
    {
      return out;
    }
    let Some(task) = state.find_mut(id) else {
      return Ok(ApiResponse::failure(
        TODO_NOT_FOUND,
        "task does not exist"
      ));
    };
    if task.status != TaskStatus::Completed {
      return Ok(ApiResponse::failure(
        STATUS_INVALID,
        "only completed tasks can be deleted"
      ));
    }
    task.status = TaskStatus::Deleted;
    task.modified = Some(now_stamp());

    self.persist(&state.tasks)?;
    info!(id, "soft-deleted task");
    Ok(ApiResponse::ok_empty())
  }

  #[instrument(skip(self))]
  async fn list_users(
    &self
  ) -> anyhow::Result<ApiResponse<Vec<UserRef>>>
  {
    let mut state = self.state.lock();
    if let Some(out) = state.enter("list_users")
    {
      return out;
    }
    let mut users: Vec<UserRef> = Vec::new();
    for executor in state
      .tasks
      .iter()
      .flat_map(|t| t.executors.iter())
    {
      if !users
        .iter()
        .any(|u| u.user_id == executor.user_id)
      {
        users.push(UserRef {
          user_id: executor.user_id.clone(),
          name:    executor.name.clone()
        });
      }
    }
    Ok(ApiResponse::ok(users))
  }
}
