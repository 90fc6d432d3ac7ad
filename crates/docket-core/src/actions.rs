//! User-facing task operations. Each one
//! validates, checks permissions, then goes
//! through the optimistic executor.

use docket_shared::{
  NewTask,
  Task,
  TaskStatus,
  UserRef
};
use tracing::{
  debug,
  instrument
};

use crate::api::TaskApi;
use crate::mutations::{
  ExecutorListChange,
  ExecutorStatusChange,
  FieldEdit,
  ProgressUpdate,
  TaskCancel
};
use crate::notify::Notifier;
use crate::optimistic::{
  MutationError,
  OptimisticMutationExecutor
};
use crate::permission::{
  Actor,
  can_delete_task,
  can_edit_executor_status,
  can_edit_task
};

pub struct TaskActions<'a, C, N> {
  exec:  OptimisticMutationExecutor<'a, C, N>,
  actor: Actor
}

impl<'a, C, N> TaskActions<'a, C, N>
where
  C: TaskApi,
  N: Notifier
{
  pub fn new(
    api: &'a C,
    notifier: &'a N,
    actor: Actor
  ) -> Self {
    Self {
      exec: OptimisticMutationExecutor::new(
        api, notifier
      ),
      actor
    }
  }

  fn guard_edit(
    &self,
    task: &Task
  ) -> Result<(), MutationError> {
    if can_edit_task(&self.actor, task) {
      return Ok(());
    }
    Err(self.exec.report(
      MutationError::NotAllowed {
        actor:  self.actor.id.clone(),
        action: format!("edit task {}", task.id)
      }
    ))
  }

  async fn edit(
    &self,
    task: &mut Task,
    edit: FieldEdit
  ) -> Result<(), MutationError> {
    self.guard_edit(task)?;
    let patch = edit.patch(&task.id);
    let api = self.exec.api();
    self
      .exec
      .execute(task, edit, move || {
        api.update_task(patch)
      })
      .await
  }

  #[instrument(skip(self, task, title), fields(task = %task.id))]
  pub async fn rename(
    &self,
    task: &mut Task,
    title: &str
  ) -> Result<(), MutationError> {
    let title = title.trim();
    if title.is_empty() {
      return Err(self.exec.report(
        MutationError::Invalid(
          "title cannot be empty".to_string()
        )
      ));
    }
    if title == task.title {
      debug!("title unchanged");
      return Ok(());
    }
    self
      .edit(task, FieldEdit::Title(title.to_string()))
      .await
  }

  pub async fn describe(
    &self,
    task: &mut Task,
    text: &str
  ) -> Result<(), MutationError> {
    if text == task.description {
      return Ok(());
    }
    self
      .edit(
        task,
        FieldEdit::Description(text.to_string())
      )
      .await
  }

  pub async fn toggle_important(
    &self,
    task: &mut Task
  ) -> Result<(), MutationError> {
    let flipped = !task.is_important;
    self
      .edit(task, FieldEdit::Important(flipped))
      .await
  }

  /// Moves the whole task to `status`.
  /// Deletion has its own operation.
  #[instrument(skip(self, task), fields(task = %task.id))]
  pub async fn set_status(
    &self,
    task: &mut Task,
    status: TaskStatus
  ) -> Result<(), MutationError> {
    if status == TaskStatus::Deleted {
      return Err(self.exec.report(
        MutationError::Invalid(
          "use delete to remove a task"
            .to_string()
        )
      ));
    }
    if status == task.status {
      return Ok(());
    }
    if status == TaskStatus::Cancelled {
      return self.cancel(task).await;
    }
    self.edit(task, FieldEdit::Status(status)).await
  }

  /// Cancels an unfinished task together
  /// with its executors.
  #[instrument(skip(self, task), fields(task = %task.id))]
  pub async fn cancel(
    &self,
    task: &mut Task
  ) -> Result<(), MutationError> {
    self.guard_edit(task)?;
    match task.status {
      | TaskStatus::Cancelled => return Ok(()),
      | TaskStatus::Completed
      | TaskStatus::Deleted => {
        return Err(self.exec.report(
          MutationError::Invalid(format!(
            "{} tasks cannot be cancelled",
            task.status
          ))
        ));
      }
      | _ => {}
    }
    let task_id = task.id.clone();
    let api = self.exec.api();
    self
      .exec
      .execute(task, TaskCancel, || {
        api.cancel_task(&task_id)
      })
      .await
  }

  pub async fn mark_complete(
    &self,
    task: &mut Task
  ) -> Result<(), MutationError> {
    self
      .set_status(task, TaskStatus::Completed)
      .await
  }

  #[instrument(skip(self, task, note), fields(task = %task.id))]
  pub async fn submit_progress(
    &self,
    task: &mut Task,
    percent: u32,
    note: &str
  ) -> Result<(), MutationError> {
    let Ok(percent) = u8::try_from(percent)
    else {
      return Err(self.exec.report(
        MutationError::Invalid(format!(
          "progress must be between 0 and 100, got {percent}"
        ))
      ));
    };
    if percent > 100 {
      return Err(self.exec.report(
        MutationError::Invalid(format!(
          "progress must be between 0 and 100, got {percent}"
        ))
      ));
    }
    self.guard_edit(task)?;

    let update = ProgressUpdate {
      percent,
      note: note.trim().to_string()
    };
    let patch = update.patch(&task.id);
    let api = self.exec.api();
    self
      .exec
      .execute(task, update, move || {
        api.update_task(patch)
      })
      .await
  }

  /// Changes one executor's own status.
  /// Checked before anything is touched.
  #[instrument(skip(self, task), fields(task = %task.id, actor = %self.actor.id))]
  pub async fn update_executor_status(
    &self,
    task: &mut Task,
    executor_id: &str,
    status: TaskStatus
  ) -> Result<(), MutationError> {
    if !can_edit_executor_status(
      executor_id,
      &self.actor.id,
      &task.owner_id
    ) {
      return Err(self.exec.report(
        MutationError::PermissionDenied {
          actor:    self.actor.id.clone(),
          executor: executor_id.to_string()
        }
      ));
    }
    if !task.has_executor(executor_id) {
      return Err(self.exec.report(
        MutationError::NotFound(
          executor_id.to_string()
        )
      ));
    }

    let change = ExecutorStatusChange {
      user_id: executor_id.to_string(),
      status
    };
    let task_id = task.id.clone();
    let api = self.exec.api();
    self
      .exec
      .execute(task, change, || {
        api.update_executor_status(
          &task_id,
          executor_id,
          status
        )
      })
      .await
  }

  /// Directory of assignable users.
  pub async fn available_users(
    &self
  ) -> Result<Vec<UserRef>, MutationError> {
    let api = self.exec.api();
    match self.exec.call(|| api.list_users()).await
    {
      | Ok(users) => Ok(users.unwrap_or_default()),
      | Err(err) => Err(self.exec.report(err))
    }
  }

  #[instrument(skip(self, task, available), fields(task = %task.id))]
  pub async fn update_executors(
    &self,
    task: &mut Task,
    user_ids: &[String],
    available: &[UserRef]
  ) -> Result<(), MutationError> {
    self.guard_edit(task)?;
    let change = ExecutorListChange::from_selection(
      task, user_ids, available
    );
    let patch = change.patch(&task.id);
    let api = self.exec.api();
    self
      .exec
      .execute(task, change, move || {
        api.update_task(patch)
      })
      .await
  }

  /// Deletes after `confirm` agrees. The
  /// local task is never touched; callers
  /// drop it once this returns `Ok`.
  #[instrument(skip(self, task, confirm), fields(task = %task.id))]
  pub async fn delete<F>(
    &self,
    task: &Task,
    confirm: F
  ) -> Result<(), MutationError>
  where
    F: FnOnce(&Task) -> bool
  {
    if !can_delete_task(&self.actor, task) {
      return Err(self.exec.report(
        MutationError::NotAllowed {
          actor:  self.actor.id.clone(),
          action: format!("delete task {}", task.id)
        }
      ));
    }
    if !confirm(task) {
      debug!("delete declined");
      return Err(MutationError::Cancelled);
    }
    let api = self.exec.api();
    self
      .exec
      .confirm(|| api.delete_task(&task.id), "task deleted")
      .await
      .map(|_| ())
  }

  #[instrument(skip(self, new_task), fields(title = %new_task.title))]
  pub async fn create(
    &self,
    mut new_task: NewTask
  ) -> Result<Task, MutationError> {
    new_task.title = new_task.title.trim().to_string();
    if new_task.title.is_empty() {
      return Err(self.exec.report(
        MutationError::Invalid(
          "title cannot be empty".to_string()
        )
      ));
    }
    if new_task.owner_id.is_empty() {
      new_task.owner_id = self.actor.id.clone();
    }
    let api = self.exec.api();
    let created = self
      .exec
      .confirm(
        move || api.create_task(new_task),
        "task created"
      )
      .await?;
    created.ok_or_else(|| {
      self.exec.report(MutationError::Transport(
        "server returned no task".to_string()
      ))
    })
  }

  /// Checks off (or reopens) a subtask of
  /// the open `parent`, then re-reads the
  /// parent. Returns the subtask as saved.
  #[instrument(skip(self, parent), fields(parent = %parent.id))]
  pub async fn toggle_subtask(
    &self,
    parent: &mut Task,
    subtask_id: &str,
    finished: bool
  ) -> Result<Task, MutationError> {
    self.guard_edit(parent)?;
    let api = self.exec.api();
    let mut subtask = match self
      .exec
      .call(|| api.fetch_task(subtask_id))
      .await
    {
      | Ok(Some(subtask)) => subtask,
      | Ok(None) => {
        return Err(self.exec.report(
          MutationError::NotFound(
            subtask_id.to_string()
          )
        ));
      }
      | Err(err) => return Err(self.exec.report(err))
    };
    if subtask.parent_id.as_deref()
      != Some(parent.id.as_str())
    {
      return Err(self.exec.report(
        MutationError::Invalid(format!(
          "task {subtask_id} is not a subtask of {}",
          parent.id
        ))
      ));
    }

    let target = if finished {
      TaskStatus::Completed
    } else {
      TaskStatus::Pending
    };
    if subtask.status == target {
      debug!("subtask already there");
      return Ok(subtask);
    }
    let edit = FieldEdit::Status(target);
    let patch = edit.patch(&subtask.id);
    self
      .exec
      .execute(&mut subtask, edit, move || {
        api.update_task(patch)
      })
      .await?;
    self.exec.refresh(parent).await;
    Ok(subtask)
  }

  pub async fn add_subtask(
    &self,
    parent: &Task,
    title: &str
  ) -> Result<Task, MutationError> {
    self.guard_edit(parent)?;
    self
      .create(NewTask {
        parent_id: Some(parent.id.clone()),
        project_id: parent.project_id.clone(),
        title: title.to_string(),
        ..NewTask::default()
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use docket_shared::{
    Executor,
    NewTask,
    Task,
    TaskStatus
  };

  use super::TaskActions;
  use crate::api::TaskApi;
  use crate::mock::{
    DEFAULT_EXECUTOR_STATUS,
    MockTaskApi
  };
  use crate::notify::{
    Notice,
    RecordingNotifier
  };
  use crate::optimistic::MutationError;
  use crate::permission::{
    Actor,
    Role
  };

  async fn seeded() -> (MockTaskApi, Task) {
    let api = MockTaskApi::in_memory(vec![]);
    let task = api
      .create_task(NewTask {
        owner_id: "owner".to_string(),
        owner_name: "Owner".to_string(),
        title: "Quarterly report".to_string(),
        executors: vec![
          Executor::new("U1", "Uno"),
          Executor::new("U3", "Tres"),
        ],
        ..NewTask::default()
      })
      .await
      .expect("create")
      .body
      .expect("body");
    (api, task)
  }

  fn as_owner() -> Actor {
    Actor::new("owner", Role::Member)
  }

  #[tokio::test]
  async fn failed_toggle_rolls_back_and_notifies()
  {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());

    api.fail_next("500", "could not save");
    let err = actions
      .toggle_important(&mut task)
      .await
      .expect_err("rejected");
    assert!(matches!(
      err,
      MutationError::Rejected { .. }
    ));
    assert!(!task.is_important);
    assert_eq!(
      notifier.errors(),
      vec!["could not save".to_string()]
    );

    actions
      .toggle_important(&mut task)
      .await
      .expect("toggle");
    assert!(task.is_important);
    assert_eq!(
      api.task(&task.id).map(|t| t.is_important),
      Some(true)
    );
    assert_eq!(
      notifier.notices(),
      vec![
        Notice::Error("could not save".to_string()),
        Notice::Success("marked important".to_string())
      ]
    );
  }

  #[tokio::test]
  async fn completing_refreshes_exactly_once() {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());

    actions
      .set_status(&mut task, TaskStatus::Overdue)
      .await
      .expect("overdue");
    assert_eq!(api.calls("fetch_task"), 0);

    actions.mark_complete(&mut task).await.expect("done");
    assert_eq!(api.calls("fetch_task"), 1);
    assert!(task.finish_time.is_some());
    assert_eq!(task.progress_percent, 100);

    actions
      .set_status(&mut task, TaskStatus::InProgress)
      .await
      .expect("reopen");
    assert_eq!(api.calls("fetch_task"), 2);
    assert!(task.finish_time.is_none());
  }

  #[tokio::test]
  async fn executor_list_keeps_retained_and_defaults_added()
  {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions = TaskActions::new(
      &api,
      &notifier,
      Actor::new("U1", Role::Member)
    );
    actions
      .update_executor_status(
        &mut task,
        "U1",
        TaskStatus::InProgress
      )
      .await
      .expect("status");

    let mut available =
      actions.available_users().await.expect("users");
    available.push(docket_shared::UserRef {
      user_id: "U2".to_string(),
      name:    "Dos".to_string()
    });
    actions
      .update_executors(
        &mut task,
        &["U1".to_string(), "U2".to_string()],
        &available
      )
      .await
      .expect("executors");

    assert_eq!(task.executors.len(), 2);
    assert_eq!(
      task.executor("U1").and_then(|e| e.status),
      Some(TaskStatus::InProgress)
    );
    assert_eq!(
      task.executor("U2").and_then(|e| e.status),
      Some(DEFAULT_EXECUTOR_STATUS)
    );
    assert_eq!(
      task.executor("U2").map(|e| e.name.as_str()),
      Some("Dos")
    );
  }

  #[tokio::test]
  async fn executor_status_is_permission_checked_first()
  {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions = TaskActions::new(
      &api,
      &notifier,
      Actor::new("U3", Role::Member)
    );
    let before = task.clone();

    let err = actions
      .update_executor_status(
        &mut task,
        "U1",
        TaskStatus::Completed
      )
      .await
      .expect_err("denied");
    assert!(matches!(
      err,
      MutationError::PermissionDenied { .. }
    ));
    assert_eq!(task, before);
    assert_eq!(api.calls("update_executor_status"), 0);
    assert_eq!(
      notifier.errors(),
      vec!["permission denied".to_string()]
    );

    let owner =
      TaskActions::new(&api, &notifier, as_owner());
    let err = owner
      .update_executor_status(
        &mut task,
        "U9",
        TaskStatus::Completed
      )
      .await
      .expect_err("unknown executor");
    assert_eq!(
      err,
      MutationError::NotFound("U9".to_string())
    );
    assert_eq!(api.calls("update_executor_status"), 0);
  }

  #[tokio::test]
  async fn last_executor_completing_refreshes_rollup()
  {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());

    actions
      .update_executor_status(
        &mut task,
        "U1",
        TaskStatus::Completed
      )
      .await
      .expect("U1");
    assert_eq!(task.status, TaskStatus::Pending);
    actions
      .update_executor_status(
        &mut task,
        "U3",
        TaskStatus::Completed
      )
      .await
      .expect("U3");
    assert_eq!(api.calls("fetch_task"), 2);
    assert_eq!(task.status, TaskStatus::Completed);
  }

  #[tokio::test]
  async fn rename_validates_and_skips_no_ops() {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());

    assert!(matches!(
      actions.rename(&mut task, "   ").await,
      Err(MutationError::Invalid(_))
    ));
    actions
      .rename(&mut task, " Quarterly report ")
      .await
      .expect("unchanged");
    assert_eq!(api.calls("update_task"), 0);

    actions
      .rename(&mut task, "  Annual report ")
      .await
      .expect("rename");
    assert_eq!(task.title, "Annual report");
    assert_eq!(api.calls("update_task"), 1);
  }

  #[tokio::test]
  async fn progress_must_be_a_percentage() {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());

    assert!(matches!(
      actions
        .submit_progress(&mut task, 101, "too far")
        .await,
      Err(MutationError::Invalid(_))
    ));
    api.fail_next_transport("timeout");
    assert!(
      actions
        .submit_progress(&mut task, 40, "drafted")
        .await
        .is_err()
    );
    assert_eq!(task.progress_percent, 0);
    assert_eq!(task.progress_note, None);

    actions
      .submit_progress(&mut task, 40, " drafted ")
      .await
      .expect("progress");
    assert_eq!(task.progress_percent, 40);
    assert_eq!(task.progress_note.as_deref(), Some("drafted"));
  }

  #[tokio::test]
  async fn delete_needs_confirmation_and_permission()
  {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let outsider = TaskActions::new(
      &api,
      &notifier,
      Actor::new("U1", Role::Member)
    );
    assert!(matches!(
      outsider.delete(&task, |_| true).await,
      Err(MutationError::NotAllowed { .. })
    ));

    let actions =
      TaskActions::new(&api, &notifier, as_owner());
    assert_eq!(
      actions.delete(&task, |_| false).await,
      Err(MutationError::Cancelled)
    );
    assert_eq!(api.calls("delete_task"), 0);

    let err = actions
      .delete(&task, |_| true)
      .await
      .expect_err("not completed");
    assert!(matches!(
      err,
      MutationError::Rejected { .. }
    ));

    actions.mark_complete(&mut task).await.expect("done");
    actions.delete(&task, |_| true).await.expect("delete");
    assert_eq!(
      api.task(&task.id).map(|t| t.status),
      Some(TaskStatus::Deleted)
    );
  }

  #[tokio::test]
  async fn subtasks_inherit_parent_and_project() {
    let (api, task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions = TaskActions::new(
      &api,
      &notifier,
      Actor::new("U1", Role::Member)
    );

    let child = actions
      .add_subtask(&task, " gather numbers ")
      .await
      .expect("subtask");
    assert_eq!(child.parent_id.as_deref(), Some(task.id.as_str()));
    assert_eq!(child.title, "gather numbers");
    assert_eq!(child.owner_id, "U1");

    assert!(matches!(
      actions.add_subtask(&task, "").await,
      Err(MutationError::Invalid(_))
    ));
  }

  #[tokio::test]
  async fn cancelling_reaches_every_executor() {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());

    api.fail_next("500", "cancel failed");
    assert!(actions.cancel(&mut task).await.is_err());
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(
      task.executor("U1").and_then(|e| e.status),
      Some(DEFAULT_EXECUTOR_STATUS)
    );

    actions
      .set_status(&mut task, TaskStatus::Cancelled)
      .await
      .expect("cancel");
    assert_eq!(api.calls("cancel_task"), 2);
    assert_eq!(api.calls("update_task"), 0);
    let saved = api.task(&task.id).expect("saved");
    assert_eq!(saved.status, TaskStatus::Cancelled);
    for executor in [&task.executors, &saved.executors]
      .into_iter()
      .flatten()
    {
      assert_eq!(
        executor.status,
        Some(TaskStatus::Cancelled)
      );
    }
  }

  #[tokio::test]
  async fn completed_tasks_cannot_be_cancelled() {
    let (api, mut task) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());
    actions.mark_complete(&mut task).await.expect("done");

    assert!(matches!(
      actions.cancel(&mut task).await,
      Err(MutationError::Invalid(_))
    ));
    assert_eq!(api.calls("cancel_task"), 0);
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(
      notifier.errors(),
      vec!["completed tasks cannot be cancelled".to_string()]
    );
  }

  #[tokio::test]
  async fn subtasks_toggle_between_completed_and_pending()
  {
    let (api, mut parent) = seeded().await;
    let notifier = RecordingNotifier::new();
    let actions =
      TaskActions::new(&api, &notifier, as_owner());
    let child = actions
      .add_subtask(&parent, "collect receipts")
      .await
      .expect("subtask");

    let done = actions
      .toggle_subtask(&mut parent, &child.id, true)
      .await
      .expect("check off");
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.finish_time.is_some());
    assert_eq!(
      api.task(&child.id).map(|t| t.status),
      Some(TaskStatus::Completed)
    );

    let reopened = actions
      .toggle_subtask(&mut parent, &child.id, false)
      .await
      .expect("reopen");
    assert_eq!(reopened.status, TaskStatus::Pending);
    assert!(reopened.finish_time.is_none());

    let updates = api.calls("update_task");
    let itself = parent.id.clone();
    assert!(matches!(
      actions
        .toggle_subtask(&mut parent, &itself, true)
        .await,
      Err(MutationError::Invalid(_))
    ));
    assert_eq!(api.calls("update_task"), updates);
  }
}
