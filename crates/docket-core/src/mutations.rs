use docket_shared::{
  Executor,
  Task,
  TaskPatch,
  TaskStatus,
  UserRef
};

use crate::optimistic::Mutation;

/// True when a transition enters or leaves
/// the completed state, which moves
/// server-side fields like the finish time
/// and parent rollups.
pub fn crosses_completed(
  before: Option<TaskStatus>,
  after: TaskStatus
) -> bool {
  before != Some(after)
    && (before
      == Some(TaskStatus::Completed)
      || after == TaskStatus::Completed)
}

/// Single-field edit of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
  Title(String),
  Description(String),
  Important(bool),
  Status(TaskStatus)
}

impl FieldEdit {
  fn read(&self, task: &Task) -> FieldEdit {
    match self {
      | FieldEdit::Title(_) => {
        FieldEdit::Title(task.title.clone())
      }
      | FieldEdit::Description(_) => {
        FieldEdit::Description(
          task.description.clone()
        )
      }
      | FieldEdit::Important(_) => {
        FieldEdit::Important(task.is_important)
      }
      | FieldEdit::Status(_) => {
        FieldEdit::Status(task.status)
      }
    }
  }

  fn write(&self, task: &mut Task) {
    match self {
      | FieldEdit::Title(value) => {
        task.title = value.clone()
      }
      | FieldEdit::Description(value) => {
        task.description = value.clone()
      }
      | FieldEdit::Important(value) => {
        task.is_important = *value
      }
      | FieldEdit::Status(value) => {
        task.status = *value
      }
    }
  }

  pub fn patch(&self, id: &str) -> TaskPatch {
    let base = TaskPatch::for_task(id);
    match self {
      | FieldEdit::Title(value) => TaskPatch {
        title: Some(value.clone()),
        ..base
      },
      | FieldEdit::Description(value) => {
        TaskPatch {
          description: Some(value.clone()),
          ..base
        }
      }
      | FieldEdit::Important(value) => {
        TaskPatch {
          is_important: Some(*value),
          ..base
        }
      }
      | FieldEdit::Status(value) => {
        TaskPatch {
          status: Some(*value),
          ..base
        }
      }
    }
  }
}

impl Mutation<Task> for FieldEdit {
  type Snapshot = FieldEdit;

  fn describe(&self) -> String {
    match self {
      | FieldEdit::Title(_) => "set title".into(),
      | FieldEdit::Description(_) => {
        "set description".into()
      }
      | FieldEdit::Important(v) => {
        format!("set important={v}")
      }
      | FieldEdit::Status(s) => {
        format!("set status={s}")
      }
    }
  }

  fn capture(&self, task: &Task) -> FieldEdit {
    self.read(task)
  }

  fn apply(&self, task: &mut Task) {
    self.write(task);
  }

  fn restore(
    &self,
    task: &mut Task,
    snapshot: FieldEdit
  ) {
    snapshot.write(task);
  }

  fn needs_refresh(
    &self,
    before: &FieldEdit
  ) -> bool {
    match (self, before) {
      | (
        FieldEdit::Status(after),
        FieldEdit::Status(before)
      ) => crosses_completed(Some(*before), *after),
      | _ => false
    }
  }

  fn success_message(&self) -> String {
    match self {
      | FieldEdit::Important(true) => {
        "marked important".into()
      }
      | FieldEdit::Important(false) => {
        "no longer important".into()
      }
      | FieldEdit::Status(
        TaskStatus::Completed
      ) => "marked complete".into(),
      | _ => "task updated".into()
    }
  }
}

/// Composite update: progress percent and
/// the note that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
  pub percent: u8,
  pub note:    String
}

impl ProgressUpdate {
  pub fn patch(&self, id: &str) -> TaskPatch {
    TaskPatch {
      progress_percent: Some(self.percent),
      progress_note: Some(self.note.clone()),
      ..TaskPatch::for_task(id)
    }
  }
}

impl Mutation<Task> for ProgressUpdate {
  type Snapshot = (u8, Option<String>);

  fn describe(&self) -> String {
    format!("progress {}%", self.percent)
  }

  fn capture(
    &self,
    task: &Task
  ) -> Self::Snapshot {
    (
      task.progress_percent,
      task.progress_note.clone()
    )
  }

  fn apply(&self, task: &mut Task) {
    task.progress_percent = self.percent;
    task.progress_note =
      Some(self.note.clone());
  }

  fn restore(
    &self,
    task: &mut Task,
    (percent, note): Self::Snapshot
  ) {
    task.progress_percent = percent;
    task.progress_note = note;
  }

  fn success_message(&self) -> String {
    "progress submitted".into()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorStatusChange {
  pub user_id: String,
  pub status:  TaskStatus
}

impl Mutation<Task> for ExecutorStatusChange {
  type Snapshot = Option<TaskStatus>;

  fn describe(&self) -> String {
    format!(
      "executor {} status={}",
      self.user_id, self.status
    )
  }

  fn capture(
    &self,
    task: &Task
  ) -> Option<TaskStatus> {
    task
      .executor(&self.user_id)
      .and_then(|e| e.status)
  }

  fn apply(&self, task: &mut Task) {
    if let Some(executor) =
      task.executor_mut(&self.user_id)
    {
      executor.status = Some(self.status);
    }
  }

  fn restore(
    &self,
    task: &mut Task,
    snapshot: Option<TaskStatus>
  ) {
    if let Some(executor) =
      task.executor_mut(&self.user_id)
    {
      executor.status = snapshot;
    }
  }

  fn needs_refresh(
    &self,
    before: &Option<TaskStatus>
  ) -> bool {
    crosses_completed(*before, self.status)
  }

  fn success_message(&self) -> String {
    "executor status updated".into()
  }
}

/// Replaces the executor list. Retained
/// entries keep every field; added entries
/// carry identity only so the server can
/// assign its defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorListChange {
  pub executors: Vec<Executor>
}

impl ExecutorListChange {
  pub fn from_selection(
    task: &Task,
    user_ids: &[String],
    available: &[UserRef]
  ) -> Self {
    let mut executors: Vec<Executor> =
      Vec::with_capacity(user_ids.len());
    for user_id in user_ids {
      if executors
        .iter()
        .any(|e| &e.user_id == user_id)
      {
        continue;
      }
      let entry = match task.executor(user_id)
      {
        | Some(existing) => existing.clone(),
        | None => {
          let name = available
            .iter()
            .find(|u| &u.user_id == user_id)
            .map(|u| u.name.clone())
            .unwrap_or_default();
          Executor::new(user_id.clone(), name)
        }
      };
      executors.push(entry);
    }
    Self { executors }
  }

  pub fn patch(&self, id: &str) -> TaskPatch {
    TaskPatch {
      executors: Some(self.executors.clone()),
      ..TaskPatch::for_task(id)
    }
  }
}

impl Mutation<Task> for ExecutorListChange {
  type Snapshot = Vec<Executor>;

  fn describe(&self) -> String {
    format!(
      "set {} executors",
      self.executors.len()
    )
  }

  fn capture(
    &self,
    task: &Task
  ) -> Vec<Executor> {
    task.executors.clone()
  }

  fn apply(&self, task: &mut Task) {
    task.executors = self.executors.clone();
  }

  fn restore(
    &self,
    task: &mut Task,
    snapshot: Vec<Executor>
  ) {
    task.executors = snapshot;
  }

  fn needs_refresh(
    &self,
    _before: &Vec<Executor>
  ) -> bool {
    true
  }

  fn success_message(&self) -> String {
    "executors updated".into()
  }
}

/// Cancels the task and every executor on
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskCancel;

impl Mutation<Task> for TaskCancel {
  type Snapshot =
    (TaskStatus, Vec<Option<TaskStatus>>);

  fn describe(&self) -> String {
    "cancel".to_string()
  }

  fn capture(
    &self,
    task: &Task
  ) -> Self::Snapshot {
    (
      task.status,
      task.executors.iter().map(|e| e.status).collect()
    )
  }

  fn apply(&self, task: &mut Task) {
    task.status = TaskStatus::Cancelled;
    for executor in &mut task.executors {
      executor.status = Some(TaskStatus::Cancelled);
    }
  }

  fn restore(
    &self,
    task: &mut Task,
    (status, executors): Self::Snapshot
  ) {
    task.status = status;
    for (executor, before) in
      task.executors.iter_mut().zip(executors)
    {
      executor.status = before;
    }
  }

  fn success_message(&self) -> String {
    "task cancelled".into()
  }
}

#[cfg(test)]
mod tests {
  use docket_shared::{
    Executor,
    Task,
    TaskStatus,
    UserRef
  };

  use super::*;

  fn task() -> Task {
    Task {
      id:               "T1".to_string(),
      parent_id:        None,
      owner_id:         "owner".to_string(),
      owner_name:       "Owner".to_string(),
      title:            "Ship it".to_string(),
      description:      String::new(),
      status:           TaskStatus::Pending,
      is_important:     false,
      executors:        vec![Executor {
        user_id: "U1".to_string(),
        name:    "Uno".to_string(),
        status:  Some(TaskStatus::InProgress)
      }],
      progress_percent: 10,
      progress_note:    None,
      project_id:       None,
      deadline:         None,
      finish_time:      None,
      created:          None,
      modified:         None
    }
  }

  #[test]
  fn crossing_completed_in_either_direction()
  {
    use TaskStatus::*;
    assert!(crosses_completed(
      Some(Pending),
      Completed
    ));
    assert!(crosses_completed(
      Some(Completed),
      InProgress
    ));
    assert!(!crosses_completed(
      Some(Pending),
      Overdue
    ));
    assert!(!crosses_completed(
      Some(Completed),
      Completed
    ));
    assert!(crosses_completed(None, Completed));
  }

  #[test]
  fn field_edit_restores_only_its_field() {
    let mut t = task();
    let edit =
      FieldEdit::Title("Renamed".to_string());
    let snap = edit.capture(&t);
    edit.apply(&mut t);
    t.description = "touched elsewhere".into();
    edit.restore(&mut t, snap);
    assert_eq!(t.title, "Ship it");
    assert_eq!(t.description, "touched elsewhere");
  }

  #[test]
  fn status_edit_refreshes_only_around_completed()
  {
    let t = task();
    let done = FieldEdit::Status(
      TaskStatus::Completed
    );
    assert!(done.needs_refresh(&done.capture(&t)));
    let overdue =
      FieldEdit::Status(TaskStatus::Overdue);
    assert!(
      !overdue.needs_refresh(&overdue.capture(&t))
    );
    let title = FieldEdit::Title("x".into());
    assert!(!title.needs_refresh(&title.capture(&t)));
  }

  #[test]
  fn patch_carries_only_the_edited_field() {
    let patch =
      FieldEdit::Important(true).patch("T1");
    assert_eq!(
      patch,
      TaskPatch {
        is_important: Some(true),
        ..TaskPatch::for_task("T1")
      }
    );
  }

  #[test]
  fn executor_selection_keeps_existing_fields()
  {
    let t = task();
    let change = ExecutorListChange::from_selection(
      &t,
      &[
        "U1".to_string(),
        "U2".to_string(),
        "U2".to_string()
      ],
      &[UserRef {
        user_id: "U2".to_string(),
        name:    "Dos".to_string()
      }]
    );
    assert_eq!(
      change.executors,
      vec![
        Executor {
          user_id: "U1".to_string(),
          name:    "Uno".to_string(),
          status:  Some(TaskStatus::InProgress)
        },
        Executor::new("U2", "Dos")
      ]
    );
  }

  #[test]
  fn executor_status_change_round_trips() {
    let mut t = task();
    let change = ExecutorStatusChange {
      user_id: "U1".to_string(),
      status:  TaskStatus::Completed
    };
    let snap = change.capture(&t);
    change.apply(&mut t);
    assert_eq!(
      t.executor("U1").and_then(|e| e.status),
      Some(TaskStatus::Completed)
    );
    assert!(change.needs_refresh(&snap));
    change.restore(&mut t, snap);
    assert_eq!(t, task());
  }

  #[test]
  fn cancel_restores_task_and_executor_statuses()
  {
    let mut t = task();
    let before = TaskCancel.capture(&t);
    TaskCancel.apply(&mut t);
    assert_eq!(t.status, TaskStatus::Cancelled);
    assert_eq!(
      t.executors[0].status,
      Some(TaskStatus::Cancelled)
    );
    assert!(!TaskCancel.needs_refresh(&before));

    TaskCancel.restore(&mut t, before);
    assert_eq!(t, task());
  }
}
