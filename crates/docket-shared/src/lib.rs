use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};

pub const SUCCESS_CODE: &str = "200";

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Default,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum TaskStatus {
  ToReceive,
  #[default]
  Pending,
  Completed,
  InProgress,
  Overdue,
  Cancelled,
  Deleted
}

impl TaskStatus {
  /// Lifecycle states a list can be
  /// filtered by, excluding deleted.
  pub const NORMAL: [TaskStatus; 5] = [
    TaskStatus::Pending,
    TaskStatus::Completed,
    TaskStatus::InProgress,
    TaskStatus::Overdue,
    TaskStatus::Cancelled
  ];

  pub const fn code(self) -> u8 {
    match self {
      | TaskStatus::ToReceive => 0,
      | TaskStatus::Pending => 1,
      | TaskStatus::Completed => 2,
      | TaskStatus::InProgress => 3,
      | TaskStatus::Overdue => 4,
      | TaskStatus::Cancelled => 5,
      | TaskStatus::Deleted => 6
    }
  }

  pub const fn from_code(
    code: u8
  ) -> Option<Self> {
    match code {
      | 0 => Some(TaskStatus::ToReceive),
      | 1 => Some(TaskStatus::Pending),
      | 2 => Some(TaskStatus::Completed),
      | 3 => {
        Some(TaskStatus::InProgress)
      }
      | 4 => Some(TaskStatus::Overdue),
      | 5 => Some(TaskStatus::Cancelled),
      | 6 => Some(TaskStatus::Deleted),
      | _ => None
    }
  }

  pub fn is_normal(self) -> bool {
    Self::NORMAL.contains(&self)
  }

  pub const fn label(
    self
  ) -> &'static str {
    match self {
      | TaskStatus::ToReceive => {
        "to-receive"
      }
      | TaskStatus::Pending => "pending",
      | TaskStatus::Completed => {
        "completed"
      }
      | TaskStatus::InProgress => {
        "in-progress"
      }
      | TaskStatus::Overdue => "overdue",
      | TaskStatus::Cancelled => {
        "cancelled"
      }
      | TaskStatus::Deleted => "deleted"
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl From<TaskStatus> for u8 {
  fn from(status: TaskStatus) -> Self {
    status.code()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "unknown task status: {}",
      self.0
    )
  }
}

impl std::error::Error for UnknownStatus {}

impl TryFrom<u8> for TaskStatus {
  type Error = UnknownStatus;

  fn try_from(
    code: u8
  ) -> Result<Self, Self::Error> {
    Self::from_code(code).ok_or_else(
      || UnknownStatus(code.to_string())
    )
  }
}

impl FromStr for TaskStatus {
  type Err = UnknownStatus;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let needle =
      s.trim().to_ascii_lowercase();
    if let Ok(code) = needle.parse::<u8>()
    {
      return Self::try_from(code);
    }
    let normalized =
      needle.replace('_', "-");
    [
      TaskStatus::ToReceive,
      TaskStatus::Pending,
      TaskStatus::Completed,
      TaskStatus::InProgress,
      TaskStatus::Overdue,
      TaskStatus::Cancelled,
      TaskStatus::Deleted
    ]
    .into_iter()
    .find(|status| {
      status.label() == normalized
    })
    .ok_or_else(|| {
      UnknownStatus(s.to_string())
    })
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Executor {
  pub user_id: String,
  #[serde(default)]
  pub name:    String,
  /// Absent on entries the server has
  /// not assigned a status to yet.
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status:  Option<TaskStatus>
}

impl Executor {
  pub fn new(
    user_id: impl Into<String>,
    name: impl Into<String>
  ) -> Self {
    Self {
      user_id: user_id.into(),
      name:    name.into(),
      status:  None
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct Task {
  pub id:               String,
  #[serde(default)]
  pub parent_id:        Option<String>,
  #[serde(default)]
  pub owner_id:         String,
  #[serde(default)]
  pub owner_name:       String,
  #[serde(default)]
  pub title:            String,
  #[serde(default)]
  pub description:      String,
  pub status:           TaskStatus,
  #[serde(default)]
  pub is_important:     bool,
  #[serde(default)]
  pub executors:        Vec<Executor>,
  #[serde(default)]
  pub progress_percent: u8,
  #[serde(default)]
  pub progress_note:    Option<String>,
  #[serde(default)]
  pub project_id:       Option<String>,
  #[serde(default)]
  pub deadline:         Option<String>,
  #[serde(default)]
  pub finish_time:      Option<String>,
  #[serde(default)]
  pub created:          Option<String>,
  #[serde(default)]
  pub modified:         Option<String>
}

impl Task {
  pub fn executor(
    &self,
    user_id: &str
  ) -> Option<&Executor> {
    self
      .executors
      .iter()
      .find(|e| e.user_id == user_id)
  }

  pub fn executor_mut(
    &mut self,
    user_id: &str
  ) -> Option<&mut Executor> {
    self
      .executors
      .iter_mut()
      .find(|e| e.user_id == user_id)
  }

  pub fn has_executor(
    &self,
    user_id: &str
  ) -> bool {
    self.executor(user_id).is_some()
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct UserRef {
  pub user_id: String,
  pub name:    String
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
  #[default]
  All,
  AssignedByMe,
  ExecutedByMe
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TaskListFilter {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub statuses:     Option<Vec<TaskStatus>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub assignee_ids: Option<Vec<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub project_id:   Option<String>,
  /// Children of this task; top-level
  /// tasks when absent.
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub parent_id:    Option<String>,
  #[serde(default)]
  pub query_type:   QueryType,
  pub page:         u32,
  pub page_size:    u32
}

impl TaskListFilter {
  pub fn new(
    page: u32,
    page_size: u32
  ) -> Self {
    Self {
      statuses: None,
      assignee_ids: None,
      project_id: None,
      parent_id: None,
      query_type: QueryType::All,
      page,
      page_size
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
pub struct TaskPage {
  pub list:      Vec<Task>,
  pub total:     usize,
  pub page:      u32,
  pub page_size: u32
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct NewTask {
  pub owner_id:    String,
  #[serde(default)]
  pub owner_name:  String,
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub parent_id:   Option<String>,
  #[serde(default)]
  pub project_id:  Option<String>,
  #[serde(default)]
  pub executors:   Vec<Executor>,
  #[serde(default)]
  pub deadline:    Option<String>
}

/// Partial update of one task. Only
/// fields that are `Some` go on the wire.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
  Eq,
)]
pub struct TaskPatch {
  pub id: String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status: Option<TaskStatus>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub is_important: Option<bool>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub progress_percent: Option<u8>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub progress_note: Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub executors: Option<Vec<Executor>>
}

impl TaskPatch {
  pub fn for_task(
    id: impl Into<String>
  ) -> Self {
    Self {
      id: id.into(),
      ..Self::default()
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct ApiResponse<T> {
  pub code:    String,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default = "none")]
  pub body:    Option<T>
}

fn none<T>() -> Option<T> {
  None
}

impl<T> ApiResponse<T> {
  pub fn ok(body: T) -> Self {
    Self {
      code:    SUCCESS_CODE.to_string(),
      message: Some("success".to_string()),
      body:    Some(body)
    }
  }

  pub fn ok_empty() -> Self {
    Self {
      code:    SUCCESS_CODE.to_string(),
      message: Some("success".to_string()),
      body:    None
    }
  }

  pub fn failure(
    code: impl Into<String>,
    message: impl Into<String>
  ) -> Self {
    Self {
      code:    code.into(),
      message: Some(message.into()),
      body:    None
    }
  }

  /// The code is a string and only the
  /// exact text `"200"` counts.
  pub fn is_success(&self) -> bool {
    self.code == SUCCESS_CODE
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_travels_as_integer_code() {
    let encoded = serde_json::to_string(
      &TaskStatus::InProgress
    )
    .expect("encode status");
    assert_eq!(encoded, "3");

    let decoded: TaskStatus =
      serde_json::from_str("6")
        .expect("decode status");
    assert_eq!(
      decoded,
      TaskStatus::Deleted
    );

    assert!(
      serde_json::from_str::<TaskStatus>(
        "9"
      )
      .is_err()
    );
  }

  #[test]
  fn status_parses_labels_and_codes() {
    assert_eq!(
      "in_progress".parse::<TaskStatus>(),
      Ok(TaskStatus::InProgress)
    );
    assert_eq!(
      " Completed ".parse::<TaskStatus>(),
      Ok(TaskStatus::Completed)
    );
    assert_eq!(
      "5".parse::<TaskStatus>(),
      Ok(TaskStatus::Cancelled)
    );
    assert!(
      "archived"
        .parse::<TaskStatus>()
        .is_err()
    );
  }

  #[test]
  fn only_exact_200_is_success() {
    let ok: ApiResponse<()> =
      serde_json::from_str(
        r#"{"code":"200"}"#
      )
      .expect("decode response");
    assert!(ok.is_success());

    for code in ["500", "0200", "200 ", "OK"]
    {
      let resp: ApiResponse<()> =
        ApiResponse::failure(code, "x");
      assert!(
        !resp.is_success(),
        "{code} must not count as success"
      );
    }

    assert!(
      serde_json::from_str::<
        ApiResponse<()>
      >(r#"{"code":200}"#)
      .is_err()
    );
  }

  #[test]
  fn patch_omits_untouched_fields() {
    let patch = TaskPatch {
      is_important: Some(true),
      ..TaskPatch::for_task("T1")
    };
    let value = serde_json::to_value(
      &patch
    )
    .expect("encode patch");
    assert_eq!(
      value,
      serde_json::json!({
        "id": "T1",
        "is_important": true
      })
    );
  }

  #[test]
  fn new_executor_has_no_status_on_the_wire()
  {
    let value = serde_json::to_value(
      Executor::new("U2", "Ada")
    )
    .expect("encode executor");
    assert_eq!(
      value,
      serde_json::json!({
        "user_id": "U2",
        "name": "Ada"
      })
    );
  }
}
