use docket_shared::{
  QueryType,
  Task,
  TaskListFilter
};
use tracing::{
  debug,
  error,
  instrument,
  warn
};

use crate::api::TaskApi;
use crate::notify::Notifier;
use crate::status_filter::{
  FilterValue,
  Reconciled,
  StatusFilterState,
  reconcile
};

pub const LIST_LOAD_FAILED: &str =
  "failed to load tasks";

/// Paged, filtered task list owned by one
/// view.
pub struct TaskListView<'a, C, N> {
  api:        &'a C,
  notifier:   &'a N,
  status:     StatusFilterState,
  assignees:  Vec<String>,
  project_id: Option<String>,
  query_type: QueryType,
  page:       u32,
  page_size:  u32,
  tasks:      Vec<Task>,
  total:      usize
}

impl<'a, C, N> TaskListView<'a, C, N>
where
  C: TaskApi,
  N: Notifier
{
  pub fn new(
    api: &'a C,
    notifier: &'a N,
    page_size: u32
  ) -> Self {
    Self {
      api,
      notifier,
      status: StatusFilterState::default(),
      assignees: Vec::new(),
      project_id: None,
      query_type: QueryType::All,
      page: 1,
      page_size: page_size.max(1),
      tasks: Vec::new(),
      total: 0
    }
  }

  pub fn with_project(
    mut self,
    project_id: Option<String>
  ) -> Self {
    self.project_id = project_id;
    self
  }

  pub fn with_query_type(
    mut self,
    query_type: QueryType
  ) -> Self {
    self.query_type = query_type;
    self
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn total(&self) -> usize {
    self.total
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  pub fn status_filter(
    &self
  ) -> &StatusFilterState {
    &self.status
  }

  pub fn build_filter(&self) -> TaskListFilter {
    TaskListFilter {
      statuses: self.status.query_statuses(),
      assignee_ids: if self.assignees.is_empty()
      {
        None
      } else {
        Some(self.assignees.clone())
      },
      project_id: self.project_id.clone(),
      parent_id: None,
      query_type: self.query_type,
      page: self.page,
      page_size: self.page_size
    }
  }

  /// Loads the current page. A failed load
  /// keeps whatever was shown before.
  #[instrument(skip(self), fields(page = self.page, page_size = self.page_size))]
  pub async fn fetch(&mut self) -> bool {
    let filter = self.build_filter();
    match self.api.fetch_task_list(filter).await
    {
      | Ok(resp) if resp.is_success() => {
        let page = resp.body.unwrap_or_default();
        debug!(
          total = page.total,
          returned = page.list.len(),
          "task list loaded"
        );
        self.tasks = page.list;
        self.total = page.total;
        true
      }
      | Ok(resp) => {
        warn!(code = %resp.code, "task list rejected");
        let message = resp
          .message
          .filter(|m| !m.trim().is_empty())
          .unwrap_or_else(|| {
            LIST_LOAD_FAILED.to_string()
          });
        self.notifier.error(&message);
        false
      }
      | Err(err) => {
        error!(
          error = %format!("{err:#}"),
          "task list fetch failed"
        );
        self.notifier.error(LIST_LOAD_FAILED);
        false
      }
    }
  }

  /// One checkbox event. `None` when the
  /// filter stayed the same and nothing was
  /// fetched, otherwise the fetch outcome.
  pub async fn on_status_selection(
    &mut self,
    raw: &[FilterValue]
  ) -> Option<bool> {
    let next = reconcile(&self.status, raw);
    self.settle_status(next).await
  }

  pub async fn select_all_normal(
    &mut self,
    checked: bool
  ) -> Option<bool> {
    let next =
      self.status.select_all_normal(checked);
    self.settle_status(next).await
  }

  pub async fn select_deleted(
    &mut self,
    checked: bool
  ) -> Option<bool> {
    let next = self.status.select_deleted(checked);
    self.settle_status(next).await
  }

  async fn settle_status(
    &mut self,
    next: Reconciled
  ) -> Option<bool> {
    if !next.changed {
      return None;
    }
    self.status = next.state;
    self.page = 1;
    Some(self.fetch().await)
  }

  pub async fn on_assignee_change(
    &mut self,
    assignees: Vec<String>
  ) -> bool {
    self.assignees = assignees;
    self.page = 1;
    self.fetch().await
  }

  pub async fn on_page_change(
    &mut self,
    page: u32
  ) -> bool {
    self.page = page.max(1);
    self.fetch().await
  }

  pub async fn on_page_size_change(
    &mut self,
    page_size: u32
  ) -> bool {
    self.page_size = page_size.max(1);
    self.page = 1;
    self.fetch().await
  }

  /// Drops a task after the server
  /// confirmed its deletion.
  pub fn remove_task(&mut self, id: &str) {
    let before = self.tasks.len();
    self.tasks.retain(|t| t.id != id);
    if self.tasks.len() < before {
      self.total = self.total.saturating_sub(1);
    }
  }
}

#[cfg(test)]
mod tests {
  use docket_shared::{
    Executor,
    NewTask,
    TaskStatus
  };

  use super::{
    LIST_LOAD_FAILED,
    TaskListView
  };
  use crate::api::TaskApi;
  use crate::mock::MockTaskApi;
  use crate::notify::RecordingNotifier;
  use crate::status_filter::FilterValue;

  async fn api_with(count: usize) -> MockTaskApi {
    let api = MockTaskApi::in_memory(vec![]);
    for i in 0..count {
      api
        .create_task(NewTask {
          owner_id: "me".to_string(),
          title: format!("task {i}"),
          executors: vec![Executor::new(
            format!("U{}", i % 2),
            "x"
          )],
          ..NewTask::default()
        })
        .await
        .expect("create");
    }
    api
  }

  #[tokio::test]
  async fn every_settled_status_change_fetches_page_one()
  {
    let api = api_with(5).await;
    let notifier = RecordingNotifier::new();
    let mut view =
      TaskListView::new(&api, &notifier, 2);

    assert!(view.on_page_change(3).await);
    assert_eq!(view.page(), 3);
    assert_eq!(view.tasks().len(), 1);
    assert_eq!(api.calls("fetch_task_list"), 1);

    assert_eq!(
      view
        .on_status_selection(&[FilterValue::All])
        .await,
      Some(true)
    );
    assert_eq!(view.page(), 1);
    assert_eq!(api.calls("fetch_task_list"), 2);
    assert_eq!(
      view.build_filter().statuses.map(|s| s.len()),
      Some(5)
    );

    let same = view.status_filter().checked_values();
    assert_eq!(
      view.on_status_selection(&same).await,
      None
    );
    assert_eq!(api.calls("fetch_task_list"), 2);

    assert_eq!(
      view.select_deleted(true).await,
      Some(true)
    );
    assert_eq!(api.calls("fetch_task_list"), 3);
    assert_eq!(view.total(), 0);

    assert_eq!(
      view.select_deleted(false).await,
      Some(true)
    );
    assert_eq!(view.build_filter().statuses, None);
    assert_eq!(view.total(), 5);
  }

  #[tokio::test]
  async fn failed_fetch_keeps_previous_list() {
    let api = api_with(3).await;
    let notifier = RecordingNotifier::new();
    let mut view =
      TaskListView::new(&api, &notifier, 10);
    assert!(view.fetch().await);
    assert_eq!(view.tasks().len(), 3);

    api.fail_next_transport("offline");
    assert_eq!(
      view
        .on_status_selection(&[FilterValue::Status(
          TaskStatus::Completed
        )])
        .await,
      Some(false)
    );
    assert_eq!(view.tasks().len(), 3);
    assert_eq!(
      notifier.errors(),
      vec![LIST_LOAD_FAILED.to_string()]
    );

    api.fail_next("503", "maintenance");
    assert!(!view.on_page_change(1).await);
    assert_eq!(view.tasks().len(), 3);
    assert_eq!(
      notifier.errors().last().map(String::as_str),
      Some("maintenance")
    );
  }

  #[tokio::test]
  async fn assignee_and_page_size_reset_to_first_page()
  {
    let api = api_with(6).await;
    let notifier = RecordingNotifier::new();
    let mut view =
      TaskListView::new(&api, &notifier, 2);
    view.on_page_change(2).await;

    assert!(
      view
        .on_assignee_change(vec!["U1".to_string()])
        .await
    );
    assert_eq!(view.page(), 1);
    assert_eq!(view.total(), 3);

    view.on_page_change(2).await;
    assert!(view.on_page_size_change(5).await);
    assert_eq!(view.page(), 1);
    assert_eq!(view.tasks().len(), 3);
  }

  #[tokio::test]
  async fn removing_a_task_adjusts_total() {
    let api = api_with(2).await;
    let notifier = RecordingNotifier::new();
    let mut view =
      TaskListView::new(&api, &notifier, 10);
    view.fetch().await;

    view.remove_task("T1");
    view.remove_task("T1");
    assert_eq!(view.total(), 1);
    assert_eq!(view.tasks()[0].id, "T2");
  }
}
