use docket_shared::{
  QueryType,
  Task,
  TaskListFilter,
  TaskPatch,
  TaskStatus
};
use tracing::{
  debug,
  instrument,
  warn
};

use crate::api::TaskApi;
use crate::mutations::crosses_completed;
use crate::notify::Notifier;
use crate::optimistic::{
  Mutation,
  MutationError,
  OptimisticMutationExecutor
};

/// Column order on the board.
pub const LANE_ORDER: [TaskStatus; 5] = [
  TaskStatus::Pending,
  TaskStatus::InProgress,
  TaskStatus::Completed,
  TaskStatus::Overdue,
  TaskStatus::Cancelled
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KanbanColumn {
  pub status:    TaskStatus,
  pub tasks:     Vec<Task>,
  pub page:      u32,
  pub page_size: u32,
  pub total:     usize
}

impl KanbanColumn {
  fn new(
    status: TaskStatus,
    page_size: u32
  ) -> Self {
    Self {
      status,
      tasks: Vec::new(),
      page: 1,
      page_size,
      total: 0
    }
  }

  pub fn has_more(&self) -> bool {
    self.tasks.len() < self.total
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lanes(pub Vec<KanbanColumn>);

impl Lanes {
  fn position(
    &self,
    status: TaskStatus
  ) -> Option<usize> {
    self.0.iter().position(|c| c.status == status)
  }

  fn locate(
    &self,
    task_id: &str
  ) -> Option<TaskStatus> {
    self
      .0
      .iter()
      .find(|c| {
        c.tasks.iter().any(|t| t.id == task_id)
      })
      .map(|c| c.status)
  }
}

/// Drag of one card between two columns.
#[derive(Debug, Clone)]
pub struct CardMove {
  pub task_id: String,
  pub from:    TaskStatus,
  pub to:      TaskStatus
}

impl Mutation<Lanes> for CardMove {
  type Snapshot = Vec<KanbanColumn>;

  fn describe(&self) -> String {
    format!(
      "move {} {} -> {}",
      self.task_id, self.from, self.to
    )
  }

  fn capture(
    &self,
    lanes: &Lanes
  ) -> Vec<KanbanColumn> {
    lanes
      .0
      .iter()
      .filter(|c| {
        c.status == self.from
          || c.status == self.to
      })
      .cloned()
      .collect()
  }

  fn apply(&self, lanes: &mut Lanes) {
    let (Some(from), Some(to)) = (
      lanes.position(self.from),
      lanes.position(self.to)
    ) else {
      return;
    };
    let source = &mut lanes.0[from];
    let Some(idx) = source
      .tasks
      .iter()
      .position(|t| t.id == self.task_id)
    else {
      return;
    };
    let mut card = source.tasks.remove(idx);
    source.total =
      source.total.saturating_sub(1);

    card.status = self.to;
    let target = &mut lanes.0[to];
    target.tasks.insert(0, card);
    target.total += 1;
  }

  fn restore(
    &self,
    lanes: &mut Lanes,
    snapshot: Vec<KanbanColumn>
  ) {
    for column in snapshot {
      if let Some(idx) =
        lanes.position(column.status)
      {
        lanes.0[idx] = column;
      }
    }
  }

  fn needs_refresh(
    &self,
    _before: &Self::Snapshot
  ) -> bool {
    crosses_completed(Some(self.from), self.to)
  }

  fn success_message(&self) -> String {
    "status updated".into()
  }
}

pub struct KanbanBoard<'a, C, N> {
  api:        &'a C,
  notifier:   &'a N,
  lanes:      Lanes,
  project_id: Option<String>,
  query_type: QueryType
}

impl<'a, C, N> KanbanBoard<'a, C, N>
where
  C: TaskApi,
  N: Notifier
{
  pub fn new(
    api: &'a C,
    notifier: &'a N,
    page_size: u32
  ) -> Self {
    let page_size = page_size.max(1);
    Self {
      api,
      notifier,
      lanes: Lanes(
        LANE_ORDER
          .into_iter()
          .map(|s| KanbanColumn::new(s, page_size))
          .collect()
      ),
      project_id: None,
      query_type: QueryType::All
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

  pub fn columns(&self) -> &[KanbanColumn] {
    &self.lanes.0
  }

  pub fn column(
    &self,
    status: TaskStatus
  ) -> Option<&KanbanColumn> {
    self.lanes.0.iter().find(|c| c.status == status)
  }

  pub async fn load_all(&mut self) {
    for status in LANE_ORDER {
      self.load_column(status).await;
    }
  }

  /// Reloads a column from its first page.
  pub async fn load_column(
    &mut self,
    status: TaskStatus
  ) -> bool {
    self.fetch_page(status, 1, false).await
  }

  /// Appends the next page, if any.
  pub async fn load_more(
    &mut self,
    status: TaskStatus
  ) -> bool {
    let Some(column) = self.column(status) else {
      return false;
    };
    if !column.has_more() {
      return false;
    }
    let next = column.page + 1;
    self.fetch_page(status, next, true).await
  }

  #[instrument(skip(self))]
  async fn fetch_page(
    &mut self,
    status: TaskStatus,
    page: u32,
    append: bool
  ) -> bool {
    let Some(idx) = self.lanes.position(status)
    else {
      return false;
    };
    let filter = TaskListFilter {
      statuses: Some(vec![status]),
      project_id: self.project_id.clone(),
      query_type: self.query_type,
      ..TaskListFilter::new(
        page,
        self.lanes.0[idx].page_size
      )
    };

    let outcome = OptimisticMutationExecutor::new(
      self.api,
      self.notifier
    )
    .call(|| self.api.fetch_task_list(filter))
    .await;

    match outcome {
      | Ok(Some(page_body)) => {
        let column = &mut self.lanes.0[idx];
        if append {
          column.tasks.extend(page_body.list);
        } else {
          column.tasks = page_body.list;
        }
        column.page = page;
        column.total = page_body.total;
        debug!(
          %status,
          loaded = column.tasks.len(),
          total = column.total,
          "kanban column loaded"
        );
        true
      }
      | Ok(None) => false,
      | Err(err) => {
        warn!(%status, error = %err, "kanban column load failed");
        self.notifier.error(&err.user_message());
        false
      }
    }
  }

  /// Drops `task_id` into the `to` column.
  /// The card moves immediately and moves
  /// back if the server refuses.
  #[instrument(skip(self))]
  pub async fn move_task(
    &mut self,
    task_id: &str,
    to: TaskStatus
  ) -> Result<(), MutationError> {
    let exec = OptimisticMutationExecutor::new(
      self.api,
      self.notifier
    );
    let Some(from) = self.lanes.locate(task_id)
    else {
      return Err(exec.report(
        MutationError::Invalid(format!(
          "task {task_id} is not on the board"
        ))
      ));
    };
    if self.lanes.position(to).is_none() {
      return Err(exec.report(
        MutationError::Invalid(format!(
          "no column for status {to}"
        ))
      ));
    }
    if from == to {
      return Ok(());
    }

    let card = CardMove {
      task_id: task_id.to_string(),
      from,
      to
    };
    let patch = TaskPatch {
      status: Some(to),
      ..TaskPatch::for_task(task_id)
    };
    let api = self.api;
    let before = exec
      .execute_on(&mut self.lanes, &card, move || {
        api.update_task(patch)
      })
      .await?;

    // server-side fields such as the finish
    // time move with completed
    if card.needs_refresh(&before)
      && let Some(idx) = self.lanes.position(to)
      && let Some(moved) = self.lanes.0[idx]
        .tasks
        .iter_mut()
        .find(|t| t.id == task_id)
    {
      exec.refresh(moved).await;
    }
    Ok(())
  }
}
