//! Status filter selection for task list
//! queries.
//!
//! The list view offers one checkbox per
//! normal status, an "all" pseudo-option
//! and a "deleted" option that excludes
//! every other choice. Each checkbox event
//! hands the full set of checked values to
//! [`reconcile`], which returns the next
//! consistent [`StatusFilterState`].

use std::collections::BTreeSet;

use docket_shared::TaskStatus;
use tracing::{
  debug,
  instrument
};

/// One checked value as reported by the
/// checkbox group.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum FilterValue {
  All,
  Status(TaskStatus)
}

impl From<TaskStatus> for FilterValue {
  fn from(status: TaskStatus) -> Self {
    FilterValue::Status(status)
  }
}

impl std::str::FromStr for FilterValue {
  type Err =
    docket_shared::UnknownStatus;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(FilterValue::All);
    }
    let status: TaskStatus = s.parse()?;
    if !is_filterable(status) {
      return Err(docket_shared::UnknownStatus(
        format!("{} (not a list filter)", s.trim())
      ));
    }
    Ok(FilterValue::Status(status))
  }
}

/// Statuses the checkbox group offers.
pub fn is_filterable(status: TaskStatus) -> bool {
  status.is_normal()
    || status == TaskStatus::Deleted
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct StatusFilterState {
  selected:   BTreeSet<TaskStatus>,
  all_normal: bool,
  deleted:    bool
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
  pub state:   StatusFilterState,
  pub changed: bool
}

impl StatusFilterState {
  pub fn selected(
    &self
  ) -> &BTreeSet<TaskStatus> {
    &self.selected
  }

  pub fn is_all_normal_selected(
    &self
  ) -> bool {
    self.all_normal
  }

  pub fn is_deleted_selected(
    &self
  ) -> bool {
    self.deleted
  }

  pub fn is_empty(&self) -> bool {
    self.selected.is_empty()
  }

  /// Values the checkbox group should
  /// show as checked, "all" included.
  pub fn checked_values(
    &self
  ) -> Vec<FilterValue> {
    let mut out = Vec::with_capacity(
      self.selected.len() + 1
    );
    if self.all_normal {
      out.push(FilterValue::All);
    }
    out.extend(
      self
        .selected
        .iter()
        .copied()
        .map(FilterValue::Status)
    );
    out
  }

  /// Normal statuses are disabled in the
  /// UI while "deleted" is selected.
  pub fn is_status_enabled(
    &self,
    status: TaskStatus
  ) -> bool {
    status == TaskStatus::Deleted
      || !self.deleted
  }

  /// Status list for the query. `None`
  /// means the parameter is omitted.
  pub fn query_statuses(
    &self
  ) -> Option<Vec<TaskStatus>> {
    if self.selected.is_empty() {
      None
    } else {
      Some(
        self
          .selected
          .iter()
          .copied()
          .collect()
      )
    }
  }

  pub fn select_all_normal(
    &self,
    checked: bool
  ) -> Reconciled {
    let mut raw: Vec<FilterValue> = if checked {
      self.checked_values()
    } else {
      self
        .selected
        .iter()
        .copied()
        .filter(|s| !s.is_normal())
        .map(FilterValue::Status)
        .collect()
    };
    if checked
      && !raw.contains(&FilterValue::All)
    {
      raw.push(FilterValue::All);
    }
    reconcile(self, &raw)
  }

  pub fn select_deleted(
    &self,
    checked: bool
  ) -> Reconciled {
    let deleted =
      FilterValue::Status(TaskStatus::Deleted);
    let mut raw: Vec<FilterValue> = self
      .checked_values()
      .into_iter()
      .filter(|v| *v != deleted)
      .collect();
    if checked {
      raw.push(deleted);
    }
    reconcile(self, &raw)
  }
}

fn normal_count(
  set: &BTreeSet<TaskStatus>
) -> usize {
  set.iter().filter(|s| s.is_normal()).count()
}

/// Computes the next filter state from the
/// previous one and the full list of
/// checked values after a UI event.
///
/// Only `previous` and `raw` feed the
/// result. Later rules override earlier
/// ones: a fresh "deleted" wins over a
/// fresh "all".
#[instrument(skip(previous, raw), fields(raw_len = raw.len()))]
pub fn reconcile(
  previous: &StatusFilterState,
  raw: &[FilterValue]
) -> Reconciled {
  let has_all =
    raw.contains(&FilterValue::All);
  let has_deleted = raw.contains(
    &FilterValue::Status(
      TaskStatus::Deleted
    )
  );

  let mut working: BTreeSet<TaskStatus> =
    raw
      .iter()
      .filter_map(|value| match value {
        | FilterValue::Status(s)
          if is_filterable(*s) =>
        {
          Some(*s)
        }
        | _ => None
      })
      .collect();
  let mut all_normal = previous.all_normal;

  if has_all && !previous.all_normal {
    working = TaskStatus::NORMAL
      .into_iter()
      .collect();
    if has_deleted {
      working.insert(TaskStatus::Deleted);
    }
    all_normal = true;
  } else if !has_all && previous.all_normal
  {
    all_normal = false;
  } else if previous.all_normal
    && normal_count(&working)
      < TaskStatus::NORMAL.len()
  {
    all_normal = false;
  }

  let deleted = if has_deleted
    && !previous.deleted
  {
    working =
      BTreeSet::from([TaskStatus::Deleted]);
    all_normal = false;
    true
  } else if !has_deleted && previous.deleted
  {
    working.remove(&TaskStatus::Deleted);
    false
  } else if has_deleted {
    // normal statuses stay disabled while
    // deleted is selected
    working =
      BTreeSet::from([TaskStatus::Deleted]);
    all_normal = false;
    true
  } else {
    false
  };

  if !deleted {
    all_normal = normal_count(&working)
      == TaskStatus::NORMAL.len();
  }

  let state = StatusFilterState {
    selected: working,
    all_normal,
    deleted
  };
  let changed = state != *previous;
  debug!(
    changed,
    all_normal = state.all_normal,
    deleted = state.deleted,
    selected = ?state.selected,
    "reconciled status filter"
  );

  Reconciled { state, changed }
}

#[cfg(test)]
mod tests {
  use docket_shared::TaskStatus;

  use super::{
    FilterValue,
    StatusFilterState,
    reconcile
  };

  #[test]
  fn to_receive_is_not_a_list_filter() {
    assert!(
      "to-receive".parse::<FilterValue>().is_err()
    );
    assert!("0".parse::<FilterValue>().is_err());
    assert_eq!(
      "ALL".parse::<FilterValue>(),
      Ok(FilterValue::All)
    );
    assert_eq!(
      "deleted".parse::<FilterValue>(),
      Ok(FilterValue::Status(TaskStatus::Deleted))
    );

    let step = reconcile(
      &StatusFilterState::default(),
      &[
        FilterValue::Status(TaskStatus::ToReceive),
        FilterValue::Status(TaskStatus::Overdue)
      ]
    );
    assert_eq!(
      step.state.query_statuses(),
      Some(vec![TaskStatus::Overdue])
    );
  }

  fn normal_values() -> Vec<FilterValue> {
    TaskStatus::NORMAL
      .into_iter()
      .map(FilterValue::Status)
      .collect()
  }

  fn statuses(
    state: &StatusFilterState
  ) -> Vec<TaskStatus> {
    state.selected().iter().copied().collect()
  }

  const DELETED: FilterValue =
    FilterValue::Status(
      TaskStatus::Deleted
    );

  #[test]
  fn all_then_deleted_then_unchecked() {
    let empty = StatusFilterState::default();

    let step = reconcile(
      &empty,
      &[FilterValue::All]
    );
    assert!(step.changed);
    assert!(step.state.is_all_normal_selected());
    assert_eq!(
      statuses(&step.state),
      TaskStatus::NORMAL.to_vec()
    );

    let mut raw =
      step.state.checked_values();
    raw.push(DELETED);
    let step = reconcile(&step.state, &raw);
    assert!(step.changed);
    assert_eq!(
      statuses(&step.state),
      vec![TaskStatus::Deleted]
    );
    assert!(!step.state.is_all_normal_selected());
    assert!(step.state.is_deleted_selected());

    let step = reconcile(&step.state, &[]);
    assert!(step.changed);
    assert!(step.state.is_empty());
    assert_eq!(
      step.state,
      StatusFilterState::default()
    );
  }

  #[test]
  fn deleted_wins_from_any_prior_state() {
    let priors = [
      StatusFilterState::default(),
      reconcile(
        &StatusFilterState::default(),
        &[FilterValue::All]
      )
      .state,
      reconcile(
        &StatusFilterState::default(),
        &[FilterValue::Status(
          TaskStatus::Overdue
        )]
      )
      .state
    ];

    for prior in priors {
      let mut raw = prior.checked_values();
      raw.push(DELETED);
      let next = reconcile(&prior, &raw).state;
      assert_eq!(
        statuses(&next),
        vec![TaskStatus::Deleted]
      );
      assert!(!next.is_all_normal_selected());
    }
  }

  #[test]
  fn fresh_all_and_deleted_together_collapse_to_deleted()
  {
    let mut raw = vec![FilterValue::All];
    raw.push(DELETED);
    let next = reconcile(
      &StatusFilterState::default(),
      &raw
    )
    .state;
    assert_eq!(
      statuses(&next),
      vec![TaskStatus::Deleted]
    );
    assert!(!next.is_all_normal_selected());
  }

  #[test]
  fn unchecking_deleted_forgets_earlier_selection()
  {
    let picked = reconcile(
      &StatusFilterState::default(),
      &[
        FilterValue::Status(
          TaskStatus::Pending
        ),
        FilterValue::Status(
          TaskStatus::Overdue
        )
      ]
    )
    .state;
    let deleted = picked.select_deleted(true);
    assert!(deleted.changed);
    let cleared =
      deleted.state.select_deleted(false);
    assert!(cleared.state.is_empty());
    assert!(!cleared.state.is_deleted_selected());
  }

  #[test]
  fn checking_every_status_individually_selects_all()
  {
    let mut state =
      StatusFilterState::default();
    let mut raw = Vec::new();
    for status in TaskStatus::NORMAL {
      assert!(!state.is_all_normal_selected());
      raw.push(FilterValue::Status(status));
      let step = reconcile(&state, &raw);
      assert!(step.changed);
      state = step.state;
    }
    assert!(state.is_all_normal_selected());
    assert!(
      state
        .checked_values()
        .contains(&FilterValue::All)
    );
  }

  #[test]
  fn unchecking_one_status_drops_all() {
    let all = reconcile(
      &StatusFilterState::default(),
      &[FilterValue::All]
    )
    .state;

    let mut raw = vec![FilterValue::All];
    raw.extend(
      normal_values()
        .into_iter()
        .filter(|v| {
          *v
            != FilterValue::Status(
              TaskStatus::Cancelled
            )
        })
    );
    let next = reconcile(&all, &raw).state;
    assert!(!next.is_all_normal_selected());
    assert_eq!(next.selected().len(), 4);
    assert!(
      !next
        .selected()
        .contains(&TaskStatus::Cancelled)
    );
  }

  #[test]
  fn same_selection_is_not_a_change() {
    let state = reconcile(
      &StatusFilterState::default(),
      &[FilterValue::Status(
        TaskStatus::Completed
      )]
    )
    .state;
    let again =
      reconcile(&state, &state.checked_values());
    assert!(!again.changed);
    assert_eq!(again.state, state);
  }

  #[test]
  fn result_depends_only_on_previous_state_and_raw()
  {
    let via_all = reconcile(
      &StatusFilterState::default(),
      &[FilterValue::All]
    )
    .state;
    let via_individual = reconcile(
      &StatusFilterState::default(),
      &normal_values()
    )
    .state;
    assert_eq!(via_all, via_individual);

    let raw = [FilterValue::Status(
      TaskStatus::InProgress
    )];
    assert_eq!(
      reconcile(&via_all, &raw),
      reconcile(&via_individual, &raw)
    );
  }

  #[test]
  fn convenience_transitions_match_raw_events()
  {
    let empty = StatusFilterState::default();
    assert_eq!(
      empty.select_all_normal(true),
      reconcile(&empty, &[FilterValue::All])
    );

    let all = empty.select_all_normal(true).state;
    let unchecked = all.select_all_normal(false);
    assert_eq!(
      unchecked,
      reconcile(&all, &[])
    );
    assert!(unchecked.state.is_empty());

    let mut raw = all.checked_values();
    raw.push(DELETED);
    assert_eq!(
      all.select_deleted(true),
      reconcile(&all, &raw)
    );

    let deleted = all.select_deleted(true).state;
    assert_eq!(
      deleted.select_deleted(false),
      reconcile(&deleted, &[])
    );
  }

  #[test]
  fn query_parameter_is_omitted_when_empty()
  {
    let empty = StatusFilterState::default();
    assert_eq!(empty.query_statuses(), None);

    let picked = reconcile(
      &empty,
      &[
        FilterValue::Status(
          TaskStatus::Overdue
        ),
        FilterValue::Status(
          TaskStatus::Pending
        )
      ]
    )
    .state;
    assert_eq!(
      picked.query_statuses(),
      Some(vec![
        TaskStatus::Pending,
        TaskStatus::Overdue
      ])
    );
  }

  #[test]
  fn normal_statuses_are_disabled_while_deleted()
  {
    let deleted = StatusFilterState::default()
      .select_deleted(true)
      .state;
    assert!(
      !deleted
        .is_status_enabled(TaskStatus::Pending)
    );
    assert!(
      deleted
        .is_status_enabled(TaskStatus::Deleted)
    );

    let ignored = reconcile(
      &deleted,
      &[
        DELETED,
        FilterValue::Status(
          TaskStatus::Pending
        )
      ]
    );
    assert!(!ignored.changed);
  }

  #[test]
  fn filter_values_parse_from_cli_tokens() {
    assert_eq!(
      "ALL".parse::<FilterValue>(),
      Ok(FilterValue::All)
    );
    assert_eq!(
      "deleted".parse::<FilterValue>(),
      Ok(DELETED)
    );
    assert!(
      "nope".parse::<FilterValue>().is_err()
    );
  }
}
