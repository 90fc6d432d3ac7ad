//! Apply a change locally, confirm it
//! remotely, roll it back when the server
//! says no.

use std::future::Future;

use docket_shared::{
  ApiResponse,
  Task
};
use thiserror::Error;
use tracing::{
  debug,
  error,
  instrument,
  warn
};

use crate::api::TaskApi;
use crate::notify::Notifier;

pub const GENERIC_FAILURE: &str =
  "operation failed";

#[derive(
  Debug, Clone, PartialEq, Eq, Error,
)]
pub enum MutationError {
  #[error("invalid input: {0}")]
  Invalid(String),
  #[error("server rejected the change with code {code}")]
  Rejected {
    code:    String,
    message: Option<String>
  },
  #[error("request failed: {0}")]
  Transport(String),
  #[error(
    "user {actor} may not change the status of executor {executor}"
  )]
  PermissionDenied {
    actor:    String,
    executor: String
  },
  #[error("user {actor} may not {action}")]
  NotAllowed {
    actor:  String,
    action: String
  },
  #[error("executor {0} is not assigned to this task")]
  NotFound(String),
  #[error("cancelled")]
  Cancelled
}

impl MutationError {
  /// Text shown to the user: the server
  /// message when it sent one.
  pub fn user_message(&self) -> String {
    match self {
      | MutationError::Rejected {
        message: Some(message),
        ..
      } if !message.trim().is_empty() => {
        message.clone()
      }
      | MutationError::Invalid(reason) => {
        reason.clone()
      }
      | MutationError::PermissionDenied {
        ..
      }
      | MutationError::NotAllowed { .. } => {
        "permission denied".to_string()
      }
      | MutationError::NotFound(_) => {
        self.to_string()
      }
      | _ => GENERIC_FAILURE.to_string()
    }
  }
}

/// A field-level change to `E` that can be
/// undone.
pub trait Mutation<E> {
  /// Prior values of exactly the fields
  /// `apply` writes.
  type Snapshot;

  fn describe(&self) -> String;

  fn capture(
    &self,
    entity: &E
  ) -> Self::Snapshot;

  fn apply(&self, entity: &mut E);

  fn restore(
    &self,
    entity: &mut E,
    snapshot: Self::Snapshot
  );

  /// Whether server-computed fields may
  /// have moved, given the values before.
  fn needs_refresh(
    &self,
    _before: &Self::Snapshot
  ) -> bool {
    false
  }

  fn success_message(&self) -> String {
    "updated".to_string()
  }
}

pub struct OptimisticMutationExecutor<
  'a,
  C,
  N
> {
  api:      &'a C,
  notifier: &'a N
}

impl<'a, C, N> OptimisticMutationExecutor<'a, C, N>
where
  C: TaskApi,
  N: Notifier
{
  pub fn new(
    api: &'a C,
    notifier: &'a N
  ) -> Self {
    Self { api, notifier }
  }

  pub fn api(&self) -> &'a C {
    self.api
  }

  /// Mutates `task`, awaits `remote`, and
  /// on success silently re-reads the task
  /// when the mutation asks for it. On
  /// failure every touched field is put
  /// back and the user is notified.
  #[instrument(skip_all, fields(task = %task.id, mutation = %mutation.describe()))]
  pub async fn execute<M, B, F, Fut>(
    &self,
    task: &mut Task,
    mutation: M,
    remote: F
  ) -> Result<(), MutationError>
  where
    M: Mutation<Task>,
    F: FnOnce() -> Fut,
    Fut: Future<
      Output = anyhow::Result<
        ApiResponse<B>
      >
    >
  {
    let before = self
      .execute_on(task, &mutation, remote)
      .await?;
    if mutation.needs_refresh(&before) {
      self.refresh(task).await;
    }
    Ok(())
  }

  /// Entity-agnostic core of [`Self::execute`]
  /// without the follow-up refresh. Hands
  /// back the snapshot on commit.
  pub async fn execute_on<E, M, B, F, Fut>(
    &self,
    entity: &mut E,
    mutation: &M,
    remote: F
  ) -> Result<M::Snapshot, MutationError>
  where
    M: Mutation<E>,
    F: FnOnce() -> Fut,
    Fut: Future<
      Output = anyhow::Result<
        ApiResponse<B>
      >
    >
  {
    let snapshot = mutation.capture(entity);
    mutation.apply(entity);

    match self.call(remote).await {
      | Ok(_) => {
        debug!(
          mutation = %mutation.describe(),
          "optimistic mutation committed"
        );
        self
          .notifier
          .success(&mutation.success_message());
        Ok(snapshot)
      }
      | Err(err) => {
        mutation.restore(entity, snapshot);
        warn!(
          mutation = %mutation.describe(),
          error = %err,
          "optimistic mutation rolled back"
        );
        Err(self.report(err))
      }
    }
  }

  /// Awaits a remote call and classifies
  /// the outcome. Nothing is notified.
  pub async fn call<B, F, Fut>(
    &self,
    remote: F
  ) -> Result<Option<B>, MutationError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<
      Output = anyhow::Result<
        ApiResponse<B>
      >
    >
  {
    match remote().await {
      | Ok(resp) if resp.is_success() => {
        Ok(resp.body)
      }
      | Ok(resp) => {
        Err(MutationError::Rejected {
          code:    resp.code,
          message: resp.message
        })
      }
      | Err(err) => {
        error!(
          error = %format!("{err:#}"),
          "remote call failed"
        );
        Err(MutationError::Transport(
          format!("{err:#}")
        ))
      }
    }
  }

  /// Remote-only operation with nothing to
  /// roll back locally, such as a delete.
  pub async fn confirm<B, F, Fut>(
    &self,
    remote: F,
    success_message: &str
  ) -> Result<Option<B>, MutationError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<
      Output = anyhow::Result<
        ApiResponse<B>
      >
    >
  {
    match self.call(remote).await {
      | Ok(body) => {
        self.notifier.success(success_message);
        Ok(body)
      }
      | Err(err) => Err(self.report(err))
    }
  }

  /// Surfaces an error to the user and
  /// returns it for propagation.
  pub fn report(
    &self,
    err: MutationError
  ) -> MutationError {
    self.notifier.error(&err.user_message());
    err
  }

  /// Silent refresh: replaces `task` with
  /// the canonical copy. Failures keep the
  /// local state and are only logged.
  #[instrument(skip_all, fields(task = %task.id))]
  pub async fn refresh(
    &self,
    task: &mut Task
  ) -> bool {
    let id = task.id.clone();
    match self.api.fetch_task(&id).await {
      | Ok(resp) if resp.is_success() => {
        match resp.body {
          | Some(canonical) => {
            debug!("silent refresh applied");
            *task = canonical;
            true
          }
          | None => {
            warn!(
              "silent refresh returned no body"
            );
            false
          }
        }
      }
      | Ok(resp) => {
        warn!(
          code = %resp.code,
          "silent refresh rejected; keeping local state"
        );
        false
      }
      | Err(err) => {
        warn!(
          error = %format!("{err:#}"),
          "silent refresh failed; keeping local state"
        );
        false
      }
    }
  }
}
