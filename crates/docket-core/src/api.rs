use std::future::Future;

use docket_shared::{
  ApiResponse,
  NewTask,
  Task,
  TaskListFilter,
  TaskPage,
  TaskPatch,
  TaskStatus,
  UserRef
};

/// Remote task service. An `Err` is the
/// thrown/network path; a response with a
/// code other than `"200"` is a rejection.
pub trait TaskApi {
  fn fetch_task_list(
    &self,
    filter: TaskListFilter
  ) -> impl Future<
    Output = anyhow::Result<
      ApiResponse<TaskPage>
    >
  >;

  fn fetch_task(
    &self,
    id: &str
  ) -> impl Future<
    Output = anyhow::Result<ApiResponse<Task>>
  >;

  fn create_task(
    &self,
    task: NewTask
  ) -> impl Future<
    Output = anyhow::Result<ApiResponse<Task>>
  >;

  fn update_task(
    &self,
    patch: TaskPatch
  ) -> impl Future<
    Output = anyhow::Result<ApiResponse<Task>>
  >;

  fn update_executor_status(
    &self,
    task_id: &str,
    executor_id: &str,
    status: TaskStatus
  ) -> impl Future<
    Output = anyhow::Result<ApiResponse<()>>
  >;

  /// Cancels a task that is not finished;
  /// its executors are cancelled with it.
  fn cancel_task(
    &self,
    id: &str
  ) -> impl Future<
    Output = anyhow::Result<ApiResponse<()>>
  >;

  fn delete_task(
    &self,
    id: &str
  ) -> impl Future<
    Output = anyhow::Result<ApiResponse<()>>
  >;

  fn list_users(
    &self
  ) -> impl Future<
    Output = anyhow::Result<
      ApiResponse<Vec<UserRef>>
    >
  >;
}
