use std::io::{self, BufRead, Write};

use anyhow::{Context, anyhow, bail};
use docket_shared::{Executor, NewTask, QueryType, Task, TaskListFilter, TaskStatus};
use tracing::{debug, info, instrument};

use crate::actions::TaskActions;
use crate::api::TaskApi;
use crate::cli::Command;
use crate::config::Config;
use crate::kanban::KanbanBoard;
use crate::list_view::TaskListView;
use crate::notify::Notifier;
use crate::optimistic::MutationError;
use crate::render::Renderer;

const SUBTASK_PAGE_SIZE: u32 = 100;

/// Everything a command needs besides its own arguments.
pub struct Session<'a, C, N> {
    pub api: &'a C,
    pub notifier: &'a N,
    pub cfg: &'a Config,
    pub renderer: &'a Renderer,
    pub actions: TaskActions<'a, C, N>,
}

impl<'a, C, N> Session<'a, C, N>
where
    C: TaskApi,
    N: Notifier,
{
    pub fn new(
        api: &'a C,
        notifier: &'a N,
        cfg: &'a Config,
        renderer: &'a Renderer,
        acting_as: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut actor = cfg.actor()?;
        if let Some(id) = acting_as {
            actor.id = id.to_string();
        }
        info!(actor = %actor.id, role = ?actor.role, "session actor");
        Ok(Self {
            api,
            notifier,
            cfg,
            renderer,
            actions: TaskActions::new(api, notifier, actor),
        })
    }
}

#[instrument(skip(session, command))]
pub async fn dispatch<C, N>(session: &Session<'_, C, N>, command: Command) -> anyhow::Result<()>
where
    C: TaskApi,
    N: Notifier,
{
    debug!(?command, "dispatching command");

    match command {
        Command::Add {
            title,
            description,
            executors,
            project,
            deadline,
        } => {
            let executors = executors
                .iter()
                .map(|spec| parse_executor(spec))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let task = session
                .actions
                .create(NewTask {
                    title: title.join(" "),
                    description: description.unwrap_or_default(),
                    executors,
                    project_id: project,
                    deadline,
                    ..NewTask::default()
                })
                .await?;
            println!("Created task {}.", task.id);
            Ok(())
        }
        Command::List {
            statuses,
            assignees,
            page,
            page_size,
            project,
            mine,
            json,
        } => {
            let page_size = match page_size {
                Some(size) => size,
                None => session.cfg.get_u32("list.pagesize")?.unwrap_or(10),
            };
            let mut view = TaskListView::new(session.api, session.notifier, page_size)
                .with_project(project)
                .with_query_type(mine.map(QueryType::from).unwrap_or_default());

            // outcome of the most recent fetch, if any ran
            let mut last_fetch = None;
            for value in statuses {
                // one click on one more checkbox
                let mut raw = view.status_filter().checked_values();
                if !raw.contains(&value) {
                    raw.push(value);
                }
                if let Some(ok) = view.on_status_selection(&raw).await {
                    last_fetch = Some(ok);
                }
            }
            if !assignees.is_empty() {
                last_fetch = Some(view.on_assignee_change(assignees).await);
            }
            if page > 1 {
                last_fetch = Some(view.on_page_change(page).await);
            }
            let loaded = match last_fetch {
                Some(ok) => ok,
                None => view.fetch().await,
            };
            if !loaded {
                bail!("failed to load tasks");
            }

            if json {
                let mut out = io::stdout().lock();
                for task in view.tasks() {
                    writeln!(out, "{}", serde_json::to_string(task)?)?;
                }
                return Ok(());
            }
            session.renderer.print_task_table(
                view.tasks(),
                view.total(),
                view.page(),
                view.page_size(),
            )
        }
        Command::Show { id } => {
            let task = load_task(session.api, &id).await?;
            let subtasks = session
                .api
                .fetch_task_list(TaskListFilter {
                    parent_id: Some(task.id.clone()),
                    ..TaskListFilter::new(1, SUBTASK_PAGE_SIZE)
                })
                .await?
                .body
                .map(|page| page.list)
                .unwrap_or_default();
            session.renderer.print_task_info(&task, &subtasks)
        }
        Command::Title { id, title } => {
            let mut task = load_task(session.api, &id).await?;
            session.actions.rename(&mut task, &title.join(" ")).await?;
            Ok(())
        }
        Command::Describe { id, text } => {
            let mut task = load_task(session.api, &id).await?;
            session
                .actions
                .describe(&mut task, &text.join(" "))
                .await?;
            Ok(())
        }
        Command::Important { id } => {
            let mut task = load_task(session.api, &id).await?;
            session.actions.toggle_important(&mut task).await?;
            Ok(())
        }
        Command::Status { id, status } => {
            let mut task = load_task(session.api, &id).await?;
            session.actions.set_status(&mut task, status).await?;
            Ok(())
        }
        Command::Done { id } => {
            let mut task = load_task(session.api, &id).await?;
            session.actions.mark_complete(&mut task).await?;
            Ok(())
        }
        Command::Progress { id, percent, note } => {
            let mut task = load_task(session.api, &id).await?;
            session
                .actions
                .submit_progress(&mut task, percent, &note.join(" "))
                .await?;
            Ok(())
        }
        Command::ExecutorStatus {
            id,
            executor,
            status,
        } => {
            let mut task = load_task(session.api, &id).await?;
            session
                .actions
                .update_executor_status(&mut task, &executor, status)
                .await?;
            Ok(())
        }
        Command::Executors { id, users } => {
            let mut task = load_task(session.api, &id).await?;
            let available = session.actions.available_users().await?;
            session
                .actions
                .update_executors(&mut task, &users, &available)
                .await?;
            Ok(())
        }
        Command::Subtask { parent, title } => {
            let parent = load_task(session.api, &parent).await?;
            let child = session
                .actions
                .add_subtask(&parent, &title.join(" "))
                .await?;
            println!("Created subtask {} under {}.", child.id, parent.id);
            Ok(())
        }
        Command::Check {
            parent,
            subtask,
            reopen,
        } => {
            let mut parent = load_task(session.api, &parent).await?;
            let saved = session
                .actions
                .toggle_subtask(&mut parent, &subtask, !reopen)
                .await?;
            println!("Subtask {} is {}.", saved.id, saved.status);
            Ok(())
        }
        Command::Cancel { id } => {
            let mut task = load_task(session.api, &id).await?;
            session.actions.cancel(&mut task).await?;
            Ok(())
        }
        Command::Delete { id, yes } => {
            let task = load_task(session.api, &id).await?;
            let ask = !yes && session.cfg.get_bool("confirm").unwrap_or(true);
            let outcome = session
                .actions
                .delete(&task, |task| !ask || prompt_delete(task))
                .await;
            match outcome {
                Ok(()) => Ok(()),
                Err(MutationError::Cancelled) => {
                    println!("Task {} not deleted.", task.id);
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        }
        Command::Board {
            project,
            mine,
            page_size,
            move_card,
        } => {
            let page_size = match page_size {
                Some(size) => size,
                None => session.cfg.get_u32("kanban.pagesize")?.unwrap_or(20),
            };
            let mut board = KanbanBoard::new(session.api, session.notifier, page_size)
                .with_project(project)
                .with_query_type(mine.map(QueryType::from).unwrap_or_default());
            board.load_all().await;

            if let Some(card) = move_card {
                let to: TaskStatus = card
                    .value
                    .parse()
                    .with_context(|| format!("invalid status for --move {}", card.key))?;
                board.move_task(&card.key, to).await?;
            }
            session.renderer.print_board(board.columns())
        }
    }
}

#[instrument(skip(api))]
async fn load_task<C: TaskApi>(api: &C, id: &str) -> anyhow::Result<Task> {
    let resp = api
        .fetch_task(id)
        .await
        .with_context(|| format!("failed to fetch task {id}"))?;
    if !resp.is_success() {
        let reason = resp.message.unwrap_or_else(|| format!("code {}", resp.code));
        bail!("cannot load task {id}: {reason}");
    }
    resp.body
        .ok_or_else(|| anyhow!("task {id} came back empty"))
}

fn parse_executor(spec: &str) -> anyhow::Result<Executor> {
    let (id, name) = match spec.split_once(':') {
        Some((id, name)) => (id.trim(), name.trim()),
        None => (spec.trim(), ""),
    };
    if id.is_empty() {
        bail!("executor needs an id, got {spec:?}");
    }
    Ok(Executor::new(id, name))
}

fn prompt_delete(task: &Task) -> bool {
    print!("Delete task {} '{}'? (y/N) ", task.id, task.title);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::parse_executor;

    #[test]
    fn executor_specs_accept_optional_names() {
        let e = parse_executor("U2:Dos").expect("with name");
        assert_eq!((e.user_id.as_str(), e.name.as_str()), ("U2", "Dos"));
        let e = parse_executor("U3").expect("bare id");
        assert_eq!((e.user_id.as_str(), e.name.as_str()), ("U3", ""));
        assert!(parse_executor(":nobody").is_err());
    }
}
