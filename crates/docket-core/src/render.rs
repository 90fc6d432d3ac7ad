use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use docket_shared::{Task, TaskStatus};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::kanban::KanbanColumn;

const BOARD_CARD_WIDTH: usize = 28;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn color(&self) -> bool {
        self.color
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(
        &self,
        tasks: &[Task],
        total: usize,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, tasks)?;

        let pages = total.div_ceil(page_size.max(1) as usize).max(1);
        writeln!(out)?;
        writeln!(out, "page {page}/{pages}, {total} task(s)")?;
        Ok(())
    }

    pub fn write_task_table<W: Write>(&self, out: W, tasks: &[Task]) -> anyhow::Result<()> {
        let headers = ["ID", "!", "Status", "Progress", "Executors", "Deadline", "Title"]
            .map(String::from)
            .to_vec();

        let rows = tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(&task.id, "33"),
                    if task.is_important {
                        self.paint("!", "35")
                    } else {
                        String::new()
                    },
                    self.status_cell(task.status),
                    format!("{}%", task.progress_percent),
                    task.executors
                        .iter()
                        .map(|e| {
                            if e.name.is_empty() {
                                e.user_id.clone()
                            } else {
                                e.name.clone()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(", "),
                    task.deadline.clone().unwrap_or_default(),
                    task.title.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, task, subtasks))]
    pub fn print_task_info(&self, task: &Task, subtasks: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        if let Some(parent) = &task.parent_id {
            writeln!(out, "parent    {parent}")?;
        }
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", self.status_cell(task.status))?;
        writeln!(out, "important {}", if task.is_important { "yes" } else { "no" })?;
        writeln!(out, "owner     {} ({})", task.owner_name, task.owner_id)?;
        writeln!(out, "progress  {}%", task.progress_percent)?;
        if let Some(note) = &task.progress_note {
            writeln!(out, "note      {note}")?;
        }
        if let Some(project) = &task.project_id {
            writeln!(out, "project   {project}")?;
        }
        if let Some(deadline) = &task.deadline {
            writeln!(out, "deadline  {deadline}")?;
        }
        if let Some(finished) = &task.finish_time {
            writeln!(out, "finished  {finished}")?;
        }
        if let Some(created) = &task.created {
            writeln!(out, "created   {created}")?;
        }
        if let Some(modified) = &task.modified {
            writeln!(out, "modified  {modified}")?;
        }
        if !task.description.is_empty() {
            writeln!(out, "desc      {}", task.description)?;
        }

        for executor in &task.executors {
            let status = executor
                .status
                .map(|s| self.status_cell(s))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                out,
                "executor  {} ({}) {status}",
                executor.name, executor.user_id
            )?;
        }

        if !subtasks.is_empty() {
            writeln!(out)?;
            writeln!(out, "subtasks")?;
            self.write_task_table(&mut out, subtasks)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, columns))]
    pub fn print_board(&self, columns: &[KanbanColumn]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = columns
            .iter()
            .map(|c| format!("{} ({})", self.status_cell(c.status), c.total))
            .collect();

        let depth = columns
            .iter()
            .map(|c| c.tasks.len() + usize::from(c.has_more()))
            .max()
            .unwrap_or(0);
        let rows = (0..depth)
            .map(|row| {
                columns
                    .iter()
                    .map(|c| match c.tasks.get(row) {
                        Some(task) => {
                            truncate(&format!("{} {}", task.id, task.title), BOARD_CARD_WIDTH)
                        }
                        None if row == c.tasks.len() && c.has_more() => {
                            format!("+{} more", c.total - c.tasks.len())
                        }
                        None => String::new(),
                    })
                    .collect()
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    fn status_cell(&self, status: TaskStatus) -> String {
        let code = match status {
            TaskStatus::Completed => "32",
            TaskStatus::Overdue => "31",
            TaskStatus::InProgress => "36",
            TaskStatus::Cancelled | TaskStatus::Deleted => "90",
            TaskStatus::ToReceive | TaskStatus::Pending => return status.to_string(),
        };
        self.paint(&status.to_string(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn truncate(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    out
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(header).as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write_cell(&mut writer, header, widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, width) in widths.iter().enumerate() {
            let cell = row.get(idx).map(String::as_str).unwrap_or("");
            write_cell(&mut writer, cell, *width)?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn write_cell<W: Write>(writer: &mut W, cell: &str, width: usize) -> anyhow::Result<()> {
    let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
    let padding = width.saturating_sub(visible_width);
    write!(writer, "{}{} ", cell, " ".repeat(padding))?;
    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
