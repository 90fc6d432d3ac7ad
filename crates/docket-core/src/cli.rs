use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use docket_shared::{QueryType, TaskStatus};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::status_filter::FilterValue;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "docket",
    version,
    about = "Docket: team task tracking from the terminal",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "docketrc")]
    pub docketrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Act as this user instead of `user.id`.
    #[arg(long = "as", value_name = "USER")]
    pub acting_as: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mine {
    Assigned,
    Executing,
}

impl From<Mine> for QueryType {
    fn from(mine: Mine) -> Self {
        match mine {
            Mine::Assigned => QueryType::AssignedByMe,
            Mine::Executing => QueryType::ExecutedByMe,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[arg(long, short = 'd')]
        description: Option<String>,
        /// Executor as `ID` or `ID:NAME`; repeatable.
        #[arg(long = "executor", short = 'e', action = ArgAction::Append)]
        executors: Vec<String>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        deadline: Option<String>,
    },
    /// Page through tasks.
    List {
        /// Checkbox values in click order: `all`, `deleted` or a status name.
        #[arg(long = "status", short = 's', action = ArgAction::Append)]
        statuses: Vec<FilterValue>,
        #[arg(long = "assignee", short = 'a', action = ArgAction::Append)]
        assignees: Vec<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long = "page-size")]
        page_size: Option<u32>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long, value_enum)]
        mine: Option<Mine>,
        /// One JSON task per line.
        #[arg(long)]
        json: bool,
    },
    Show {
        id: String,
    },
    Title {
        id: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    Describe {
        id: String,
        #[arg(num_args = 0..)]
        text: Vec<String>,
    },
    /// Flip the important flag.
    Important {
        id: String,
    },
    Status {
        id: String,
        status: TaskStatus,
    },
    Done {
        id: String,
    },
    Progress {
        id: String,
        percent: u32,
        #[arg(num_args = 0..)]
        note: Vec<String>,
    },
    /// Change one executor's own status.
    ExecutorStatus {
        id: String,
        executor: String,
        status: TaskStatus,
    },
    /// Replace the executor list.
    Executors {
        id: String,
        #[arg(num_args = 0..)]
        users: Vec<String>,
    },
    Subtask {
        parent: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    /// Check off a subtask of PARENT.
    Check {
        parent: String,
        subtask: String,
        /// Set the subtask back to pending.
        #[arg(long)]
        reopen: bool,
    },
    /// Cancel an unfinished task and its executors.
    Cancel {
        id: String,
    },
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Kanban view, one column per status.
    Board {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, value_enum)]
        mine: Option<Mine>,
        #[arg(long = "page-size")]
        page_size: Option<u32>,
        /// Drag a card: `ID=STATUS`.
        #[arg(
            long = "move",
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>())
        )]
        move_card: Option<KeyVal>,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls bare `rc.KEY=VALUE` / `rc.KEY:VALUE` tokens out of the argument list.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));
            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k.to_string(), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
