//! Diagnostic CLI over the mission control facade.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mission_core::{SystemClock, Task, TaskId, TaskStatus};
use mission_git::GitCli;
use missiond::{ControlError, McpServer, MissionControl, ToolRegistry};

#[derive(Parser)]
#[command(name = "mission")]
#[command(about = "Task dependency engine for agent workflows")]
#[command(version)]
struct Cli {
    /// Operate on this project root instead of the current directory
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tasks
    List {
        /// Filter by status (todo, in_progress, blocked, done)
        #[arg(long)]
        status: Option<String>,
        /// Filter by tag; repeatable
        #[arg(long)]
        tag: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show tasks whose dependencies are all complete
    Ready {
        #[arg(long)]
        json: bool,
    },
    /// Create a task
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma-separated dependency ids
        #[arg(long, value_delimiter = ',')]
        depends: Vec<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long)]
        priority: Option<i64>,
    },
    /// Update a task's status
    Status {
        #[arg(long)]
        id: String,
        #[arg(long = "set-status")]
        set_status: String,
    },
    /// Check dependency consistency
    Check,
    /// Show the mission summary
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// Commit the task directory via the version-control tool
    Commit {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Serve the tool set over MCP stdio
    Serve,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let root = match cli.project {
        Some(path) => path,
        None => std::env::current_dir().context("resolve working directory")?,
    };
    let git = GitCli::default();
    let clock = Arc::new(SystemClock);

    if matches!(&cli.command, Commands::Serve) {
        let registry = Arc::new(ToolRegistry::new(root, git, clock));
        let mut server = McpServer::new(registry);
        server.run_stdio().context("MCP stdio loop")?;
        return Ok(());
    }

    let mc = MissionControl::open(&root, git, clock)?;

    match cli.command {
        Commands::List { status, tag, json } => {
            let status = parse_status(status.as_deref())?;
            let tasks = mc.list_tasks(status, &tag)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_tasks(&tasks);
            }
        }
        Commands::Ready { json } => {
            let tasks = mc.list_ready_work()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("nothing ready");
            } else {
                print_tasks(&tasks);
            }
        }
        Commands::Create {
            title,
            description,
            depends,
            tags,
            priority,
        } => {
            let depends_on = depends.into_iter().map(TaskId::new).collect();
            let task = mc.create_task(&title, &description, depends_on, tags, priority)?;
            println!("created {} '{}'", task.id, task.title);
        }
        Commands::Status { id, set_status } => {
            let id = TaskId::new(id);
            let status: TaskStatus = set_status.parse().map_err(anyhow::Error::msg)?;
            let task = mc.update_task_status(&id, status, true)?;
            println!("updated {} -> {}", task.id, task.status);
            if matches!(mc.get_task(&task.id), Err(ControlError::NotFound { .. })) {
                println!("archived {}", task.id);
            }
        }
        Commands::Check => {
            let (ok, errors) = mc.check_consistency()?;
            if ok {
                println!("all task dependencies are consistent");
            } else {
                for error in errors {
                    println!("{error}");
                }
            }
        }
        Commands::Summary { json } => {
            let summary = mc.summary()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("tasks:      {}", summary.total_tasks);
                for (status, count) in &summary.by_status {
                    println!("  {status:<12} {count}");
                }
                println!("ready:      {}", summary.ready_count);
                for entry in &summary.ready_tasks {
                    println!("  p{:<2} {} {}", entry.priority, entry.id, entry.title);
                }
                println!(
                    "consistent: {}",
                    if summary.is_consistent { "yes" } else { "no" }
                );
                for error in &summary.consistency_errors {
                    println!("  {error}");
                }
                println!("store:      {}", summary.task_dir);
            }
        }
        Commands::Commit { message } => {
            let committed = mc.commit(message.as_deref())?;
            println!("committed: {committed}");
        }
        Commands::Serve => unreachable!("handled above"),
    }

    Ok(())
}

fn parse_status(raw: Option<&str>) -> anyhow::Result<Option<TaskStatus>> {
    match raw {
        Some(raw) => raw
            .parse::<TaskStatus>()
            .map(Some)
            .map_err(anyhow::Error::msg),
        None => Ok(None),
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        let deps = if task.depends_on.is_empty() {
            String::new()
        } else {
            let ids: Vec<&str> = task.depends_on.iter().map(|d| d.as_ref()).collect();
            format!("  <- {}", ids.join(", "))
        };
        println!(
            "{:<10} {:<12} p{:<2} {}{}",
            task.id.as_ref(),
            task.status.as_str(),
            task.priority,
            task.title,
            deps
        );
    }
}
