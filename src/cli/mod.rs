pub mod process;
pub mod report;

use std::{
    env,
    path::{Path, PathBuf},
};

use ansi_term::Colour;
use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use process::{kill_previous_servers, restart_server};
use report::{process_report_command, ReportCommand};
use serde_json::{json, Value};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{create_engine, engine::indicator::LogIndicator, engine::protocol, start_daemon},
    utils::{
        clock::DefaultClock,
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
        time::{format_duration, parse_signed_hms},
    },
};

#[derive(Parser, Debug)]
#[command(name = "PrimeTrack", version, long_about = None)]
#[command(about = "Project/task time tracker with a single active timer", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts the idle-watching daemon in the background")]
    Init {},
    #[command(
        about = "Run the daemon directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {},
    #[command(about = "Stop a currently running daemon.")]
    Shutdown {},
    #[command(about = "Start the timer on a task")]
    Start {
        #[arg(long, help = "Project id, see `status` for the list")]
        project: String,
        #[arg(long, help = "Task id, see `status` for the list")]
        task: String,
    },
    #[command(about = "Stop the running timer and record the session")]
    Stop {},
    #[command(about = "Restart the running timer from zero without recording anything")]
    Reset {},
    #[command(about = "Manage projects")]
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    #[command(about = "Manage tasks")]
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    #[command(about = "Print the accumulated total of a task or a project in milliseconds")]
    Total {
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    #[command(about = "Dump projects, tasks, sessions and the current state as JSON")]
    Snapshot {},
    #[command(about = "Show what is being tracked right now")]
    Status {},
    #[command(about = "Summarize recorded sessions over a date range")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectCommands {
    #[command(about = "Create a project with the default task set")]
    New { name: String },
    #[command(about = "Rename a project")]
    Rename {
        #[arg(long)]
        project: String,
        name: String,
    },
    #[command(about = "Hide a project from selection lists. Nothing is ever deleted")]
    Archive {
        #[arg(long)]
        project: String,
        #[arg(long, help = "Bring the project back instead")]
        restore: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommands {
    #[command(about = "Create a task under a project")]
    New {
        #[arg(long)]
        project: String,
        name: String,
    },
    #[command(about = "Apply a signed H:MM:SS correction to a task total")]
    Adjust {
        #[arg(long)]
        task: String,
        #[arg(allow_hyphen_values = true, help = "Correction such as 1:30:00 or -0:10:00")]
        delta: String,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args
        .dir
        .clone()
        .map_or_else(create_application_default_path, Ok)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init {} => {
            restart_server()?;
            Ok(())
        }
        Commands::Shutdown {} => {
            let process_name = env::current_exe().expect("Can't operate without an executable");
            kill_previous_servers(&process_name);
            Ok(())
        }
        Commands::Serve {} => {
            start_daemon(app_dir).await?;
            Ok(())
        }
        Commands::Status {} => process_status_command(&app_dir).await,
        Commands::Report { command } => process_report_command(&app_dir, command).await,
        action => {
            let message = action_message(action)?;
            let mut engine =
                create_engine(&app_dir, Box::new(DefaultClock), Box::new(LogIndicator))?;
            let response = protocol::handle_message(&mut engine, &message).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

/// Maps an action subcommand to its protocol message. The CLI is a thin stand-in for the UI
/// layer, one subcommand per action.
fn action_message(command: Commands) -> Result<Value> {
    Ok(match command {
        Commands::Start { project, task } => {
            json!({"action": "timer:start", "payload": {"projectId": project, "taskId": task}})
        }
        Commands::Stop {} => json!({"action": "timer:stop"}),
        Commands::Reset {} => json!({"action": "timer:reset"}),
        Commands::Project { command } => match command {
            ProjectCommands::New { name } => {
                json!({"action": "project:create", "payload": {"name": name}})
            }
            ProjectCommands::Rename { project, name } => {
                json!({"action": "project:rename", "payload": {"projectId": project, "newName": name}})
            }
            ProjectCommands::Archive { project, restore } => {
                json!({"action": "project:archive", "payload": {"projectId": project, "archived": !restore}})
            }
        },
        Commands::Task { command } => match command {
            TaskCommands::New { project, name } => {
                json!({"action": "task:create", "payload": {"projectId": project, "name": name}})
            }
            TaskCommands::Adjust { task, delta } => {
                let delta_ms = parse_signed_hms(&delta)?;
                json!({"action": "task:adjust", "payload": {"taskId": task, "deltaMs": delta_ms}})
            }
        },
        Commands::Total { task, project } => {
            let mut payload = serde_json::Map::new();
            if let Some(task) = task {
                payload.insert("taskId".into(), task.into());
            }
            if let Some(project) = project {
                payload.insert("projectId".into(), project.into());
            }
            json!({"action": "total:get", "payload": payload})
        }
        Commands::Snapshot {} => json!({"action": "get:snapshot"}),
        Commands::Init {}
        | Commands::Serve {}
        | Commands::Shutdown {}
        | Commands::Status {}
        | Commands::Report { .. } => unreachable!("not an engine action"),
    })
}

async fn process_status_command(app_dir: &Path) -> Result<()> {
    let mut engine = create_engine(app_dir, Box::new(DefaultClock), Box::new(LogIndicator))?;
    let snapshot = engine.snapshot().await?;

    match &snapshot.state.active {
        Some(active) => {
            let project_name = snapshot
                .projects
                .iter()
                .find(|p| p.id == active.project_id)
                .map(|p| p.name.as_str())
                .unwrap_or("<unknown project>");
            let task_name = snapshot
                .tasks
                .iter()
                .find(|t| t.id == active.task_id)
                .map(|t| t.name.as_str())
                .unwrap_or("<unknown task>");
            let elapsed = Utc::now() - active.started_at
                + Duration::milliseconds(active.carried_ms as i64);
            println!(
                "{} {} / {} for {}",
                Colour::Red.bold().paint("recording"),
                project_name,
                task_name,
                format_duration(elapsed)
            );
        }
        None => println!("{}", Colour::Green.paint("stopped")),
    }

    for project in snapshot.projects.iter().filter(|p| !p.archived) {
        let total: u64 = snapshot
            .tasks
            .iter()
            .filter(|t| t.project_id == project.id)
            .map(|t| t.total_ms)
            .sum();
        println!(
            "\n{}\t{}\t[{}]",
            format_duration(Duration::milliseconds(total as i64)),
            ansi_term::Style::new().bold().paint(project.name.as_str()),
            project.id
        );
        for task in snapshot.tasks.iter().filter(|t| t.project_id == project.id) {
            println!(
                "  {}\t{}\t[{}]",
                format_duration(Duration::milliseconds(task.total_ms as i64)),
                task.name,
                task.id
            );
        }
    }
    Ok(())
}
