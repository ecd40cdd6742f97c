//! `evox`: command-line front end and scheduler daemon for the EVOX agent fleet.

mod config;

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use config::EvoxConfig;
use evox_core::{AgentRole, AgentStatus, Task, TaskPriority, TaskStatus};
use evox_fleet::standup::from_millis;
use evox_fleet::{
    render_agent_standup, render_fleet_summary, Autoscaler, CanonicalRoster, DispatchEngine,
    FleetCycle, FleetScheduler, IdleDetector, StandupAggregator, TaskBoard, TaskMatcher,
};
use evox_store::{EntityStore, FileStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "evox", about = "EVOX: agent fleet dispatch and autoscaling")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "evox.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign the best eligible task to one agent
    Dispatch { agent: String },
    /// Run one dispatch pass over the whole fleet
    Cycle,
    /// Autoscaler operations
    Spawn {
        #[command(subcommand)]
        action: SpawnAction,
    },
    /// Daily standup report (defaults to today, local time)
    Standup {
        /// Window start, epoch milliseconds
        #[arg(long)]
        start: Option<i64>,
        /// Window end, epoch milliseconds
        #[arg(long)]
        end: Option<i64>,
        /// Print rendered markdown instead of JSON
        #[arg(long)]
        markdown: bool,
    },
    /// Check whether an agent can take work
    Idle { agent: String },
    /// Show the task an agent would get next, without assigning it
    Next {
        /// Agent whose affinity and role decide the match
        #[arg(required_unless_present = "role", conflicts_with = "role")]
        agent: Option<String>,
        /// Match by role alone
        #[arg(long)]
        role: Option<String>,
    },
    /// Manage agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Canonical agent identities
    Roster {
        #[command(subcommand)]
        action: RosterAction,
    },
    /// Team learnings
    Learning {
        #[command(subcommand)]
        action: LearningAction,
    },
    /// Log a message from one agent to another
    Message {
        from: String,
        to: String,
        content: String,
    },
    /// Start the scheduler (dispatch cycle, autoscale, standup)
    Run,
}

#[derive(Subcommand)]
enum SpawnAction {
    /// Show spawn recommendations without acting on them
    Check,
    /// Spawn one agent of a role
    Role {
        role: String,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Check and spawn for every recommendation, respecting the per-role cap
    Auto,
}

#[derive(Subcommand)]
enum AgentAction {
    /// Register an agent
    Add {
        name: String,
        #[arg(long)]
        role: String,
        #[arg(long, default_value = "offline")]
        status: AgentStatus,
    },
    /// List agents
    List,
    /// Report agent status
    Heartbeat {
        name: String,
        /// New status; omit to only refresh liveness
        #[arg(long)]
        status: Option<AgentStatus>,
    },
    /// Mark an agent offline
    Offline { name: String },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Queue a task
    Add {
        title: String,
        #[arg(long, default_value = "medium")]
        priority: TaskPriority,
        #[arg(long, default_value = "backlog")]
        status: TaskStatus,
        /// Route the task to this agent
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        external_id: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Agent credited with creating the task
        #[arg(long)]
        actor: Option<String>,
    },
    /// Change a task's status
    Move {
        id: Uuid,
        status: TaskStatus,
        #[arg(long)]
        actor: Option<String>,
    },
    /// List tasks
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
    },
}

#[derive(Subcommand)]
enum RosterAction {
    /// Point a canonical name at an agent
    Map { canonical: String, agent: String },
    /// List canonical identities
    List,
}

#[derive(Subcommand)]
enum LearningAction {
    /// Record a learning
    Add {
        summary: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_id() -> String {
    format!("cli-{}", Uuid::new_v4())
}

fn engine(store: &Arc<dyn EntityStore>, config: &EvoxConfig) -> DispatchEngine {
    DispatchEngine::new(Arc::clone(store)).with_config(config.dispatch.clone())
}

fn autoscaler(store: &Arc<dyn EntityStore>, config: &EvoxConfig) -> Autoscaler {
    Autoscaler::new(Arc::clone(store), config.role_templates())
        .with_config(config.autoscale.clone())
        .with_lease_ttl(config.schedule.lease_ttl())
}

fn fleet_cycle(store: &Arc<dyn EntityStore>, config: &EvoxConfig) -> FleetCycle {
    FleetCycle::new(Arc::clone(store), engine(store, config))
        .with_lease_ttl(config.schedule.lease_ttl())
}

fn window_date(start: DateTime<Utc>) -> String {
    start.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = EvoxConfig::load(&cli.config).await?;
    let store: Arc<dyn EntityStore> = Arc::new(FileStore::open(config.store_path()).await?);
    let board = TaskBoard::new(Arc::clone(&store));

    match cli.command {
        Commands::Dispatch { agent } => {
            let outcome = engine(&store, &config).dispatch(&agent).await?;
            print_json(&outcome.to_result())?;
        }
        Commands::Cycle => {
            let outcomes = fleet_cycle(&store, &config)
                .run_cycle_exclusive(&run_id())
                .await?;
            print_json(&outcomes)?;
        }
        Commands::Spawn { action } => {
            let autoscaler = autoscaler(&store, &config);
            match action {
                SpawnAction::Check => print_json(&autoscaler.check_spawn_needed().await?)?,
                SpawnAction::Role { role, reason } => print_json(
                    &autoscaler
                        .auto_spawn(&AgentRole::from(role), &reason)
                        .await?,
                )?,
                SpawnAction::Auto => print_json(
                    &autoscaler
                        .check_and_auto_spawn_exclusive(&run_id())
                        .await?,
                )?,
            }
        }
        Commands::Standup {
            start,
            end,
            markdown,
        } => {
            let start = start.map(from_millis).transpose()?;
            let end = end.map(from_millis).transpose()?;
            let report = StandupAggregator::new(Arc::clone(&store))
                .report(start, end)
                .await?;
            if markdown {
                let date = window_date(report.start);
                print!("{}", render_fleet_summary(&report, &date));
                for agent in &report.agents {
                    println!();
                    print!("{}", render_agent_standup(agent, &date));
                }
            } else {
                print_json(&report)?;
            }
        }
        Commands::Idle { agent } => {
            print_json(&IdleDetector::new(Arc::clone(&store)).check_idle(&agent).await?)?;
        }
        Commands::Next { agent, role } => {
            let matcher = TaskMatcher::new(Arc::clone(&store));
            let task = match (role, agent) {
                (Some(role), _) => {
                    matcher
                        .find_next_task_for_role(&AgentRole::from(role))
                        .await?
                }
                (None, Some(agent)) => matcher.find_next_task(&agent).await?,
                (None, None) => anyhow::bail!("either an agent name or --role is required"),
            };
            print_json(&task)?;
        }
        Commands::Agent { action } => match action {
            AgentAction::Add { name, role, status } => {
                print_json(&board.add_agent(&name, AgentRole::from(role), status).await?)?;
            }
            AgentAction::List => print_json(&store.agents().await?)?,
            AgentAction::Heartbeat { name, status } => {
                let agent = match status {
                    Some(status) => board.heartbeat(&name, status).await?,
                    None => board.ping(&name).await?,
                };
                print_json(&agent)?;
            }
            AgentAction::Offline { name } => print_json(&board.set_offline(&name).await?)?,
        },
        Commands::Task { action } => match action {
            TaskAction::Add {
                title,
                priority,
                status,
                agent,
                external_id,
                description,
                actor,
            } => {
                let mut task = Task::new(title, priority).with_status(status);
                if let Some(agent) = agent {
                    task = task.with_affinity(agent);
                }
                if let Some(external_id) = external_id {
                    task = task.with_external_id(external_id);
                }
                if let Some(description) = description {
                    task = task.with_description(description);
                }
                print_json(&board.create_task(task, actor.as_deref()).await?)?;
            }
            TaskAction::Move { id, status, actor } => {
                print_json(&board.move_task(id, status, actor.as_deref()).await?)?;
            }
            TaskAction::List { status } => {
                let tasks = match status {
                    Some(status) => store.tasks_by_status(status).await?,
                    None => store.tasks().await?,
                };
                print_json(&tasks)?;
            }
        },
        Commands::Roster { action } => match action {
            RosterAction::Map { canonical, agent } => {
                print_json(&board.map_canonical(&canonical, &agent).await?)?;
            }
            RosterAction::List => {
                let entries: Vec<serde_json::Value> = CanonicalRoster::new(Arc::clone(&store))
                    .entries()
                    .await?
                    .into_iter()
                    .map(|entry| {
                        serde_json::json!({
                            "canonical": entry.canonical,
                            "agentId": entry.agent.id,
                            "name": entry.agent.name,
                            "status": entry.agent.status,
                        })
                    })
                    .collect();
                print_json(&entries)?;
            }
        },
        Commands::Learning { action } => match action {
            LearningAction::Add {
                summary,
                agent,
                tags,
            } => print_json(&board.record_learning(&summary, agent.as_deref(), tags).await?)?,
        },
        Commands::Message { from, to, content } => {
            print_json(&board.send_message(&from, &to, &content).await?)?;
        }
        Commands::Run => {
            let scheduler = FleetScheduler::new(
                Arc::clone(&store),
                fleet_cycle(&store, &config),
                autoscaler(&store, &config),
                config.standup_dir(),
            )
            .with_schedule(&config.schedule);
            scheduler.validate()?;

            info!(
                holder = scheduler.holder(),
                jobs = scheduler.enabled_jobs().len(),
                store = %config.store_path().display(),
                "Starting EVOX scheduler"
            );
            let handle = scheduler.start();
            tokio::signal::ctrl_c().await?;
            info!("Shutting down scheduler");
            handle.abort();
        }
    }

    Ok(())
}
