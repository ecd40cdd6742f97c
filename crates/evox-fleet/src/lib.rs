//! Dispatch, autoscaling and reporting for the EVOX agent fleet.
//!
//! Everything here works against an [`evox_store::EntityStore`]. Reads are
//! plain queries; every state change is one [`evox_store::WriteBatch`] carrying
//! the revisions it was computed from, so concurrent dispatchers and
//! schedulers can share a store without double-assigning work.
//!
//! # Main types
//!
//! - [`IdleDetector`] — Decides whether an agent can take work, and why not.
//! - [`TaskMatcher`] — Picks the highest-priority eligible task for an agent or role.
//! - [`DispatchEngine`] — Atomically assigns a task to an idle agent.
//! - [`FleetCycle`] — Runs the dispatch engine across the whole fleet.
//! - [`Autoscaler`] — Recommends and spawns agents from [`RoleTemplates`].
//! - [`StandupAggregator`] — Builds per-agent and fleet daily reports.
//! - [`FleetScheduler`] — Cron-driven, lease-guarded runner for the periodic jobs.
//! - [`TaskBoard`] — Manual agent and task bookkeeping.

/// Agent spawn recommendations and spawning.
pub mod autoscaler;
/// Manual agent, task, message and learning operations.
pub mod board;
/// Pending-dispatch role classification.
pub mod classifier;
/// Tunables for dispatch, autoscaling and scheduling.
pub mod config;
/// Fleet-wide dispatch pass.
pub mod cycle;
/// Single-agent dispatch.
pub mod engine;
/// Agent idleness checks.
pub mod idle;
/// Named leases for periodic jobs.
pub mod lease;
/// Task selection.
pub mod matcher;
/// Canonical agent identities.
pub mod roster;
/// Cron scheduler for the periodic fleet jobs.
pub mod scheduler;
/// Daily standup aggregation and rendering.
pub mod standup;
/// Role templates used when spawning agents.
pub mod templates;

pub use autoscaler::{
    AutoSpawnSummary, Autoscaler, SkippedSpawn, SpawnCheck, SpawnRecommendation, SpawnedAgent,
};
pub use board::TaskBoard;
pub use classifier::{DispatchClassifier, KeywordClassifier};
pub use config::{AutoscaleConfig, DispatchConfig, ScheduleConfig};
pub use cycle::{CycleOutcome, FleetCycle};
pub use engine::{Assignment, DispatchEngine, DispatchOutcome, DispatchRejection, DispatchResult};
pub use idle::{IdleCheck, IdleDetector, IdleReason};
pub use lease::run_exclusive;
pub use matcher::TaskMatcher;
pub use roster::{CanonicalRoster, RosterEntry};
pub use scheduler::{FleetJob, FleetScheduler, JobReport, ScheduledJob};
pub use standup::{
    render_agent_standup, render_fleet_summary, AgentStandup, StandupAggregator, StandupReport,
    StandupSummary,
};
pub use templates::{RoleTemplate, RoleTemplates};
