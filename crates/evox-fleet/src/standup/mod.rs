//! Windowed per-agent and fleet-wide activity reports.

mod render;

pub use render::{render_agent_standup, render_fleet_summary};

use crate::roster::{CanonicalRoster, RosterEntry};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use evox_core::{
    ActivityEvent, ActivityKind, AgentRole, AgentStatus, EvoxError, EvoxResult, Task,
    TaskPriority, TaskStatus,
};
use evox_store::EntityStore;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Inclusive bounds of the calendar day `day` in `tz`, as UTC instants.
/// The end is the last millisecond of the day.
pub fn day_bounds<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = day.and_time(NaiveTime::MIN);
    let start = tz
        .from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight));
    (start, start + Duration::hours(24) - Duration::milliseconds(1))
}

/// Today in the process' local timezone.
pub fn local_today() -> (DateTime<Utc>, DateTime<Utc>) {
    day_bounds(Local::now().date_naive(), &Local)
}

/// Milliseconds since the epoch to a UTC instant.
pub fn from_millis(ms: i64) -> EvoxResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| EvoxError::Invalid(format!("timestamp {ms} is out of range")))
}

/// Task as listed in a standup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    /// Task id.
    pub id: Uuid,
    /// Task title.
    pub title: String,
    /// Task priority.
    pub priority: TaskPriority,
    /// External tracker id.
    pub external_id: Option<String>,
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            priority: task.priority,
            external_id: task.external_id.clone(),
        }
    }
}

/// Agent as shown in a standup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    /// Agent id.
    pub id: Uuid,
    /// Current display name.
    pub name: String,
    /// Role.
    pub role: AgentRole,
    /// Status at report time.
    pub status: AgentStatus,
}

/// One canonical identity's day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStandup {
    /// Reporting name.
    pub canonical: String,
    /// The agent behind it.
    pub agent: AgentSummary,
    /// Owned tasks moved to done in the window and still done.
    pub completed: Vec<TaskRef>,
    /// Owned in-progress tasks touched in the window.
    pub in_progress: Vec<TaskRef>,
    /// Owned queued tasks touched in the window.
    pub backlog: Vec<TaskRef>,
    /// Owned blocked tasks touched in the window.
    pub blocked: Vec<TaskRef>,
    /// Events credited to the agent in the window.
    pub activity_count: usize,
}

/// Fleet-wide totals for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandupSummary {
    /// Events in the window.
    pub total_activities: usize,
    /// Distinct tasks with a done transition in the window.
    pub tasks_completed: usize,
    /// In-progress tasks touched in the window.
    pub tasks_in_progress: usize,
    /// Queued tasks touched in the window.
    pub tasks_backlog: usize,
    /// Blocked tasks touched in the window.
    pub tasks_blocked: usize,
    /// Distinct agents with at least one event.
    pub agents_active: usize,
    /// Agent-to-agent messages.
    pub messages_sent: usize,
}

/// Per-agent and fleet standup for `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandupReport {
    /// Window start, inclusive.
    pub start: DateTime<Utc>,
    /// Window end, inclusive.
    pub end: DateTime<Utc>,
    /// One entry per roster identity, in roster order.
    pub agents: Vec<AgentStandup>,
    /// Fleet totals.
    pub summary: StandupSummary,
}

/// Task ids that count as touched or completed inside one window.
struct Window {
    completed: HashSet<Uuid>,
    touched: HashSet<Uuid>,
}

impl Window {
    fn new(
        activity: &[ActivityEvent],
        tasks: &[Task],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let completed = activity
            .iter()
            .filter(|e| e.kind.completes_task())
            .filter_map(|e| e.task_id)
            .collect();
        let touched = activity
            .iter()
            .filter(|e| e.kind.touches_task())
            .filter_map(|e| e.task_id)
            .chain(
                tasks
                    .iter()
                    .filter(|t| t.updated_at >= start && t.updated_at <= end)
                    .map(|t| t.id),
            )
            .collect();
        Self { completed, touched }
    }

    fn is_completed(&self, task: &Task) -> bool {
        task.status == TaskStatus::Done && self.completed.contains(&task.id)
    }

    fn is_in_progress(&self, task: &Task) -> bool {
        task.status == TaskStatus::InProgress && self.touched.contains(&task.id)
    }

    fn is_backlog(&self, task: &Task) -> bool {
        task.status.is_queued() && self.touched.contains(&task.id)
    }

    fn is_blocked(&self, task: &Task) -> bool {
        task.is_blocked() && self.touched.contains(&task.id)
    }
}

/// Affinity names the identity; without affinity, formal assignment decides.
fn owns(entry: &RosterEntry, task: &Task) -> bool {
    match task.affinity() {
        Some(affinity) => entry.owns_affinity(&affinity),
        None => task.assignee == Some(entry.agent.id),
    }
}

fn refs<'a>(tasks: impl Iterator<Item = &'a Task>) -> Vec<TaskRef> {
    tasks.map(TaskRef::from).collect()
}

/// Computes standup reports. Read-only and idempotent for an unchanged store.
#[derive(Clone)]
pub struct StandupAggregator {
    store: Arc<dyn EntityStore>,
    roster: CanonicalRoster,
}

impl StandupAggregator {
    /// Aggregator over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            roster: CanonicalRoster::new(Arc::clone(&store)),
            store,
        }
    }

    /// Report for `[start, end]`; a missing bound defaults to today's local
    /// calendar day.
    pub async fn report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> EvoxResult<StandupReport> {
        let (today_start, today_end) = local_today();
        self.report_range(start.unwrap_or(today_start), end.unwrap_or(today_end))
            .await
    }

    /// Report for `[start, end]`. Fails when `end` precedes `start`.
    pub async fn report_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EvoxResult<StandupReport> {
        if end < start {
            return Err(EvoxError::Invalid(format!(
                "standup range ends ({end}) before it starts ({start})"
            )));
        }

        let activity = self.store.activity_between(start, end).await?;
        let tasks = self.store.tasks().await?;
        let window = Window::new(&activity, &tasks, start, end);

        let agents = self
            .roster
            .entries()
            .await?
            .into_iter()
            .map(|entry| {
                let owned: Vec<&Task> = tasks.iter().filter(|t| owns(&entry, t)).collect();
                AgentStandup {
                    completed: refs(owned.iter().copied().filter(|t| window.is_completed(t))),
                    in_progress: refs(owned.iter().copied().filter(|t| window.is_in_progress(t))),
                    backlog: refs(owned.iter().copied().filter(|t| window.is_backlog(t))),
                    blocked: refs(owned.iter().copied().filter(|t| window.is_blocked(t))),
                    activity_count: activity
                        .iter()
                        .filter(|e| e.agent_id == entry.agent.id)
                        .count(),
                    agent: AgentSummary {
                        id: entry.agent.id,
                        name: entry.agent.name,
                        role: entry.agent.role,
                        status: entry.agent.status,
                    },
                    canonical: entry.canonical,
                }
            })
            .collect();

        let summary = StandupSummary {
            total_activities: activity.len(),
            tasks_completed: window.completed.len(),
            tasks_in_progress: tasks.iter().filter(|t| window.is_in_progress(t)).count(),
            tasks_backlog: tasks.iter().filter(|t| window.is_backlog(t)).count(),
            tasks_blocked: tasks.iter().filter(|t| window.is_blocked(t)).count(),
            agents_active: activity
                .iter()
                .map(|e| e.agent_id)
                .collect::<HashSet<_>>()
                .len(),
            messages_sent: activity
                .iter()
                .filter(|e| matches!(e.kind, ActivityKind::MessageSent { .. }))
                .count(),
        };

        Ok(StandupReport {
            start,
            end,
            agents,
            summary,
        })
    }
}
