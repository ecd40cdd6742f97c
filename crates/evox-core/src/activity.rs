use crate::task::{Task, TaskPriority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad grouping of activity events for feeds and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    /// Task creation, movement and assignment.
    Task,
    /// Scheduler and autoscaler actions.
    System,
    /// Agent-to-agent messages.
    Message,
    /// Agent lifecycle: spawns and standups.
    Agent,
}

/// Which code path produced an automatic assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchSource {
    /// A direct `dispatch(agent)` call.
    AutoDispatch,
    /// The periodic fleet cycle.
    AutoDispatchCycle,
}

/// Typed payload of an activity event, tagged by `eventType`.
///
/// Reporting code matches on this exhaustively instead of poking at an open
/// metadata map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ActivityKind {
    /// The dispatch engine assigned a task.
    AutoDispatched {
        /// Priority of the assigned task.
        priority: TaskPriority,
        /// Which dispatch path made the assignment.
        source: DispatchSource,
    },
    /// The autoscaler created an agent.
    AgentSpawned {
        /// Why the agent was spawned.
        reason: String,
    },
    /// A task entered the queue.
    TaskCreated,
    /// A task moved between statuses.
    TaskStatusChanged {
        /// Status before the move.
        from: TaskStatus,
        /// Status after the move.
        to: TaskStatus,
    },
    /// A task was formally assigned.
    TaskAssigned {
        /// The agent that received the task.
        assignee: Uuid,
    },
    /// A comment was left on a task.
    Commented {
        /// Comment text.
        comment: String,
    },
    /// One agent messaged another.
    MessageSent {
        /// Lower-cased name of the receiving agent.
        recipient: String,
    },
    /// A daily standup report was written.
    StandupGenerated {
        /// Report date, `YYYY-MM-DD`.
        date: String,
    },
}

impl ActivityKind {
    /// The wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            ActivityKind::AutoDispatched { .. } => "auto_dispatched",
            ActivityKind::AgentSpawned { .. } => "agent_spawned",
            ActivityKind::TaskCreated => "task_created",
            ActivityKind::TaskStatusChanged { .. } => "task_status_changed",
            ActivityKind::TaskAssigned { .. } => "task_assigned",
            ActivityKind::Commented { .. } => "commented",
            ActivityKind::MessageSent { .. } => "message_sent",
            ActivityKind::StandupGenerated { .. } => "standup_generated",
        }
    }

    /// Status changes and creations count as touching a task.
    pub fn touches_task(&self) -> bool {
        matches!(
            self,
            ActivityKind::TaskStatusChanged { .. } | ActivityKind::TaskCreated
        )
    }

    /// A transition into `done`.
    pub fn completes_task(&self) -> bool {
        matches!(
            self,
            ActivityKind::TaskStatusChanged {
                to: TaskStatus::Done,
                ..
            }
        )
    }
}

/// Immutable, append-only audit-log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Agent the event is credited to.
    pub agent_id: Uuid,
    /// Lower-cased agent name at the time of the event.
    pub agent_name: String,
    /// Feed grouping.
    pub category: ActivityCategory,
    /// One-line human-readable summary.
    pub title: String,
    /// Longer free-form detail.
    pub description: Option<String>,
    /// Task the event refers to, if any.
    pub task_id: Option<Uuid>,
    /// External tracker id of that task.
    pub external_id: Option<String>,
    /// Project of that task.
    pub project_id: Option<String>,
    /// Typed payload; serialized inline with an `eventType` tag.
    #[serde(flatten)]
    pub kind: ActivityKind,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    /// Event stamped now, with no task reference.
    pub fn new(
        agent_id: Uuid,
        agent_name: &str,
        category: ActivityCategory,
        title: impl Into<String>,
        kind: ActivityKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            agent_name: agent_name.to_lowercase(),
            category,
            title: title.into(),
            description: None,
            task_id: None,
            external_id: None,
            project_id: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Set the long description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach the task reference, its external identifier and project.
    pub fn with_task(mut self, task: &Task) -> Self {
        self.task_id = Some(task.id);
        self.external_id = task.external_id.clone();
        self.project_id = task.project_id.clone();
        self
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Wire name of [`Self::kind`].
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}
