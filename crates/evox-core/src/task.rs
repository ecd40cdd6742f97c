use crate::{EvoxError, EvoxResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Task priority. Declaration order is the dispatch order: `Urgent` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Drop everything.
    Urgent,
    /// Next in line after urgent work.
    High,
    /// Default priority.
    Medium,
    /// Whenever there is time.
    Low,
}

impl TaskPriority {
    /// Rank used by the matcher: urgent(0) < high(1) < medium(2) < low(3).
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Urgent => 0,
            TaskPriority::High => 1,
            TaskPriority::Medium => 2,
            TaskPriority::Low => 3,
        }
    }

    /// Lower-case priority name.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Urgent => "urgent",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = EvoxError;

    fn from_str(s: &str) -> EvoxResult<Self> {
        match s.to_lowercase().as_str() {
            "urgent" => Ok(TaskPriority::Urgent),
            "high" => Ok(TaskPriority::High),
            "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            other => Err(EvoxError::Invalid(format!("unknown priority '{other}'"))),
        }
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, not yet planned.
    Backlog,
    /// Queued and planned.
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// Waiting to be picked up (backlog or todo).
    pub fn is_queued(self) -> bool {
        matches!(self, TaskStatus::Backlog | TaskStatus::Todo)
    }

    /// Wire name, e.g. `in_progress`.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = EvoxError;

    fn from_str(s: &str) -> EvoxResult<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "backlog" => Ok(TaskStatus::Backlog),
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            other => Err(EvoxError::Invalid(format!("unknown task status '{other}'"))),
        }
    }
}

/// A unit of work in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task id.
    pub id: Uuid,
    /// Short title.
    pub title: String,
    /// Free-form description, empty when unset.
    #[serde(default)]
    pub description: String,
    /// Workflow status.
    pub status: TaskStatus,
    /// Dispatch priority.
    pub priority: TaskPriority,
    /// Formal assignment. Set together with `InProgress` by the dispatch engine.
    pub assignee: Option<Uuid>,
    /// Soft routing hint naming a specific agent, independent of `assignee`.
    pub agent_name: Option<String>,
    /// Identifier in the external tracker (e.g. `AGT-208`).
    pub external_id: Option<String>,
    /// Owning project, if any.
    pub project_id: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub revision: u64,
}

impl Task {
    /// Backlog task with no assignee or affinity.
    pub fn new(title: impl Into<String>, priority: TaskPriority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Backlog,
            priority,
            assignee: None,
            agent_name: None,
            external_id: None,
            project_id: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Set the initial status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Route the task to the named agent.
    pub fn with_affinity(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    /// Set the external tracker id.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the project.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Override the last modification time.
    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }

    /// External identifier when present, title otherwise.
    pub fn reference(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.title)
    }

    /// Lower-cased affinity, if any. Empty strings count as unset.
    pub fn affinity(&self) -> Option<String> {
        self.agent_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_lowercase)
    }

    /// Derived blocked flag: "blocked" anywhere in title or description.
    pub fn is_blocked(&self) -> bool {
        self.title.to_lowercase().contains("blocked")
            || self.description.to_lowercase().contains("blocked")
    }

    /// Waiting in the queue with nobody formally assigned.
    pub fn is_open(&self) -> bool {
        self.status.is_queued() && self.assignee.is_none()
    }
}
