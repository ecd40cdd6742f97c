use crate::{EvoxError, EvoxResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Role of an agent in the fleet.
///
/// The well-known roles have templates; anything else (for example the
/// `general` bucket the dispatch classifier falls back to) is kept verbatim
/// in [`AgentRole::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentRole {
    /// Plans, dispatches, coordinates. Does not write code.
    Planner,
    /// Builds the data layer and APIs.
    Backend,
    /// Builds UI components.
    Frontend,
    /// Tests code and hunts bugs.
    Qa,
    /// CI/CD, deployment, infrastructure.
    Devops,
    /// Posts, documentation, communications.
    Content,
    /// Any role outside the built-in set.
    Other(String),
}

impl AgentRole {
    /// The built-in roles, in template order.
    pub const BUILTIN: [AgentRole; 6] = [
        AgentRole::Planner,
        AgentRole::Backend,
        AgentRole::Frontend,
        AgentRole::Qa,
        AgentRole::Devops,
        AgentRole::Content,
    ];

    /// Lower-case role name.
    pub fn as_str(&self) -> &str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Backend => "backend",
            AgentRole::Frontend => "frontend",
            AgentRole::Qa => "qa",
            AgentRole::Devops => "devops",
            AgentRole::Content => "content",
            AgentRole::Other(name) => name,
        }
    }

    /// Bucket used when a dispatch cannot be attributed to any role.
    pub fn general() -> Self {
        AgentRole::Other("general".to_string())
    }
}

impl From<String> for AgentRole {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            // "pm" is the legacy name of the planner role.
            "planner" | "pm" => AgentRole::Planner,
            "backend" => AgentRole::Backend,
            "frontend" => AgentRole::Frontend,
            "qa" => AgentRole::Qa,
            "devops" => AgentRole::Devops,
            "content" => AgentRole::Content,
            other => AgentRole::Other(other.to_string()),
        }
    }
}

impl From<&str> for AgentRole {
    fn from(value: &str) -> Self {
        AgentRole::from(value.to_string())
    }
}

impl From<AgentRole> for String {
    fn from(role: AgentRole) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Connected and able to take work.
    Online,
    /// Waiting for work.
    Idle,
    /// Working on a task.
    Busy,
    /// Not reachable.
    Offline,
}

impl AgentStatus {
    /// Statuses that allow new work to be assigned.
    pub fn accepts_work(self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Online)
    }

    /// Lower-case status name.
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Online => "online",
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = EvoxError;

    fn from_str(s: &str) -> EvoxResult<Self> {
        match s.to_lowercase().as_str() {
            "online" => Ok(AgentStatus::Online),
            "idle" => Ok(AgentStatus::Idle),
            "busy" => Ok(AgentStatus::Busy),
            "offline" => Ok(AgentStatus::Offline),
            other => Err(EvoxError::Invalid(format!("unknown agent status '{other}'"))),
        }
    }
}

/// A worker in the fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Unique agent id.
    pub id: Uuid,
    /// Display name. Unique per fleet, compared case-insensitively.
    pub name: String,
    /// Specialization, used for role matching and spawning.
    pub role: AgentRole,
    /// Current live status.
    pub status: AgentStatus,
    /// Task the agent is working on.
    pub current_task: Option<Uuid>,
    /// Free-form note on the last status change.
    pub status_reason: Option<String>,
    /// When the current status was entered.
    pub status_since: Option<DateTime<Utc>>,
    /// Skill tags copied from the role template.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Path/scope patterns the agent owns. Advisory only.
    #[serde(default)]
    pub territory: Vec<String>,
    /// Capability tags used for prompt construction, never for scheduling.
    #[serde(default)]
    pub genius_dna: Vec<String>,
    /// Prompt the agent runs with.
    pub base_prompt: Option<String>,
    /// Set for agents created by the autoscaler.
    pub spawned_at: Option<DateTime<Utc>>,
    /// Why the autoscaler created the agent.
    pub spawn_reason: Option<String>,
    /// Last time the agent showed any sign of life.
    pub last_seen: DateTime<Utc>,
    /// Last explicit status report.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Optional profile text.
    pub profile: Option<String>,
    /// Optimistic-concurrency token, bumped by the store on every update.
    #[serde(default)]
    pub revision: u64,
}

impl Agent {
    /// A manually created agent starts offline until its first heartbeat.
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            status: AgentStatus::Offline,
            current_task: None,
            status_reason: None,
            status_since: None,
            skills: Vec::new(),
            territory: Vec::new(),
            genius_dna: Vec::new(),
            base_prompt: None,
            spawned_at: None,
            spawn_reason: None,
            last_seen: Utc::now(),
            last_heartbeat: None,
            profile: None,
            revision: 0,
        }
    }

    /// Set the initial status.
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the skill tags.
    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    /// Lower-case form used in activity events and affinity matching.
    pub fn canonical_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Case-insensitive name comparison.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}
