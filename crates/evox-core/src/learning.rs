use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only note produced by or about an agent's past work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Learning {
    /// Unique learning id.
    pub id: Uuid,
    /// Name of the agent that owns the note.
    pub agent_name: Option<String>,
    /// The lesson itself.
    pub summary: String,
    /// Role or topic tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the note was recorded.
    pub created_at: DateTime<Utc>,
}

impl Learning {
    /// Untagged, unowned learning stamped now.
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_name: None,
            summary: summary.into(),
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the owning agent.
    pub fn by_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Override the creation time.
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Tagged with `role`, or owned by an agent named exactly `name_prefix`.
    pub fn is_relevant(&self, role: &str, name_prefix: &str) -> bool {
        self.tags.iter().any(|tag| tag.eq_ignore_ascii_case(role))
            || self
                .agent_name
                .as_deref()
                .is_some_and(|owner| owner.eq_ignore_ascii_case(name_prefix))
    }
}

/// Stable reporting identity pointing at one agent record.
///
/// Survives display-name changes: reports key on `canonical`, the agent row
/// can be renamed freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMapping {
    /// Lower-cased reporting name.
    pub canonical: String,
    /// Agent record the name points at.
    pub agent_id: Uuid,
}

impl AgentMapping {
    /// Mapping with `canonical` lower-cased.
    pub fn new(canonical: &str, agent_id: Uuid) -> Self {
        Self {
            canonical: canonical.to_lowercase(),
            agent_id,
        }
    }
}
