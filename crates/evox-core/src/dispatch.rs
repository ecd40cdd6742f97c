use crate::task::Task;
use crate::EvoxResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command string for task assignments.
pub const WORK_ON_TASK: &str = "work_on_task";

/// Lifecycle of a dispatch. Only `Pending` is written by the engine; an
/// external executor moves it along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    /// Written, not yet picked up.
    Pending,
    /// An executor is working on it.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// What a `work_on_task` dispatch carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    /// Assigned task.
    pub task_id: Uuid,
    /// External tracker id of the task.
    pub external_id: Option<String>,
    /// Task title at assignment time.
    pub title: String,
}

impl DispatchPayload {
    /// Payload describing `task`.
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            external_id: task.external_id.clone(),
            title: task.title.clone(),
        }
    }
}

/// Audit/control record of one assignment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    /// Unique dispatch id.
    pub id: Uuid,
    /// Agent the command is for.
    pub agent_id: Uuid,
    /// Command name, e.g. [`WORK_ON_TASK`].
    pub command: String,
    /// Serialized payload, kept as text so executors can treat it opaquely.
    pub payload: String,
    /// Lifecycle state.
    pub status: DispatchStatus,
    /// When the dispatch was written.
    pub created_at: DateTime<Utc>,
}

impl Dispatch {
    /// A pending `work_on_task` dispatch for `task`.
    pub fn work_on_task(agent_id: Uuid, task: &Task, now: DateTime<Utc>) -> EvoxResult<Self> {
        let payload = serde_json::to_string(&DispatchPayload::for_task(task))?;
        Ok(Self {
            id: Uuid::new_v4(),
            agent_id,
            command: WORK_ON_TASK.to_string(),
            payload,
            status: DispatchStatus::Pending,
            created_at: now,
        })
    }

    /// Free-form dispatch, used by executors and fixtures.
    pub fn new(agent_id: Uuid, command: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            command: command.into(),
            payload: payload.into(),
            status: DispatchStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Set the lifecycle state.
    pub fn with_status(mut self, status: DispatchStatus) -> Self {
        self.status = status;
        self
    }

    /// Decode the payload of a `work_on_task` dispatch.
    pub fn task_payload(&self) -> EvoxResult<DispatchPayload> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskPriority;

    #[test]
    fn test_work_on_task_payload() {
        let task = Task::new("Wire up schema", TaskPriority::High).with_external_id("AGT-7");
        let agent_id = Uuid::new_v4();
        let dispatch = Dispatch::work_on_task(agent_id, &task, Utc::now()).unwrap();

        assert_eq!(dispatch.command, WORK_ON_TASK);
        assert_eq!(dispatch.status, DispatchStatus::Pending);
        assert!(dispatch.payload.contains("\"externalId\":\"AGT-7\""));

        let payload = dispatch.task_payload().unwrap();
        assert_eq!(payload.task_id, task.id);
        assert_eq!(payload.title, "Wire up schema");
    }

    #[test]
    fn test_free_form_payload_is_not_decoded() {
        let dispatch = Dispatch::new(Uuid::new_v4(), "deploy_frontend", "preview build");
        assert!(dispatch.task_payload().is_err());
    }
}
