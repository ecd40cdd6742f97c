use crate::config::DispatchConfig;
use crate::matcher::TaskMatcher;
use chrono::Utc;
use evox_core::{
    ActivityCategory, ActivityEvent, ActivityKind, AgentStatus, Dispatch, DispatchSource,
    ErrorKind, EvoxError, EvoxResult, TaskPriority, TaskStatus,
};
use evox_store::{EntityStore, WriteBatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A committed assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Agent that received the task.
    pub agent_id: Uuid,
    /// Its display name.
    pub agent_name: String,
    /// Assigned task.
    pub task_id: Uuid,
    /// External tracker id of the task.
    pub external_id: Option<String>,
    /// Dispatch written for the assignment.
    pub dispatch_id: Uuid,
    /// Task priority.
    pub priority: TaskPriority,
}

/// Why nothing was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRejection {
    /// No agent with that name.
    AgentNotFound,
    /// The agent is busy or offline.
    AgentNotIdle {
        /// Status at dispatch time.
        status: AgentStatus,
    },
    /// The agent already has a running dispatch.
    HasRunningDispatch,
    /// Nothing eligible in the queue.
    NoTasksAvailable,
    /// Every commit attempt lost to a concurrent writer.
    CommitConflict,
}

impl DispatchRejection {
    /// Stable error code callers branch on.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchRejection::AgentNotFound => "agent_not_found",
            DispatchRejection::AgentNotIdle { .. } => "agent_not_idle",
            DispatchRejection::HasRunningDispatch => "has_running_dispatch",
            DispatchRejection::NoTasksAvailable => "no_tasks_available",
            DispatchRejection::CommitConflict => "commit_conflict",
        }
    }

    /// Error class for callers that retry or report.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchRejection::AgentNotFound => ErrorKind::NotFound,
            DispatchRejection::AgentNotIdle { .. } => ErrorKind::InvalidState,
            DispatchRejection::HasRunningDispatch | DispatchRejection::CommitConflict => {
                ErrorKind::Conflict
            }
            DispatchRejection::NoTasksAvailable => ErrorKind::Exhausted,
        }
    }
}

/// Result of one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A task was committed to the agent.
    Assigned(Assignment),
    /// Nothing was written.
    Rejected(DispatchRejection),
}

impl DispatchOutcome {
    /// A task was assigned.
    pub fn is_assigned(&self) -> bool {
        matches!(self, DispatchOutcome::Assigned(_))
    }

    /// The assignment, if any.
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            DispatchOutcome::Assigned(assignment) => Some(assignment),
            DispatchOutcome::Rejected(_) => None,
        }
    }

    /// The rejection, if any.
    pub fn rejection(&self) -> Option<DispatchRejection> {
        match self {
            DispatchOutcome::Assigned(_) => None,
            DispatchOutcome::Rejected(rejection) => Some(*rejection),
        }
    }

    /// Flat wire form: `{success, taskId?, externalId?, dispatchId?, priority?,
    /// errorCode?, errorKind?, status?}`.
    pub fn to_result(&self) -> DispatchResult {
        match self {
            DispatchOutcome::Assigned(a) => DispatchResult {
                success: true,
                task_id: Some(a.task_id),
                external_id: a.external_id.clone(),
                dispatch_id: Some(a.dispatch_id),
                priority: Some(a.priority),
                error_code: None,
                error_kind: None,
                status: None,
            },
            DispatchOutcome::Rejected(r) => DispatchResult {
                success: false,
                task_id: None,
                external_id: None,
                dispatch_id: None,
                priority: None,
                error_code: Some(r.code()),
                error_kind: Some(r.kind()),
                status: match r {
                    DispatchRejection::AgentNotIdle { status } => Some(*status),
                    _ => None,
                },
            },
        }
    }
}

/// Serialized form of a [`DispatchOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// A task was assigned.
    pub success: bool,
    /// Assigned task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// External tracker id of the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Dispatch written for the assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<Uuid>,
    /// Task priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    /// Rejection code, see [`DispatchRejection::code`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    /// Rejection class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Agent status, for `agent_not_idle`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
}

/// Assigns the best eligible task to an agent as one atomic store batch.
///
/// The batch carries the agent and task revisions that were read, plus a
/// no-running-dispatch precondition, so a concurrent dispatch makes the
/// commit fail with a conflict. The engine then re-reads and tries again.
#[derive(Clone)]
pub struct DispatchEngine {
    store: Arc<dyn EntityStore>,
    matcher: TaskMatcher,
    config: DispatchConfig,
}

impl DispatchEngine {
    /// Engine over `store` with default retry settings.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            matcher: TaskMatcher::new(Arc::clone(&store)),
            store,
            config: DispatchConfig::default(),
        }
    }

    /// Override retry settings.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Assign work to `agent_name`.
    ///
    /// Rejections come back as [`DispatchOutcome::Rejected`]; `Err` is only
    /// returned for store failures.
    pub async fn dispatch(&self, agent_name: &str) -> EvoxResult<DispatchOutcome> {
        self.dispatch_from(agent_name, DispatchSource::AutoDispatch)
            .await
    }

    /// Same as [`dispatch`](Self::dispatch), recording `source` in the activity log.
    pub async fn dispatch_from(
        &self,
        agent_name: &str,
        source: DispatchSource,
    ) -> EvoxResult<DispatchOutcome> {
        let attempts = self.config.max_commit_attempts.max(1);
        for attempt in 1..=attempts {
            match self.try_dispatch(agent_name, source).await {
                Err(EvoxError::Conflict(reason)) => {
                    debug!(
                        agent = agent_name,
                        attempt,
                        %reason,
                        "Dispatch lost commit race, retrying"
                    );
                }
                other => return other,
            }
        }
        warn!(agent = agent_name, attempts, "Dispatch gave up after repeated commit conflicts");
        Ok(DispatchOutcome::Rejected(DispatchRejection::CommitConflict))
    }

    async fn try_dispatch(
        &self,
        agent_name: &str,
        source: DispatchSource,
    ) -> EvoxResult<DispatchOutcome> {
        let Some(agent) = self.store.agent_by_name(agent_name).await? else {
            debug!(agent = agent_name, "Dispatch rejected: agent not found");
            return Ok(DispatchOutcome::Rejected(DispatchRejection::AgentNotFound));
        };

        if !agent.status.accepts_work() {
            debug!(
                agent = %agent.name,
                status = %agent.status,
                "Dispatch rejected: agent not idle"
            );
            return Ok(DispatchOutcome::Rejected(DispatchRejection::AgentNotIdle {
                status: agent.status,
            }));
        }

        if self.store.has_running_dispatch(agent.id).await? {
            debug!(agent = %agent.name, "Dispatch rejected: running dispatch");
            return Ok(DispatchOutcome::Rejected(
                DispatchRejection::HasRunningDispatch,
            ));
        }

        let Some(task) = self.matcher.find_next_task(&agent.name).await? else {
            debug!(agent = %agent.name, "Dispatch rejected: no tasks available");
            return Ok(DispatchOutcome::Rejected(
                DispatchRejection::NoTasksAvailable,
            ));
        };

        let now = Utc::now();
        let reference = task.reference().to_string();

        let mut claimed = task.clone();
        claimed.assignee = Some(agent.id);
        claimed.status = TaskStatus::InProgress;
        claimed.updated_at = now;

        let dispatch = Dispatch::work_on_task(agent.id, &task, now)?;
        let dispatch_id = dispatch.id;

        let mut busy = agent.clone();
        busy.status = AgentStatus::Busy;
        busy.status_reason = Some(format!("Working on {reference}"));
        busy.status_since = Some(now);
        busy.current_task = Some(task.id);

        let event = ActivityEvent::new(
            agent.id,
            &agent.name,
            ActivityCategory::Task,
            format!("{} auto-assigned {reference}", agent.name.to_uppercase()),
            ActivityKind::AutoDispatched {
                priority: task.priority,
                source,
            },
        )
        .with_description(task.title.clone())
        .with_task(&task)
        .at(now);

        let batch = WriteBatch::new()
            .expect_agent(&agent)
            .expect_task(&task)
            .expect_no_running_dispatch(agent.id)
            .update_task(claimed)
            .insert_dispatch(dispatch)
            .update_agent(busy)
            .append_activity(event);
        self.store.commit(batch).await?;

        info!(
            agent = %agent.name,
            task = %reference,
            priority = task.priority.as_str(),
            %dispatch_id,
            "Dispatched task"
        );

        Ok(DispatchOutcome::Assigned(Assignment {
            agent_id: agent.id,
            agent_name: agent.name,
            task_id: task.id,
            external_id: task.external_id,
            dispatch_id,
            priority: task.priority,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use evox_core::{Agent, AgentRole, DispatchStatus, Task};
    use evox_store::{MemoryStore, Snapshot};

    fn engine(snapshot: Snapshot) -> (Arc<MemoryStore>, DispatchEngine) {
        let store = Arc::new(MemoryStore::from_snapshot(snapshot));
        let engine = DispatchEngine::new(store.clone());
        (store, engine)
    }

    #[tokio::test]
    async fn test_busy_without_running_dispatch_is_invalid_state() {
        let agent = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Busy);
        let (_, engine) = engine(
            Snapshot::default()
                .with_agent(agent)
                .with_task(Task::new("t", TaskPriority::High)),
        );
        let outcome = engine.dispatch("sam").await.unwrap();
        let rejection = outcome.rejection().unwrap();
        assert_eq!(
            rejection,
            DispatchRejection::AgentNotIdle {
                status: AgentStatus::Busy
            }
        );
        assert_eq!(rejection.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_running_dispatch_is_conflict() {
        let agent = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Idle);
        let running = Dispatch::new(agent.id, "work_on_task", "{}")
            .with_status(DispatchStatus::Running);
        let (_, engine) = engine(
            Snapshot::default()
                .with_agent(agent)
                .with_dispatch(running)
                .with_task(Task::new("t", TaskPriority::High)),
        );
        let rejection = engine.dispatch("SAM").await.unwrap().rejection().unwrap();
        assert_eq!(rejection, DispatchRejection::HasRunningDispatch);
        assert_eq!(rejection.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_agent_and_empty_queue() {
        let agent = Agent::new("LEO", AgentRole::Frontend).with_status(AgentStatus::Online);
        let (_, engine) = engine(Snapshot::default().with_agent(agent));
        assert_eq!(
            engine.dispatch("nobody").await.unwrap().rejection(),
            Some(DispatchRejection::AgentNotFound)
        );
        let rejection = engine.dispatch("leo").await.unwrap().rejection().unwrap();
        assert_eq!(rejection, DispatchRejection::NoTasksAvailable);
        assert_eq!(rejection.kind(), ErrorKind::Exhausted);
    }

    #[tokio::test]
    async fn test_commit_writes_all_four_records() {
        let agent = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Idle);
        let task = Task::new("Schema", TaskPriority::High)
            .with_external_id("AGT-9")
            .with_project("evox");
        let (store, engine) = engine(
            Snapshot::default()
                .with_agent(agent.clone())
                .with_task(task.clone()),
        );

        let outcome = engine.dispatch("sam").await.unwrap();
        let assignment = outcome.assignment().unwrap();
        assert_eq!(assignment.task_id, task.id);
        assert_eq!(assignment.external_id.as_deref(), Some("AGT-9"));

        let snapshot = store.snapshot().await;
        let stored_agent = &snapshot.agents[0];
        assert_eq!(stored_agent.status, AgentStatus::Busy);
        assert_eq!(stored_agent.status_reason.as_deref(), Some("Working on AGT-9"));
        assert_eq!(stored_agent.current_task, Some(task.id));

        let dispatch = &snapshot.dispatches[0];
        assert_eq!(dispatch.id, assignment.dispatch_id);
        assert_eq!(dispatch.status, DispatchStatus::Pending);
        assert_eq!(dispatch.command, evox_core::WORK_ON_TASK);
        let payload = dispatch.task_payload().unwrap();
        assert_eq!(payload.task_id, task.id);
        assert_eq!(payload.external_id.as_deref(), Some("AGT-9"));

        let event = &snapshot.activity[0];
        assert_eq!(event.agent_name, "sam");
        assert_eq!(event.title, "SAM auto-assigned AGT-9");
        assert_eq!(event.project_id.as_deref(), Some("evox"));
        assert_eq!(
            event.kind,
            ActivityKind::AutoDispatched {
                priority: TaskPriority::High,
                source: DispatchSource::AutoDispatch,
            }
        );

        let result = serde_json::to_value(outcome.to_result()).unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["externalId"], "AGT-9");
        assert!(result.get("errorCode").is_none());
    }

    #[tokio::test]
    async fn test_rejection_wire_form() {
        let agent = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Offline);
        let (_, engine) = engine(Snapshot::default().with_agent(agent));
        let result = serde_json::to_value(engine.dispatch("sam").await.unwrap().to_result())
            .unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(result["errorCode"], "agent_not_idle");
        assert_eq!(result["errorKind"], "invalid_state");
        assert_eq!(result["status"], "offline");
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let agent = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Idle);
        let (_, engine) = engine(
            Snapshot::default()
                .with_agent(agent)
                .with_task(Task::new("t", TaskPriority::Low)),
        );
        let engine = engine.with_config(DispatchConfig {
            max_commit_attempts: 0,
        });
        assert!(engine.dispatch("sam").await.unwrap().is_assigned());
    }
}
