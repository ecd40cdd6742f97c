use chrono::Utc;
use evox_core::{
    ActivityCategory, ActivityEvent, ActivityKind, Agent, AgentMapping, AgentRole, AgentStatus,
    EvoxError, EvoxResult, Learning, Task, TaskStatus,
};
use crate::roster::CanonicalRoster;
use evox_store::{EntityStore, WriteBatch};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Manual fleet and queue operations. Each call is one committed batch.
#[derive(Clone)]
pub struct TaskBoard {
    store: Arc<dyn EntityStore>,
}

impl TaskBoard {
    /// Board over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    async fn agent_named(&self, name: &str) -> EvoxResult<Agent> {
        self.store
            .agent_by_name(name)
            .await?
            .ok_or_else(|| EvoxError::NotFound(format!("agent '{name}'")))
    }

    /// Agent a task is routed to: the canonical mapping first, then the
    /// display name.
    async fn affinity_agent(&self, task: &Task) -> EvoxResult<Option<Agent>> {
        let Some(name) = task.affinity() else {
            return Ok(None);
        };
        match CanonicalRoster::new(Arc::clone(&self.store)).resolve(&name).await? {
            Some(agent) => Ok(Some(agent)),
            None => self.store.agent_by_name(&name).await,
        }
    }

    async fn task_with_id(&self, id: Uuid) -> EvoxResult<Task> {
        self.store
            .task(id)
            .await?
            .ok_or_else(|| EvoxError::NotFound(format!("task {id}")))
    }

    /// Register an agent. Names are case-insensitively unique.
    pub async fn add_agent(
        &self,
        name: &str,
        role: AgentRole,
        status: AgentStatus,
    ) -> EvoxResult<Agent> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EvoxError::Invalid("agent name must not be empty".into()));
        }
        let mut agent = Agent::new(name, role).with_status(status);
        agent.status_since = Some(agent.last_seen);
        self.store
            .commit(WriteBatch::new().insert_agent(agent.clone()))
            .await?;
        info!(agent = %agent.name, role = %agent.role, "Agent added");
        Ok(agent)
    }

    /// Queue a task. When `actor` names an agent, a `task_created` event is
    /// logged against it.
    pub async fn create_task(&self, task: Task, actor: Option<&str>) -> EvoxResult<Task> {
        let mut batch = WriteBatch::new().insert_task(task.clone());
        if let Some(actor) = actor {
            let agent = self.agent_named(actor).await?;
            batch = batch.append_activity(
                ActivityEvent::new(
                    agent.id,
                    &agent.name,
                    ActivityCategory::Task,
                    format!("{} created {}", agent.name.to_uppercase(), task.reference()),
                    ActivityKind::TaskCreated,
                )
                .with_task(&task)
                .at(task.created_at),
            );
        }
        self.store.commit(batch).await?;
        info!(task = %task.reference(), priority = task.priority.as_str(), "Task created");
        Ok(task)
    }

    /// Move a task to `to`. The status change is attributed to `actor` when
    /// given, otherwise to the assignee, otherwise to the affinity agent. A
    /// task with none of these moves without an activity event.
    /// Moving to done keeps the assignee.
    pub async fn move_task(
        &self,
        task_id: Uuid,
        to: TaskStatus,
        actor: Option<&str>,
    ) -> EvoxResult<Task> {
        let task = self.task_with_id(task_id).await?;
        let from = task.status;
        let now = Utc::now();

        let mut moved = task.clone();
        moved.status = to;
        moved.updated_at = now;

        let author = match (actor, task.assignee) {
            (Some(name), _) => Some(self.agent_named(name).await?),
            (None, Some(id)) => self.store.agent(id).await?,
            (None, None) => self.affinity_agent(&task).await?,
        };
        if author.is_none() {
            debug!(task = %task.reference(), "No agent to credit, status change not logged");
        }

        let mut batch = WriteBatch::new().expect_task(&task).update_task(moved.clone());
        if let Some(agent) = author {
            batch = batch.append_activity(
                ActivityEvent::new(
                    agent.id,
                    &agent.name,
                    ActivityCategory::Task,
                    format!("{} moved {} to {to}", agent.name.to_uppercase(), task.reference()),
                    ActivityKind::TaskStatusChanged { from, to },
                )
                .with_task(&task)
                .at(now),
            );
        }
        self.store.commit(batch).await?;
        info!(task = %task.reference(), %from, %to, "Task moved");
        Ok(moved)
    }

    /// Status report from the agent itself: sets status and both liveness
    /// timestamps.
    pub async fn heartbeat(&self, name: &str, status: AgentStatus) -> EvoxResult<Agent> {
        let agent = self.agent_named(name).await?;
        let now = Utc::now();
        let mut updated = agent.clone();
        if updated.status != status {
            updated.status_since = Some(now);
        }
        updated.status = status;
        updated.last_seen = now;
        updated.last_heartbeat = Some(now);
        self.store
            .commit(WriteBatch::new().expect_agent(&agent).update_agent(updated.clone()))
            .await?;
        debug!(agent = %agent.name, %status, "Heartbeat");
        Ok(updated)
    }

    /// Liveness only; status is left alone.
    pub async fn ping(&self, name: &str) -> EvoxResult<Agent> {
        let agent = self.agent_named(name).await?;
        let now = Utc::now();
        let mut updated = agent.clone();
        updated.last_seen = now;
        updated.last_heartbeat = Some(now);
        self.store
            .commit(WriteBatch::new().expect_agent(&agent).update_agent(updated.clone()))
            .await?;
        Ok(updated)
    }

    /// Mark the agent offline.
    pub async fn set_offline(&self, name: &str) -> EvoxResult<Agent> {
        let agent = self.heartbeat(name, AgentStatus::Offline).await?;
        info!(agent = %agent.name, "Agent set offline");
        Ok(agent)
    }

    /// Append a learning, optionally owned by `agent_name`.
    pub async fn record_learning(
        &self,
        summary: &str,
        agent_name: Option<&str>,
        tags: Vec<String>,
    ) -> EvoxResult<Learning> {
        let mut learning = Learning::new(summary).with_tags(tags);
        if let Some(name) = agent_name {
            learning = learning.by_agent(name);
        }
        self.store
            .commit(WriteBatch::new().append_learning(learning.clone()))
            .await?;
        Ok(learning)
    }

    /// Point the canonical identity at the agent currently called `agent_name`.
    pub async fn map_canonical(
        &self,
        canonical: &str,
        agent_name: &str,
    ) -> EvoxResult<AgentMapping> {
        let canonical = canonical.trim();
        if canonical.is_empty() {
            return Err(EvoxError::Invalid("canonical name must not be empty".into()));
        }
        let agent = self.agent_named(agent_name).await?;
        let mapping = AgentMapping::new(canonical, agent.id);
        self.store
            .commit(WriteBatch::new().put_mapping(mapping.clone()))
            .await?;
        info!(canonical = %mapping.canonical, agent = %agent.name, "Roster mapping updated");
        Ok(mapping)
    }

    /// Log a message between agents. Delivery is someone else's job.
    pub async fn send_message(
        &self,
        from: &str,
        to: &str,
        content: &str,
    ) -> EvoxResult<ActivityEvent> {
        let sender = self.agent_named(from).await?;
        let recipient = self.agent_named(to).await?;
        let event = ActivityEvent::new(
            sender.id,
            &sender.name,
            ActivityCategory::Message,
            format!(
                "{} messaged {}",
                sender.name.to_uppercase(),
                recipient.name.to_uppercase()
            ),
            ActivityKind::MessageSent {
                recipient: recipient.canonical_name(),
            },
        )
        .with_description(content);
        self.store
            .commit(WriteBatch::new().append_activity(event.clone()))
            .await?;
        Ok(event)
    }
}
