use crate::batch::WriteBatch;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use evox_core::{
    ActivityEvent, Agent, AgentMapping, AgentRole, AgentStatus, Dispatch, DispatchStatus,
    EvoxResult, Learning, Task, TaskStatus,
};
use uuid::Uuid;

/// Indexed read access plus transactional writes over the fleet entities.
///
/// List-returning reads preserve the store's enumeration order (insertion
/// order for the reference stores); callers that need a specific order sort
/// explicitly.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Agent by id.
    async fn agent(&self, id: Uuid) -> EvoxResult<Option<Agent>>;

    /// Case-insensitive lookup by display name.
    async fn agent_by_name(&self, name: &str) -> EvoxResult<Option<Agent>>;

    /// Every agent.
    async fn agents(&self) -> EvoxResult<Vec<Agent>>;

    /// Agents with `status`.
    async fn agents_by_status(&self, status: AgentStatus) -> EvoxResult<Vec<Agent>>;

    /// Agents of `role`.
    async fn agents_by_role(&self, role: &AgentRole) -> EvoxResult<Vec<Agent>>;

    /// Task by id.
    async fn task(&self, id: Uuid) -> EvoxResult<Option<Task>>;

    /// Every task.
    async fn tasks(&self) -> EvoxResult<Vec<Task>>;

    /// Tasks with `status`.
    async fn tasks_by_status(&self, status: TaskStatus) -> EvoxResult<Vec<Task>>;

    /// Tasks formally assigned to `agent_id`.
    async fn tasks_by_assignee(&self, agent_id: Uuid) -> EvoxResult<Vec<Task>>;

    /// Composite (agent, status) index over dispatches.
    async fn dispatches_for_agent(
        &self,
        agent_id: Uuid,
        status: DispatchStatus,
    ) -> EvoxResult<Vec<Dispatch>>;

    /// Dispatches with `status`, across all agents.
    async fn dispatches_by_status(&self, status: DispatchStatus) -> EvoxResult<Vec<Dispatch>>;

    /// Activity with `start <= timestamp <= end`, oldest first.
    async fn activity_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EvoxResult<Vec<ActivityEvent>>;

    /// Newest learnings first, at most `limit`.
    async fn recent_learnings(&self, limit: usize) -> EvoxResult<Vec<Learning>>;

    /// Every canonical mapping.
    async fn mappings(&self) -> EvoxResult<Vec<AgentMapping>>;

    /// Apply a batch atomically.
    ///
    /// Fails with `EvoxError::Conflict` when a precondition does not hold or a
    /// uniqueness rule is violated, and with `EvoxError::Integrity` when a write
    /// references a record that does not exist. Nothing is applied on failure.
    async fn commit(&self, batch: WriteBatch) -> EvoxResult<()>;

    /// Take or renew the lease on `job` for `holder`.
    ///
    /// Returns `false` when another holder owns an unexpired lease.
    async fn acquire_lease(
        &self,
        job: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> EvoxResult<bool>;

    /// Drop the lease if `holder` owns it. Returns whether it was released.
    async fn release_lease(&self, job: &str, holder: &str) -> EvoxResult<bool>;

    /// The agent has at least one running dispatch.
    async fn has_running_dispatch(&self, agent_id: Uuid) -> EvoxResult<bool> {
        Ok(!self
            .dispatches_for_agent(agent_id, DispatchStatus::Running)
            .await?
            .is_empty())
    }
}
