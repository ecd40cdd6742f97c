use crate::batch::{Precondition, Write, WriteBatch};
use crate::store::EntityStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use evox_core::{
    ActivityEvent, Agent, AgentMapping, AgentRole, AgentStatus, Dispatch, DispatchStatus,
    EvoxError, EvoxResult, Learning, Task, TaskStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::debug;
use uuid::Uuid;

/// Time-bounded single-holder token for a periodic job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    /// Job name, e.g. `dispatch_cycle`.
    pub job: String,
    /// Process or run currently holding the lease.
    pub holder: String,
    /// After this instant any holder may take it over.
    pub expires_at: DateTime<Utc>,
}

/// Every table of the store, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    /// Agents.
    pub agents: Vec<Agent>,
    /// Tasks.
    pub tasks: Vec<Task>,
    /// Dispatches.
    pub dispatches: Vec<Dispatch>,
    /// Append-only activity log.
    pub activity: Vec<ActivityEvent>,
    /// Append-only learnings.
    pub learnings: Vec<Learning>,
    /// Canonical name mappings.
    pub mappings: Vec<AgentMapping>,
    /// Job leases, live or expired.
    pub leases: Vec<Lease>,
}

impl Snapshot {
    /// Fixture builder: add an agent without validation.
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    /// Add a task.
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add a dispatch.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatches.push(dispatch);
        self
    }

    /// Add an activity event.
    pub fn with_activity(mut self, event: ActivityEvent) -> Self {
        self.activity.push(event);
        self
    }

    /// Add a learning.
    pub fn with_learning(mut self, learning: Learning) -> Self {
        self.learnings.push(learning);
        self
    }

    /// Add a mapping.
    pub fn with_mapping(mut self, mapping: AgentMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    fn agent(&self, id: Uuid) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    fn name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.agents
            .iter()
            .any(|a| Some(a.id) != except && a.has_name(name))
    }

    fn check(&self, precondition: &Precondition) -> EvoxResult<()> {
        match precondition {
            Precondition::AgentRevision { id, expected } => match self.agent(*id) {
                Some(agent) if agent.revision == *expected => Ok(()),
                Some(agent) => Err(EvoxError::Conflict(format!(
                    "agent {id} is at revision {}, expected {expected}",
                    agent.revision
                ))),
                None => Err(EvoxError::Conflict(format!("agent {id} no longer exists"))),
            },
            Precondition::TaskRevision { id, expected } => {
                match self.tasks.iter().find(|t| t.id == *id) {
                    Some(task) if task.revision == *expected => Ok(()),
                    Some(task) => Err(EvoxError::Conflict(format!(
                        "task {id} is at revision {}, expected {expected}",
                        task.revision
                    ))),
                    None => Err(EvoxError::Conflict(format!("task {id} no longer exists"))),
                }
            }
            Precondition::NoRunningDispatch { agent_id } => {
                if self
                    .dispatches
                    .iter()
                    .any(|d| d.agent_id == *agent_id && d.status == DispatchStatus::Running)
                {
                    Err(EvoxError::Conflict(format!(
                        "agent {agent_id} already has a running dispatch"
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Validate every write against the current tables plus the rows the
    /// batch itself inserts earlier on.
    fn validate(&self, writes: &[Write]) -> EvoxResult<()> {
        let mut new_agents: Vec<(Uuid, String)> = Vec::new();
        let mut new_tasks: HashSet<Uuid> = HashSet::new();
        let mut new_dispatches: HashSet<Uuid> = HashSet::new();

        let agent_exists = |id: Uuid, pending: &[(Uuid, String)]| {
            self.agent(id).is_some() || pending.iter().any(|(pid, _)| *pid == id)
        };

        for write in writes {
            match write {
                Write::InsertAgent(agent) => {
                    if agent_exists(agent.id, &new_agents) {
                        return Err(EvoxError::Integrity(format!(
                            "agent {} already exists",
                            agent.id
                        )));
                    }
                    if self.name_taken(&agent.name, None)
                        || new_agents
                            .iter()
                            .any(|(_, name)| name.eq_ignore_ascii_case(&agent.name))
                    {
                        return Err(EvoxError::Conflict(format!(
                            "agent name '{}' is already taken",
                            agent.name
                        )));
                    }
                    new_agents.push((agent.id, agent.name.clone()));
                }
                Write::UpdateAgent(agent) => {
                    if self.agent(agent.id).is_none() {
                        return Err(EvoxError::Integrity(format!(
                            "cannot update missing agent {}",
                            agent.id
                        )));
                    }
                    if self.name_taken(&agent.name, Some(agent.id)) {
                        return Err(EvoxError::Conflict(format!(
                            "agent name '{}' is already taken",
                            agent.name
                        )));
                    }
                    if let Some(task_id) = agent.current_task {
                        if !self.tasks.iter().any(|t| t.id == task_id)
                            && !new_tasks.contains(&task_id)
                        {
                            return Err(EvoxError::Integrity(format!(
                                "agent {} points at missing task {task_id}",
                                agent.id
                            )));
                        }
                    }
                }
                Write::InsertTask(task) => {
                    if self.tasks.iter().any(|t| t.id == task.id) || !new_tasks.insert(task.id) {
                        return Err(EvoxError::Integrity(format!(
                            "task {} already exists",
                            task.id
                        )));
                    }
                }
                Write::UpdateTask(task) => {
                    if !self.tasks.iter().any(|t| t.id == task.id) {
                        return Err(EvoxError::Integrity(format!(
                            "cannot update missing task {}",
                            task.id
                        )));
                    }
                    if let Some(assignee) = task.assignee {
                        if !agent_exists(assignee, &new_agents) {
                            return Err(EvoxError::Integrity(format!(
                                "task {} assigned to missing agent {assignee}",
                                task.id
                            )));
                        }
                    }
                }
                Write::InsertDispatch(dispatch) => {
                    if !agent_exists(dispatch.agent_id, &new_agents) {
                        return Err(EvoxError::Integrity(format!(
                            "dispatch {} references missing agent {}",
                            dispatch.id, dispatch.agent_id
                        )));
                    }
                    if self.dispatches.iter().any(|d| d.id == dispatch.id)
                        || !new_dispatches.insert(dispatch.id)
                    {
                        return Err(EvoxError::Integrity(format!(
                            "dispatch {} already exists",
                            dispatch.id
                        )));
                    }
                }
                Write::UpdateDispatch(dispatch) => {
                    if !self.dispatches.iter().any(|d| d.id == dispatch.id) {
                        return Err(EvoxError::Integrity(format!(
                            "cannot update missing dispatch {}",
                            dispatch.id
                        )));
                    }
                }
                Write::AppendActivity(event) => {
                    if !agent_exists(event.agent_id, &new_agents) {
                        return Err(EvoxError::Integrity(format!(
                            "activity {} references missing agent {}",
                            event.id, event.agent_id
                        )));
                    }
                }
                Write::AppendLearning(_) => {}
                Write::PutMapping(mapping) => {
                    if !agent_exists(mapping.agent_id, &new_agents) {
                        return Err(EvoxError::Integrity(format!(
                            "mapping '{}' references missing agent {}",
                            mapping.canonical, mapping.agent_id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply already-validated writes. Updates bump the stored revision.
    fn apply(&mut self, writes: Vec<Write>) {
        for write in writes {
            match write {
                Write::InsertAgent(mut agent) => {
                    agent.revision = 0;
                    self.agents.push(agent);
                }
                Write::UpdateAgent(mut agent) => {
                    if let Some(slot) = self.agents.iter_mut().find(|a| a.id == agent.id) {
                        agent.revision = slot.revision + 1;
                        *slot = agent;
                    }
                }
                Write::InsertTask(mut task) => {
                    task.revision = 0;
                    self.tasks.push(task);
                }
                Write::UpdateTask(mut task) => {
                    if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
                        task.revision = slot.revision + 1;
                        *slot = task;
                    }
                }
                Write::InsertDispatch(dispatch) => self.dispatches.push(dispatch),
                Write::UpdateDispatch(dispatch) => {
                    if let Some(slot) = self.dispatches.iter_mut().find(|d| d.id == dispatch.id) {
                        *slot = dispatch;
                    }
                }
                Write::AppendActivity(event) => self.activity.push(event),
                Write::AppendLearning(learning) => self.learnings.push(learning),
                Write::PutMapping(mapping) => {
                    match self
                        .mappings
                        .iter_mut()
                        .find(|m| m.canonical == mapping.canonical)
                    {
                        Some(slot) => *slot = mapping,
                        None => self.mappings.push(mapping),
                    }
                }
            }
        }
    }

    /// Check, validate and apply `batch`. On error nothing has changed.
    pub(crate) fn commit(&mut self, batch: WriteBatch) -> EvoxResult<()> {
        for precondition in batch.preconditions() {
            self.check(precondition)?;
        }
        self.validate(batch.writes())?;
        let count = batch.writes().len();
        self.apply(batch.into_writes());
        debug!(writes = count, "Store: batch committed");
        Ok(())
    }

    pub(crate) fn acquire_lease(
        &mut self,
        job: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> bool {
        let lease = Lease {
            job: job.to_string(),
            holder: holder.to_string(),
            expires_at: now + ttl,
        };
        match self.leases.iter_mut().find(|l| l.job == job) {
            Some(current) if current.holder != holder && current.expires_at > now => false,
            Some(current) => {
                *current = lease;
                true
            }
            None => {
                self.leases.push(lease);
                true
            }
        }
    }

    pub(crate) fn release_lease(&mut self, job: &str, holder: &str) -> bool {
        let before = self.leases.len();
        self.leases.retain(|l| !(l.job == job && l.holder == holder));
        self.leases.len() < before
    }
}

/// In-memory reference store.
///
/// A single `RwLock` over all tables gives serializable batches: a commit
/// holds the write lock across precondition checks, validation and apply.
pub struct MemoryStore {
    tables: RwLock<Snapshot>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    /// Store seeded with `snapshot`, taken as-is.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot),
        }
    }

    /// Clone of every table.
    pub async fn snapshot(&self) -> Snapshot {
        self.tables.read().await.clone()
    }

    /// Exclusive access to the tables, for stores layered on top.
    pub(crate) async fn tables_mut(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.tables.write().await
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn agent(&self, id: Uuid) -> EvoxResult<Option<Agent>> {
        Ok(self.tables.read().await.agent(id).cloned())
    }

    async fn agent_by_name(&self, name: &str) -> EvoxResult<Option<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables.agents.iter().find(|a| a.has_name(name)).cloned())
    }

    async fn agents(&self) -> EvoxResult<Vec<Agent>> {
        Ok(self.tables.read().await.agents.clone())
    }

    async fn agents_by_status(&self, status: AgentStatus) -> EvoxResult<Vec<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect())
    }

    async fn agents_by_role(&self, role: &AgentRole) -> EvoxResult<Vec<Agent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .iter()
            .filter(|a| &a.role == role)
            .cloned()
            .collect())
    }

    async fn task(&self, id: Uuid) -> EvoxResult<Option<Task>> {
        let tables = self.tables.read().await;
        Ok(tables.tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn tasks(&self) -> EvoxResult<Vec<Task>> {
        Ok(self.tables.read().await.tasks.clone())
    }

    async fn tasks_by_status(&self, status: TaskStatus) -> EvoxResult<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn tasks_by_assignee(&self, agent_id: Uuid) -> EvoxResult<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .iter()
            .filter(|t| t.assignee == Some(agent_id))
            .cloned()
            .collect())
    }

    async fn dispatches_for_agent(
        &self,
        agent_id: Uuid,
        status: DispatchStatus,
    ) -> EvoxResult<Vec<Dispatch>> {
        let tables = self.tables.read().await;
        Ok(tables
            .dispatches
            .iter()
            .filter(|d| d.agent_id == agent_id && d.status == status)
            .cloned()
            .collect())
    }

    async fn dispatches_by_status(&self, status: DispatchStatus) -> EvoxResult<Vec<Dispatch>> {
        let tables = self.tables.read().await;
        Ok(tables
            .dispatches
            .iter()
            .filter(|d| d.status == status)
            .cloned()
            .collect())
    }

    async fn activity_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EvoxResult<Vec<ActivityEvent>> {
        let tables = self.tables.read().await;
        let mut events: Vec<ActivityEvent> = tables
            .activity
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn recent_learnings(&self, limit: usize) -> EvoxResult<Vec<Learning>> {
        let tables = self.tables.read().await;
        let mut learnings = tables.learnings.clone();
        learnings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        learnings.truncate(limit);
        Ok(learnings)
    }

    async fn mappings(&self) -> EvoxResult<Vec<AgentMapping>> {
        Ok(self.tables.read().await.mappings.clone())
    }

    async fn commit(&self, batch: WriteBatch) -> EvoxResult<()> {
        self.tables.write().await.commit(batch)
    }

    async fn acquire_lease(
        &self,
        job: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> EvoxResult<bool> {
        Ok(self.tables.write().await.acquire_lease(job, holder, now, ttl))
    }

    async fn release_lease(&self, job: &str, holder: &str) -> EvoxResult<bool> {
        Ok(self.tables.write().await.release_lease(job, holder))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use evox_core::{ActivityCategory, ActivityKind, TaskPriority};

    fn sam() -> Agent {
        Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Idle)
    }

    #[tokio::test]
    async fn test_lookup_by_name_is_case_insensitive() {
        let store = MemoryStore::from_snapshot(Snapshot::default().with_agent(sam()));
        assert!(store.agent_by_name("sam").await.unwrap().is_some());
        assert!(store.agent_by_name("Sam").await.unwrap().is_some());
        assert!(store.agent_by_name("leo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_bumps_revision() {
        let agent = sam();
        let store = MemoryStore::from_snapshot(Snapshot::default().with_agent(agent.clone()));

        let mut busy = agent.clone();
        busy.status = AgentStatus::Busy;
        store
            .commit(WriteBatch::new().expect_agent(&agent).update_agent(busy))
            .await
            .unwrap();

        let stored = store.agent(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AgentStatus::Busy);
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts_and_applies_nothing() {
        let agent = sam();
        let task = Task::new("Schema", TaskPriority::High);
        let store = MemoryStore::from_snapshot(
            Snapshot::default()
                .with_agent(agent.clone())
                .with_task(task.clone()),
        );

        let mut first = agent.clone();
        first.status = AgentStatus::Busy;
        store
            .commit(WriteBatch::new().expect_agent(&agent).update_agent(first))
            .await
            .unwrap();

        let mut moved = task.clone();
        moved.status = TaskStatus::InProgress;
        let err = store
            .commit(
                WriteBatch::new()
                    .expect_agent(&agent)
                    .update_task(moved)
                    .update_agent(agent.clone()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EvoxError::Conflict(_)));

        let stored = store.task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Backlog);
        assert_eq!(stored.revision, 0);
    }

    #[tokio::test]
    async fn test_running_dispatch_precondition() {
        let agent = sam();
        let running = Dispatch::new(agent.id, "work_on_task", "{}")
            .with_status(DispatchStatus::Running);
        let store = MemoryStore::from_snapshot(
            Snapshot::default()
                .with_agent(agent.clone())
                .with_dispatch(running),
        );

        assert!(store.has_running_dispatch(agent.id).await.unwrap());
        let err = store
            .commit(WriteBatch::new().expect_no_running_dispatch(agent.id))
            .await
            .unwrap_err();
        assert!(matches!(err, EvoxError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_missing_agent_is_integrity_violation() {
        let store = MemoryStore::new();
        let err = store
            .commit(WriteBatch::new().update_agent(sam()))
            .await
            .unwrap_err();
        assert!(matches!(err, EvoxError::Integrity(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_batch_may_reference_agent_it_inserts() {
        let store = MemoryStore::new();
        let agent = sam();
        let event = ActivityEvent::new(
            agent.id,
            &agent.name,
            ActivityCategory::System,
            "SAM joined the team",
            ActivityKind::AgentSpawned {
                reason: "test".into(),
            },
        );
        store
            .commit(WriteBatch::new().insert_agent(agent).append_activity(event))
            .await
            .unwrap();
        assert_eq!(store.agents().await.unwrap().len(), 1);
        assert_eq!(store.snapshot().await.activity.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let store = MemoryStore::from_snapshot(Snapshot::default().with_agent(sam()));
        let err = store
            .commit(WriteBatch::new().insert_agent(Agent::new("sam", AgentRole::Qa)))
            .await
            .unwrap_err();
        assert!(matches!(err, EvoxError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_activity_between_is_inclusive_and_ordered() {
        let agent = sam();
        let base = Utc::now();
        let make = |offset: i64| {
            ActivityEvent::new(
                agent.id,
                "sam",
                ActivityCategory::Task,
                format!("event {offset}"),
                ActivityKind::TaskCreated,
            )
            .at(base + Duration::milliseconds(offset))
        };
        let store = MemoryStore::from_snapshot(
            Snapshot::default()
                .with_agent(agent.clone())
                .with_activity(make(20))
                .with_activity(make(0))
                .with_activity(make(10))
                .with_activity(make(30)),
        );

        let events = store
            .activity_between(base, base + Duration::milliseconds(20))
            .await
            .unwrap();
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["event 0", "event 10", "event 20"]);
    }

    #[tokio::test]
    async fn test_recent_learnings_newest_first() {
        let base = Utc::now();
        let store = MemoryStore::from_snapshot(
            Snapshot::default()
                .with_learning(Learning::new("old").at(base - Duration::hours(2)))
                .with_learning(Learning::new("new").at(base))
                .with_learning(Learning::new("mid").at(base - Duration::hours(1))),
        );
        let learnings = store.recent_learnings(2).await.unwrap();
        let summaries: Vec<&str> = learnings.iter().map(|l| l.summary.as_str()).collect();
        assert_eq!(summaries, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_lease_exclusion_and_expiry() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let ttl = Duration::seconds(60);

        assert!(store.acquire_lease("cycle", "a", now, ttl).await.unwrap());
        assert!(!store.acquire_lease("cycle", "b", now, ttl).await.unwrap());
        // Renewal by the same holder.
        assert!(store.acquire_lease("cycle", "a", now, ttl).await.unwrap());
        // Expired leases can be taken over.
        let later = now + Duration::seconds(61);
        assert!(store.acquire_lease("cycle", "b", later, ttl).await.unwrap());

        assert!(!store.release_lease("cycle", "a").await.unwrap());
        assert!(store.release_lease("cycle", "b").await.unwrap());
        assert!(store.acquire_lease("cycle", "a", later, ttl).await.unwrap());
    }
}
