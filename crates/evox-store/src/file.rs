use crate::batch::WriteBatch;
use crate::memory::{MemoryStore, Snapshot};
use crate::store::EntityStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use evox_core::{
    ActivityEvent, Agent, AgentMapping, AgentRole, AgentStatus, Dispatch, DispatchStatus,
    EvoxError, EvoxResult, Learning, Task, TaskStatus,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// [`MemoryStore`] that rewrites a JSON snapshot on every commit or lease
/// change.
///
/// Changes are applied to a copy of the tables, written to a sibling temp
/// file and renamed over the target, and only then made visible. A failed
/// write leaves both the file and the in-memory tables untouched.
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Open the store at `path`, loading the snapshot if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> EvoxResult<Self> {
        let path = path.into();
        let snapshot = if tokio::fs::try_exists(&path).await? {
            let data = tokio::fs::read_to_string(&path).await?;
            let snapshot: Snapshot = serde_json::from_str(&data).map_err(|e| {
                EvoxError::Integrity(format!("corrupt store file {}: {e}", path.display()))
            })?;
            info!(
                path = %path.display(),
                agents = snapshot.agents.len(),
                tasks = snapshot.tasks.len(),
                "FileStore: loaded snapshot"
            );
            snapshot
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            Snapshot::default()
        };

        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
        })
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of every table.
    pub async fn snapshot(&self) -> Snapshot {
        self.inner.snapshot().await
    }

    async fn persist(&self, snapshot: &Snapshot) -> EvoxResult<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "FileStore: snapshot written");
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FileStore {
    async fn agent(&self, id: Uuid) -> EvoxResult<Option<Agent>> {
        self.inner.agent(id).await
    }

    async fn agent_by_name(&self, name: &str) -> EvoxResult<Option<Agent>> {
        self.inner.agent_by_name(name).await
    }

    async fn agents(&self) -> EvoxResult<Vec<Agent>> {
        self.inner.agents().await
    }

    async fn agents_by_status(&self, status: AgentStatus) -> EvoxResult<Vec<Agent>> {
        self.inner.agents_by_status(status).await
    }

    async fn agents_by_role(&self, role: &AgentRole) -> EvoxResult<Vec<Agent>> {
        self.inner.agents_by_role(role).await
    }

    async fn task(&self, id: Uuid) -> EvoxResult<Option<Task>> {
        self.inner.task(id).await
    }

    async fn tasks(&self) -> EvoxResult<Vec<Task>> {
        self.inner.tasks().await
    }

    async fn tasks_by_status(&self, status: TaskStatus) -> EvoxResult<Vec<Task>> {
        self.inner.tasks_by_status(status).await
    }

    async fn tasks_by_assignee(&self, agent_id: Uuid) -> EvoxResult<Vec<Task>> {
        self.inner.tasks_by_assignee(agent_id).await
    }

    async fn dispatches_for_agent(
        &self,
        agent_id: Uuid,
        status: DispatchStatus,
    ) -> EvoxResult<Vec<Dispatch>> {
        self.inner.dispatches_for_agent(agent_id, status).await
    }

    async fn dispatches_by_status(&self, status: DispatchStatus) -> EvoxResult<Vec<Dispatch>> {
        self.inner.dispatches_by_status(status).await
    }

    async fn activity_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EvoxResult<Vec<ActivityEvent>> {
        self.inner.activity_between(start, end).await
    }

    async fn recent_learnings(&self, limit: usize) -> EvoxResult<Vec<Learning>> {
        self.inner.recent_learnings(limit).await
    }

    async fn mappings(&self) -> EvoxResult<Vec<AgentMapping>> {
        self.inner.mappings().await
    }

    async fn commit(&self, batch: WriteBatch) -> EvoxResult<()> {
        let mut tables = self.inner.tables_mut().await;
        let mut next = tables.clone();
        next.commit(batch)?;
        self.persist(&next).await?;
        *tables = next;
        Ok(())
    }

    async fn acquire_lease(
        &self,
        job: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> EvoxResult<bool> {
        let mut tables = self.inner.tables_mut().await;
        let mut next = tables.clone();
        if !next.acquire_lease(job, holder, now, ttl) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *tables = next;
        Ok(true)
    }

    async fn release_lease(&self, job: &str, holder: &str) -> EvoxResult<bool> {
        let mut tables = self.inner.tables_mut().await;
        let mut next = tables.clone();
        if !next.release_lease(job, holder) {
            return Ok(false);
        }
        self.persist(&next).await?;
        *tables = next;
        Ok(true)
    }
}
