use evox_core::{ActivityEvent, Agent, AgentMapping, Dispatch, Learning, Task};
use uuid::Uuid;

/// A condition that must hold when the batch is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The agent still has the revision the caller read.
    AgentRevision {
        /// Agent id.
        id: Uuid,
        /// Revision at read time.
        expected: u64,
    },
    /// The task still has the revision the caller read.
    TaskRevision {
        /// Task id.
        id: Uuid,
        /// Revision at read time.
        expected: u64,
    },
    /// No dispatch with status `running` references the agent.
    NoRunningDispatch {
        /// Agent id.
        agent_id: Uuid,
    },
}

/// A single mutation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Add a new agent; names must stay unique.
    InsertAgent(Agent),
    /// Replace an existing agent, bumping its revision.
    UpdateAgent(Agent),
    /// Add a new task.
    InsertTask(Task),
    /// Replace an existing task, bumping its revision.
    UpdateTask(Task),
    /// Add a dispatch for an existing agent.
    InsertDispatch(Dispatch),
    /// Replace an existing dispatch.
    UpdateDispatch(Dispatch),
    /// Append to the activity log.
    AppendActivity(ActivityEvent),
    /// Append a learning.
    AppendLearning(Learning),
    /// Insert or repoint a canonical mapping.
    PutMapping(AgentMapping),
}

/// Transactional unit submitted to [`EntityStore::commit`](crate::EntityStore::commit).
///
/// Preconditions are checked first, then every write is validated, and only
/// then is anything applied. Writes are applied in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    preconditions: Vec<Precondition>,
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a precondition.
    pub fn expect(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Require the agent to be unchanged since `agent` was read.
    pub fn expect_agent(self, agent: &Agent) -> Self {
        self.expect(Precondition::AgentRevision {
            id: agent.id,
            expected: agent.revision,
        })
    }

    /// Require the task to be unchanged since `task` was read.
    pub fn expect_task(self, task: &Task) -> Self {
        self.expect(Precondition::TaskRevision {
            id: task.id,
            expected: task.revision,
        })
    }

    /// Require the agent to have no running dispatch.
    pub fn expect_no_running_dispatch(self, agent_id: Uuid) -> Self {
        self.expect(Precondition::NoRunningDispatch { agent_id })
    }

    /// Add a write.
    pub fn push(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    /// Queue [`Write::InsertAgent`].
    pub fn insert_agent(self, agent: Agent) -> Self {
        self.push(Write::InsertAgent(agent))
    }

    /// Queue [`Write::UpdateAgent`].
    pub fn update_agent(self, agent: Agent) -> Self {
        self.push(Write::UpdateAgent(agent))
    }

    /// Queue [`Write::InsertTask`].
    pub fn insert_task(self, task: Task) -> Self {
        self.push(Write::InsertTask(task))
    }

    /// Queue [`Write::UpdateTask`].
    pub fn update_task(self, task: Task) -> Self {
        self.push(Write::UpdateTask(task))
    }

    /// Queue [`Write::InsertDispatch`].
    pub fn insert_dispatch(self, dispatch: Dispatch) -> Self {
        self.push(Write::InsertDispatch(dispatch))
    }

    /// Queue [`Write::UpdateDispatch`].
    pub fn update_dispatch(self, dispatch: Dispatch) -> Self {
        self.push(Write::UpdateDispatch(dispatch))
    }

    /// Queue [`Write::AppendActivity`].
    pub fn append_activity(self, event: ActivityEvent) -> Self {
        self.push(Write::AppendActivity(event))
    }

    /// Queue [`Write::AppendLearning`].
    pub fn append_learning(self, learning: Learning) -> Self {
        self.push(Write::AppendLearning(learning))
    }

    /// Queue [`Write::PutMapping`].
    pub fn put_mapping(self, mapping: AgentMapping) -> Self {
        self.push(Write::PutMapping(mapping))
    }

    /// Preconditions in the order they were added.
    pub fn preconditions(&self) -> &[Precondition] {
        &self.preconditions
    }

    /// Writes in the order they were added.
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// No writes queued.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}
