use crate::engine::{DispatchEngine, DispatchOutcome, DispatchRejection};
use crate::lease::{default_lease_ttl, run_exclusive, FLEET_CYCLE_LEASE};
use chrono::Duration;
use evox_core::{AgentStatus, DispatchSource, EvoxResult};
use evox_store::EntityStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// What happened to one agent during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    /// Agent display name.
    pub agent: String,
    /// A task was assigned.
    pub success: bool,
    /// Assigned task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// External tracker id of the assigned task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// `no_tasks`, or the dispatch rejection code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CycleOutcome {
    fn from_dispatch(agent: String, outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Assigned(assignment) => Self {
                agent,
                success: true,
                task_id: Some(assignment.task_id),
                external_id: assignment.external_id,
                reason: None,
            },
            DispatchOutcome::Rejected(rejection) => Self {
                agent,
                success: false,
                task_id: None,
                external_id: None,
                reason: Some(
                    match rejection {
                        DispatchRejection::NoTasksAvailable => "no_tasks",
                        other => other.code(),
                    }
                    .to_string(),
                ),
            },
        }
    }
}

/// Drives the dispatch engine across every agent once per run.
pub struct FleetCycle {
    store: Arc<dyn EntityStore>,
    engine: DispatchEngine,
    lease_ttl: Duration,
}

impl FleetCycle {
    /// Cycle over every agent in `store`, dispatching through `engine`.
    pub fn new(store: Arc<dyn EntityStore>, engine: DispatchEngine) -> Self {
        Self {
            store,
            engine,
            lease_ttl: default_lease_ttl(),
        }
    }

    /// Lease lifetime for exclusive runs.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// One pass over the fleet in store order.
    ///
    /// Offline agents are skipped. A rejection for one agent is recorded and
    /// the pass continues; store failures abort it.
    pub async fn run_cycle(&self) -> EvoxResult<Vec<CycleOutcome>> {
        let agents = self.store.agents().await?;
        let mut outcomes = Vec::with_capacity(agents.len());

        for agent in agents {
            if agent.status == AgentStatus::Offline {
                continue;
            }
            let outcome = self
                .engine
                .dispatch_from(&agent.name, DispatchSource::AutoDispatchCycle)
                .await?;
            outcomes.push(CycleOutcome::from_dispatch(agent.name, outcome));
        }

        let assigned = outcomes.iter().filter(|o| o.success).count();
        info!(agents = outcomes.len(), assigned, "Fleet cycle complete");
        Ok(outcomes)
    }

    /// [`run_cycle`](Self::run_cycle) under the `fleet_cycle` lease.
    ///
    /// Returns `None` without touching anything when another holder is
    /// mid-cycle.
    pub async fn run_cycle_exclusive(
        &self,
        holder: &str,
    ) -> EvoxResult<Option<Vec<CycleOutcome>>> {
        run_exclusive(
            self.store.as_ref(),
            FLEET_CYCLE_LEASE,
            holder,
            self.lease_ttl,
            || self.run_cycle(),
        )
        .await
    }
}
