use evox_core::{AgentStatus, EvoxResult};
use evox_store::EntityStore;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Why an agent is or is not eligible for new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleReason {
    /// No agent with that name.
    AgentNotFound,
    /// Idle or online, with no running dispatch.
    Available,
    /// Busy.
    StatusBusy,
    /// Offline.
    StatusOffline,
    /// A dispatch is still running.
    HasRunningDispatch,
}

impl IdleReason {
    fn for_status(status: AgentStatus) -> Self {
        match status {
            AgentStatus::Busy => IdleReason::StatusBusy,
            AgentStatus::Offline => IdleReason::StatusOffline,
            AgentStatus::Idle | AgentStatus::Online => IdleReason::Available,
        }
    }

    /// Wire name, e.g. `status_busy`.
    pub fn as_str(self) -> &'static str {
        match self {
            IdleReason::AgentNotFound => "agent_not_found",
            IdleReason::Available => "available",
            IdleReason::StatusBusy => "status_busy",
            IdleReason::StatusOffline => "status_offline",
            IdleReason::HasRunningDispatch => "has_running_dispatch",
        }
    }
}

/// Result of [`IdleDetector::check_idle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleCheck {
    /// The agent may take new work.
    pub idle: bool,
    /// Why.
    pub reason: IdleReason,
    /// Agent id, when found.
    pub agent_id: Option<Uuid>,
    /// Lower-cased agent name, when found.
    pub canonical_name: Option<String>,
}

/// Decides whether a named agent may accept new work. Read-only.
#[derive(Clone)]
pub struct IdleDetector {
    store: Arc<dyn EntityStore>,
}

impl IdleDetector {
    /// Detector over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// A running dispatch makes the agent non-idle regardless of its status.
    pub async fn check_idle(&self, agent_name: &str) -> EvoxResult<IdleCheck> {
        let Some(agent) = self.store.agent_by_name(agent_name).await? else {
            return Ok(IdleCheck {
                idle: false,
                reason: IdleReason::AgentNotFound,
                agent_id: None,
                canonical_name: None,
            });
        };

        let reason = if self.store.has_running_dispatch(agent.id).await? {
            IdleReason::HasRunningDispatch
        } else {
            IdleReason::for_status(agent.status)
        };

        Ok(IdleCheck {
            idle: reason == IdleReason::Available,
            reason,
            agent_id: Some(agent.id),
            canonical_name: Some(agent.canonical_name()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use evox_core::{Agent, AgentRole, Dispatch, DispatchStatus};
    use evox_store::{MemoryStore, Snapshot};

    fn detector(snapshot: Snapshot) -> IdleDetector {
        IdleDetector::new(Arc::new(MemoryStore::from_snapshot(snapshot)))
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let check = detector(Snapshot::default()).check_idle("nobody").await.unwrap();
        assert!(!check.idle);
        assert_eq!(check.reason, IdleReason::AgentNotFound);
        assert_eq!(check.agent_id, None);
    }

    #[tokio::test]
    async fn test_status_decides_when_nothing_runs() {
        for (status, idle, reason) in [
            (AgentStatus::Idle, true, IdleReason::Available),
            (AgentStatus::Online, true, IdleReason::Available),
            (AgentStatus::Busy, false, IdleReason::StatusBusy),
            (AgentStatus::Offline, false, IdleReason::StatusOffline),
        ] {
            let agent = Agent::new("LEO", AgentRole::Frontend).with_status(status);
            let check = detector(Snapshot::default().with_agent(agent.clone()))
                .check_idle("leo")
                .await
                .unwrap();
            assert_eq!(check.idle, idle, "{status}");
            assert_eq!(check.reason, reason);
            assert_eq!(check.agent_id, Some(agent.id));
            assert_eq!(check.canonical_name.as_deref(), Some("leo"));
        }
    }

    #[tokio::test]
    async fn test_running_dispatch_overrides_idle_status() {
        let agent = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Idle);
        let running = Dispatch::new(agent.id, "work_on_task", "{}")
            .with_status(DispatchStatus::Running);
        let check = detector(
            Snapshot::default()
                .with_agent(agent)
                .with_dispatch(running),
        )
        .check_idle("SAM")
        .await
        .unwrap();
        assert!(!check.idle);
        assert_eq!(check.reason, IdleReason::HasRunningDispatch);
    }

    #[tokio::test]
    async fn test_pending_dispatch_does_not_block() {
        let agent = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Online);
        let pending = Dispatch::new(agent.id, "work_on_task", "{}");
        let check = detector(
            Snapshot::default()
                .with_agent(agent)
                .with_dispatch(pending),
        )
        .check_idle("sam")
        .await
        .unwrap();
        assert!(check.idle);
    }
}
