use evox_core::{Agent, EvoxResult};
use evox_store::EntityStore;
use std::sync::Arc;
use tracing::warn;

/// One canonical identity and the agent record it currently points at.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    /// Lower-cased reporting name.
    pub canonical: String,
    /// Agent the name points at now.
    pub agent: Agent,
}

impl RosterEntry {
    /// The task affinity string that routes work to this identity.
    pub fn owns_affinity(&self, affinity: &str) -> bool {
        self.canonical.eq_ignore_ascii_case(affinity)
    }
}

/// Reporting identities, independent of mutable display names.
#[derive(Clone)]
pub struct CanonicalRoster {
    store: Arc<dyn EntityStore>,
}

impl CanonicalRoster {
    /// Roster over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Mappings in store order, resolved to their agents. Mappings that point
    /// at a missing agent are skipped.
    pub async fn entries(&self) -> EvoxResult<Vec<RosterEntry>> {
        let mut entries = Vec::new();
        for mapping in self.store.mappings().await? {
            match self.store.agent(mapping.agent_id).await? {
                Some(agent) => entries.push(RosterEntry {
                    canonical: mapping.canonical,
                    agent,
                }),
                None => warn!(
                    canonical = %mapping.canonical,
                    agent_id = %mapping.agent_id,
                    "Roster mapping points at a missing agent"
                ),
            }
        }
        Ok(entries)
    }

    /// Agent mapped to `canonical`, compared case-insensitively.
    pub async fn resolve(&self, canonical: &str) -> EvoxResult<Option<Agent>> {
        let canonical = canonical.to_lowercase();
        let Some(mapping) = self
            .store
            .mappings()
            .await?
            .into_iter()
            .find(|m| m.canonical == canonical)
        else {
            return Ok(None);
        };
        self.store.agent(mapping.agent_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use evox_core::{AgentMapping, AgentRole};
    use evox_store::{MemoryStore, Snapshot};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_resolves_renamed_agent() {
        let mut agent = Agent::new("SAM-2", AgentRole::Backend);
        let store = Arc::new(MemoryStore::from_snapshot(
            Snapshot::default()
                .with_agent(agent.clone())
                .with_mapping(AgentMapping::new("sam", agent.id)),
        ));
        let roster = CanonicalRoster::new(store.clone());

        agent.name = "SAMUEL".into();
        store
            .commit(evox_store::WriteBatch::new().update_agent(agent.clone()))
            .await
            .unwrap();

        let resolved = roster.resolve("SAM").await.unwrap().unwrap();
        assert_eq!(resolved.name, "SAMUEL");
        let entries = roster.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].owns_affinity("Sam"));
    }

    #[tokio::test]
    async fn test_dangling_mapping_is_skipped() {
        let store = Arc::new(MemoryStore::from_snapshot(
            Snapshot::default().with_mapping(AgentMapping::new("ghost", Uuid::new_v4())),
        ));
        let roster = CanonicalRoster::new(store);
        assert!(roster.entries().await.unwrap().is_empty());
        assert!(roster.resolve("ghost").await.unwrap().is_none());
        assert!(roster.resolve("nobody").await.unwrap().is_none());
    }
}
