use crate::classifier::{DispatchClassifier, KeywordClassifier};
use crate::config::AutoscaleConfig;
use crate::lease::{default_lease_ttl, run_exclusive, AUTOSCALE_LEASE};
use crate::templates::RoleTemplates;
use chrono::{DateTime, Duration, Utc};
use evox_core::{
    ActivityCategory, ActivityEvent, ActivityKind, Agent, AgentRole, AgentStatus,
    DispatchStatus, EvoxError, EvoxResult,
};
use evox_store::{EntityStore, WriteBatch};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A role the autoscaler thinks needs another agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRecommendation {
    /// Role to grow.
    pub role: AgentRole,
    /// Human-readable trigger, e.g. backlog size.
    pub reason: String,
}

/// Result of [`Autoscaler::check_spawn_needed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnCheck {
    /// Backlog triggers first, then saturation triggers.
    pub recommendations: Vec<SpawnRecommendation>,
    /// Fleet size at check time.
    pub current_agents: usize,
    /// Pending dispatches counted as backlog.
    pub pending_dispatches: usize,
}

/// An agent created by the autoscaler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnedAgent {
    /// New agent id.
    pub agent_id: Uuid,
    /// Generated display name.
    pub name: String,
    /// Role the agent was spawned for.
    pub role: AgentRole,
    /// Spawn reason recorded on the agent.
    pub reason: String,
}

/// A recommendation that did not produce an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSpawn {
    /// Role that was not grown.
    pub role: AgentRole,
    /// Recommendation reason.
    pub reason: String,
    /// Why the spawn did not happen.
    pub error: String,
}

/// Result of one check-and-spawn pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSpawnSummary {
    /// When the pass ran.
    pub checked: DateTime<Utc>,
    /// Recommendations considered.
    pub recommendations_count: usize,
    /// Agents created.
    pub spawned_count: usize,
    /// Created agents.
    pub spawned: Vec<SpawnedAgent>,
    /// Recommendations that did not produce an agent.
    pub skipped: Vec<SkippedSpawn>,
}

/// Count per role, in first-seen order.
fn tally(roles: impl IntoIterator<Item = AgentRole>) -> Vec<(AgentRole, usize)> {
    let mut counts: Vec<(AgentRole, usize)> = Vec::new();
    for role in roles {
        match counts.iter_mut().find(|(r, _)| *r == role) {
            Some((_, count)) => *count += 1,
            None => counts.push((role, 1)),
        }
    }
    counts
}

/// Grows the fleet from role templates when backlog or saturation calls for it.
pub struct Autoscaler {
    store: Arc<dyn EntityStore>,
    templates: RoleTemplates,
    config: AutoscaleConfig,
    classifier: Box<dyn DispatchClassifier>,
    lease_ttl: Duration,
}

impl Autoscaler {
    /// Autoscaler with default thresholds and the keyword classifier.
    pub fn new(store: Arc<dyn EntityStore>, templates: RoleTemplates) -> Self {
        Self {
            store,
            templates,
            config: AutoscaleConfig::default(),
            classifier: Box::new(KeywordClassifier::default()),
            lease_ttl: default_lease_ttl(),
        }
    }

    /// Override thresholds and the per-role cap.
    pub fn with_config(mut self, config: AutoscaleConfig) -> Self {
        self.config = config;
        self
    }

    /// Override how pending dispatches are attributed to roles.
    pub fn with_classifier(mut self, classifier: impl DispatchClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Lease lifetime for exclusive runs.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Role templates used for spawning.
    pub fn templates(&self) -> &RoleTemplates {
        &self.templates
    }

    /// Phase A: recommend roles under backlog pressure or fully saturated.
    ///
    /// The two rules fire independently; a role can be recommended twice.
    pub async fn check_spawn_needed(&self) -> EvoxResult<SpawnCheck> {
        let agents = self.store.agents().await?;
        let pending = self
            .store
            .dispatches_by_status(DispatchStatus::Pending)
            .await?;

        let mut recommendations = Vec::new();

        let backlog = tally(pending.iter().map(|d| self.classifier.classify(d)));
        for (role, count) in backlog {
            if count > self.config.backlog_threshold {
                recommendations.push(SpawnRecommendation {
                    role,
                    reason: format!("High backlog: {count} pending tasks"),
                });
            }
        }

        for (role, total) in tally(agents.iter().map(|a| a.role.clone())) {
            let busy = agents
                .iter()
                .filter(|a| a.role == role && a.status == AgentStatus::Busy)
                .count();
            if total > 0 && busy == total {
                recommendations.push(SpawnRecommendation {
                    reason: format!("All {total} {role} agents busy"),
                    role,
                });
            }
        }

        Ok(SpawnCheck {
            recommendations,
            current_agents: agents.len(),
            pending_dispatches: pending.len(),
        })
    }

    /// Synthesize one agent of `role` from its template.
    ///
    /// Fails with `UnknownRole` when the table has no template for `role`.
    /// The per-role cap is not checked here; see
    /// [`check_and_auto_spawn`](Self::check_and_auto_spawn).
    pub async fn auto_spawn(&self, role: &AgentRole, reason: &str) -> EvoxResult<SpawnedAgent> {
        let template = self
            .templates
            .get(role)
            .ok_or_else(|| EvoxError::UnknownRole(role.to_string()))?;

        let existing = self.store.agents_by_role(role).await?.len();
        let name = if existing == 0 {
            template.name_prefix.clone()
        } else {
            format!("{}-{}", template.name_prefix, existing + 1)
        }
        .to_uppercase();

        let learnings: Vec<String> = self
            .store
            .recent_learnings(self.config.learning_scan_window)
            .await?
            .into_iter()
            .filter(|l| l.is_relevant(role.as_str(), &template.name_prefix))
            .take(self.config.learning_limit)
            .map(|l| l.summary)
            .collect();

        let mut prompt = template.base_prompt.clone();
        if !learnings.is_empty() {
            prompt.push_str("\n\n## Learnings from Team\n");
            for summary in &learnings {
                prompt.push_str(&format!("- {summary}\n"));
            }
        }

        let now = Utc::now();
        let mut agent = Agent::new(name.clone(), role.clone()).with_status(AgentStatus::Idle);
        agent.skills = template.skills.clone();
        agent.territory = template.territory.clone();
        agent.genius_dna = template.genius_dna.clone();
        agent.base_prompt = Some(prompt);
        agent.spawned_at = Some(now);
        agent.spawn_reason = Some(reason.to_string());
        agent.last_seen = now;
        let agent_id = agent.id;

        let event = ActivityEvent::new(
            agent_id,
            &name,
            ActivityCategory::System,
            format!("{name} joined the team"),
            ActivityKind::AgentSpawned {
                reason: reason.to_string(),
            },
        )
        .with_description(format!("Auto-spawned: {reason}"))
        .at(now);

        self.store
            .commit(WriteBatch::new().insert_agent(agent).append_activity(event))
            .await?;

        info!(
            agent = %name,
            %role,
            learnings = learnings.len(),
            reason,
            "Spawned agent"
        );

        Ok(SpawnedAgent {
            agent_id,
            name,
            role: role.clone(),
            reason: reason.to_string(),
        })
    }

    /// Phase B: act on every recommendation in order.
    ///
    /// Recommendations for roles already at the cap, or whose spawn fails, are
    /// logged and recorded as skipped. Fatal store errors abort the pass.
    pub async fn check_and_auto_spawn(&self) -> EvoxResult<AutoSpawnSummary> {
        let check = self.check_spawn_needed().await?;
        let mut spawned = Vec::new();
        let mut skipped = Vec::new();

        for rec in &check.recommendations {
            let current = self.store.agents_by_role(&rec.role).await?.len();
            let attempt = if current >= self.config.max_agents_per_role {
                Err(EvoxError::CapacityExceeded(format!(
                    "{} already has {current} agents (max {})",
                    rec.role, self.config.max_agents_per_role
                )))
            } else {
                self.auto_spawn(&rec.role, &rec.reason).await
            };

            match attempt {
                Ok(agent) => spawned.push(agent),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e @ EvoxError::CapacityExceeded(_)) => {
                    warn!(role = %rec.role, error = %e, "Skipping spawn: role at capacity");
                    skipped.push(SkippedSpawn {
                        role: rec.role.clone(),
                        reason: rec.reason.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(role = %rec.role, error = %e, "Failed to spawn agent");
                    skipped.push(SkippedSpawn {
                        role: rec.role.clone(),
                        reason: rec.reason.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            recommendations = check.recommendations.len(),
            spawned = spawned.len(),
            skipped = skipped.len(),
            "Autoscale pass complete"
        );

        Ok(AutoSpawnSummary {
            checked: Utc::now(),
            recommendations_count: check.recommendations.len(),
            spawned_count: spawned.len(),
            spawned,
            skipped,
        })
    }

    /// [`check_and_auto_spawn`](Self::check_and_auto_spawn) under the
    /// `autoscale` lease. `None` when another holder is mid-pass.
    pub async fn check_and_auto_spawn_exclusive(
        &self,
        holder: &str,
    ) -> EvoxResult<Option<AutoSpawnSummary>> {
        run_exclusive(
            self.store.as_ref(),
            AUTOSCALE_LEASE,
            holder,
            self.lease_ttl,
            || self.check_and_auto_spawn(),
        )
        .await
    }
}
