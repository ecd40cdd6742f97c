use serde::{Deserialize, Serialize};

/// Dispatch engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// How many times a dispatch re-reads and retries after losing a commit
    /// race before giving up with `commit_conflict`.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
}

fn default_max_commit_attempts() -> u32 {
    3
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: default_max_commit_attempts(),
        }
    }
}

/// Autoscaler thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscaleConfig {
    /// A role is recommended when its pending dispatches exceed this count.
    #[serde(default = "default_backlog_threshold")]
    pub backlog_threshold: usize,
    /// Hard cap on agents per role.
    #[serde(default = "default_max_agents_per_role")]
    pub max_agents_per_role: usize,
    /// Learnings appended to a spawned agent's prompt.
    #[serde(default = "default_learning_limit")]
    pub learning_limit: usize,
    /// How many of the newest learnings are scanned for relevant ones.
    #[serde(default = "default_learning_scan_window")]
    pub learning_scan_window: usize,
}

fn default_backlog_threshold() -> usize {
    10
}

fn default_max_agents_per_role() -> usize {
    2
}

fn default_learning_limit() -> usize {
    5
}

fn default_learning_scan_window() -> usize {
    20
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            backlog_threshold: default_backlog_threshold(),
            max_agents_per_role: default_max_agents_per_role(),
            learning_limit: default_learning_limit(),
            learning_scan_window: default_learning_scan_window(),
        }
    }
}

/// Cron expressions (7-field: sec min hour dom month dow year) and lease
/// settings for the periodic jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Fleet dispatch cycle.
    #[serde(default = "default_dispatch_cycle_cron")]
    pub dispatch_cycle: String,
    /// Autoscale check-and-spawn.
    #[serde(default = "default_autoscale_cron")]
    pub autoscale: String,
    /// Daily standup report.
    #[serde(default = "default_standup_cron")]
    pub standup: String,
    /// Lease lifetime for a single job run.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    /// Agent credited with `standup_generated` events, if it exists.
    #[serde(default = "default_reporter")]
    pub reporter: String,
    /// Set to false to disable every job.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_dispatch_cycle_cron() -> String {
    "0 */5 * * * * *".to_string()
}

fn default_autoscale_cron() -> String {
    "0 0 * * * * *".to_string()
}

fn default_standup_cron() -> String {
    "0 0 18 * * * *".to_string()
}

fn default_lease_ttl_secs() -> u64 {
    300
}

fn default_reporter() -> String {
    "MAX".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            dispatch_cycle: default_dispatch_cycle_cron(),
            autoscale: default_autoscale_cron(),
            standup: default_standup_cron(),
            lease_ttl_secs: default_lease_ttl_secs(),
            reporter: default_reporter(),
            enabled: default_enabled(),
        }
    }
}

const MAX_LEASE_TTL_SECS: u64 = 86_400;

impl ScheduleConfig {
    /// Lease lifetime, capped at one day.
    pub fn lease_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_ttl_secs.min(MAX_LEASE_TTL_SECS) as i64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_autoscale_defaults() {
        let config = AutoscaleConfig::default();
        assert_eq!(config.backlog_threshold, 10);
        assert_eq!(config.max_agents_per_role, 2);
        assert_eq!(config.learning_limit, 5);
        assert_eq!(config.learning_scan_window, 20);
    }

    #[test]
    fn test_partial_schedule_fills_defaults() {
        let config: ScheduleConfig = serde_json::from_str(r#"{"reporter": "ella"}"#).unwrap();
        assert_eq!(config.reporter, "ella");
        assert_eq!(config.lease_ttl_secs, 300);
        assert_eq!(config.lease_ttl(), chrono::Duration::minutes(5));
        assert!(config.enabled);
    }
}
