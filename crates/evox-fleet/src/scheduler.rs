use crate::autoscaler::{AutoSpawnSummary, Autoscaler};
use crate::config::ScheduleConfig;
use crate::cycle::{CycleOutcome, FleetCycle};
use crate::lease::{default_lease_ttl, run_exclusive, STANDUP_LEASE};
use crate::standup::{render_agent_standup, render_fleet_summary, StandupAggregator};
use chrono::{DateTime, Duration, Local, Utc};
use cron::Schedule;
use evox_core::{ActivityCategory, ActivityEvent, ActivityKind, EvoxError, EvoxResult};
use evox_store::{EntityStore, WriteBatch};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The periodic jobs the fleet knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetJob {
    /// [`FleetCycle::run_cycle`](crate::FleetCycle::run_cycle) over every agent.
    DispatchCycle,
    /// Autoscaler check-and-spawn.
    Autoscale,
    /// Daily standup report.
    Standup,
}

impl FleetJob {
    /// Snake-case job name.
    pub fn as_str(self) -> &'static str {
        match self {
            FleetJob::DispatchCycle => "dispatch_cycle",
            FleetJob::Autoscale => "autoscale",
            FleetJob::Standup => "standup",
        }
    }
}

/// A single scheduled job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Which job to run.
    pub job: FleetJob,
    /// 7-field cron expression.
    pub cron_expression: String,
    /// Disabled jobs are never fired.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduledJob {
    /// Enabled job firing on `cron_expression`.
    pub fn new(job: FleetJob, cron_expression: impl Into<String>) -> Self {
        Self {
            job,
            cron_expression: cron_expression.into(),
            enabled: true,
        }
    }
}

/// What one job run produced. `None` payloads mean the lease was held
/// elsewhere and the run was skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum JobReport {
    /// Per-agent outcomes.
    DispatchCycle(Option<Vec<CycleOutcome>>),
    /// Spawn summary.
    Autoscale(Option<AutoSpawnSummary>),
    /// Path of the written report.
    Standup(Option<PathBuf>),
}

/// Cron-based runner for the dispatch cycle, autoscaler and standup jobs.
///
/// Every firing takes the job's lease under a per-process holder id, so
/// several schedulers pointed at one store never run the same job at once.
pub struct FleetScheduler {
    jobs: Vec<ScheduledJob>,
    store: Arc<dyn EntityStore>,
    cycle: FleetCycle,
    autoscaler: Autoscaler,
    standup: StandupAggregator,
    standup_dir: PathBuf,
    reporter: String,
    lease_ttl: Duration,
    holder: String,
}

impl FleetScheduler {
    /// Scheduler with no jobs; add them with [`Self::with_schedule`] or [`Self::with_job`].
    pub fn new(
        store: Arc<dyn EntityStore>,
        cycle: FleetCycle,
        autoscaler: Autoscaler,
        standup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            jobs: Vec::new(),
            standup: StandupAggregator::new(Arc::clone(&store)),
            store,
            cycle,
            autoscaler,
            standup_dir: standup_dir.into(),
            reporter: "MAX".to_string(),
            lease_ttl: default_lease_ttl(),
            holder: format!("evox-{}", Uuid::new_v4()),
        }
    }

    /// Jobs, reporter and lease lifetime from the `[schedule]` config section.
    pub fn with_schedule(mut self, config: &ScheduleConfig) -> Self {
        self.jobs = vec![
            ScheduledJob::new(FleetJob::DispatchCycle, &config.dispatch_cycle),
            ScheduledJob::new(FleetJob::Autoscale, &config.autoscale),
            ScheduledJob::new(FleetJob::Standup, &config.standup),
        ];
        for job in &mut self.jobs {
            job.enabled = config.enabled;
        }
        self.reporter = config.reporter.clone();
        self.lease_ttl = config.lease_ttl();
        self
    }

    /// Add one job.
    pub fn with_job(mut self, job: ScheduledJob) -> Self {
        self.jobs.push(job);
        self
    }

    /// Lease holder id for this process.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    ///
    /// Uses the 7-field cron format: sec min hour day-of-month month day-of-week year.
    pub fn parse_cron(cron_expr: &str) -> EvoxResult<Schedule> {
        Schedule::from_str(cron_expr)
            .map_err(|e| EvoxError::Config(format!("Invalid cron expression '{cron_expr}': {e}")))
    }

    /// First fire time strictly after `after`.
    pub fn next_fire_after(cron_expr: &str, after: DateTime<Utc>) -> EvoxResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(cron_expr)?;
        schedule.after(&after).next().ok_or_else(|| {
            EvoxError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    /// First fire time after now.
    pub fn next_fire_time(cron_expr: &str) -> EvoxResult<DateTime<Utc>> {
        Self::next_fire_after(cron_expr, Utc::now())
    }

    /// Check every job's expression up front so a typo fails at startup.
    pub fn validate(&self) -> EvoxResult<()> {
        for job in &self.jobs {
            Self::parse_cron(&job.cron_expression)?;
        }
        Ok(())
    }

    /// Jobs that will fire.
    pub fn enabled_jobs(&self) -> Vec<&ScheduledJob> {
        self.jobs.iter().filter(|j| j.enabled).collect()
    }

    /// All configured jobs, enabled or not.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Run one job now, under its lease.
    pub async fn run_job(&self, job: FleetJob) -> EvoxResult<JobReport> {
        Ok(match job {
            FleetJob::DispatchCycle => {
                JobReport::DispatchCycle(self.cycle.run_cycle_exclusive(&self.holder).await?)
            }
            FleetJob::Autoscale => JobReport::Autoscale(
                self.autoscaler
                    .check_and_auto_spawn_exclusive(&self.holder)
                    .await?,
            ),
            FleetJob::Standup => JobReport::Standup(
                run_exclusive(
                    self.store.as_ref(),
                    STANDUP_LEASE,
                    &self.holder,
                    self.lease_ttl,
                    || self.write_standup(),
                )
                .await?,
            ),
        })
    }

    /// Render today's standup to `<standup_dir>/<date>.md` and credit the
    /// reporter agent, if it exists, with a `standup_generated` event.
    pub async fn write_standup(&self) -> EvoxResult<PathBuf> {
        let date = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let report = self.standup.report(None, None).await?;

        let mut markdown = render_fleet_summary(&report, &date);
        for agent in &report.agents {
            markdown.push('\n');
            markdown.push_str(&render_agent_standup(agent, &date));
        }

        tokio::fs::create_dir_all(&self.standup_dir).await?;
        let path = self.standup_dir.join(format!("{date}.md"));
        tokio::fs::write(&path, markdown).await?;

        match self.store.agent_by_name(&self.reporter).await? {
            Some(reporter) => {
                let event = ActivityEvent::new(
                    reporter.id,
                    &reporter.name,
                    ActivityCategory::System,
                    format!("Daily standup generated for {date}"),
                    ActivityKind::StandupGenerated { date: date.clone() },
                )
                .with_description(format!("Standup written to {}", path.display()));
                self.store
                    .commit(WriteBatch::new().append_activity(event))
                    .await?;
            }
            None => warn!(
                reporter = %self.reporter,
                "Reporter agent not found, standup not logged"
            ),
        }

        info!(
            date = %date,
            path = %path.display(),
            agents = report.agents.len(),
            "Standup generated"
        );
        Ok(path)
    }

    /// Directory standup reports are written to.
    pub fn standup_dir(&self) -> &Path {
        &self.standup_dir
    }

    async fn fire(&self, job: FleetJob) {
        match self.run_job(job).await {
            Ok(JobReport::DispatchCycle(Some(outcomes))) => info!(
                job = job.as_str(),
                assigned = outcomes.iter().filter(|o| o.success).count(),
                "Scheduler: job finished"
            ),
            Ok(JobReport::Autoscale(Some(summary))) => info!(
                job = job.as_str(),
                spawned = summary.spawned_count,
                "Scheduler: job finished"
            ),
            Ok(JobReport::Standup(Some(path))) => info!(
                job = job.as_str(),
                path = %path.display(),
                "Scheduler: job finished"
            ),
            Ok(_) => info!(job = job.as_str(), "Scheduler: job skipped, lease held elsewhere"),
            Err(e) => error!(job = job.as_str(), error = %e, "Scheduler: job failed"),
        }
    }

    /// Start the scheduler background loop.
    ///
    /// Spawns a tokio task that continuously:
    /// 1. Computes the next fire time for each enabled job.
    /// 2. Sleeps until the nearest fire time.
    /// 3. Runs every job whose fire time falls within a 1-second tolerance window.
    ///
    /// Returns the [`tokio::task::JoinHandle`] so the caller can abort or await it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let enabled = self.enabled_jobs();
                if enabled.is_empty() {
                    info!("Scheduler: no enabled jobs, sleeping 60s");
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    continue;
                }

                let mut job_times: Vec<(FleetJob, DateTime<Utc>)> = Vec::new();
                for job in &enabled {
                    match Self::next_fire_time(&job.cron_expression) {
                        Ok(next) => job_times.push((job.job, next)),
                        Err(e) => warn!(
                            job = job.job.as_str(),
                            error = %e,
                            "Scheduler: skipping job due to cron error"
                        ),
                    }
                }

                let Some(nearest) = job_times.iter().map(|(_, t)| *t).min() else {
                    warn!(
                        "Scheduler: all enabled jobs have invalid cron expressions, sleeping 60s"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    continue;
                };

                let now = Utc::now();
                if nearest > now {
                    let wait = (nearest - now).to_std().unwrap_or_default();
                    tracing::debug!("Scheduler: sleeping for {:?} until next job", wait);
                    tokio::time::sleep(wait).await;
                }

                let fire_threshold = Utc::now() + Duration::seconds(1);
                for (job, fire_time) in job_times {
                    if fire_time <= fire_threshold {
                        self.fire(job).await;
                    }
                }
            }
        })
    }
}
