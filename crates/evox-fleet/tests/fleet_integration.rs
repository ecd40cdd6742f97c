#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Duration, NaiveDate, Utc};
use evox_core::{
    ActivityCategory, ActivityEvent, ActivityKind, Agent, AgentMapping, AgentRole, AgentStatus,
    Dispatch, DispatchStatus, ErrorKind, EvoxError, Task, TaskPriority, TaskStatus,
};
use evox_fleet::standup::day_bounds;
use evox_fleet::{
    AutoscaleConfig, Autoscaler, DispatchEngine, DispatchOutcome, DispatchRejection, FleetCycle,
    RoleTemplates, StandupAggregator, TaskBoard, TaskMatcher,
};
use evox_store::{EntityStore, FileStore, MemoryStore, Snapshot, WriteBatch};
use std::sync::Arc;

fn idle(name: &str, role: AgentRole) -> Agent {
    Agent::new(name, role).with_status(AgentStatus::Idle)
}

#[tokio::test]
async fn test_dispatch_picks_urgent_task_and_commits_everything() {
    let sam = idle("SAM", AgentRole::Backend);
    let t1 = Task::new("Cleanup logs", TaskPriority::Low);
    let t2 = Task::new("Fix prod outage", TaskPriority::Urgent)
        .with_status(TaskStatus::Todo)
        .with_external_id("AGT-2");
    let t3 = Task::new("Schema migration", TaskPriority::High).with_affinity("sam");
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_agent(sam.clone())
            .with_task(t1.clone())
            .with_task(t2.clone())
            .with_task(t3.clone()),
    ));

    let outcome = DispatchEngine::new(store.clone()).dispatch("SAM").await.unwrap();
    let assignment = outcome.assignment().unwrap();
    assert_eq!(assignment.task_id, t2.id);
    assert_eq!(assignment.priority, TaskPriority::Urgent);

    let claimed = store.task(t2.id).await.unwrap().unwrap();
    assert_eq!(claimed.status, TaskStatus::InProgress);
    assert_eq!(claimed.assignee, Some(sam.id));
    assert_eq!(store.task(t1.id).await.unwrap().unwrap().status, TaskStatus::Backlog);

    let dispatches = store
        .dispatches_for_agent(sam.id, DispatchStatus::Pending)
        .await
        .unwrap();
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].task_payload().unwrap().task_id, t2.id);

    let agent = store.agent(sam.id).await.unwrap().unwrap();
    assert_eq!(agent.status, AgentStatus::Busy);
    assert_eq!(agent.current_task, Some(t2.id));
    assert_eq!(agent.status_reason.as_deref(), Some("Working on AGT-2"));

    let activity = store.snapshot().await.activity;
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].title, "SAM auto-assigned AGT-2");
    assert_eq!(activity[0].event_type(), "auto_dispatched");
}

#[tokio::test]
async fn test_busy_agent_is_invalid_state_not_conflict() {
    let sam = Agent::new("SAM", AgentRole::Backend).with_status(AgentStatus::Busy);
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_agent(sam)
            .with_task(Task::new("Anything", TaskPriority::High)),
    ));

    let outcome = DispatchEngine::new(store).dispatch("SAM").await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Rejected(DispatchRejection::AgentNotIdle {
            status: AgentStatus::Busy
        })
    );
    let result = outcome.to_result();
    assert_eq!(result.error_kind, Some(ErrorKind::InvalidState));
    assert_eq!(result.error_code, Some("agent_not_idle"));
}

#[tokio::test]
async fn test_running_dispatch_blocks_idle_agent() {
    let sam = idle("SAM", AgentRole::Backend);
    let running = Dispatch::new(sam.id, "deploy", "{}").with_status(DispatchStatus::Running);
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_agent(sam)
            .with_dispatch(running)
            .with_task(Task::new("Anything", TaskPriority::High)),
    ));

    let outcome = DispatchEngine::new(store).dispatch("sam").await.unwrap();
    assert_eq!(
        outcome.rejection(),
        Some(DispatchRejection::HasRunningDispatch)
    );
    assert_eq!(outcome.to_result().error_kind, Some(ErrorKind::Conflict));
}

#[tokio::test]
async fn test_concurrent_dispatches_for_one_agent_assign_once() {
    let sam = idle("SAM", AgentRole::Backend);
    let snapshot = (0..4).fold(Snapshot::default().with_agent(sam.clone()), |s, i| {
        s.with_task(Task::new(format!("Task {i}"), TaskPriority::Medium))
    });
    let store = Arc::new(MemoryStore::from_snapshot(snapshot));
    let engine = DispatchEngine::new(store.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.dispatch("SAM").await })
        })
        .collect();
    let outcomes: Vec<DispatchOutcome> = futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_assigned()).count(), 1);
    assert_eq!(store.snapshot().await.dispatches.len(), 1);
    assert_eq!(store.tasks_by_assignee(sam.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_priority_beats_store_order() {
    let low = Task::new("low", TaskPriority::Low);
    let urgent = Task::new("urgent", TaskPriority::Urgent).with_status(TaskStatus::Todo);
    let medium = Task::new("medium", TaskPriority::Medium);
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_task(low)
            .with_task(urgent.clone())
            .with_task(medium),
    ));

    let next = TaskMatcher::new(store).find_next_task("anyone").await.unwrap().unwrap();
    assert_eq!(next.id, urgent.id);
}

#[tokio::test]
async fn test_second_cycle_dispatches_nothing() {
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_agent(idle("SAM", AgentRole::Backend))
            .with_agent(idle("LEO", AgentRole::Frontend))
            .with_agent(Agent::new("QUINN", AgentRole::Qa))
            .with_task(Task::new("a", TaskPriority::High))
            .with_task(Task::new("b", TaskPriority::Low))
            .with_task(Task::new("c", TaskPriority::Low)),
    ));
    let cycle = FleetCycle::new(store.clone(), DispatchEngine::new(store.clone()));

    let first = cycle.run_cycle().await.unwrap();
    assert_eq!(first.len(), 2, "offline QUINN is skipped");
    assert!(first.iter().all(|o| o.success));

    let second = cycle.run_cycle().await.unwrap();
    assert!(second.iter().all(|o| !o.success));
    assert!(second
        .iter()
        .all(|o| o.reason.as_deref() == Some("agent_not_idle")));
    assert_eq!(store.snapshot().await.dispatches.len(), 2);
}

#[tokio::test]
async fn test_cycle_lease_excludes_second_holder() {
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default().with_agent(idle("SAM", AgentRole::Backend)),
    ));
    store
        .acquire_lease("fleet_cycle", "host-a", Utc::now(), Duration::minutes(5))
        .await
        .unwrap();
    let cycle = FleetCycle::new(store.clone(), DispatchEngine::new(store.clone()));

    assert!(cycle.run_cycle_exclusive("host-b").await.unwrap().is_none());
    store.release_lease("fleet_cycle", "host-a").await.unwrap();
    assert!(cycle.run_cycle_exclusive("host-b").await.unwrap().is_some());
}

#[tokio::test]
async fn test_spawn_names_follow_template_prefix() {
    let store = Arc::new(MemoryStore::new());
    let autoscaler = Autoscaler::new(store.clone(), RoleTemplates::builtin());

    let first = autoscaler
        .auto_spawn(&AgentRole::Backend, "high backlog")
        .await
        .unwrap();
    let second = autoscaler
        .auto_spawn(&AgentRole::Backend, "high backlog")
        .await
        .unwrap();
    assert_eq!(first.name, "SAM");
    assert_eq!(second.name, "SAM-2");

    let spawned = store.agent_by_name("SAM-2").await.unwrap().unwrap();
    assert_eq!(spawned.status, AgentStatus::Idle);
    assert_eq!(spawned.spawn_reason.as_deref(), Some("high backlog"));
}

#[tokio::test]
async fn test_autoscale_respects_role_cap() {
    let max = idle("MAX", AgentRole::Planner);
    let snapshot = (0..3).fold(Snapshot::default().with_agent(max.clone()), |s, i| {
        s.with_dispatch(Dispatch::new(max.id, "build", format!("api endpoint {i}")))
    });
    let store = Arc::new(MemoryStore::from_snapshot(snapshot));
    let autoscaler = Autoscaler::new(store.clone(), RoleTemplates::builtin())
        .with_config(AutoscaleConfig {
            backlog_threshold: 0,
            max_agents_per_role: 2,
            ..AutoscaleConfig::default()
        })
        .with_classifier(|_: &Dispatch| AgentRole::Backend);

    let mut spawned = 0;
    let mut skipped = Vec::new();
    for _ in 0..3 {
        let summary = autoscaler.check_and_auto_spawn().await.unwrap();
        assert_eq!(summary.recommendations_count, 1);
        spawned += summary.spawned_count;
        skipped.extend(summary.skipped);
    }

    assert_eq!(spawned, 2);
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].error.starts_with("Capacity exceeded"));
    assert_eq!(
        store.agents_by_role(&AgentRole::Backend).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_unknown_role_spawn_is_skipped_not_fatal() {
    let max = idle("MAX", AgentRole::Planner);
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_agent(max.clone())
            .with_dispatch(Dispatch::new(max.id, "think", "about things")),
    ));
    let summary = Autoscaler::new(store, RoleTemplates::builtin())
        .with_config(AutoscaleConfig {
            backlog_threshold: 0,
            ..AutoscaleConfig::default()
        })
        .check_and_auto_spawn()
        .await
        .unwrap();
    assert_eq!(summary.spawned_count, 0);
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].error.starts_with("Unknown role"));
}

fn completion(agent: &Agent, task: &Task, at: DateTime<Utc>) -> ActivityEvent {
    ActivityEvent::new(
        agent.id,
        &agent.name,
        ActivityCategory::Task,
        "done",
        ActivityKind::TaskStatusChanged {
            from: TaskStatus::InProgress,
            to: TaskStatus::Done,
        },
    )
    .with_task(task)
    .at(at)
}

#[tokio::test]
async fn test_completed_bucket_follows_the_window() {
    let (day_start, day_end) = day_bounds(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), &Utc);
    let done_at = day_start + Duration::hours(10);
    let sam = Agent::new("SAM", AgentRole::Backend);
    let task = Task::new("Ship it", TaskPriority::High)
        .with_status(TaskStatus::Done)
        .with_affinity("sam")
        .with_updated_at(done_at);
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_agent(sam.clone())
            .with_mapping(AgentMapping::new("sam", sam.id))
            .with_task(task.clone())
            .with_activity(completion(&sam, &task, done_at)),
    ));
    let standup = StandupAggregator::new(store);

    let containing = [
        (day_start, day_end),
        (done_at, done_at),
        (done_at - Duration::minutes(1), done_at + Duration::minutes(1)),
    ];
    for (start, end) in containing {
        let report = standup.report_range(start, end).await.unwrap();
        assert_eq!(report.summary.tasks_completed, 1, "{start}..{end}");
        assert_eq!(report.agents[0].completed[0].id, task.id);
    }

    let excluding = [
        (day_start, done_at - Duration::milliseconds(1)),
        (done_at + Duration::milliseconds(1), day_end),
    ];
    for (start, end) in excluding {
        let report = standup.report_range(start, end).await.unwrap();
        assert_eq!(report.summary.tasks_completed, 0, "{start}..{end}");
        assert!(report.agents[0].completed.is_empty());
    }
}

#[tokio::test]
async fn test_updated_task_without_activity_is_in_progress() {
    let (day_start, day_end) = day_bounds(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), &Utc);
    let sam = Agent::new("SAM", AgentRole::Backend);
    let mut task = Task::new("Quiet work", TaskPriority::Medium)
        .with_status(TaskStatus::InProgress)
        .with_updated_at(day_start + Duration::milliseconds(1));
    task.assignee = Some(sam.id);
    let store = Arc::new(MemoryStore::from_snapshot(
        Snapshot::default()
            .with_agent(sam.clone())
            .with_mapping(AgentMapping::new("sam", sam.id))
            .with_task(task.clone()),
    ));

    let report = StandupAggregator::new(store)
        .report(Some(day_start), Some(day_end))
        .await
        .unwrap();
    assert_eq!(report.summary.total_activities, 0);
    assert_eq!(report.summary.tasks_in_progress, 1);
    assert_eq!(report.agents[0].in_progress[0].id, task.id);
}

#[tokio::test]
async fn test_orphan_write_is_fatal_and_atomic() {
    let store = Arc::new(MemoryStore::new());
    let ghost = Agent::new("GHOST", AgentRole::Qa);
    let task = Task::new("Never lands", TaskPriority::Low);
    let err = store
        .commit(
            WriteBatch::new()
                .insert_task(task)
                .insert_dispatch(Dispatch::new(ghost.id, "noop", "")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EvoxError::Integrity(_)));
    assert!(err.is_fatal());
    assert!(store.tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.json");
    let task_id;
    {
        let store: Arc<dyn EntityStore> = Arc::new(FileStore::open(&path).await.unwrap());
        let board = TaskBoard::new(store.clone());
        board
            .add_agent("SAM", AgentRole::Backend, AgentStatus::Idle)
            .await
            .unwrap();
        board.map_canonical("sam", "SAM").await.unwrap();
        let task = board
            .create_task(Task::new("[api] Login", TaskPriority::High), Some("SAM"))
            .await
            .unwrap();
        task_id = task.id;

        let outcome = DispatchEngine::new(store.clone()).dispatch("SAM").await.unwrap();
        assert_eq!(outcome.assignment().unwrap().task_id, task_id);
        board.move_task(task_id, TaskStatus::Done, None).await.unwrap();
    }

    let reopened: Arc<dyn EntityStore> = Arc::new(FileStore::open(&path).await.unwrap());
    let task = reopened.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Done);

    let report = StandupAggregator::new(reopened).report(None, None).await.unwrap();
    assert_eq!(report.summary.tasks_completed, 1);
    assert_eq!(report.agents.len(), 1);
    assert_eq!(report.agents[0].completed[0].id, task_id);
    assert_eq!(report.agents[0].activity_count, 3);
}
