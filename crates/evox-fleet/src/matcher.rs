use evox_core::{AgentRole, EvoxResult, Task, TaskStatus};
use evox_store::EntityStore;
use std::sync::Arc;

/// Title tags that mark a task as belonging to a role.
pub fn role_tags(role: &AgentRole) -> &'static [&'static str] {
    match role {
        AgentRole::Backend => &["[backend]", "[api]"],
        AgentRole::Frontend => &["[ui]", "[frontend]"],
        AgentRole::Planner => &["[phase", "[planning]"],
        AgentRole::Qa => &["[qa]", "[test]"],
        AgentRole::Devops => &["[devops]", "[infra]"],
        AgentRole::Content => &["[content]", "[docs]"],
        AgentRole::Other(_) => &[],
    }
}

fn has_role_tag(task: &Task, role: &AgentRole) -> bool {
    let title = task.title.to_lowercase();
    role_tags(role).iter().any(|tag| title.contains(tag))
}

/// Highest-priority eligible task for the agent called `agent_name`.
///
/// Eligible means unassigned, queued, and either routed to this agent by
/// affinity or not routed at all. Ties keep candidate order.
pub fn select_for_agent(candidates: Vec<Task>, agent_name: &str) -> Option<Task> {
    let name = agent_name.to_lowercase();
    let mut eligible: Vec<Task> = candidates
        .into_iter()
        .filter(Task::is_open)
        .filter(|task| task.affinity().map_or(true, |affinity| affinity == name))
        .collect();
    eligible.sort_by_key(|task| task.priority.rank());
    eligible.into_iter().next()
}

/// Highest-priority task a new agent of `role` could pick up.
///
/// Used for recommendations only: tasks routed to a specific agent are still
/// offered when their title carries one of the role's tags, and on equal
/// priority tagged tasks come first.
pub fn select_for_role(candidates: Vec<Task>, role: &AgentRole) -> Option<Task> {
    let mut eligible: Vec<(bool, Task)> = candidates
        .into_iter()
        .filter(Task::is_open)
        .map(|task| (has_role_tag(&task, role), task))
        .filter(|(tagged, task)| *tagged || task.affinity().is_none())
        .collect();
    eligible.sort_by_key(|(tagged, task)| (task.priority.rank(), !*tagged));
    eligible.into_iter().next().map(|(_, task)| task)
}

/// Reads the queue and applies the selection policy.
#[derive(Clone)]
pub struct TaskMatcher {
    store: Arc<dyn EntityStore>,
}

impl TaskMatcher {
    /// Matcher over `store`.
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Backlog tasks first, then todo tasks, each in store order.
    async fn candidates(&self) -> EvoxResult<Vec<Task>> {
        let mut tasks = self.store.tasks_by_status(TaskStatus::Backlog).await?;
        tasks.extend(self.store.tasks_by_status(TaskStatus::Todo).await?);
        Ok(tasks)
    }

    /// Next task for `agent_name`, see [`select_for_agent`].
    pub async fn find_next_task(&self, agent_name: &str) -> EvoxResult<Option<Task>> {
        Ok(select_for_agent(self.candidates().await?, agent_name))
    }

    /// Next task for a new agent of `role`, see [`select_for_role`].
    pub async fn find_next_task_for_role(&self, role: &AgentRole) -> EvoxResult<Option<Task>> {
        Ok(select_for_role(self.candidates().await?, role))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use evox_core::TaskPriority;
    use uuid::Uuid;

    fn task(title: &str, priority: TaskPriority) -> Task {
        Task::new(title, priority)
    }

    #[test]
    fn test_priority_beats_scan_order() {
        let picked = select_for_agent(
            vec![
                task("low", TaskPriority::Low),
                task("urgent", TaskPriority::Urgent),
                task("medium", TaskPriority::Medium),
            ],
            "sam",
        )
        .unwrap();
        assert_eq!(picked.title, "urgent");
    }

    #[test]
    fn test_ties_keep_scan_order() {
        let picked = select_for_agent(
            vec![
                task("first", TaskPriority::High),
                task("second", TaskPriority::High),
            ],
            "sam",
        )
        .unwrap();
        assert_eq!(picked.title, "first");
    }

    #[test]
    fn test_affinity_routes_and_excludes() {
        let mine = task("mine", TaskPriority::Low).with_affinity("Sam");
        let theirs = task("theirs", TaskPriority::Urgent).with_affinity("leo");
        let picked = select_for_agent(vec![theirs.clone(), mine], "SAM").unwrap();
        assert_eq!(picked.title, "mine");
        assert!(select_for_agent(vec![theirs], "sam").is_none());
    }

    #[test]
    fn test_assigned_and_done_tasks_are_skipped() {
        let mut assigned = task("assigned", TaskPriority::Urgent);
        assigned.assignee = Some(Uuid::new_v4());
        let done = task("done", TaskPriority::Urgent).with_status(TaskStatus::Done);
        let open = task("open", TaskPriority::Low);
        let picked = select_for_agent(vec![assigned, done, open], "sam").unwrap();
        assert_eq!(picked.title, "open");
    }

    #[test]
    fn test_role_query_prefers_tagged_on_ties() {
        let plain = task("Refactor", TaskPriority::High);
        let tagged = task("[API] Rate limits", TaskPriority::High).with_affinity("sam");
        let picked = select_for_role(vec![plain, tagged], &AgentRole::Backend).unwrap();
        assert_eq!(picked.title, "[API] Rate limits");
    }

    #[test]
    fn test_role_query_priority_still_wins() {
        let tagged = task("[backend] cleanup", TaskPriority::Low);
        let urgent = task("hotfix", TaskPriority::Urgent);
        let picked = select_for_role(vec![tagged, urgent], &AgentRole::Backend).unwrap();
        assert_eq!(picked.title, "hotfix");
    }

    #[test]
    fn test_role_query_skips_foreign_untagged_affinity() {
        let foreign = task("polish", TaskPriority::Urgent).with_affinity("leo");
        assert!(select_for_role(vec![foreign], &AgentRole::Backend).is_none());
    }
}
