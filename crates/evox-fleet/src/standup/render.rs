use super::{AgentStandup, StandupReport, TaskRef};
use std::fmt::Write;

const QUEUE_PREVIEW: usize = 5;

fn task_line(task: &TaskRef) -> String {
    match &task.external_id {
        Some(id) => format!("- [{id}] {}", task.title),
        None => format!("- {}", task.title),
    }
}

fn section(out: &mut String, heading: &str, tasks: &[TaskRef]) {
    let _ = writeln!(out, "## {heading} ({})", tasks.len());
    if tasks.is_empty() {
        out.push_str("- (none)\n");
    }
    for task in tasks {
        let _ = writeln!(out, "{}", task_line(task));
    }
    out.push('\n');
}

/// Markdown standup note for one agent.
pub fn render_agent_standup(report: &AgentStandup, date: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# {} Daily Standup - {date}\n",
        report.agent.name.to_uppercase()
    );

    section(&mut out, "Completed", &report.completed);
    section(&mut out, "In Progress", &report.in_progress);
    if !report.blocked.is_empty() {
        section(&mut out, "Blocked", &report.blocked);
    }

    let _ = writeln!(out, "## Queue ({})", report.backlog.len());
    if report.backlog.is_empty() {
        out.push_str("- (none)\n");
    }
    for task in report.backlog.iter().take(QUEUE_PREVIEW) {
        let _ = writeln!(out, "{}", task_line(task));
    }
    if report.backlog.len() > QUEUE_PREVIEW {
        let _ = writeln!(out, "- ... and {} more", report.backlog.len() - QUEUE_PREVIEW);
    }
    out
}

fn agent_state(report: &AgentStandup) -> &'static str {
    if !report.blocked.is_empty() {
        "BLOCKED"
    } else if !report.in_progress.is_empty() {
        "Working"
    } else if !report.completed.is_empty() {
        "Done"
    } else {
        "Idle"
    }
}

/// Fleet-wide markdown summary with per-agent breakdown and blockers.
pub fn render_fleet_summary(report: &StandupReport, date: &str) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    let _ = writeln!(out, "# EVOX Daily Standup - {date}\n");
    out.push_str("## Summary\n");
    let _ = writeln!(out, "- **Completed:** {} tasks", summary.tasks_completed);
    let _ = writeln!(out, "- **In Progress:** {} tasks", summary.tasks_in_progress);
    let _ = writeln!(out, "- **Backlog:** {} tasks", summary.tasks_backlog);
    let _ = writeln!(out, "- **Blocked:** {} tasks", summary.tasks_blocked);
    let _ = writeln!(
        out,
        "- **Active Agents:** {}/{}",
        summary.agents_active,
        report.agents.len()
    );
    let _ = writeln!(out, "- **Messages:** {}\n", summary.messages_sent);

    out.push_str("## Per-Agent Breakdown\n");
    for agent in &report.agents {
        let _ = writeln!(
            out,
            "- **{}**: {} done, {} in progress ({})",
            agent.agent.name.to_uppercase(),
            agent.completed.len(),
            agent.in_progress.len(),
            agent_state(agent)
        );
    }
    out.push('\n');

    let blockers: Vec<(&str, &TaskRef)> = report
        .agents
        .iter()
        .flat_map(|a| a.blocked.iter().map(move |t| (a.agent.name.as_str(), t)))
        .collect();
    if !blockers.is_empty() {
        out.push_str("## Blockers Requiring Attention\n");
        for (agent, task) in blockers {
            let _ = match &task.external_id {
                Some(id) => writeln!(out, "- [{}] {id}: {}", agent.to_uppercase(), task.title),
                None => writeln!(out, "- [{}] {}", agent.to_uppercase(), task.title),
            };
        }
        out.push('\n');
    }

    out.push_str("---\n_Auto-generated by EVOX Standup System_\n");
    out
}
