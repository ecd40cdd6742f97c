use evox_core::AgentRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to synthesize a new agent of one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTemplate {
    /// Role this template spawns.
    pub role: AgentRole,
    /// Upper-case display-name stem, e.g. `SAM` for `SAM`, `SAM-2`, ...
    pub name_prefix: String,
    /// Prompt before team learnings are appended.
    pub base_prompt: String,
    /// Skill tags given to spawned agents.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Territory patterns given to spawned agents.
    #[serde(default)]
    pub territory: Vec<String>,
    /// Capability tags given to spawned agents.
    #[serde(default)]
    pub genius_dna: Vec<String>,
}

impl RoleTemplate {
    /// Template with no tags; `name_prefix` is upper-cased.
    pub fn new(
        role: AgentRole,
        name_prefix: impl Into<String>,
        base_prompt: impl Into<String>,
    ) -> Self {
        Self {
            role,
            name_prefix: name_prefix.into().to_uppercase(),
            base_prompt: base_prompt.into(),
            skills: Vec::new(),
            territory: Vec::new(),
            genius_dna: Vec::new(),
        }
    }

    /// Set the skill tags.
    pub fn with_skills(mut self, skills: &[&str]) -> Self {
        self.skills = skills.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Set the territory patterns.
    pub fn with_territory(mut self, territory: &[&str]) -> Self {
        self.territory = territory.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Set the capability tags.
    pub fn with_genius_dna(mut self, dna: &[&str]) -> Self {
        self.genius_dna = dna.iter().map(|s| (*s).to_string()).collect();
        self
    }
}

/// Immutable role → template table handed to the autoscaler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTemplates {
    templates: BTreeMap<AgentRole, RoleTemplate>,
}

impl RoleTemplates {
    /// A table with no templates. Every spawn fails with `UnknownRole`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The six built-in roles.
    pub fn builtin() -> Self {
        Self::empty()
            .with_template(
                RoleTemplate::new(
                    AgentRole::Planner,
                    "MAX",
                    "You are a PM. Plan, dispatch, coordinate, track progress.\n\
                     You do NOT write code. You manage the team.",
                )
                .with_skills(&["planning", "linear", "coordination", "estimation"])
                .with_territory(&["docs/", "DISPATCH.md"])
                .with_genius_dna(&["musk", "von_neumann"]),
            )
            .with_template(
                RoleTemplate::new(
                    AgentRole::Backend,
                    "SAM",
                    "You are a backend engineer. Build the database layer.\n\
                     Territory: convex/, scripts/, lib/evox/\n\
                     DO NOT touch: app/, components/",
                )
                .with_skills(&["convex", "typescript", "api", "schema", "database"])
                .with_territory(&["convex/", "scripts/", "lib/evox/"])
                .with_genius_dna(&["von_neumann", "shannon"]),
            )
            .with_template(
                RoleTemplate::new(
                    AgentRole::Frontend,
                    "LEO",
                    "You are a frontend engineer. Build the UI components.\n\
                     Territory: app/, components/\n\
                     DO NOT touch: convex/, scripts/",
                )
                .with_skills(&["nextjs", "react", "tailwind", "typescript", "ui"])
                .with_territory(&["app/", "components/"])
                .with_genius_dna(&["feynman", "musk"]),
            )
            .with_template(
                RoleTemplate::new(
                    AgentRole::Qa,
                    "QUINN",
                    "You are a QA engineer. Test code, find bugs, ensure quality.\n\
                     Territory: *.test.ts, e2e/, code review\n\
                     You CAN read all files to understand context.",
                )
                .with_skills(&["testing", "playwright", "code-review", "bug-hunting"])
                .with_territory(&["**/*.test.ts", "e2e/"])
                .with_genius_dna(&["von_neumann", "feynman"]),
            )
            .with_template(
                RoleTemplate::new(
                    AgentRole::Devops,
                    "ALEX",
                    "You are a DevOps engineer. CI/CD, deployment, infrastructure.\n\
                     Territory: .github/, vercel.json, deployment configs",
                )
                .with_skills(&["ci-cd", "docker", "vercel", "github-actions"])
                .with_territory(&[".github/", "vercel.json"])
                .with_genius_dna(&["shannon", "musk"]),
            )
            .with_template(
                RoleTemplate::new(
                    AgentRole::Content,
                    "ELLA",
                    "You are a content creator. Write posts, documentation, communications.\n\
                     Territory: docs/, content/, social media",
                )
                .with_skills(&["writing", "social-media", "storytelling", "documentation"])
                .with_territory(&["docs/", "content/"])
                .with_genius_dna(&["feynman", "shannon"]),
            )
    }

    /// Add or replace the template for `template.role`.
    pub fn with_template(mut self, template: RoleTemplate) -> Self {
        self.templates.insert(template.role.clone(), template);
        self
    }

    /// Template for `role`.
    pub fn get(&self, role: &AgentRole) -> Option<&RoleTemplate> {
        self.templates.get(role)
    }

    /// Templates ordered by role.
    pub fn iter(&self) -> impl Iterator<Item = &RoleTemplate> {
        self.templates.values()
    }

    /// Number of roles covered.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// No templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl FromIterator<RoleTemplate> for RoleTemplates {
    fn from_iter<I: IntoIterator<Item = RoleTemplate>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |table, template| table.with_template(template))
    }
}
