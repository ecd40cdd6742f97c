use evox_core::{AgentRole, Dispatch};

/// Attributes a pending dispatch to the role whose backlog it counts toward.
pub trait DispatchClassifier: Send + Sync {
    /// Role whose backlog `dispatch` counts toward.
    fn classify(&self, dispatch: &Dispatch) -> AgentRole;
}

impl<F> DispatchClassifier for F
where
    F: Fn(&Dispatch) -> AgentRole + Send + Sync,
{
    fn classify(&self, dispatch: &Dispatch) -> AgentRole {
        self(dispatch)
    }
}

/// Substring match of keywords over the dispatch command and payload.
///
/// Rules are tried in order; the first keyword found wins. Dispatches that
/// match nothing land in the fallback bucket (`general` by default).
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<(String, AgentRole)>,
    fallback: AgentRole,
}

impl KeywordClassifier {
    /// No rules: everything goes to the fallback bucket.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            fallback: AgentRole::general(),
        }
    }

    /// Route dispatches mentioning `keyword` to `role`. Rules match in insertion order.
    pub fn with_rule(mut self, keyword: impl Into<String>, role: AgentRole) -> Self {
        self.rules.push((keyword.into().to_lowercase(), role));
        self
    }

    /// Role for dispatches no rule matches.
    pub fn with_fallback(mut self, fallback: AgentRole) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::empty()
            .with_rule("backend", AgentRole::Backend)
            .with_rule("frontend", AgentRole::Frontend)
    }
}

impl DispatchClassifier for KeywordClassifier {
    fn classify(&self, dispatch: &Dispatch) -> AgentRole {
        let haystack = format!("{} {}", dispatch.command, dispatch.payload).to_lowercase();
        self.rules
            .iter()
            .find(|(keyword, _)| haystack.contains(keyword.as_str()))
            .map_or_else(|| self.fallback.clone(), |(_, role)| role.clone())
    }
}
