//! Registry key for per-session counters.

/// Identifies one sliding-window counter: a session within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The scope whose restriction applies
    pub scope: String,
    /// The session tracked independently within the scope
    pub session: String,
}

impl CounterKey {
    pub fn new(scope: &str, session: &str) -> Self {
        Self {
            scope: scope.to_string(),
            session: session.to_string(),
        }
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.session)
    }
}
