use std::time::Duration;

pub const DEFAULT_MAX_TREE_DEPTH: usize = 64;
pub const DEFAULT_MAX_TREE_NODES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Deepest component nesting materialised into a tree.
    pub max_tree_depth: usize,
    /// Total nodes materialised per tree; shared subtrees count once per
    /// reference.
    pub max_tree_nodes: usize,
    /// How long a dispatched event waits for its reply. `None` waits forever.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            max_tree_nodes: DEFAULT_MAX_TREE_NODES,
            dispatch_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Reads `A2UI_MAX_TREE_DEPTH`, `A2UI_MAX_TREE_NODES` and
    /// `A2UI_DISPATCH_TIMEOUT_MS`. Missing, unparsable or zero values keep
    /// the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            max_tree_depth: parse_positive(lookup("A2UI_MAX_TREE_DEPTH"))
                .unwrap_or(defaults.max_tree_depth),
            max_tree_nodes: parse_positive(lookup("A2UI_MAX_TREE_NODES"))
                .unwrap_or(defaults.max_tree_nodes),
            dispatch_timeout: parse_positive(lookup("A2UI_DISPATCH_TIMEOUT_MS"))
                .map(|millis| Duration::from_millis(millis as u64))
                .or(defaults.dispatch_timeout),
        }
    }
}

fn parse_positive(raw: Option<String>) -> Option<usize> {
    raw.and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}
