use crate::core::repository::Repository;
use serde::{Deserialize, Serialize};

/// One unit of fetch work: a file path inside a repository.
///
/// Work items are never mutated after construction; scheduling decisions
/// (ordering, batching, dedupe) produce new collections instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub repo: Repository,
    pub path: String,
    /// Higher runs first. Ties keep input order.
    #[serde(default)]
    pub priority: i32,
    /// Expected content size in bytes, used for streaming decisions.
    #[serde(default)]
    pub estimated_size: u64,
}

impl WorkItem {
    pub fn new(repo: Repository, path: impl Into<String>) -> Self {
        Self {
            repo,
            path: path.into(),
            priority: 0,
            estimated_size: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimated_size(mut self, bytes: u64) -> Self {
        self.estimated_size = bytes;
        self
    }

    pub fn target_key(&self) -> &str {
        self.repo.key()
    }

    /// Identity used for duplicate detection: repository plus path.
    pub fn dedupe_key(&self) -> (String, String) {
        (self.repo.full_name.clone(), self.path.clone())
    }
}

/// Orders items by priority descending, keeping input order between equals.
pub fn prioritize(mut items: Vec<WorkItem>) -> Vec<WorkItem> {
    // `sort_by` is stable, which gives the input-order tie-break for free.
    items.sort_by(|a, b| b.priority.cmp(&a.priority));
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(path: &str, priority: i32) -> WorkItem {
        WorkItem::new(Repository::new("acme", "api"), path).with_priority(priority)
    }

    #[test]
    fn prioritize_orders_descending_then_input_order() {
        let items = vec![
            item("a", 0),
            item("b", 5),
            item("c", 0),
            item("d", 5),
            item("e", 1),
        ];

        let ordered: Vec<_> = prioritize(items)
            .into_iter()
            .map(|i| i.path)
            .collect();

        assert_eq!(ordered, vec!["b", "d", "e", "a", "c"]);
    }
}
