use model::{
    core::strategy::ExecutionStrategy, execution::opportunity::CrossTargetOpportunity,
    records::outcome::Outcome,
};
use serde::Serialize;
use std::{collections::BTreeMap, time::Duration};

/// Final outcomes of one run, grouped by target.
#[derive(Debug, Clone, Serialize)]
pub struct RunResults {
    pub run_id: String,
    pub strategy: ExecutionStrategy,
    /// Target key to the outcomes of that target's items.
    pub results: BTreeMap<String, Vec<Outcome>>,
    pub opportunities: Vec<CrossTargetOpportunity>,
    /// Set when the run stopped early; unadmitted items have no outcome.
    pub cancelled: bool,
    pub duration: Duration,
}

impl RunResults {
    pub fn new(run_id: impl Into<String>, strategy: ExecutionStrategy) -> Self {
        Self {
            run_id: run_id.into(),
            strategy,
            results: BTreeMap::new(),
            opportunities: Vec::new(),
            cancelled: false,
            duration: Duration::ZERO,
        }
    }

    pub fn insert(&mut self, outcome: Outcome) {
        self.results
            .entry(outcome.item.target_key().to_string())
            .or_default()
            .push(outcome);
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.results.values().flatten()
    }

    pub fn successful(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes().filter(|o| o.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes().filter(|o| !o.success)
    }

    pub fn get(&self, target: &str) -> Option<&[Outcome]> {
        self.results.get(target).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::repository::Repository;
    use model::records::{
        outcome::{FailureKind, FileContent},
        work_item::WorkItem,
    };

    #[test]
    fn groups_outcomes_by_target() {
        let repo = Repository::new("acme", "api");
        let mut results = RunResults::new("run", ExecutionStrategy::Parallel);
        results.insert(Outcome::succeeded(
            WorkItem::new(repo.clone(), "go.mod"),
            FileContent::new("module api", "h"),
            false,
            Duration::ZERO,
            1,
        ));
        results.insert(Outcome::failed(
            WorkItem::new(repo, "go.sum"),
            FailureKind::NotFound,
            "missing",
            Duration::ZERO,
            1,
        ));

        assert_eq!(results.get("acme/api").map(<[Outcome]>::len), Some(2));
        assert_eq!(results.successful().count(), 1);
        assert_eq!(results.failed().count(), 1);
        assert_eq!(results.len(), 2);
    }
}
