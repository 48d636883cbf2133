use crate::records::work_item::WorkItem;

/// An ordered group of work items admitted for concurrent processing together.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    /// Position in the run's admission order, starting at zero.
    pub sequence: usize,
    pub items: Vec<WorkItem>,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl Batch {
    pub fn new(run_id: &str, sequence: usize, items: Vec<WorkItem>) -> Self {
        Self {
            id: format!("{run_id}-batch-{sequence}"),
            sequence,
            items,
            ts: chrono::Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.estimated_size).sum()
    }
}

/// Splits `items` into consecutive batches of at most `size` items.
///
/// Used for previews and fixed-size strategies; adaptive runs cut batches
/// one at a time as the size recommendation changes.
pub fn partition(run_id: &str, items: Vec<WorkItem>, size: usize) -> Vec<Batch> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    let mut sequence = 0;

    while iter.peek().is_some() {
        let chunk: Vec<WorkItem> = iter.by_ref().take(size).collect();
        batches.push(Batch::new(run_id, sequence, chunk));
        sequence += 1;
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::repository::Repository;

    #[test]
    fn partition_preserves_order_and_remainder() {
        let repo = Repository::new("acme", "api");
        let items: Vec<_> = (0..7)
            .map(|i| WorkItem::new(repo.clone(), format!("f{i}")).with_estimated_size(10))
            .collect();

        let batches = partition("run", items, 3);

        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(Batch::len).collect::<Vec<_>>(),
            vec![3, 3, 1]
        );
        assert_eq!(batches[1].items[0].path, "f3");
        assert_eq!(batches[2].id, "run-batch-2");
        assert_eq!(batches[0].size_bytes(), 30);
    }

    #[test]
    fn partition_of_nothing_is_empty() {
        assert!(partition("run", Vec::new(), 4).is_empty());
    }
}
