// Pre-flight quota checks. The budget belongs to the host; this module only
// compares it against the cost of the work about to be issued.
use crate::core::wire::OperationKind;
use crate::host::store::RecordStore;

/// True when `iterations` more units of `operation` fit in the remaining
/// budget. The cost table is keyed by the operation actually passed in.
pub fn can_afford(store: &dyn RecordStore, operation: OperationKind, iterations: u64) -> bool {
    operation.base_cost().saturating_mul(iterations) <= store.remaining_usage()
}

#[cfg(test)]
mod tests {
    use super::can_afford;
    use crate::core::wire::OperationKind;
    use crate::host::store::MemoryStore;

    #[test]
    fn affordability_is_keyed_by_the_passed_operation() {
        // 15 units: one search (10) fits, one upsert (20) does not. A guard
        // keyed by anything other than the argument would get these wrong.
        let store = MemoryStore::new().with_budget(15);
        assert!(can_afford(&store, OperationKind::Search, 1));
        assert!(!can_afford(&store, OperationKind::Upsert, 1));
    }

    #[test]
    fn iteration_count_multiplies_cost() {
        let store = MemoryStore::new().with_budget(100);
        assert!(can_afford(&store, OperationKind::Search, 10));
        assert!(!can_afford(&store, OperationKind::Search, 11));
        assert!(can_afford(&store, OperationKind::Delete, 5));
        assert!(!can_afford(&store, OperationKind::Delete, 6));
    }

    #[test]
    fn huge_iteration_counts_do_not_overflow() {
        let store = MemoryStore::new().with_budget(100);
        assert!(!can_afford(&store, OperationKind::Upsert, u64::MAX));
    }
}
