//! Purpose: Batched create/update/delete with per-record error isolation.
//! Exports: `upsert`, `delete`.
//! Role: The write half of the host executor; one governance check and one
//!       structured outcome per input item.
//! Invariants: Outcome lists pair 1:1, in input order, with their inputs.
//! Invariants: One item's failure never aborts its siblings.
//! Invariants: A failed quota check stops store work before the next unit
//!             starts; items already committed stay committed.

use crate::core::aggregate::OutcomeLog;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{
    DeleteOutcome, RecordId, WriteFailure, WriteOptions, WriteOutcome, WriteRequest,
};
use crate::core::wire::OperationKind;
use crate::host::governance;
use crate::host::store::RecordStore;

/// Apply each request in order: load-then-mutate when an id is present,
/// create otherwise. Failures are captured per item and processing
/// continues; the returned list always matches the input length and order.
pub fn upsert(
    store: &mut dyn RecordStore,
    record_type: &str,
    requests: Vec<WriteRequest>,
    options: WriteOptions,
) -> Vec<(WriteOutcome, WriteRequest)> {
    let mut log = OutcomeLog::new();
    let mut quota_stopped = false;

    for request in requests {
        if quota_stopped || !governance::can_afford(store, OperationKind::Upsert, 1) {
            quota_stopped = true;
            log.record(quota_outcome(OperationKind::Upsert), request);
            continue;
        }
        let outcome = match apply_one(store, record_type, &request, options) {
            Ok(id) => WriteOutcome::Committed { id },
            Err(err) => {
                tracing::debug!(record_type, error = %err, "write item failed");
                WriteOutcome::Failed(WriteFailure::from_error(&err))
            }
        };
        log.record(outcome, request);
    }

    log.into_entries()
}

fn apply_one(
    store: &mut dyn RecordStore,
    record_type: &str,
    request: &WriteRequest,
    options: WriteOptions,
) -> Result<RecordId, Error> {
    let mut record = match request.id()? {
        Some(id) => store.load_record(record_type, id)?,
        None if options.update_only => {
            return Err(Error::new(ErrorKind::Validation)
                .with_message("update_only is set; refusing to create a new record")
                .with_record_type(record_type));
        }
        None => store.create_record(record_type)?,
    };

    for (field, value) in request.scalars() {
        record.fields.insert(field.to_string(), value.clone());
    }
    for (sublist, rows) in request.sublists()? {
        record.sublists.entry(sublist).or_default().extend(rows);
    }

    store.submit_record(record, options.do_sourcing, options.ignore_mandatory)
}

/// Delete each id in order with the same isolation policy as `upsert`:
/// one outcome per id, failures captured, siblings unaffected.
pub fn delete(
    store: &mut dyn RecordStore,
    record_type: &str,
    ids: &[RecordId],
) -> Vec<DeleteOutcome> {
    let mut outcomes = Vec::with_capacity(ids.len());
    let mut quota_stopped = false;

    for &id in ids {
        if quota_stopped || !governance::can_afford(store, OperationKind::Delete, 1) {
            quota_stopped = true;
            outcomes.push(DeleteOutcome {
                id,
                error: Some(quota_failure(OperationKind::Delete)),
            });
            continue;
        }
        let error = store
            .delete_record(record_type, id)
            .err()
            .map(|err| WriteFailure::from_error(&err));
        outcomes.push(DeleteOutcome { id, error });
    }

    outcomes
}

fn quota_failure(operation: OperationKind) -> WriteFailure {
    WriteFailure::from_error(
        &Error::new(ErrorKind::Quota).with_message(format!(
            "quota exhausted before this {} item; resubmit the remainder",
            operation.name()
        )),
    )
}

fn quota_outcome(operation: OperationKind) -> WriteOutcome {
    WriteOutcome::Failed(quota_failure(operation))
}

#[cfg(test)]
mod tests {
    use super::{delete, upsert};
    use crate::core::error::ErrorKind;
    use crate::core::record::{WriteOptions, WriteRequest};
    use crate::host::store::{MemoryStore, RecordStore};
    use serde_json::json;

    fn requests(names: &[&str]) -> Vec<WriteRequest> {
        names
            .iter()
            .map(|name| WriteRequest::new().with_field("name", *name))
            .collect()
    }

    #[test]
    fn creates_assign_ascending_ids_in_order() {
        let mut store = MemoryStore::new();
        let results = upsert(
            &mut store,
            "customer",
            requests(&["A", "B", "C"]),
            WriteOptions::default(),
        );
        assert_eq!(results.len(), 3);
        let ids: Vec<u64> = results
            .iter()
            .map(|(outcome, _)| match outcome {
                crate::core::record::WriteOutcome::Committed { id } => *id,
                other => panic!("unexpected outcome: {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn update_mutates_existing_record() {
        let mut store = MemoryStore::new();
        let id = store.seed("customer", [("name".to_string(), json!("old"))].into());
        let results = upsert(
            &mut store,
            "customer",
            vec![WriteRequest::new().with_id(id).with_field("name", "new")],
            WriteOptions::default(),
        );
        assert!(results[0].0.is_committed());
        let record = store.record("customer", id).expect("record");
        assert_eq!(record.fields.get("name"), Some(&json!("new")));
    }

    #[test]
    fn one_failure_never_aborts_the_batch() {
        let mut store = MemoryStore::new();
        store.require_fields("customer", &["name"]);
        let batch = vec![
            WriteRequest::new().with_field("name", "A"),
            WriteRequest::new().with_field("nickname", "no name here"),
            WriteRequest::new().with_field("name", "C"),
        ];
        let results = upsert(&mut store, "customer", batch, WriteOptions::default());
        assert_eq!(results.len(), 3);
        assert!(results[0].0.is_committed());
        let failure = results[1].0.failure().expect("failure");
        assert_eq!(failure.error_kind(), ErrorKind::Validation);
        assert!(results[2].0.is_committed());
        assert_eq!(store.count("customer"), 2);
    }

    #[test]
    fn update_only_refuses_creation() {
        let mut store = MemoryStore::new();
        let id = store.seed("customer", [("name".to_string(), json!("A"))].into());
        let options = WriteOptions {
            update_only: true,
            ..WriteOptions::default()
        };
        let batch = vec![
            WriteRequest::new().with_id(id).with_field("name", "A2"),
            WriteRequest::new().with_field("name", "B"),
        ];
        let results = upsert(&mut store, "customer", batch, options);
        assert!(results[0].0.is_committed());
        let failure = results[1].0.failure().expect("failure");
        assert_eq!(failure.error_kind(), ErrorKind::Validation);
        assert_eq!(store.count("customer"), 1);
    }

    #[test]
    fn update_only_with_unknown_id_fails_that_item() {
        let mut store = MemoryStore::new();
        let id = store.seed("customer", [("name".to_string(), json!("A"))].into());
        let options = WriteOptions {
            update_only: true,
            ..WriteOptions::default()
        };
        let batch = vec![
            WriteRequest::new().with_id(id).with_field("name", "A2"),
            WriteRequest::new().with_id(999_999).with_field("name", "B"),
        ];
        let results = upsert(&mut store, "customer", batch, options);
        assert!(results[0].0.is_committed());
        let failure = results[1].0.failure().expect("failure");
        assert_eq!(failure.error_kind(), ErrorKind::NotFound);
    }

    #[test]
    fn sublist_rows_append_in_order() {
        let mut store = MemoryStore::new();
        let request = WriteRequest::new()
            .with_field("name", "A")
            .with_sublist_row("addresses", [("city".to_string(), json!("Lyon"))].into())
            .with_sublist_row("addresses", [("city".to_string(), json!("Nantes"))].into());
        let results = upsert(
            &mut store,
            "customer",
            vec![request],
            WriteOptions::default(),
        );
        assert!(results[0].0.is_committed());
        let record = store.record("customer", 1).expect("record");
        let rows = record.sublists.get("addresses").expect("rows");
        assert_eq!(rows[0].get("city"), Some(&json!("Lyon")));
        assert_eq!(rows[1].get("city"), Some(&json!("Nantes")));
    }

    #[test]
    fn quota_stop_fails_remaining_items_but_keeps_committed_work() {
        // Each upsert costs 10 (load/create) + 20 (submit); budget 70 fits
        // two items with 10 left over, below the guard's 20-unit threshold.
        let mut store = MemoryStore::new().with_budget(70);
        let results = upsert(
            &mut store,
            "customer",
            requests(&["A", "B", "C", "D"]),
            WriteOptions::default(),
        );
        assert_eq!(results.len(), 4);
        assert!(results[0].0.is_committed());
        assert!(results[1].0.is_committed());
        for (outcome, _) in &results[2..] {
            let failure = outcome.failure().expect("failure");
            assert_eq!(failure.error_kind(), ErrorKind::Quota);
        }
        assert_eq!(store.count("customer"), 2);
    }

    #[test]
    fn delete_isolates_missing_ids() {
        let mut store = MemoryStore::new();
        let a = store.seed("customer", [("name".to_string(), json!("A"))].into());
        let b = store.seed("customer", [("name".to_string(), json!("B"))].into());
        let outcomes = delete(&mut store, "customer", &[a, 12_345, b]);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].error.is_none());
        let failure = outcomes[1].error.as_ref().expect("failure");
        assert_eq!(failure.error_kind(), ErrorKind::NotFound);
        assert!(outcomes[2].error.is_none());
        assert_eq!(store.count("customer"), 0);
    }

    #[test]
    fn delete_preserves_input_order() {
        let mut store = MemoryStore::new();
        let a = store.seed("customer", [("name".to_string(), json!("A"))].into());
        let b = store.seed("customer", [("name".to_string(), json!("B"))].into());
        let outcomes = delete(&mut store, "customer", &[b, a]);
        let ids: Vec<u64> = outcomes.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn delete_quota_stop_marks_remaining_ids() {
        let mut store = MemoryStore::new();
        let ids: Vec<u64> = (0..4)
            .map(|n| store.seed("customer", [("name".to_string(), json!(format!("c{n}")))].into()))
            .collect();
        let mut store = store.with_budget(40);
        let outcomes = delete(&mut store, "customer", &ids);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].error.is_none());
        assert!(outcomes[1].error.is_none());
        for outcome in &outcomes[2..] {
            let failure = outcome.error.as_ref().expect("failure");
            assert_eq!(failure.error_kind(), ErrorKind::Quota);
        }
        assert_eq!(store.count("customer"), 2);
    }
}
