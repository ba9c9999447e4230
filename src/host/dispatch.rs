//! Purpose: Route decoded wire requests to the host executor functions.
//! Exports: `dispatch`.
//! Role: The host's single entry point; a static match from operation kind
//!       to handler, validated at the boundary.
//! Invariants: An access-method mismatch is a fatal request error, reported
//!             in the response body and never retried.
//! Invariants: Unknown operations never reach a handler; they fail when the
//!             request is decoded.

use crate::core::error::{Error, ErrorKind};
use crate::core::record::WriteOptions;
use crate::core::wire::{
    AccessMethod, DeleteResponse, OperationKind, RecordResponse, UpsertResponse, WireRequest,
    WireResponse,
};
use crate::host::store::RecordStore;
use crate::host::{search, write};

/// Validate the access method, then run the statically mapped handler.
pub fn dispatch(
    store: &mut dyn RecordStore,
    method: AccessMethod,
    request: &WireRequest,
) -> Result<WireResponse, Error> {
    let operation = request.operation()?;
    if method != operation.access() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "the operation [{}] cannot be accessed via {}; method allowed: [{}]",
            operation.name(),
            method.as_str(),
            operation.access().as_str()
        )));
    }

    tracing::debug!(operation = operation.name(), "dispatching request");
    match operation {
        OperationKind::Create => {
            let record = store.create_record(request.require_record_type()?)?;
            Ok(WireResponse::Record(RecordResponse { record }))
        }
        OperationKind::Load => {
            let record = store.load_record(
                request.require_record_type()?,
                request.require_internal_id()?,
            )?;
            Ok(WireResponse::Record(RecordResponse { record }))
        }
        OperationKind::Saved => {
            let response = search::perform_search(
                store,
                request.require_record_type()?,
                Some(request.require_search_id()?),
                request.batch_size,
                request.start_id.unwrap_or(0),
                &[],
                &[],
            )?;
            Ok(WireResponse::Search(response))
        }
        OperationKind::Search => {
            let response = search::perform_search(
                store,
                request.require_record_type()?,
                None,
                request.batch_size,
                request.start_id.unwrap_or(0),
                request.search_filters.as_deref().unwrap_or(&[]),
                request.return_columns.as_deref().unwrap_or(&[]),
            )?;
            Ok(WireResponse::Search(response))
        }
        OperationKind::Upsert => {
            let options = WriteOptions {
                update_only: request.update_only.unwrap_or(false),
                do_sourcing: request.do_sourcing.unwrap_or(false),
                ignore_mandatory: request.ignore_mandatory.unwrap_or(false),
            };
            let results = write::upsert(
                store,
                request.require_record_type()?,
                request.require_record_data()?.to_vec(),
                options,
            );
            Ok(WireResponse::Upsert(UpsertResponse { results }))
        }
        OperationKind::Delete => {
            let results = write::delete(
                store,
                request.require_record_type()?,
                request.require_internal_ids()?,
            );
            Ok(WireResponse::Delete(DeleteResponse { results }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dispatch;
    use crate::core::error::ErrorKind;
    use crate::core::record::WriteRequest;
    use crate::core::wire::{AccessMethod, OperationKind, WireRequest, WireResponse};
    use crate::host::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn access_method_mismatch_is_fatal_usage_error() {
        let mut store = MemoryStore::new();
        let mut request = WireRequest::for_operation(OperationKind::Upsert);
        request.record_type = Some("customer".to_string());
        request.record_data = Some(vec![WriteRequest::new().with_field("name", "A")]);
        let err = dispatch(&mut store, AccessMethod::Get, &request).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let message = err.message().expect("message");
        assert!(message.contains("[upsert]"));
        assert!(message.contains("[POST]"));
        assert_eq!(store.count("customer"), 0);
    }

    #[test]
    fn missing_operation_is_usage_error() {
        let mut store = MemoryStore::new();
        let err = dispatch(&mut store, AccessMethod::Get, &WireRequest::default())
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn create_returns_unsaved_record() {
        let mut store = MemoryStore::new();
        let mut request = WireRequest::for_operation(OperationKind::Create);
        request.record_type = Some("customer".to_string());
        let response = dispatch(&mut store, AccessMethod::Get, &request).expect("response");
        match response {
            WireResponse::Record(envelope) => {
                assert_eq!(envelope.record.record_type, "customer");
                assert_eq!(envelope.record.id, None);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn load_requires_internal_id() {
        let mut store = MemoryStore::new();
        let mut request = WireRequest::for_operation(OperationKind::Load);
        request.record_type = Some("customer".to_string());
        let err = dispatch(&mut store, AccessMethod::Get, &request).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn saved_search_dispatch_returns_rows_and_cursor() {
        let mut store = MemoryStore::new();
        for n in 1..=3u64 {
            store.seed("customer", [("name".to_string(), json!(format!("c{n}")))].into());
        }
        store.register_saved_search("all", Default::default());
        let mut request = WireRequest::for_operation(OperationKind::Saved);
        request.record_type = Some("customer".to_string());
        request.search_id = Some("all".to_string());
        request.batch_size = Some(10);
        let response = dispatch(&mut store, AccessMethod::Get, &request).expect("response");
        match response {
            WireResponse::Search(page) => {
                assert_eq!(page.rows.len(), 3);
                assert_eq!(page.cursor, 3);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn delete_dispatch_pairs_ids_with_outcomes() {
        let mut store = MemoryStore::new();
        let id = store.seed("customer", [("name".to_string(), json!("A"))].into());
        let mut request = WireRequest::for_operation(OperationKind::Delete);
        request.record_type = Some("customer".to_string());
        request.internal_ids = Some(vec![id, 999]);
        let response = dispatch(&mut store, AccessMethod::Post, &request).expect("response");
        match response {
            WireResponse::Delete(envelope) => {
                assert_eq!(envelope.results.len(), 2);
                assert!(envelope.results[0].error.is_none());
                assert!(envelope.results[1].error.is_some());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
