//! Purpose: Typed client surface over the transport seam.
//! Exports: `Client`, `ClientConfig`, `DEFAULT_SEARCH_BATCH_SIZE`.
//! Role: Builds wire requests, issues them, decodes typed responses; the
//!       pagination driver lives in `paginate` and is re-used here.
//! Invariants: One blocking transport round-trip at a time per call.
//! Invariants: Batched responses must pair 1:1 with their inputs; a length
//!             mismatch is a protocol error, not silently accepted.
#![allow(clippy::result_large_err)]

use crate::api::auth::Auth;
use crate::api::paginate::drain_pages;
use crate::api::transport::{
    Endpoint, HttpTransport, LocalTransport, Transport, TransportRequest,
};
use crate::core::criteria::SearchCriteria;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{
    DeleteOutcome, Record, RecordId, RecordRow, WriteOptions, WriteOutcome, WriteRequest,
};
use crate::core::wire::{
    AccessMethod, DeleteResponse, OperationKind, RecordResponse, SearchResponse, UpsertResponse,
    WireRequest,
};
use crate::host::store::MemoryStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Advisory batch size for saved-search fetches; the host rounds up to
/// whole native pages regardless.
pub const DEFAULT_SEARCH_BATCH_SIZE: usize = 20_000;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub timeout: Option<Duration>,
    pub search_batch_size: usize,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            timeout: None,
            search_batch_size: DEFAULT_SEARCH_BATCH_SIZE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_search_batch_size(mut self, search_batch_size: usize) -> Self {
        self.search_batch_size = search_batch_size.max(1);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Client {
    transport: Box<dyn Transport>,
    config: ClientConfig,
}

impl Client {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            config: ClientConfig::new(),
        }
    }

    /// Client over blocking HTTP against a hosted executor.
    pub fn connect(endpoint: Endpoint, auth: Auth) -> Self {
        Self::new(HttpTransport::new(endpoint, auth))
    }

    /// Client over an in-process store; useful offline and in tests.
    pub fn local(store: MemoryStore) -> Self {
        Self::new(LocalTransport::new(store))
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn create_record(&self, record_type: &str) -> Result<Record, Error> {
        let mut wire = WireRequest::for_operation(OperationKind::Create);
        wire.record_type = Some(record_type.to_string());
        let envelope: RecordResponse = self.issue(&wire)?;
        Ok(envelope.record)
    }

    pub fn load_record(&self, record_type: &str, id: RecordId) -> Result<Record, Error> {
        let mut wire = WireRequest::for_operation(OperationKind::Load);
        wire.record_type = Some(record_type.to_string());
        wire.internal_id = Some(id);
        let envelope: RecordResponse = self.issue(&wire)?;
        Ok(envelope.record)
    }

    /// One saved-search invocation: a batch of whole native pages starting
    /// above `start_id`, plus the cursor to resume from. Orchestrators that
    /// span quota windows drive this directly.
    pub fn fetch_page(
        &self,
        record_type: &str,
        search_id: &str,
        start_id: RecordId,
    ) -> Result<SearchResponse, Error> {
        let mut wire = WireRequest::for_operation(OperationKind::Saved);
        wire.record_type = Some(record_type.to_string());
        wire.search_id = Some(search_id.to_string());
        wire.batch_size = Some(self.config.search_batch_size);
        wire.start_id = Some(start_id);
        self.issue(&wire)
    }

    /// Every row of a saved search, fetched page by page until exhaustion.
    pub fn fetch_all(&self, record_type: &str, search_id: &str) -> Result<Vec<RecordRow>, Error> {
        self.fetch_all_from(record_type, search_id, 0)
    }

    /// Like [`Client::fetch_all`], but starting above a caller-supplied
    /// boundary — typically the cursor a previous invocation ended on.
    pub fn fetch_all_from(
        &self,
        record_type: &str,
        search_id: &str,
        start_id: RecordId,
    ) -> Result<Vec<RecordRow>, Error> {
        drain_pages(start_id, |cursor| {
            self.fetch_page(record_type, search_id, cursor)
        })
    }

    /// One ad-hoc search invocation; the criteria travel with the request.
    pub fn search_page(
        &self,
        record_type: &str,
        criteria: &SearchCriteria,
        start_id: RecordId,
    ) -> Result<SearchResponse, Error> {
        let mut wire = WireRequest::for_operation(OperationKind::Search);
        wire.record_type = Some(record_type.to_string());
        wire.batch_size = Some(self.config.search_batch_size);
        wire.start_id = Some(start_id);
        wire.search_filters = Some(criteria.filters.clone());
        wire.return_columns = Some(criteria.columns.clone());
        self.issue(&wire)
    }

    /// Every row matching the criteria, fetched page by page.
    pub fn search(
        &self,
        record_type: &str,
        criteria: &SearchCriteria,
    ) -> Result<Vec<RecordRow>, Error> {
        drain_pages(0, |cursor| self.search_page(record_type, criteria, cursor))
    }

    /// Batched upsert: one outcome per request, in input order.
    pub fn upsert(
        &self,
        record_type: &str,
        requests: Vec<WriteRequest>,
        options: WriteOptions,
    ) -> Result<Vec<(WriteOutcome, WriteRequest)>, Error> {
        let expected = requests.len();
        let mut wire = WireRequest::for_operation(OperationKind::Upsert);
        wire.record_type = Some(record_type.to_string());
        wire.record_data = Some(requests);
        wire.update_only = Some(options.update_only);
        wire.do_sourcing = Some(options.do_sourcing);
        wire.ignore_mandatory = Some(options.ignore_mandatory);
        let envelope: UpsertResponse = self.issue(&wire)?;
        ensure_paired(expected, envelope.results.len())?;
        Ok(envelope.results)
    }

    /// Batched delete: one outcome per id, in input order.
    pub fn delete_records(
        &self,
        record_type: &str,
        ids: &[RecordId],
    ) -> Result<Vec<DeleteOutcome>, Error> {
        let mut wire = WireRequest::for_operation(OperationKind::Delete);
        wire.record_type = Some(record_type.to_string());
        wire.internal_ids = Some(ids.to_vec());
        let envelope: DeleteResponse = self.issue(&wire)?;
        ensure_paired(ids.len(), envelope.results.len())?;
        Ok(envelope.results)
    }

    fn issue<R>(&self, wire: &WireRequest) -> Result<R, Error>
    where
        R: DeserializeOwned,
    {
        let method = wire.operation()?.access();
        let request = match method {
            AccessMethod::Get => TransportRequest {
                method,
                query: wire.to_query_pairs(),
                body: None,
                timeout: self.config.timeout,
            },
            AccessMethod::Post => TransportRequest {
                method,
                query: Vec::new(),
                body: Some(encode_body(wire)?),
                timeout: self.config.timeout,
            },
        };
        let value = self.transport.issue(&request)?;
        decode_response(value)
    }
}

fn encode_body(wire: &WireRequest) -> Result<Value, Error> {
    serde_json::to_value(wire).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode request json")
            .with_source(err)
    })
}

fn decode_response<R>(value: Value) -> Result<R, Error>
where
    R: DeserializeOwned,
{
    serde_json::from_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn ensure_paired(expected: usize, actual: usize) -> Result<(), Error> {
    if expected == actual {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Internal).with_message(format!(
        "host returned {actual} outcome(s) for {expected} input(s)"
    )))
}

#[cfg(test)]
mod tests {
    use super::{Client, ClientConfig};
    use crate::api::transport::LocalTransport;
    use crate::core::criteria::{Filter, FilterOp, SearchCriteria};
    use crate::core::error::ErrorKind;
    use crate::core::record::{WriteOptions, WriteRequest};
    use crate::host::store::MemoryStore;
    use serde_json::json;

    fn seeded_client(count: u64, page_cap: usize) -> (Client, LocalTransport) {
        let mut store = MemoryStore::new().with_page_cap(page_cap);
        for n in 1..=count {
            store.seed("customer", [("name".to_string(), json!(format!("c{n}")))].into());
        }
        store.register_saved_search("all", SearchCriteria::new());
        let transport = LocalTransport::new(store);
        (Client::new(transport.clone()), transport)
    }

    #[test]
    fn create_and_load_round_trip() {
        let (client, transport) = seeded_client(0, 10);
        let record = client.create_record("customer").expect("create");
        assert_eq!(record.id, None);

        transport
            .store()
            .seed("customer", [("name".to_string(), json!("A"))].into());
        let loaded = client.load_record("customer", 1).expect("load");
        assert_eq!(loaded.fields.get("name"), Some(&json!("A")));
    }

    #[test]
    fn load_missing_record_is_not_found() {
        let (client, _transport) = seeded_client(0, 10);
        let err = client.load_record("customer", 99).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn fetch_all_crosses_page_boundaries() {
        let (client, _transport) = seeded_client(23, 10);
        let rows = client.fetch_all("customer", "all").expect("rows");
        assert_eq!(rows.len(), 23);
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        let expected: Vec<u64> = (1..=23).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn fetch_all_from_resumes_above_the_boundary() {
        let (client, _transport) = seeded_client(23, 10);
        let rows = client.fetch_all_from("customer", "all", 20).expect("rows");
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![21, 22, 23]);
    }

    #[test]
    fn fetch_all_unknown_search_propagates_not_found() {
        let (client, _transport) = seeded_client(3, 10);
        let err = client.fetch_all("customer", "missing").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn search_applies_criteria_over_the_wire() {
        let (client, _transport) = seeded_client(9, 4);
        let criteria =
            SearchCriteria::new().filter(Filter::new("name", FilterOp::StartsWith, "c1"));
        let rows = client.search("customer", &criteria).expect("rows");
        // c1 only: c10+ do not exist in a 9-record store.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
    }

    #[test]
    fn upsert_round_trips_outcome_pairs() {
        let (client, transport) = seeded_client(0, 10);
        let batch = vec![
            WriteRequest::new().with_field("name", "A"),
            WriteRequest::new().with_field("name", "B"),
        ];
        let results = client
            .upsert("customer", batch, WriteOptions::default())
            .expect("results");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(outcome, _)| outcome.is_committed()));
        assert_eq!(results[1].1.fields.get("name"), Some(&json!("B")));
        assert_eq!(transport.store().count("customer"), 2);
    }

    #[test]
    fn delete_round_trips_outcomes() {
        let (client, _transport) = seeded_client(2, 10);
        let outcomes = client.delete_records("customer", &[1, 2]).expect("outcomes");
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.error.is_none()));
    }

    #[test]
    fn config_batch_size_reaches_the_host() {
        let (client, _transport) = seeded_client(25, 10);
        let client = client.with_config(ClientConfig::new().with_search_batch_size(15));
        let page = client.fetch_page("customer", "all", 0).expect("page");
        // Batch 15 over 10-row pages: the host finishes page two at 20 rows.
        assert_eq!(page.rows.len(), 20);
        assert_eq!(page.cursor, 20);
    }
}
