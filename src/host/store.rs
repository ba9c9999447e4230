//! Purpose: Define the opaque record-store capability the executor calls into.
//! Exports: `RecordStore`, `MemoryStore`, `DEFAULT_PAGE_CAP`.
//! Role: Boundary to the host's native record/search primitives; `MemoryStore`
//!       backs the dev server and every test.
//! Invariants: `search_page` returns at most `page_cap` rows, ascending by id.
//! Invariants: Record ids are strictly ascending and never reused per type.
//! Invariants: Every primitive charges usage before doing work.

use crate::core::criteria::{Column, Filter, FilterOp, SearchCriteria};
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{FieldMap, Record, RecordId, RecordRow, ID_FIELD};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fixed size of one native search page.
pub const DEFAULT_PAGE_CAP: usize = 1000;

// Usage units burned by each native primitive. The governance guard
// pre-checks against the operation base costs; a store-level shortfall
// mid-item still surfaces as a quota error on that item alone.
const USAGE_CREATE: u64 = 10;
const USAGE_LOAD: u64 = 10;
const USAGE_SEARCH: u64 = 10;
const USAGE_SUBMIT: u64 = 20;
const USAGE_DELETE: u64 = 20;

/// The host's native record capability, as seen by the executor. The
/// executor consults `remaining_usage` but never owns the budget.
pub trait RecordStore {
    fn page_cap(&self) -> usize;
    fn remaining_usage(&self) -> u64;
    fn create_record(&mut self, record_type: &str) -> Result<Record, Error>;
    fn load_record(&mut self, record_type: &str, id: RecordId) -> Result<Record, Error>;
    fn submit_record(
        &mut self,
        record: Record,
        do_sourcing: bool,
        ignore_mandatory: bool,
    ) -> Result<RecordId, Error>;
    fn delete_record(&mut self, record_type: &str, id: RecordId) -> Result<(), Error>;
    fn search_page(
        &mut self,
        record_type: &str,
        saved_search: Option<&str>,
        filters: &[Filter],
        columns: &[Column],
    ) -> Result<Vec<RecordRow>, Error>;
}

/// In-memory record store with a simulated per-invocation usage budget.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    records: BTreeMap<String, BTreeMap<RecordId, Record>>,
    next_ids: BTreeMap<String, RecordId>,
    saved_searches: BTreeMap<String, SearchCriteria>,
    mandatory_fields: BTreeMap<String, Vec<String>>,
    sourced_defaults: BTreeMap<String, FieldMap>,
    page_cap: usize,
    budget: u64,
    remaining: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_ids: BTreeMap::new(),
            saved_searches: BTreeMap::new(),
            mandatory_fields: BTreeMap::new(),
            sourced_defaults: BTreeMap::new(),
            page_cap: DEFAULT_PAGE_CAP,
            budget: u64::MAX,
            remaining: u64::MAX,
        }
    }

    pub fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap.max(1);
        self
    }

    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self.remaining = budget;
        self
    }

    /// Restore the full budget. The host grants a fresh allowance per
    /// invocation; the dev server calls this before dispatching a request.
    pub fn reset_usage(&mut self) {
        self.remaining = self.budget;
    }

    pub fn register_saved_search(&mut self, search_id: impl Into<String>, criteria: SearchCriteria) {
        self.saved_searches.insert(search_id.into(), criteria);
    }

    pub fn require_fields(&mut self, record_type: &str, fields: &[&str]) {
        self.mandatory_fields.insert(
            record_type.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn set_sourced_defaults(&mut self, record_type: &str, defaults: FieldMap) {
        self.sourced_defaults.insert(record_type.to_string(), defaults);
    }

    /// Insert a record directly, bypassing the usage meter. Dev/test helper.
    pub fn seed(&mut self, record_type: &str, fields: FieldMap) -> RecordId {
        let id = self.allocate_id(record_type);
        let record = Record {
            record_type: record_type.to_string(),
            id: Some(id),
            fields,
            sublists: BTreeMap::new(),
        };
        self.records
            .entry(record_type.to_string())
            .or_default()
            .insert(id, record);
        id
    }

    pub fn record(&self, record_type: &str, id: RecordId) -> Option<&Record> {
        self.records.get(record_type)?.get(&id)
    }

    pub fn count(&self, record_type: &str) -> usize {
        self.records.get(record_type).map_or(0, BTreeMap::len)
    }

    fn allocate_id(&mut self, record_type: &str) -> RecordId {
        let counter = self.next_ids.entry(record_type.to_string()).or_insert(1);
        let id = *counter;
        *counter += 1;
        id
    }

    fn charge(&mut self, units: u64) -> Result<(), Error> {
        if self.remaining < units {
            return Err(Error::new(ErrorKind::Quota).with_message(format!(
                "usage limit exceeded: {units} units needed, {} remaining",
                self.remaining
            )));
        }
        self.remaining -= units;
        Ok(())
    }

    fn joined_value(&self, record: &Record, join: &str, field: &str) -> Value {
        let Some(reference) = record.fields.get(join).and_then(Value::as_u64) else {
            return Value::Null;
        };
        match self.record(join, reference) {
            Some(_) if field == ID_FIELD => Value::from(reference),
            Some(target) => target.fields.get(field).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    fn project(&self, record: &Record, columns: &[Column]) -> RecordRow {
        let mut out = FieldMap::new();
        for column in columns {
            let (key, value) = match &column.join {
                Some(join) => (
                    format!("{join}.{}", column.field),
                    self.joined_value(record, join, &column.field),
                ),
                None if column.field == ID_FIELD => {
                    (ID_FIELD.to_string(), Value::from(record.id.unwrap_or(0)))
                }
                None => (
                    column.field.clone(),
                    record.fields.get(&column.field).cloned().unwrap_or(Value::Null),
                ),
            };
            out.insert(key, value);
        }
        RecordRow {
            id: record.id.unwrap_or(0),
            columns: out,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn page_cap(&self) -> usize {
        self.page_cap
    }

    fn remaining_usage(&self) -> u64 {
        self.remaining
    }

    fn create_record(&mut self, record_type: &str) -> Result<Record, Error> {
        self.charge(USAGE_CREATE)?;
        if record_type.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("record type must not be empty"));
        }
        Ok(Record::new(record_type))
    }

    fn load_record(&mut self, record_type: &str, id: RecordId) -> Result<Record, Error> {
        self.charge(USAGE_LOAD)?;
        self.record(record_type, id).cloned().ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!("no record with id {id}"))
                .with_record_type(record_type)
        })
    }

    fn submit_record(
        &mut self,
        mut record: Record,
        do_sourcing: bool,
        ignore_mandatory: bool,
    ) -> Result<RecordId, Error> {
        self.charge(USAGE_SUBMIT)?;
        if record.record_type.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("record type must not be empty"));
        }
        if let Some(id) = record.id {
            if self.record(&record.record_type, id).is_none() {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message(format!("no record with id {id}"))
                    .with_record_type(record.record_type));
            }
        }

        if do_sourcing {
            if let Some(defaults) = self.sourced_defaults.get(&record.record_type) {
                for (field, value) in defaults {
                    record
                        .fields
                        .entry(field.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }

        if !ignore_mandatory {
            if let Some(mandatory) = self.mandatory_fields.get(&record.record_type) {
                for field in mandatory {
                    let present = record
                        .fields
                        .get(field)
                        .is_some_and(|value| !value.is_null());
                    if !present {
                        return Err(Error::new(ErrorKind::Validation)
                            .with_message(format!("missing mandatory field [{field}]"))
                            .with_record_type(record.record_type));
                    }
                }
            }
        }

        let record_type = record.record_type.clone();
        let id = match record.id {
            Some(id) => id,
            None => self.allocate_id(&record_type),
        };
        record.id = Some(id);
        self.records
            .entry(record_type)
            .or_default()
            .insert(id, record);
        Ok(id)
    }

    fn delete_record(&mut self, record_type: &str, id: RecordId) -> Result<(), Error> {
        self.charge(USAGE_DELETE)?;
        let removed = self
            .records
            .get_mut(record_type)
            .and_then(|records| records.remove(&id));
        if removed.is_none() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("no record with id {id}"))
                .with_record_type(record_type));
        }
        Ok(())
    }

    fn search_page(
        &mut self,
        record_type: &str,
        saved_search: Option<&str>,
        filters: &[Filter],
        columns: &[Column],
    ) -> Result<Vec<RecordRow>, Error> {
        self.charge(USAGE_SEARCH)?;
        let saved = match saved_search {
            Some(search_id) => Some(self.saved_searches.get(search_id).cloned().ok_or_else(
                || {
                    Error::new(ErrorKind::NotFound)
                        .with_message(format!("no saved search [{search_id}]"))
                },
            )?),
            None => None,
        };

        let mut effective_columns: Vec<Column> = Vec::new();
        if let Some(saved) = &saved {
            effective_columns.extend(saved.columns.iter().cloned());
        }
        effective_columns.extend(columns.iter().cloned());

        let mut rows = Vec::new();
        if let Some(records) = self.records.get(record_type) {
            // BTreeMap iteration gives the implicit ascending-id sort.
            for record in records.values() {
                let saved_ok = saved
                    .as_ref()
                    .is_none_or(|s| s.filters.iter().all(|f| matches(record, f)));
                if saved_ok && filters.iter().all(|f| matches(record, f)) {
                    rows.push(self.project(record, &effective_columns));
                    if rows.len() == self.page_cap {
                        break;
                    }
                }
            }
        }
        Ok(rows)
    }
}

fn field_value(record: &Record, field: &str) -> Value {
    if field == ID_FIELD {
        return record.id.map(Value::from).unwrap_or(Value::Null);
    }
    record.fields.get(field).cloned().unwrap_or(Value::Null)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a == b;
    }
    left == right
}

fn matches(record: &Record, filter: &Filter) -> bool {
    let actual = field_value(record, &filter.field);
    match filter.operator {
        FilterOp::Is => values_equal(&actual, &filter.value),
        FilterOp::IsNot => !values_equal(&actual, &filter.value),
        FilterOp::GreaterThan => match (as_number(&actual), as_number(&filter.value)) {
            (Some(a), Some(b)) => a > b,
            _ => matches!((&actual, &filter.value), (Value::String(a), Value::String(b)) if a > b),
        },
        FilterOp::LessThan => match (as_number(&actual), as_number(&filter.value)) {
            (Some(a), Some(b)) => a < b,
            _ => matches!((&actual, &filter.value), (Value::String(a), Value::String(b)) if a < b),
        },
        FilterOp::Contains => match (&actual, &filter.value) {
            (Value::String(a), Value::String(b)) => a.contains(b.as_str()),
            _ => false,
        },
        FilterOp::StartsWith => match (&actual, &filter.value) {
            (Value::String(a), Value::String(b)) => a.starts_with(b.as_str()),
            _ => false,
        },
    }
}
