//! Purpose: Define the record data model shared by client and host executor.
//! Exports: `Record`, `RecordRow`, `WriteRequest`, `WriteOutcome`, `WriteFailure`,
//!          `DeleteOutcome`, `WriteOptions`.
//! Role: Plain typed structs standing in for the store's native record objects.
//! Invariants: Write outcomes pair 1:1, in input order, with their requests.
//! Invariants: Sublist rows are append-only and keep their input order.

use crate::core::error::{Error, ErrorKind, kind_name};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type RecordId = u64;
pub type FieldMap = BTreeMap<String, Value>;
pub type SublistMap = BTreeMap<String, Vec<FieldMap>>;

/// Reserved key inside a write request's field map holding nested child rows.
pub const SUBLIST_FIELDS_KEY: &str = "sublist_fields";

/// Field name carrying the record identifier on the wire.
pub const ID_FIELD: &str = "id";

/// A record as held by the store: scalar fields plus ordered child rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: String,
    pub id: Option<RecordId>,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default, skip_serializing_if = "SublistMap::is_empty")]
    pub sublists: SublistMap,
}

impl Record {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: None,
            fields: FieldMap::new(),
            sublists: SublistMap::new(),
        }
    }
}

/// One search result row: the record id plus the requested columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: RecordId,
    #[serde(default)]
    pub columns: FieldMap,
}

/// A single batched write: a raw field map, as submitted by the caller.
///
/// The map may carry the [`ID_FIELD`] key (load-then-mutate instead of
/// create) and the reserved [`SUBLIST_FIELDS_KEY`] key (nested child rows).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteRequest {
    pub fields: FieldMap,
}

impl WriteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.fields.insert(ID_FIELD.to_string(), Value::from(id));
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_sublist_row(mut self, sublist: &str, row: FieldMap) -> Self {
        let nested = self
            .fields
            .entry(SUBLIST_FIELDS_KEY.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(map) = nested {
            let rows = map
                .entry(sublist.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = rows {
                items.push(Value::Object(row.into_iter().collect()));
            }
        }
        self
    }

    /// Identifier carried by the request, if any. Accepts both a JSON number
    /// and a numeric string, matching what callers actually send.
    pub fn id(&self) -> Result<Option<RecordId>, Error> {
        match self.fields.get(ID_FIELD) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
                Error::new(ErrorKind::Validation)
                    .with_message("record id must be a non-negative integer")
            }),
            Some(Value::String(s)) => s.parse::<RecordId>().map(Some).map_err(|err| {
                Error::new(ErrorKind::Validation)
                    .with_message("record id must be numeric")
                    .with_source(err)
            }),
            Some(_) => Err(Error::new(ErrorKind::Validation)
                .with_message("record id must be a number or numeric string")),
        }
    }

    /// Scalar fields to apply, excluding the identifier and the reserved
    /// nested-rows key.
    pub fn scalars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .filter(|(name, _)| name.as_str() != ID_FIELD && name.as_str() != SUBLIST_FIELDS_KEY)
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Nested child rows under the reserved key, decoded into ordered rows.
    pub fn sublists(&self) -> Result<SublistMap, Error> {
        let Some(raw) = self.fields.get(SUBLIST_FIELDS_KEY) else {
            return Ok(SublistMap::new());
        };
        serde_json::from_value(raw.clone()).map_err(|err| {
            Error::new(ErrorKind::Validation)
                .with_message("sublist_fields must map sublist names to lists of field maps")
                .with_source(err)
        })
    }
}

/// Flags controlling a bulk upsert, all defaulting to off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub update_only: bool,
    pub do_sourcing: bool,
    pub ignore_mandatory: bool,
}

/// Structured per-record failure: never aborts the batch it occurs in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
}

impl WriteFailure {
    /// Capture an error as a structured failure. The trace is the source
    /// chain, best effort; when there is none a fallback note stands in.
    pub fn from_error(err: &Error) -> Self {
        let mut trace = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: kind_name(err.kind()).to_string(),
            message: err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
            trace: if trace.is_empty() {
                Some(vec!["no further detail available".to_string()])
            } else {
                Some(trace)
            },
        }
    }

    pub fn error_kind(&self) -> ErrorKind {
        crate::core::error::parse_kind(&self.kind)
    }
}

/// Outcome of one write, paired with its originating request on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    Committed { id: RecordId },
    Failed(WriteFailure),
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed { .. })
    }

    pub fn failure(&self) -> Option<&WriteFailure> {
        match self {
            WriteOutcome::Failed(failure) => Some(failure),
            WriteOutcome::Committed { .. } => None,
        }
    }
}

/// Outcome of one deletion: `error` is absent on success.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WriteFailure>,
}
