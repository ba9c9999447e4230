//! Purpose: Define the wire protocol shared by the client and the host executor.
//! Exports: `OperationKind`, `AccessMethod`, `WireRequest`, response envelopes,
//!          `WireError` and the status/kind mappings.
//! Role: Single source of truth for request/response shapes; both the HTTP
//!       transport and the in-process transport speak exactly these types.
//! Invariants: Each operation has one fixed access method; a mismatch is a
//!             fatal request error, never retried.
//! Invariants: Envelope field names are stable; additions are optional-only.

use crate::core::criteria::{Column, Filter};
use crate::core::error::{kind_name, parse_kind, Error, ErrorKind};
use crate::core::record::{DeleteOutcome, Record, RecordId, RecordRow, WriteOutcome, WriteRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMethod {
    Get,
    Post,
}

impl AccessMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMethod::Get => "GET",
            AccessMethod::Post => "POST",
        }
    }
}

/// The closed set of operations the host executor understands. Dispatch is
/// a static match on this enum; unknown names fail at the boundary when the
/// request is decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Load,
    Saved,
    Search,
    Upsert,
    Delete,
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Load => "load",
            OperationKind::Saved => "saved",
            OperationKind::Search => "search",
            OperationKind::Upsert => "upsert",
            OperationKind::Delete => "delete",
        }
    }

    pub fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "create" => Ok(OperationKind::Create),
            "load" => Ok(OperationKind::Load),
            "saved" => Ok(OperationKind::Saved),
            "search" => Ok(OperationKind::Search),
            "upsert" => Ok(OperationKind::Upsert),
            "delete" => Ok(OperationKind::Delete),
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown operation [{other}]"))),
        }
    }

    /// The one access method this operation may be invoked through.
    pub fn access(self) -> AccessMethod {
        match self {
            OperationKind::Create | OperationKind::Load | OperationKind::Saved => AccessMethod::Get,
            OperationKind::Search | OperationKind::Upsert | OperationKind::Delete => {
                AccessMethod::Post
            }
        }
    }

    /// Governance units one iteration of this operation consumes.
    pub fn base_cost(self) -> u64 {
        match self {
            OperationKind::Create
            | OperationKind::Load
            | OperationKind::Saved
            | OperationKind::Search => 10,
            OperationKind::Upsert | OperationKind::Delete => 20,
        }
    }
}

/// The request envelope. Every field beyond `operation` is optional on the
/// wire; handlers demand what they need through the `require_*` accessors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub operation: Option<OperationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_filters: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_columns: Option<Vec<Column>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_data: Option<Vec<WriteRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_sourcing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_mandatory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_ids: Option<Vec<RecordId>>,
}

impl WireRequest {
    pub fn for_operation(operation: OperationKind) -> Self {
        Self {
            operation: Some(operation),
            ..Self::default()
        }
    }

    pub fn operation(&self) -> Result<OperationKind, Error> {
        self.operation
            .ok_or_else(|| Error::new(ErrorKind::Usage).with_message("request has no operation"))
    }

    pub fn require_record_type(&self) -> Result<&str, Error> {
        self.record_type.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("request is missing record_type")
        })
    }

    pub fn require_search_id(&self) -> Result<&str, Error> {
        self.search_id.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("request is missing search_id")
        })
    }

    pub fn require_internal_id(&self) -> Result<RecordId, Error> {
        self.internal_id.ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("request is missing internal_id")
        })
    }

    pub fn require_record_data(&self) -> Result<&[WriteRequest], Error> {
        self.record_data.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("request is missing record_data")
        })
    }

    pub fn require_internal_ids(&self) -> Result<&[RecordId], Error> {
        self.internal_ids.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("request is missing internal_ids")
        })
    }

    /// Scalar parameters as query pairs, for GET-class operations. Non-scalar
    /// fields (filters, columns, record data) never travel in a query string.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(operation) = self.operation {
            pairs.push(("operation".to_string(), operation.name().to_string()));
        }
        if let Some(record_type) = &self.record_type {
            pairs.push(("record_type".to_string(), record_type.clone()));
        }
        if let Some(search_id) = &self.search_id {
            pairs.push(("search_id".to_string(), search_id.clone()));
        }
        if let Some(internal_id) = self.internal_id {
            pairs.push(("internal_id".to_string(), internal_id.to_string()));
        }
        if let Some(batch_size) = self.batch_size {
            pairs.push(("batch_size".to_string(), batch_size.to_string()));
        }
        if let Some(start_id) = self.start_id {
            pairs.push(("start_id".to_string(), start_id.to_string()));
        }
        pairs
    }

    /// Decode a GET-class request from query pairs. Unknown keys (routing
    /// parameters like script/deploy ids) are ignored.
    pub fn from_query_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, Error> {
        let mut request = Self::default();
        for (key, value) in pairs {
            match key {
                "operation" => request.operation = Some(OperationKind::parse(value)?),
                "record_type" => request.record_type = Some(value.to_string()),
                "search_id" => request.search_id = Some(value.to_string()),
                "internal_id" => request.internal_id = Some(parse_number(key, value)?),
                "batch_size" => {
                    request.batch_size = Some(parse_number(key, value)? as usize);
                }
                "start_id" => request.start_id = Some(parse_number(key, value)?),
                _ => {}
            }
        }
        Ok(request)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, Error> {
    value.parse::<u64>().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{key} must be a non-negative integer"))
            .with_source(err)
    })
}

/// One search invocation's results plus the resumption cursor. The flag is
/// the distinct quota condition: rows already fetched are kept, nothing is
/// silently truncated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub rows: Vec<RecordRow>,
    pub cursor: RecordId,
    #[serde(default)]
    pub quota_exhausted: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub results: Vec<(WriteOutcome, WriteRequest)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub results: Vec<DeleteOutcome>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    pub record: Record,
}

/// Host-side response union; the client decodes the concrete envelope it
/// expects for the operation it issued.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireResponse {
    Record(RecordResponse),
    Search(SearchResponse),
    Upsert(UpsertResponse),
    Delete(DeleteResponse),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<RecordId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: WireError,
}

impl ErrorEnvelope {
    pub fn from_error(err: &Error) -> Self {
        Self {
            error: WireError {
                kind: kind_name(err.kind()).to_string(),
                message: err.message().map(str::to_string),
                hint: err.hint().map(str::to_string),
                record_type: err.record_type().map(str::to_string),
                cursor: err.cursor(),
            },
        }
    }

    pub fn into_error(self) -> Error {
        let mut err = Error::new(parse_kind(&self.error.kind));
        if let Some(message) = self.error.message {
            err = err.with_message(message);
        }
        if let Some(hint) = self.error.hint {
            err = err.with_hint(hint);
        }
        if let Some(record_type) = self.error.record_type {
            err = err.with_record_type(record_type);
        }
        if let Some(cursor) = self.error.cursor {
            err = err.with_cursor(cursor);
        }
        err
    }
}

/// HTTP status used when an error crosses the dev-server boundary.
pub fn status_for_kind(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Usage => 400,
        ErrorKind::Validation => 422,
        ErrorKind::NotFound => 404,
        ErrorKind::Permission => 403,
        ErrorKind::Quota => 429,
        ErrorKind::Internal => 500,
        ErrorKind::Io => 502,
    }
}

pub fn kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 => ErrorKind::Usage,
        422 => ErrorKind::Validation,
        401 | 403 => ErrorKind::Permission,
        404 => ErrorKind::NotFound,
        429 => ErrorKind::Quota,
        500..=501 | 503..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}

/// Decode a JSON error body, falling back to a status-derived kind when the
/// body is not a caravel error envelope.
pub fn error_from_body(status: u16, body: &str) -> Error {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.into_error();
    }
    Error::new(kind_from_status(status)).with_message(format!("remote error status {status}"))
}

pub fn response_to_value(response: &WireResponse) -> Result<Value, Error> {
    serde_json::to_value(response).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode response json")
            .with_source(err)
    })
}
