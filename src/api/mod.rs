//! Purpose: Define the stable public client API for caravel.
//! Exports: Client surface, auth, transport seam, and the core types callers
//!          need to build requests and read outcomes.
//! Role: Public, additive-only surface; internal module layout stays hidden.
//! Invariants: Everything here is synchronous and blocking by design.

mod auth;
mod client;
mod paginate;
mod transport;

pub use crate::core::criteria::{Column, Filter, FilterOp, SearchCriteria};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::record::{
    DeleteOutcome, FieldMap, Record, RecordId, RecordRow, WriteFailure, WriteOptions,
    WriteOutcome, WriteRequest,
};
pub use crate::core::wire::{OperationKind, SearchResponse};
pub use crate::host::store::{MemoryStore, DEFAULT_PAGE_CAP};
pub use auth::{Auth, Credentials, PROTOCOL_VERSION, VERSION_COOKIE};
pub use client::{Client, ClientConfig, DEFAULT_SEARCH_BATCH_SIZE};
pub use paginate::drain_pages;
pub use transport::{Endpoint, HttpTransport, LocalTransport, Transport, TransportRequest};
