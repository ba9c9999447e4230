//! Purpose: The executor that runs inside the quota-constrained record store.
//! Exports: `dispatch`, `governance`, `search`, `store`, `write`.
//! Role: Host half of the protocol; everything here is synchronous and
//!       operates through the `RecordStore` capability.
//! Invariants: Quota is consulted before each unit of work, never owned here.

pub mod dispatch;
pub mod governance;
pub mod search;
pub mod store;
pub mod write;

pub use dispatch::dispatch;
pub use store::{MemoryStore, RecordStore, DEFAULT_PAGE_CAP};
