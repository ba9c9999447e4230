//! Purpose: Protocol core shared by the client and the host executor.
//! Exports: `aggregate`, `criteria`, `error`, `record`, `wire`.
//! Role: Data model, wire envelopes, and aggregation; no transport, no I/O.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.

pub mod aggregate;
pub mod criteria;
pub mod error;
pub mod record;
pub mod wire;
