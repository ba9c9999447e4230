//! Purpose: Run one bounded page-fetch loop inside the record store host.
//! Exports: `perform_search`.
//! Role: The host half of cursor pagination; the client's paginator drives
//!       this once per outer page.
//! Invariants: The `id > lower_bound` filter and ascending-id sort are always
//!             injected ahead of caller criteria.
//! Invariants: The batch cap is soft: the page in progress always completes,
//!             so one invocation may overshoot the requested batch size.
//! Invariants: A failed governance check halts the loop, keeping accumulated
//!             rows and cursor, and marks the response quota-exhausted.

use crate::core::aggregate::PageAccumulator;
use crate::core::criteria::{effective_filters, Column, Filter};
use crate::core::error::Error;
use crate::core::record::RecordId;
use crate::core::wire::{OperationKind, SearchResponse};
use crate::host::governance;
use crate::host::store::RecordStore;

/// Fetch native pages until the dataset, the advisory batch cap, or the
/// quota runs out. Returns accumulated rows plus the resumption cursor.
///
/// `batch_cap` is advisory: `None` means one native page; a value keeps the
/// loop running while full pages arrive and the accumulated count is below
/// it. Stopping conditions are checked after the page in progress lands.
pub fn perform_search(
    store: &mut dyn RecordStore,
    record_type: &str,
    saved_search: Option<&str>,
    batch_cap: Option<usize>,
    lower_bound: RecordId,
    filters: &[Filter],
    columns: &[Column],
) -> Result<SearchResponse, Error> {
    let operation = if saved_search.is_some() {
        OperationKind::Saved
    } else {
        OperationKind::Search
    };
    let mut acc = PageAccumulator::new(lower_bound);
    let mut quota_exhausted = false;

    loop {
        if !governance::can_afford(store, operation, 1) {
            quota_exhausted = true;
            break;
        }

        let bounded = effective_filters(acc.cursor(), filters);
        let page = store.search_page(record_type, saved_search, &bounded, columns)?;
        let fetched = page.len();
        let full = fetched == store.page_cap();
        if let Some(last) = page.last() {
            let cursor = last.id;
            acc.absorb(page, cursor)?;
        }
        tracing::debug!(
            record_type,
            cursor = acc.cursor(),
            fetched,
            total = acc.len(),
            "search page complete"
        );

        if fetched == 0 || !full {
            break;
        }
        if !batch_cap.is_some_and(|cap| acc.len() < cap) {
            break;
        }
    }

    let cursor = acc.cursor();
    Ok(SearchResponse {
        rows: acc.into_rows(),
        cursor,
        quota_exhausted,
    })
}
