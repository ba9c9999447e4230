//! Purpose: Client-side cursor pagination over the remote search executor.
//! Exports: `drain_pages`.
//! Role: The outer fetch loop; one transport round-trip per page, cursor
//!       advanced from each response, stop on the first empty page.
//! Invariants: Transport and remote errors propagate unmodified; no retry.
//! Invariants: A quota-exhausted page becomes a quota error carrying the
//!             cursor to resume from, so nothing is skipped on resume.

use crate::core::aggregate::PageAccumulator;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{RecordId, RecordRow};
use crate::core::wire::SearchResponse;

/// Drive `fetch_page` from `start` until the dataset is exhausted. Progress
/// is logged per page but never influences control flow.
///
/// On quota exhaustion the error's cursor is the boundary *before* the
/// partial page, so a later invocation starting there re-fetches the rows
/// this one had to drop — no gaps.
pub fn drain_pages<F>(start: RecordId, mut fetch_page: F) -> Result<Vec<RecordRow>, Error>
where
    F: FnMut(RecordId) -> Result<SearchResponse, Error>,
{
    let mut acc = PageAccumulator::new(start);
    loop {
        let resume_from = acc.cursor();
        let page = fetch_page(resume_from)?;
        tracing::debug!(
            cursor = page.cursor,
            rows = page.rows.len(),
            page = acc.pages() + 1,
            "fetched page"
        );
        if page.quota_exhausted {
            return Err(Error::new(ErrorKind::Quota)
                .with_message("store quota exhausted during pagination")
                .with_hint("Re-issue the fetch starting from the attached cursor.")
                .with_cursor(resume_from));
        }
        if page.rows.is_empty() {
            break;
        }
        acc.absorb(page.rows, page.cursor)?;
    }
    Ok(acc.into_rows())
}
