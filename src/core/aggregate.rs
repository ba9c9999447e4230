// Ordered merging of page results and per-item outcomes. No deduplication:
// "no duplicates, no gaps" rests on the strictly-ascending cursor upstream.
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{RecordId, RecordRow, WriteOutcome, WriteRequest};

/// Accumulates sequential pages, tracking the advancing cursor. Both the
/// host's inner page loop and the client's outer pagination loop drive one.
#[derive(Debug)]
pub struct PageAccumulator {
    rows: Vec<RecordRow>,
    cursor: RecordId,
    pages: usize,
}

impl PageAccumulator {
    pub fn new(start: RecordId) -> Self {
        Self {
            rows: Vec::new(),
            cursor: start,
            pages: 0,
        }
    }

    pub fn cursor(&self) -> RecordId {
        self.cursor
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Merge one page. A non-empty page must move the cursor strictly
    /// forward; anything else means the upstream ordering contract broke.
    pub fn absorb(&mut self, rows: Vec<RecordRow>, cursor: RecordId) -> Result<(), Error> {
        self.pages += 1;
        if rows.is_empty() {
            return Ok(());
        }
        if cursor <= self.cursor {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("page cursor did not advance")
                .with_cursor(self.cursor));
        }
        self.cursor = cursor;
        self.rows.extend(rows);
        Ok(())
    }

    pub fn into_rows(self) -> Vec<RecordRow> {
        self.rows
    }
}

/// Pairs write outcomes with their originating requests, in input order.
#[derive(Debug, Default)]
pub struct OutcomeLog {
    entries: Vec<(WriteOutcome, WriteRequest)>,
}

impl OutcomeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: WriteOutcome, request: WriteRequest) {
        self.entries.push((outcome, request));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(WriteOutcome, WriteRequest)> {
        self.entries
    }
}
