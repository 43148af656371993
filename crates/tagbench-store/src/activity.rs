//! Round-trip accounting.
//!
//! Every statement the store sends to SQLite is recorded here exactly once.
//! Callers scope a count with [`ActivityLog::capture`]; the returned handle
//! reads the number of round trips issued since it was opened and releases
//! itself on drop. Statement text is only retained while at least one
//! capture is open.
//!
//! The store itself is not `Sync`, but its log is: a thread that does not own
//! the store may hold `&ActivityLog` and read totals while the owner queries.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct ActivityLog {
    state: Mutex<ActivityState>,
}

#[derive(Debug, Default)]
struct ActivityState {
    total: u64,
    open_captures: usize,
    statements: Vec<String>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, sql: &str) {
        let mut state = self.state.lock();
        state.total += 1;
        if state.open_captures > 0 {
            state.statements.push(sql.to_string());
        }
        tracing::trace!(round_trip = state.total, sql, "store round trip");
    }

    /// Round trips issued over the lifetime of the store.
    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    /// Start counting round trips. Counting stops when the handle is dropped
    /// or [`QueryCapture::finish`]ed.
    pub fn capture(&self) -> QueryCapture<'_> {
        let mut state = self.state.lock();
        state.open_captures += 1;
        QueryCapture {
            log: self,
            start_total: state.total,
            start_statement: state.statements.len(),
        }
    }
}

/// An open capture scope over an [`ActivityLog`].
#[derive(Debug)]
pub struct QueryCapture<'a> {
    log: &'a ActivityLog,
    start_total: u64,
    start_statement: usize,
}

impl QueryCapture<'_> {
    /// Round trips issued since the capture was opened.
    pub fn count(&self) -> u64 {
        self.log.state.lock().total - self.start_total
    }

    /// Statement text issued since the capture was opened.
    pub fn statements(&self) -> Vec<String> {
        let state = self.log.state.lock();
        state
            .statements
            .get(self.start_statement..)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Close the capture and return what it saw.
    pub fn finish(self) -> CapturedQueries {
        CapturedQueries {
            count: self.count(),
            statements: self.statements(),
        }
    }
}

impl Drop for QueryCapture<'_> {
    fn drop(&mut self) {
        let mut state = self.log.state.lock();
        state.open_captures = state.open_captures.saturating_sub(1);
        if state.open_captures == 0 {
            state.statements.clear();
        }
    }
}

/// Result of a closed capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedQueries {
    pub count: u64,
    pub statements: Vec<String>,
}
