//! Transaction lifecycle (C8).
//!
//! Two abstractions, deliberately asymmetric (spec.md §9 open question):
//!
//! - [`with_transaction`]: closure-scoped, runs `f` inside one atomic SQLite
//!   transaction and propagates rollback on error. It does *not* touch the
//!   caches — the caller knows which keys it touched and must invalidate
//!   them itself (that's what the mutation engine, C7, does).
//! - [`ManualTransaction`]: explicit begin/commit/rollback for callers that
//!   want to compose several facade calls atomically. Because the set of
//!   touched keys is then opaque to the facade, commit and rollback both
//!   clear the caches wholesale rather than attempt surgical invalidation.

use std::sync::Mutex;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::storage::pool::WriterHandle;

/// Run `f` inside a single deferred transaction. On success, commits; on
/// error, rolls back and propagates the error. Nesting is the caller's
/// responsibility to avoid — SQLite itself will reject a nested `BEGIN`.
pub fn with_transaction<T, E>(
    conn: &mut Connection,
    f: impl FnOnce(&rusqlite::Transaction) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    let tx = conn.transaction().map_err(E::from)?;
    let result = f(&tx);
    match result {
        Ok(value) => {
            tx.commit().map_err(E::from)?;
            Ok(value)
        }
        Err(e) => {
            // tx drops here, which rolls back.
            Err(e)
        }
    }
}

/// Tracks the writer handle checked out for an in-progress manual
/// (facade-level) transaction, so `begin_transaction` called twice in a row
/// surfaces `TransactionAlreadyActive` rather than silently nesting a second
/// `BEGIN` on the same connection (spec.md §4.8, §7), and so the checked-out
/// connection is held for the entire BEGIN..COMMIT/ROLLBACK span instead of
/// being released and re-acquired between facade calls — which is what
/// actually serializes a manual transaction against concurrent writes
/// (spec.md §5: "at most one write transaction is in flight at any time").
pub struct ManualTransaction {
    handle: Mutex<Option<WriterHandle>>,
}

impl ManualTransaction {
    pub fn new() -> Self {
        Self { handle: Mutex::new(None) }
    }

    /// Stash the already-checked-out writer handle for an in-progress manual
    /// transaction. Callers must check [`is_active`](Self::is_active) before
    /// checking out the writer, so a second `begin` never blocks waiting on
    /// a handle it would otherwise be holding itself.
    pub fn begin(&self, handle: WriterHandle) -> CoreResult<()> {
        let mut guard = self.handle.lock().unwrap();
        if guard.is_some() {
            return Err(CoreError::TransactionAlreadyActive);
        }
        *guard = Some(handle);
        debug!("manual transaction begun");
        Ok(())
    }

    /// Remove and return the checked-out writer handle, ending the manual
    /// transaction. The caller runs COMMIT/ROLLBACK on it and then drops it,
    /// returning the connection to the writer pool.
    pub fn end(&self) -> CoreResult<WriterHandle> {
        self.handle.lock().unwrap().take().ok_or(CoreError::NoActiveTransaction)
    }

    pub fn is_active(&self) -> bool {
        self.handle.lock().unwrap().is_some()
    }
}

impl Default for ManualTransaction {
    fn default() -> Self {
        Self::new()
    }
}
