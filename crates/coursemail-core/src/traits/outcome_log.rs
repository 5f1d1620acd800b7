//! Outcome log trait — append-only delivery history.

use crate::error::Result;
use crate::types::OutcomeRecord;

/// Append-only record of dispatch outcomes. Implementations provide their
/// own synchronization; the dispatcher never reads back within a run.
pub trait OutcomeLog: Send + Sync {
    fn append(&self, record: &OutcomeRecord) -> Result<()>;

    /// Newest first, at most `limit` records.
    fn query_recent(&self, limit: usize) -> Result<Vec<OutcomeRecord>>;

    fn clear(&self) -> Result<()>;
}
