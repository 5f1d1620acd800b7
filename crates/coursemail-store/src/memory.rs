//! In-memory outcome log (ring buffer).

use std::collections::VecDeque;
use std::sync::Mutex;

use coursemail_core::error::{CourseMailError, Result};
use coursemail_core::traits::OutcomeLog;
use coursemail_core::OutcomeRecord;

const DEFAULT_CAPACITY: usize = 100;

/// Keeps the last `capacity` records; older ones are dropped.
pub struct MemoryOutcomeLog {
    records: Mutex<VecDeque<OutcomeRecord>>,
    capacity: usize,
}

impl MemoryOutcomeLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    /// All retained records, oldest first.
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records
            .lock()
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryOutcomeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeLog for MemoryOutcomeLog {
    fn append(&self, record: &OutcomeRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| CourseMailError::Store("memory log poisoned".into()))?;
        records.push_back(record.clone());
        while records.len() > self.capacity {
            records.pop_front();
        }
        Ok(())
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<OutcomeRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| CourseMailError::Store("memory log poisoned".into()))?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| CourseMailError::Store("memory log poisoned".into()))?
            .clear();
        Ok(())
    }
}
