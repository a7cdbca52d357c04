//! Bounded write log for non-blocking index maintenance.
//!
//! While an HNSW index is being optimized in the background, the live
//! index keeps serving writes; this log captures them in order so they
//! can be replayed onto the optimized clone before the swap. The log is
//! bounded: overflow forces the maintenance run to abort, leaving the
//! live index untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::warn;

use crate::index::HnswIndex;
use crate::record::VectorId;

/// Maximum log entries before maintenance must abort.
pub const MAX_ENTRIES: usize = 100_000;

/// Entry count at which a warning about write load is emitted.
pub const WARN_THRESHOLD: usize = 50_000;

/// Type of logged write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Remove,
}

/// A single logged operation.
#[derive(Debug, Clone)]
pub struct WriteLogEntry {
    pub op: WriteOp,
    pub id: VectorId,
    /// Vector data; empty for removes.
    pub vector: Vec<f32>,
    /// When the operation was captured.
    pub timestamp: Instant,
}

/// Chronologically ordered capture of insert/remove operations.
#[derive(Debug, Default)]
pub struct WriteLog {
    entries: Mutex<Vec<WriteLogEntry>>,
    enabled: AtomicBool,
    overflowed: AtomicBool,
}

impl WriteLog {
    /// Creates a disabled, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while maintenance has logging switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Switches logging on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Returns true if an append was rejected since the last clear.
    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }

    /// Captures an insert. Returns false on overflow.
    pub fn log_insert(&self, id: VectorId, vector: &[f32]) -> bool {
        self.append(WriteOp::Insert, id, vector.to_vec())
    }

    /// Captures a remove. Returns false on overflow.
    pub fn log_remove(&self, id: VectorId) -> bool {
        self.append(WriteOp::Remove, id, Vec::new())
    }

    fn append(&self, op: WriteOp, id: VectorId, vector: Vec<f32>) -> bool {
        let mut entries = self.entries.lock();
        if entries.len() >= MAX_ENTRIES {
            self.overflowed.store(true, Ordering::Release);
            return false;
        }

        entries.push(WriteLogEntry {
            op,
            id,
            vector,
            timestamp: Instant::now(),
        });

        if entries.len() == WARN_THRESHOLD {
            warn!(
                entries = entries.len(),
                "write log reached warning threshold during maintenance"
            );
        }
        true
    }

    /// Replays every logged operation onto `target` in capture order.
    ///
    /// An insert whose id already lives in the target tombstones the old
    /// node first, so replay is idempotent. Removes of absent ids are
    /// ignored.
    pub fn replay_to(&self, target: &mut HnswIndex) {
        let entries = self.entries.lock();
        for entry in entries.iter() {
            match entry.op {
                WriteOp::Insert => {
                    if target.contains(entry.id) {
                        let _ = target.remove(entry.id);
                    }
                    let _ = target.add(entry.id, &entry.vector);
                }
                WriteOp::Remove => {
                    let _ = target.remove(entry.id);
                }
            }
        }
    }

    /// Drops all entries and resets the overflow flag.
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.overflowed.store(false, Ordering::Release);
    }

    /// Current number of captured entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no entries are captured.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::index::HnswParams;

    #[test]
    fn test_log_and_replay_order() {
        let log = WriteLog::new();
        assert!(log.log_insert(1, &[1.0, 0.0]));
        assert!(log.log_insert(2, &[0.0, 1.0]));
        assert!(log.log_remove(1));
        assert_eq!(log.len(), 3);

        let mut index = HnswIndex::new(2, DistanceMetric::L2, HnswParams::with_m(4));
        log.replay_to(&mut index);

        assert!(!index.contains(1));
        assert!(index.contains(2));
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_replay_insert_over_existing_id() {
        let mut index = HnswIndex::new(2, DistanceMetric::L2, HnswParams::with_m(4));
        index.add(1, &[9.0, 9.0]).unwrap();

        let log = WriteLog::new();
        log.log_insert(1, &[1.0, 1.0]);
        log.replay_to(&mut index);

        assert_eq!(index.size(), 1);
        let result = index.search(&[1.0, 1.0], 1, None, None);
        assert_eq!(result.neighbors[0].id, 1);
        assert!(result.neighbors[0].distance < 1e-6);
    }

    #[test]
    fn test_replay_remove_of_absent_id_ignored() {
        let log = WriteLog::new();
        log.log_remove(42);

        let mut index = HnswIndex::new(2, DistanceMetric::L2, HnswParams::with_m(4));
        log.replay_to(&mut index);
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_enable_flag() {
        let log = WriteLog::new();
        assert!(!log.is_enabled());
        log.set_enabled(true);
        assert!(log.is_enabled());
        log.set_enabled(false);
        assert!(!log.is_enabled());
    }

    #[test]
    fn test_overflow_rejects_appends() {
        let log = WriteLog::new();
        for id in 0..MAX_ENTRIES as u64 {
            assert!(log.log_remove(id));
        }
        assert!(!log.log_remove(u64::MAX));
        assert!(log.overflowed());
        assert_eq!(log.len(), MAX_ENTRIES);

        log.clear();
        assert!(!log.overflowed());
        assert!(log.log_remove(1));
    }

    #[test]
    fn test_clear_resets_state() {
        let log = WriteLog::new();
        log.log_insert(1, &[1.0]);
        log.clear();
        assert!(log.is_empty());
        assert!(!log.overflowed());
    }
}
