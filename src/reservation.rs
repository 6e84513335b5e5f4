//! Exclusive segment reservations.
//!
//! A segment id appears in at most one reservation at any time. The
//! conflict check and the reservation write happen under one lock, so no
//! caller can observe a state where a check has passed but the claim has
//! not been recorded yet.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::KernelError;
use crate::types::{OperationId, SegmentId};

/// Rejected reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationConflict {
    /// Some requested segments are held by other operations.
    #[error("{} segment(s) already reserved", .busy.len())]
    Busy {
        /// Exactly the busy segments, sorted.
        busy: Vec<SegmentId>,
    },
    /// The operation already holds a reservation.
    #[error("operation {0} already holds a reservation")]
    AlreadyReserved(OperationId),
}

impl From<ReservationConflict> for KernelError {
    fn from(conflict: ReservationConflict) -> Self {
        match conflict {
            ReservationConflict::Busy { busy } => KernelError::ResourceConflict { busy },
            ReservationConflict::AlreadyReserved(id) => {
                KernelError::validation(format!("operation {id} already holds a reservation"))
            }
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    by_operation: HashMap<OperationId, BTreeSet<SegmentId>>,
    holder: HashMap<SegmentId, OperationId>,
}

/// Tracks which operation, if any, holds each segment.
#[derive(Debug, Default)]
pub struct ReservationLedger {
    state: Mutex<LedgerState>,
}

impl ReservationLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim every segment for `operation`, or none of them.
    ///
    /// On conflict nothing is recorded and the error lists exactly the
    /// segments held by other operations.
    pub fn try_reserve<'a, I>(&self, operation: OperationId, segments: I) -> Result<(), ReservationConflict>
    where
        I: IntoIterator<Item = &'a SegmentId>,
    {
        let wanted: BTreeSet<SegmentId> = segments.into_iter().cloned().collect();
        let mut state = self.state.lock();

        if state.by_operation.contains_key(&operation) {
            return Err(ReservationConflict::AlreadyReserved(operation));
        }

        let busy: Vec<SegmentId> = wanted
            .iter()
            .filter(|s| state.holder.contains_key(*s))
            .cloned()
            .collect();
        if !busy.is_empty() {
            return Err(ReservationConflict::Busy { busy });
        }

        for seg in &wanted {
            state.holder.insert(seg.clone(), operation);
        }
        state.by_operation.insert(operation, wanted);
        Ok(())
    }

    /// Drop the reservation held by `operation`.
    ///
    /// Unknown ids are a no-op so retries are harmless. Returns the
    /// released segments, if there were any.
    pub fn release(&self, operation: OperationId) -> Option<BTreeSet<SegmentId>> {
        let mut state = self.state.lock();
        let segments = state.by_operation.remove(&operation)?;
        for seg in &segments {
            state.holder.remove(seg);
        }
        Some(segments)
    }

    /// Operation currently holding a segment.
    pub fn holder_of(&self, segment: &SegmentId) -> Option<OperationId> {
        self.state.lock().holder.get(segment).copied()
    }

    /// Segments held by an operation.
    pub fn held_by(&self, operation: OperationId) -> BTreeSet<SegmentId> {
        self.state
            .lock()
            .by_operation
            .get(&operation)
            .cloned()
            .unwrap_or_default()
    }

    /// Every held segment and its holder, sorted by segment.
    pub fn held_segments(&self) -> BTreeMap<SegmentId, OperationId> {
        self.state
            .lock()
            .holder
            .iter()
            .map(|(s, op)| (s.clone(), *op))
            .collect()
    }

    /// Number of operations holding a reservation.
    pub fn active_count(&self) -> usize {
        self.state.lock().by_operation.len()
    }
}
