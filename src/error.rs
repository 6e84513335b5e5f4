//! Error taxonomy for the routing kernel.
//!
//! Every failure leaves valves, the reservation ledger, operation records
//! and batch records exactly as they were before the call. Mapping these
//! errors to user-facing behaviour is the caller's job.

use crate::types::{OperationId, OperationStatus, SegmentId};

/// Error type for collaborator stores (valves, batches, occupancy, operations).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Record not found in the backing store.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
    /// Backend failure (connection, transaction, serialization).
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

/// Error type for kernel operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    /// Unknown port or junction name in the current topology snapshot.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Graph search exhausted; no path under the given valve set.
    #[error("No route found from {from} to {to}")]
    NoRouteFound {
        /// Start node name.
        from: String,
        /// End node name.
        to: String,
    },

    /// Segments already held by other active operations.
    #[error("Resource conflict on segments: {}", format_segments(.busy))]
    ResourceConflict {
        /// Exactly the busy segments, sorted.
        busy: Vec<SegmentId>,
    },

    /// End or cancel requested for an operation that is not Active.
    #[error("Invalid state transition for operation {operation}: status is {status}")]
    InvalidStateTransition {
        /// Operation the transition was requested for.
        operation: OperationId,
        /// Its current status.
        status: OperationStatus,
    },

    /// No operation record with this id.
    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    /// Malformed request.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Collaborator store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl KernelError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Busy segments, if this is a resource conflict.
    pub fn busy_segments(&self) -> Option<&[SegmentId]> {
        match self {
            Self::ResourceConflict { busy } => Some(busy),
            _ => None,
        }
    }
}

fn format_segments(segments: &[SegmentId]) -> String {
    segments
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_lists_segments() {
        let err = KernelError::ResourceConflict {
            busy: vec![SegmentId::new("S1"), SegmentId::new("S2")],
        };
        assert_eq!(err.to_string(), "Resource conflict on segments: S1, S2");
        assert_eq!(err.busy_segments().map(|b| b.len()), Some(2));
    }

    #[test]
    fn test_store_error_converts() {
        let err: KernelError = StoreError::not_found("batch", "b-1").into();
        assert!(matches!(err, KernelError::Store(StoreError::NotFound { .. })));
        assert_eq!(err.to_string(), "Store error: batch not found: b-1");
    }
}
