//! # plant-route-kernel
//!
//! Pipe routing, segment reservation and melt estimation for batch plants.
//!
//! The kernel answers two questions:
//!
//! > Which pipe segments connect these two ports, and may this operation
//! > hold them right now?
//!
//! > How much molten material does this melter have available?
//!
//! ## Core Contract
//!
//! 1. Resolve a shortest route over open valves, optionally through an
//!    intermediate vessel
//! 2. Reserve every segment of the route atomically, or report exactly which
//!    segments are busy
//! 3. On completion, move the batch and apply the mixing rule; on
//!    cancellation, restore prior state
//!
//! ## Architecture
//!
//! ```text
//! StartRequest → PathResolver → ReservationLedger → OperationLifecycle
//!                     ↑                                   ↓
//!             TopologyHandle (snapshot)        PlantStore (valves, batches,
//!                                              occupancy, operations)
//!
//! ContinuousSession → ContinuousProcessEstimator   (event-log view)
//!                   → bookkeeping_balance          (operation-log view)
//! ```
//!
//! ## Guarantees
//!
//! - A segment is held by at most one Active operation
//! - Reservation is all-or-nothing; a conflict names every busy segment
//! - Routing returns a minimum-hop path over the given valve set; ties may
//!   resolve to any shortest route
//! - Available melt quantity is never negative

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod canonical;
pub mod config;
pub mod topology;
pub mod resolver;
pub mod reservation;
pub mod store;
pub mod mixing;
pub mod lifecycle;
pub mod estimator;
pub mod balance;
pub mod telemetry;

// Re-exports
pub use types::{
    Batch, BatchId, Constituent, ContinuousSession, EquipmentId, MaterialType, MeltEvent, NodeId,
    Occupancy, Operation, OperationId, OperationKind, OperationStatus, PortDirection, PortName,
    SegmentId, SegmentSpec, SessionId, ValveId, ValveState,
};
pub use error::{KernelError, KernelResult, StoreError};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use config::{EstimatorConfig, KernelConfig, RoutingConfig, ValveScope};
pub use topology::{TopologyGraph, TopologyHandle, TopologySource};
pub use resolver::{PathResolver, RoutePlan};
pub use reservation::{ReservationConflict, ReservationLedger};
pub use store::{BatchStore, InMemoryPlantStore, OccupancyStore, OperationStore, PlantStore, ValveStore};
pub use mixing::{plan_transfer, MixOutcome, TransferPlan};
pub use lifecycle::{OperationLifecycle, StartRequest};
pub use estimator::{ContinuousProcessEstimator, MeltEstimate};
pub use balance::{
    bookkeeping_balance, equipment_summary, BookkeepingBalance, ConfirmedTransfer,
    EquipmentMeltSummary,
};
pub use telemetry::{init_tracing, try_init_tracing, LogFormat};

/// Schema version folded into topology fingerprints.
pub const KERNEL_SCHEMA_VERSION: &str = "1.0.0";
