//! Core types for the routing kernel.

pub mod node;
pub mod segment;
pub mod equipment;
pub mod operation;
pub mod batch;
pub mod session;

pub use node::{NodeId, PortName, PortDirection};
pub use segment::{SegmentId, ValveId, ValveState, SegmentSpec};
pub use equipment::{EquipmentId, Occupancy};
pub use operation::{OperationId, OperationKind, OperationStatus, Operation};
pub use batch::{BatchId, MaterialType, Batch, Constituent};
pub use session::{SessionId, MeltEvent, ContinuousSession};
