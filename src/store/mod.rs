//! Collaborator stores consumed by the operation lifecycle.
//!
//! The kernel owns none of this state; it reads and writes it through these
//! traits. All methods are async to support async database access.

pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::mixing::TransferPlan;
use crate::types::{
    Batch, BatchId, EquipmentId, Occupancy, Operation, OperationId, OperationStatus, ValveId,
    ValveState,
};

/// Valve state store.
#[async_trait]
pub trait ValveStore: Send + Sync {
    /// Ids of every valve currently open.
    async fn get_open_valve_ids(&self) -> Result<BTreeSet<ValveId>, StoreError>;

    /// Set a single valve's state.
    async fn set_valve_state(&self, valve: &ValveId, state: ValveState) -> Result<(), StoreError>;
}

/// Batch store.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Fetch a batch by id, archived or not.
    async fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>, StoreError>;

    /// The non-archived batch currently located in a piece of equipment.
    async fn batch_at(&self, equipment: &EquipmentId) -> Result<Option<Batch>, StoreError>;

    /// Apply every batch change of a completed transfer as one unit:
    /// update the source, archive the displaced destination batch, and
    /// upsert the destination batch with its composition.
    async fn commit_transfer(&self, plan: &TransferPlan) -> Result<(), StoreError>;
}

/// Equipment occupancy store.
#[async_trait]
pub trait OccupancyStore: Send + Sync {
    /// Occupancy of a piece of equipment. Unknown equipment reads as empty.
    async fn get_occupancy(&self, equipment: &EquipmentId) -> Result<Occupancy, StoreError>;

    /// Set the occupancy of a piece of equipment.
    async fn set_occupancy(&self, equipment: &EquipmentId, occupancy: Occupancy) -> Result<(), StoreError>;
}

/// Operation record store.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Persist a new operation.
    async fn insert_operation(&self, operation: Operation) -> Result<(), StoreError>;

    /// Overwrite an existing operation.
    async fn update_operation(&self, operation: &Operation) -> Result<(), StoreError>;

    /// Fetch an operation by id.
    async fn get_operation(&self, id: &OperationId) -> Result<Option<Operation>, StoreError>;

    /// List operations, optionally filtered by status, ordered by start time.
    async fn list_operations(&self, status: Option<OperationStatus>) -> Result<Vec<Operation>, StoreError>;
}

/// Everything the lifecycle needs from the surrounding system.
pub trait PlantStore: ValveStore + BatchStore + OccupancyStore + OperationStore {}

impl<T> PlantStore for T where T: ValveStore + BatchStore + OccupancyStore + OperationStore {}

pub use memory::InMemoryPlantStore;
