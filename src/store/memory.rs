//! In-memory plant store for testing.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use super::{BatchStore, OccupancyStore, OperationStore, ValveStore};
use crate::error::StoreError;
use crate::mixing::TransferPlan;
use crate::types::{
    Batch, BatchId, EquipmentId, Occupancy, Operation, OperationId, OperationStatus, ValveId,
    ValveState,
};

#[derive(Debug, Default)]
struct State {
    valves: BTreeMap<ValveId, ValveState>,
    batches: BTreeMap<BatchId, Batch>,
    occupancy: BTreeMap<EquipmentId, Occupancy>,
    operations: BTreeMap<OperationId, Operation>,
    /// Valves whose writes fail, for exercising rollback paths.
    faulty_valves: BTreeSet<ValveId>,
}

/// In-memory implementation of every collaborator store.
///
/// Uses BTreeMap for deterministic iteration order. Each trait call takes
/// the lock once, so `commit_transfer` is atomic.
#[derive(Debug, Default)]
pub struct InMemoryPlantStore {
    state: RwLock<State>,
}

impl InMemoryPlantStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given valves open.
    pub fn with_open_valves<I, S>(valves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for v in valves {
            store.put_valve(ValveId::new(v), ValveState::Open);
        }
        store
    }

    /// Set a valve state directly.
    pub fn put_valve(&self, valve: ValveId, state: ValveState) {
        self.state.write().valves.insert(valve, state);
    }

    /// Current state of a valve. Unknown valves read as closed.
    pub fn valve_state(&self, valve: &ValveId) -> ValveState {
        self.state.read().valves.get(valve).copied().unwrap_or_default()
    }

    /// Make writes to a valve fail.
    pub fn fail_writes_to(&self, valve: ValveId) {
        self.state.write().faulty_valves.insert(valve);
    }

    /// Place a batch and mark its location occupied.
    pub fn put_batch(&self, batch: Batch) {
        let mut state = self.state.write();
        if let Some(loc) = batch.location.clone().filter(|_| !batch.archived) {
            state.occupancy.insert(loc, Occupancy::Occupied);
        }
        state.batches.insert(batch.id, batch);
    }

    /// Fetch a batch.
    pub fn batch(&self, id: &BatchId) -> Option<Batch> {
        self.state.read().batches.get(id).cloned()
    }

    /// Every batch, archived ones included.
    pub fn all_batches(&self) -> Vec<Batch> {
        self.state.read().batches.values().cloned().collect()
    }

    /// Set occupancy directly.
    pub fn put_occupancy(&self, equipment: EquipmentId, occupancy: Occupancy) {
        self.state.write().occupancy.insert(equipment, occupancy);
    }

    /// Current occupancy of a piece of equipment.
    pub fn occupancy(&self, equipment: &EquipmentId) -> Occupancy {
        self.state.read().occupancy.get(equipment).copied().unwrap_or_default()
    }

    /// Number of operation records.
    pub fn num_operations(&self) -> usize {
        self.state.read().operations.len()
    }
}

#[async_trait]
impl ValveStore for InMemoryPlantStore {
    async fn get_open_valve_ids(&self) -> Result<BTreeSet<ValveId>, StoreError> {
        Ok(self
            .state
            .read()
            .valves
            .iter()
            .filter(|(_, s)| **s == ValveState::Open)
            .map(|(v, _)| v.clone())
            .collect())
    }

    async fn set_valve_state(&self, valve: &ValveId, state: ValveState) -> Result<(), StoreError> {
        let mut guard = self.state.write();
        if guard.faulty_valves.contains(valve) {
            return Err(StoreError::Backend(format!("valve {valve} did not respond")));
        }
        guard.valves.insert(valve.clone(), state);
        Ok(())
    }
}

#[async_trait]
impl BatchStore for InMemoryPlantStore {
    async fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.state.read().batches.get(id).cloned())
    }

    async fn batch_at(&self, equipment: &EquipmentId) -> Result<Option<Batch>, StoreError> {
        Ok(self
            .state
            .read()
            .batches
            .values()
            .find(|b| b.is_at(equipment))
            .cloned())
    }

    async fn commit_transfer(&self, plan: &TransferPlan) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if !state.batches.contains_key(&plan.source.id) {
            return Err(StoreError::not_found("batch", plan.source.id));
        }
        if let Some(id) = plan.archived {
            let old = state
                .batches
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("batch", id))?;
            old.archived = true;
            old.location = None;
        }
        state.batches.insert(plan.source.id, plan.source.clone());
        state.batches.insert(plan.destination.id, plan.destination.clone());
        Ok(())
    }
}

#[async_trait]
impl OccupancyStore for InMemoryPlantStore {
    async fn get_occupancy(&self, equipment: &EquipmentId) -> Result<Occupancy, StoreError> {
        Ok(self.occupancy(equipment))
    }

    async fn set_occupancy(&self, equipment: &EquipmentId, occupancy: Occupancy) -> Result<(), StoreError> {
        self.put_occupancy(equipment.clone(), occupancy);
        Ok(())
    }
}

#[async_trait]
impl OperationStore for InMemoryPlantStore {
    async fn insert_operation(&self, operation: Operation) -> Result<(), StoreError> {
        self.state.write().operations.insert(operation.id, operation);
        Ok(())
    }

    async fn update_operation(&self, operation: &Operation) -> Result<(), StoreError> {
        let mut state = self.state.write();
        match state.operations.get_mut(&operation.id) {
            Some(slot) => {
                *slot = operation.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("operation", operation.id)),
        }
    }

    async fn get_operation(&self, id: &OperationId) -> Result<Option<Operation>, StoreError> {
        Ok(self.state.read().operations.get(id).cloned())
    }

    async fn list_operations(&self, status: Option<OperationStatus>) -> Result<Vec<Operation>, StoreError> {
        let mut ops: Vec<Operation> = self
            .state
            .read()
            .operations
            .values()
            .filter(|op| status.map_or(true, |s| op.status == s))
            .cloned()
            .collect();
        ops.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(ops)
    }
}
