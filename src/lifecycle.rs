//! Operation lifecycle: reserve a route, run the transfer, release it.
//!
//! ```text
//! start ──► Active ──end────► Completed   (valves closed, route released, batch moved)
//!              └────cancel──► Cancelled   (valves closed, route released, occupancy restored)
//! ```
//!
//! A failed `start` never creates an operation record. Every transition
//! either applies all of its effects or none: each store write pushes an
//! undo step, and a later failure unwinds them in reverse before the error
//! is returned.
//!
//! Route planning reads an immutable snapshot and runs outside the
//! transition lock. Reservation, valve changes and status changes run inside
//! it, one transition at a time.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{KernelConfig, ValveScope};
use crate::error::{KernelError, KernelResult};
use crate::mixing::{plan_transfer, TransferPlan, MASS_EPSILON};
use crate::reservation::ReservationLedger;
use crate::resolver::{PathResolver, RoutePlan};
use crate::store::{BatchStore, OccupancyStore, OperationStore, PlantStore, ValveStore};
use crate::topology::{TopologyGraph, TopologyHandle};
use crate::types::{
    BatchId, EquipmentId, Occupancy, Operation, OperationId, OperationKind, OperationStatus,
    PortName, SegmentId, ValveId, ValveState,
};

/// Request to start an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    /// Kind of movement.
    pub kind: OperationKind,
    /// Start node name.
    pub from: String,
    /// End node name.
    pub to: String,
    /// Intermediate vessel to route through.
    pub via: Option<EquipmentId>,
    /// Batch to move. Defaults to the batch in the source vessel.
    pub batch: Option<BatchId>,
}

impl StartRequest {
    /// Create a request between two nodes.
    pub fn new(kind: OperationKind, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            to: to.into(),
            via: None,
            batch: None,
        }
    }

    /// Route through an intermediate vessel.
    pub fn via(mut self, equipment: EquipmentId) -> Self {
        self.via = Some(equipment);
        self
    }

    /// Move a specific batch.
    pub fn with_batch(mut self, batch: BatchId) -> Self {
        self.batch = Some(batch);
        self
    }
}

/// Compensation for a store write already applied in this transition.
#[derive(Debug)]
enum Undo {
    Release(OperationId),
    SetValve(ValveId, ValveState),
    SetOccupancy(EquipmentId, Occupancy),
    RestoreOperation(Box<Operation>),
}

/// Coordinates route reservation, valves, occupancy and batch transfer.
pub struct OperationLifecycle<S: PlantStore> {
    topology: Arc<TopologyHandle>,
    ledger: Arc<ReservationLedger>,
    store: Arc<S>,
    config: KernelConfig,
    transitions: Mutex<()>,
}

impl<S: PlantStore + 'static> OperationLifecycle<S> {
    /// Create a lifecycle over a topology, a ledger and the plant stores.
    pub fn new(
        topology: Arc<TopologyHandle>,
        ledger: Arc<ReservationLedger>,
        store: Arc<S>,
        config: KernelConfig,
    ) -> Self {
        Self {
            topology,
            ledger,
            store,
            config,
            transitions: Mutex::new(()),
        }
    }

    /// Topology handle.
    pub fn topology(&self) -> &TopologyHandle {
        &self.topology
    }

    /// Reservation ledger.
    pub fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }

    /// Plant store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Shortest path on the current snapshot under an explicit valve set.
    pub fn find_path(
        &self,
        start: &str,
        end: &str,
        open_valves: &BTreeSet<ValveId>,
    ) -> KernelResult<Vec<SegmentId>> {
        let graph = self.topology.current();
        PathResolver::new(&graph).find_path(start, end, open_valves)
    }

    /// Plan the route `start` would use, without reserving anything.
    pub async fn plan(&self, request: &StartRequest) -> KernelResult<RoutePlan> {
        let graph = self.topology.current();
        let valves = self.routing_valves(&graph).await?;
        PathResolver::new(&graph).plan(&request.from, &request.to, request.via.as_ref(), &valves)
    }

    async fn routing_valves(&self, graph: &TopologyGraph) -> KernelResult<BTreeSet<ValveId>> {
        match self.config.routing.valve_scope {
            ValveScope::OpenOnly => Ok(self.store.get_open_valve_ids().await?),
            ValveScope::AnyValve => Ok(graph.valve_ids()),
        }
    }

    /// Resolve, reserve and open a route, and record the operation.
    ///
    /// Fails with `NodeNotFound`, `NoRouteFound`, `ResourceConflict` or
    /// `ValidationError`; on any failure valves, the ledger and the stores
    /// are left as they were.
    pub async fn start(&self, request: StartRequest) -> KernelResult<OperationId> {
        if request.from == request.to && request.via.is_none() {
            return Err(KernelError::validation(format!(
                "operation must move material between two different nodes, got {} twice",
                request.from
            )));
        }

        let route = self.plan(&request).await?;

        let _guard = self.transitions.lock().await;

        let batch_id = self.resolve_batch(&request).await?;
        let id = OperationId::generate();

        if let Err(conflict) = self.ledger.try_reserve(id, &route.segments) {
            let err = KernelError::from(conflict);
            tracing::warn!(
                from = %request.from,
                to = %request.to,
                error = %err,
                "route reservation rejected"
            );
            return Err(err);
        }

        let mut undo = vec![Undo::Release(id)];
        match self.apply_start(id, &request, &route, batch_id, &mut undo).await {
            Ok(()) => {
                tracing::info!(
                    operation = %id,
                    kind = %request.kind,
                    from = %request.from,
                    to = %request.to,
                    via = ?request.via,
                    segments = route.len(),
                    valves = route.valves.len(),
                    "operation started"
                );
                Ok(id)
            }
            Err(err) => {
                tracing::warn!(operation = %id, error = %err, "start failed, rolling back");
                self.unwind(undo).await;
                Err(err)
            }
        }
    }

    async fn resolve_batch(&self, request: &StartRequest) -> KernelResult<Option<BatchId>> {
        if let Some(id) = request.batch {
            return match self.store.get_batch(&id).await? {
                Some(batch) if !batch.archived => Ok(Some(id)),
                Some(_) => Err(KernelError::validation(format!("batch {id} is archived"))),
                None => Err(KernelError::validation(format!("unknown batch {id}"))),
            };
        }
        match PortName::parse(&request.from).equipment() {
            Some(source) => Ok(self.store.batch_at(source).await?.map(|b| b.id)),
            None => Ok(None),
        }
    }

    async fn apply_start(
        &self,
        id: OperationId,
        request: &StartRequest,
        route: &RoutePlan,
        batch_id: Option<BatchId>,
        undo: &mut Vec<Undo>,
    ) -> KernelResult<()> {
        let already_open = self.store.get_open_valve_ids().await?;
        for valve in route.valves.difference(&already_open) {
            self.store.set_valve_state(valve, ValveState::Open).await?;
            undo.push(Undo::SetValve(valve.clone(), ValveState::Closed));
        }

        let active = self.store.list_operations(Some(OperationStatus::Active)).await?;
        let mut prior_occupancy = BTreeMap::new();
        for equipment in touched_equipment(&request.from, &request.to, request.via.as_ref()) {
            let current = self.store.get_occupancy(&equipment).await?;
            let prior = match current {
                Occupancy::InTransfer => self.underlying_occupancy(&equipment, &active).await?,
                other => other,
            };
            if current != Occupancy::InTransfer {
                self.store.set_occupancy(&equipment, Occupancy::InTransfer).await?;
                undo.push(Undo::SetOccupancy(equipment.clone(), current));
            }
            prior_occupancy.insert(equipment, prior);
        }

        let operation = Operation {
            id,
            kind: request.kind,
            from_node: request.from.clone(),
            to_node: request.to.clone(),
            via: request.via.clone(),
            batch_id,
            status: OperationStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
            segments: route.segments.clone(),
            valves: route.valves.clone(),
            prior_occupancy,
            transferred_mass: None,
        };
        self.store.insert_operation(operation).await?;
        Ok(())
    }

    /// State a vessel already in transfer returns to once nothing uses it.
    ///
    /// Taken from an Active operation that touches it, or from whether a
    /// batch sits in it when no such operation is on record.
    async fn underlying_occupancy(
        &self,
        equipment: &EquipmentId,
        active: &[Operation],
    ) -> KernelResult<Occupancy> {
        if let Some(prior) = active
            .iter()
            .find_map(|op| op.prior_occupancy.get(equipment).copied())
        {
            return Ok(prior);
        }
        Ok(match self.store.batch_at(equipment).await? {
            Some(_) => Occupancy::Occupied,
            None => Occupancy::Empty,
        })
    }

    /// Complete an operation, moving the whole associated batch.
    pub async fn end(&self, id: OperationId) -> KernelResult<()> {
        self.finish(id, Finish::Complete { quantity: None }).await
    }

    /// Complete an operation, moving `quantity` kg of the associated batch.
    pub async fn end_with_quantity(&self, id: OperationId, quantity: f64) -> KernelResult<()> {
        self.finish(id, Finish::Complete { quantity: Some(quantity) }).await
    }

    /// Cancel an operation. No material moves; occupancy is restored.
    pub async fn cancel(&self, id: OperationId) -> KernelResult<()> {
        self.finish(id, Finish::Cancel).await
    }

    async fn finish(&self, id: OperationId, finish: Finish) -> KernelResult<()> {
        let _guard = self.transitions.lock().await;

        let operation = self
            .store
            .get_operation(&id)
            .await?
            .ok_or(KernelError::OperationNotFound(id))?;
        if !operation.is_active() {
            return Err(KernelError::InvalidStateTransition {
                operation: id,
                status: operation.status,
            });
        }

        let transfer = match finish {
            Finish::Complete { quantity } => self.plan_completion(&operation, quantity).await?,
            Finish::Cancel => None,
        };

        let mut undo = Vec::new();
        match self.apply_finish(&operation, &finish, transfer.as_ref(), &mut undo).await {
            Ok(()) => {
                self.ledger.release(id);
                tracing::info!(
                    operation = %id,
                    status = %finish.status(),
                    transferred_kg = ?transfer.as_ref().map(|t| t.moved_mass),
                    outcome = ?transfer.as_ref().map(|t| t.outcome),
                    "operation finished"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(operation = %id, error = %err, "finish failed, rolling back");
                self.unwind(undo).await;
                Err(err)
            }
        }
    }

    async fn plan_completion(
        &self,
        operation: &Operation,
        quantity: Option<f64>,
    ) -> KernelResult<Option<TransferPlan>> {
        let Some(batch_id) = operation.batch_id else {
            return match quantity {
                Some(_) => Err(KernelError::validation(format!(
                    "operation {} has no batch to move",
                    operation.id
                ))),
                None => Ok(None),
            };
        };
        let Some(destination) = operation.destination_equipment() else {
            return Ok(None);
        };
        if operation.source_equipment().as_ref() == Some(&destination) {
            // Recirculation back into the source vessel moves nothing
            return Ok(None);
        }

        let source = self
            .store
            .get_batch(&batch_id)
            .await?
            .ok_or_else(|| KernelError::validation(format!("unknown batch {batch_id}")))?;
        let moved = quantity.unwrap_or_else(|| source.mass());
        if quantity.is_none() && moved <= MASS_EPSILON {
            return Ok(None);
        }

        let existing = self.store.batch_at(&destination).await?;
        plan_transfer(&source, moved, existing.as_ref(), &destination, Utc::now()).map(Some)
    }

    async fn apply_finish(
        &self,
        operation: &Operation,
        finish: &Finish,
        transfer: Option<&TransferPlan>,
        undo: &mut Vec<Undo>,
    ) -> KernelResult<()> {
        let others: Vec<Operation> = self
            .store
            .list_operations(Some(OperationStatus::Active))
            .await?
            .into_iter()
            .filter(|op| op.id != operation.id)
            .collect();

        // Valves still needed by another active route stay open
        let still_needed: BTreeSet<ValveId> =
            others.iter().flat_map(|op| op.valves.iter().cloned()).collect();
        for valve in operation.valves.difference(&still_needed) {
            self.store.set_valve_state(valve, ValveState::Closed).await?;
            undo.push(Undo::SetValve(valve.clone(), ValveState::Open));
        }

        // A vessel another active operation still touches stays in transfer;
        // the settled state becomes what that operation will restore
        let mut handed_over: BTreeMap<OperationId, Operation> = BTreeMap::new();
        for (equipment, occupancy) in settle_occupancy(operation, transfer) {
            let sharers: Vec<&Operation> = others
                .iter()
                .filter(|op| op.prior_occupancy.contains_key(&equipment))
                .collect();
            if sharers.is_empty() {
                let current = self.store.get_occupancy(&equipment).await?;
                self.store.set_occupancy(&equipment, occupancy).await?;
                undo.push(Undo::SetOccupancy(equipment, current));
                continue;
            }
            for op in sharers {
                handed_over
                    .entry(op.id)
                    .or_insert_with(|| op.clone())
                    .prior_occupancy
                    .insert(equipment.clone(), occupancy);
            }
        }
        for (id, updated) in handed_over {
            self.store.update_operation(&updated).await?;
            if let Some(original) = others.iter().find(|op| op.id == id) {
                undo.push(Undo::RestoreOperation(Box::new(original.clone())));
            }
        }

        let mut finished = operation.clone();
        finished.status = finish.status();
        finished.ended_at = Some(Utc::now());
        finished.transferred_mass = transfer.map(|t| t.moved_mass);
        self.store.update_operation(&finished).await?;
        undo.push(Undo::RestoreOperation(Box::new(operation.clone())));

        // Last: the batch commit is atomic and has no compensation
        if let Some(plan) = transfer {
            self.store.commit_transfer(plan).await?;
        }
        Ok(())
    }

    async fn unwind(&self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            let result = match &step {
                Undo::Release(id) => {
                    self.ledger.release(*id);
                    Ok(())
                }
                Undo::SetValve(valve, state) => self.store.set_valve_state(valve, *state).await,
                Undo::SetOccupancy(equipment, occupancy) => {
                    self.store.set_occupancy(equipment, *occupancy).await
                }
                Undo::RestoreOperation(op) => self.store.update_operation(op).await,
            };
            if let Err(err) = result {
                tracing::error!(step = ?step, error = %err, "compensation step failed");
            }
        }
    }

    /// Fetch an operation record.
    pub async fn operation(&self, id: OperationId) -> KernelResult<Operation> {
        self.store
            .get_operation(&id)
            .await?
            .ok_or(KernelError::OperationNotFound(id))
    }

    /// All Active operations, oldest first.
    pub async fn active_operations(&self) -> KernelResult<Vec<Operation>> {
        Ok(self.store.list_operations(Some(OperationStatus::Active)).await?)
    }

    /// Active operations started more than `older_than` before `now`.
    ///
    /// Nothing expires automatically; this only reports candidates for an
    /// operator to cancel.
    pub async fn stale_operations(
        &self,
        now: DateTime<Utc>,
        older_than: Duration,
    ) -> KernelResult<Vec<Operation>> {
        let cutoff = now - older_than;
        Ok(self
            .active_operations()
            .await?
            .into_iter()
            .filter(|op| op.started_at < cutoff)
            .collect())
    }

    /// Active operations older than the configured stale threshold.
    ///
    /// Empty when no threshold is configured.
    pub async fn configured_stale_operations(&self, now: DateTime<Utc>) -> KernelResult<Vec<Operation>> {
        match self.config.stale_after_minutes {
            Some(minutes) => {
                self.stale_operations(now, Duration::minutes(i64::from(minutes)))
                    .await
            }
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Finish {
    Complete { quantity: Option<f64> },
    Cancel,
}

impl Finish {
    fn status(&self) -> OperationStatus {
        match self {
            Self::Complete { .. } => OperationStatus::Completed,
            Self::Cancel => OperationStatus::Cancelled,
        }
    }
}

fn touched_equipment(from: &str, to: &str, via: Option<&EquipmentId>) -> BTreeSet<EquipmentId> {
    [PortName::parse(from), PortName::parse(to)]
        .iter()
        .filter_map(|p| p.equipment().cloned())
        .chain(via.cloned())
        .collect()
}

/// Occupancy of each touched vessel once the operation is over.
///
/// Without a transfer every vessel goes back to its prior state. With one,
/// the source is empty if drained and occupied otherwise, and the
/// destination is occupied. Vessels shared with other Active operations are
/// handled by the caller.
fn settle_occupancy(
    operation: &Operation,
    transfer: Option<&TransferPlan>,
) -> BTreeMap<EquipmentId, Occupancy> {
    let mut settled = operation.prior_occupancy.clone();
    if let Some(plan) = transfer {
        if let Some(source) = operation.source_equipment() {
            if settled.contains_key(&source) {
                let state = if plan.source_drained() {
                    Occupancy::Empty
                } else {
                    Occupancy::Occupied
                };
                settled.insert(source, state);
            }
        }
        if let Some(dest) = operation.destination_equipment() {
            settled.insert(dest, Occupancy::Occupied);
        }
    }
    settled
}
