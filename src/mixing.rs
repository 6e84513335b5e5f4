//! Batch quantity transfer and mixing.
//!
//! | Destination holds          | Result                                          |
//! |----------------------------|-------------------------------------------------|
//! | nothing                    | new batch of the moved material                 |
//! | batch of the same type     | masses summed in place                          |
//! | batch of a different type  | new composite batch, old destination archived   |
//!
//! Planning is pure. The resulting [`TransferPlan`] is committed by the batch
//! store in a single call, so either all batch changes land or none do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{KernelError, KernelResult};
use crate::types::{Batch, BatchId, Constituent, EquipmentId};

/// Masses closer than this are considered equal (kg).
pub const MASS_EPSILON: f64 = 1e-9;

/// How the moved mass landed in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixOutcome {
    /// Destination was empty; a new batch was created.
    NewBatch,
    /// Same material type; summed into the existing batch.
    Merged,
    /// Different material types; a composite batch replaced the old one.
    Mixed,
}

/// All batch changes caused by one completed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Source batch after the move. Archived when drained.
    pub source: Batch,
    /// Batch now occupying the destination (new or updated).
    pub destination: Batch,
    /// Former destination batch displaced by a composite.
    pub archived: Option<BatchId>,
    /// Which mixing rule applied.
    pub outcome: MixOutcome,
    /// Mass moved (kg).
    pub moved_mass: f64,
}

impl TransferPlan {
    /// Whether the source batch has nothing left.
    pub fn source_drained(&self) -> bool {
        self.source.archived
    }
}

/// Plan moving `moved_mass` of `source` into `dest_equipment`.
///
/// A partial move takes each source component in proportion to its share
/// of the source mass. Moving (within [`MASS_EPSILON`]) the whole source
/// drains and archives it.
pub fn plan_transfer(
    source: &Batch,
    moved_mass: f64,
    destination: Option<&Batch>,
    dest_equipment: &EquipmentId,
    now: DateTime<Utc>,
) -> KernelResult<TransferPlan> {
    if source.archived {
        return Err(KernelError::validation(format!("batch {} is archived", source.id)));
    }
    if !moved_mass.is_finite() || moved_mass <= 0.0 {
        return Err(KernelError::validation(format!(
            "transfer mass must be positive, got {moved_mass}"
        )));
    }
    let available = source.mass();
    if moved_mass > available + MASS_EPSILON {
        return Err(KernelError::validation(format!(
            "cannot move {moved_mass} kg from batch {} holding {available} kg",
            source.id
        )));
    }
    if destination.map(|d| d.id) == Some(source.id) {
        return Err(KernelError::validation(format!(
            "batch {} cannot be transferred into itself",
            source.id
        )));
    }

    let drained = moved_mass >= available - MASS_EPSILON;
    let (moved, remaining) = split_components(&source.components, moved_mass, available, drained);
    let moved_mass = moved.values().sum::<f64>();

    let mut source_after = source.clone();
    source_after.components = remaining;
    if drained {
        source_after.archived = true;
        source_after.location = None;
    }

    let incoming = Constituent { batch_id: source.id, mass: moved_mass };

    let (destination, archived, outcome) = match destination {
        None => {
            let batch = Batch {
                id: BatchId::generate(),
                components: moved,
                location: Some(dest_equipment.clone()),
                archived: false,
                composition: vec![incoming],
                created_at: now,
            };
            (batch, None, MixOutcome::NewBatch)
        }
        Some(existing) if existing.material_type() == source.material_type() => {
            let mut batch = existing.clone();
            add_components(&mut batch.components, &moved);
            // A tracked composition must keep summing to the batch mass
            if !batch.composition.is_empty() {
                add_constituent(&mut batch.composition, incoming);
            }
            (batch, None, MixOutcome::Merged)
        }
        Some(existing) => {
            let mut components = existing.components.clone();
            add_components(&mut components, &moved);
            let batch = Batch {
                id: BatchId::generate(),
                components,
                location: Some(dest_equipment.clone()),
                archived: false,
                composition: vec![
                    Constituent { batch_id: existing.id, mass: existing.mass() },
                    incoming,
                ],
                created_at: now,
            };
            (batch, Some(existing.id), MixOutcome::Mixed)
        }
    };

    Ok(TransferPlan {
        source: source_after,
        destination,
        archived,
        outcome,
        moved_mass,
    })
}

fn split_components(
    components: &BTreeMap<String, f64>,
    moved_mass: f64,
    total: f64,
    drained: bool,
) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    if drained {
        let emptied = components.keys().map(|k| (k.clone(), 0.0)).collect();
        return (components.clone(), emptied);
    }
    let fraction = moved_mass / total;
    let mut moved = BTreeMap::new();
    let mut remaining = BTreeMap::new();
    for (name, mass) in components {
        let part = mass * fraction;
        moved.insert(name.clone(), part);
        remaining.insert(name.clone(), mass - part);
    }
    (moved, remaining)
}

fn add_constituent(composition: &mut Vec<Constituent>, incoming: Constituent) {
    match composition.iter_mut().find(|c| c.batch_id == incoming.batch_id) {
        Some(existing) => existing.mass += incoming.mass,
        None => composition.push(incoming),
    }
}

fn add_components(into: &mut BTreeMap<String, f64>, from: &BTreeMap<String, f64>) {
    for (name, mass) in from {
        *into.entry(name.clone()).or_insert(0.0) += mass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tank(name: &str) -> EquipmentId {
        EquipmentId::new(name)
    }

    fn batch(material: &str, mass: f64, at: &str) -> Batch {
        Batch::new(material, mass, Some(tank(at)), Utc::now())
    }

    #[test]
    fn test_into_empty_destination() {
        let src = batch("A", 100.0, "T1");
        let plan = plan_transfer(&src, 100.0, None, &tank("T2"), Utc::now()).unwrap();

        assert_eq!(plan.outcome, MixOutcome::NewBatch);
        assert_eq!(plan.destination.mass(), 100.0);
        assert_eq!(plan.destination.material_type().to_string(), "A");
        assert_eq!(plan.destination.location, Some(tank("T2")));
        assert_eq!(plan.destination.composition, vec![Constituent { batch_id: src.id, mass: 100.0 }]);
        assert!(plan.source_drained());
        assert_eq!(plan.source.location, None);
    }

    #[test]
    fn test_same_type_sums_in_place() {
        let src = batch("A", 100.0, "T1");
        let dst = batch("A", 50.0, "T2");
        let plan = plan_transfer(&src, 40.0, Some(&dst), &tank("T2"), Utc::now()).unwrap();

        assert_eq!(plan.outcome, MixOutcome::Merged);
        assert_eq!(plan.destination.id, dst.id);
        assert!((plan.destination.mass() - 90.0).abs() < 1e-9);
        assert!((plan.source.mass() - 60.0).abs() < 1e-9);
        assert!(!plan.source_drained());
        assert!(plan.archived.is_none());
    }

    #[test]
    fn test_different_types_create_composite() {
        let src = batch("B", 100.0, "T1");
        let dst = batch("A", 200.0, "T2");
        let plan = plan_transfer(&src, 100.0, Some(&dst), &tank("T2"), Utc::now()).unwrap();

        assert_eq!(plan.outcome, MixOutcome::Mixed);
        assert_ne!(plan.destination.id, dst.id);
        assert_eq!(plan.destination.material_type().to_string(), "MIX(A, B)");
        assert_eq!(plan.destination.mass(), 300.0);
        assert_eq!(plan.destination.components.get("A"), Some(&200.0));
        assert_eq!(plan.destination.components.get("B"), Some(&100.0));
        assert_eq!(plan.archived, Some(dst.id));

        let composition_total: f64 = plan.destination.composition.iter().map(|c| c.mass).sum();
        assert_eq!(composition_total, plan.destination.mass());
        assert_eq!(plan.destination.composition.len(), 2);
    }

    #[test]
    fn test_partial_move_of_mixture_is_proportional() {
        let mut src = batch("A", 30.0, "T1");
        src.components.insert("B".to_string(), 10.0);
        let plan = plan_transfer(&src, 20.0, None, &tank("T2"), Utc::now()).unwrap();

        let moved = &plan.destination.components;
        assert!((moved["A"] - 15.0).abs() < 1e-9);
        assert!((moved["B"] - 5.0).abs() < 1e-9);
        assert!((plan.source.mass() - 20.0).abs() < 1e-9);
        assert_eq!(plan.destination.material_type().to_string(), "MIX(A, B)");
    }

    #[test]
    fn test_mixture_into_same_mixture_merges() {
        let mut src = batch("A", 10.0, "T1");
        src.components.insert("B".to_string(), 10.0);
        let mut dst = batch("B", 5.0, "T2");
        dst.components.insert("A".to_string(), 5.0);
        let plan = plan_transfer(&src, 20.0, Some(&dst), &tank("T2"), Utc::now()).unwrap();
        assert_eq!(plan.outcome, MixOutcome::Merged);
        assert_eq!(plan.destination.mass(), 30.0);
    }

    #[test]
    fn test_merge_into_composite_extends_composition() {
        let a = batch("A", 200.0, "T2");
        let b = batch("B", 100.0, "T1");
        let mixed = plan_transfer(&b, 100.0, Some(&a), &tank("T2"), Utc::now()).unwrap();
        assert_eq!(mixed.outcome, MixOutcome::Mixed);

        let mut more = batch("A", 20.0, "T3");
        more.components.insert("B".to_string(), 10.0);
        let plan =
            plan_transfer(&more, 30.0, Some(&mixed.destination), &tank("T2"), Utc::now()).unwrap();

        assert_eq!(plan.outcome, MixOutcome::Merged);
        assert_eq!(plan.destination.mass(), 330.0);
        let total: f64 = plan.destination.composition.iter().map(|c| c.mass).sum();
        assert!((total - plan.destination.mass()).abs() < 1e-9);
        assert_eq!(plan.destination.composition.len(), 3);
        assert!(plan.destination.composition.contains(&Constituent { batch_id: more.id, mass: 30.0 }));

        // The same contributor again accumulates rather than duplicating
        let again =
            plan_transfer(&more, 30.0, Some(&plan.destination), &tank("T2"), Utc::now()).unwrap();
        assert_eq!(again.destination.composition.len(), 3);
        let total: f64 = again.destination.composition.iter().map(|c| c.mass).sum();
        assert!((total - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_into_plain_batch_keeps_composition_empty() {
        let src = batch("A", 10.0, "T1");
        let dst = batch("A", 50.0, "T2");
        let plan = plan_transfer(&src, 10.0, Some(&dst), &tank("T2"), Utc::now()).unwrap();
        assert!(plan.destination.composition.is_empty());
    }

    #[test]
    fn test_rejects_invalid_masses() {
        let src = batch("A", 100.0, "T1");
        for bad in [0.0, -5.0, f64::NAN, 100.5] {
            let err = plan_transfer(&src, bad, None, &tank("T2"), Utc::now()).unwrap_err();
            assert!(matches!(err, KernelError::ValidationError(_)), "mass {bad}");
        }
    }

    #[test]
    fn test_rejects_self_transfer() {
        let src = batch("A", 100.0, "T1");
        let err = plan_transfer(&src, 10.0, Some(&src), &tank("T1"), Utc::now()).unwrap_err();
        assert!(matches!(err, KernelError::ValidationError(_)));
    }
}
