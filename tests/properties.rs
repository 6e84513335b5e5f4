//! Property-based tests for routing, reservation and melt estimation.
//!
//! Uses proptest to generate random plants, valve sets, reservation
//! sequences and event logs, then checks structural invariants hold.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Duration, TimeZone, Utc};
use plant_route_kernel::{
    ContinuousProcessEstimator, ContinuousSession, EquipmentId, KernelError, MeltEvent,
    OperationId, PathResolver, ReservationConflict, ReservationLedger, SegmentId, SegmentSpec,
    TopologyGraph, ValveId,
};
use proptest::prelude::*;
use uuid::Uuid;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
struct RandomPlant {
    nodes: usize,
    /// (from, to, valve open)
    edges: Vec<(usize, usize, bool)>,
}

impl RandomPlant {
    fn build(&self) -> TopologyGraph {
        let names: Vec<String> = (0..self.nodes).map(node).collect();
        let specs: Vec<SegmentSpec> = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, (from, to, _))| {
                SegmentSpec::new(&format!("S{i}"), &format!("V{i}"), &node(*from), &node(*to))
            })
            .collect();
        TopologyGraph::build(names, &specs).unwrap()
    }

    fn open_valves(&self) -> BTreeSet<ValveId> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, (_, _, open))| *open)
            .map(|(i, _)| ValveId::new(format!("V{i}")))
            .collect()
    }

    /// Independent hop-distance oracle over open edges.
    fn distance(&self, start: usize, end: usize) -> Option<usize> {
        let mut dist = vec![None; self.nodes];
        let mut queue = VecDeque::from([start]);
        dist[start] = Some(0);
        while let Some(n) = queue.pop_front() {
            let here = dist[n]?;
            if n == end {
                return Some(here);
            }
            for (from, to, open) in &self.edges {
                if *from == n && *open && dist[*to].is_none() {
                    dist[*to] = Some(here + 1);
                    queue.push_back(*to);
                }
            }
        }
        None
    }
}

fn node(i: usize) -> String {
    format!("N{i}")
}

fn arb_plant(max_nodes: usize, max_edges: usize) -> impl Strategy<Value = RandomPlant> {
    (2..=max_nodes).prop_flat_map(move |n| {
        proptest::collection::vec((0..n, 0..n, any::<bool>()), 0..=max_edges)
            .prop_map(move |edges| RandomPlant { nodes: n, edges })
    })
}

#[derive(Debug, Clone)]
enum LedgerOp {
    Reserve(u8, Vec<u8>),
    Release(u8),
}

fn arb_ledger_ops(max_ops: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    proptest::collection::vec(
        prop_oneof![
            (0..6u8, proptest::collection::vec(0..10u8, 1..4))
                .prop_map(|(op, segs)| LedgerOp::Reserve(op, segs)),
            (0..6u8).prop_map(LedgerOp::Release),
        ],
        1..=max_ops,
    )
}

fn op_id(n: u8) -> OperationId {
    OperationId::new(Uuid::from_u128(n as u128 + 1))
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// (kind, mass, minutes after start); kind 0 = addition, 1 = withdrawal, 2 = correction
fn arb_events(max: usize) -> impl Strategy<Value = Vec<(u8, f64, i64)>> {
    proptest::collection::vec((0..3u8, 0.0..1000.0f64, 0..240i64), 0..=max)
}

fn session_from(rate: f64, events: &[(u8, f64, i64)]) -> ContinuousSession {
    let mut session = ContinuousSession::new(EquipmentId::new("M1"), "Wax", rate, t0()).unwrap();
    for &(kind, mass, minutes) in events {
        let at = t0() + Duration::minutes(minutes);
        let event = match kind {
            0 => MeltEvent::Addition { mass, at },
            1 => MeltEvent::Withdrawal { mass, at },
            _ => MeltEvent::Correction { mass, at },
        };
        session.record(event).unwrap();
    }
    session
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// find_path succeeds iff the end is reachable over open valves, and the
    /// returned path is a contiguous walk over open segments with the fewest
    /// possible hops.
    #[test]
    fn find_path_matches_reachability(plant in arb_plant(8, 16), a in 0..8usize, b in 0..8usize) {
        let (a, b) = (a % plant.nodes, b % plant.nodes);
        let graph = plant.build();
        let open = plant.open_valves();
        let result = PathResolver::new(&graph).find_path(&node(a), &node(b), &open);
        let distance = plant.distance(a, b);

        prop_assert_eq!(result.is_ok(), distance.is_some());

        if let Ok(path) = result {
            prop_assert_eq!(Some(path.len()), distance);

            let mut at = node(a);
            for seg in &path {
                let record = graph.segment(seg).unwrap();
                prop_assert_eq!(graph.node_name(record.from), at.as_str());
                prop_assert!(open.contains(&record.valve));
                at = graph.node_name(record.to).to_string();
            }
            prop_assert_eq!(at, node(b));
        }
    }

    /// With every valve closed no two distinct nodes are connected.
    #[test]
    fn closed_valves_block_every_route(plant in arb_plant(6, 12)) {
        let graph = plant.build();
        let none = BTreeSet::new();
        let err = PathResolver::new(&graph).find_path(&node(0), &node(1), &none).unwrap_err();
        prop_assert!(
            matches!(err, KernelError::NoRouteFound { .. }),
            "unexpected error: {:?}",
            err
        );
    }

    /// The ledger behaves like a model map: a segment has at most one
    /// holder, reservations are all-or-nothing and conflicts list exactly
    /// the busy segments.
    #[test]
    fn ledger_matches_model(ops in arb_ledger_ops(40)) {
        let ledger = ReservationLedger::new();
        let mut model: BTreeMap<SegmentId, OperationId> = BTreeMap::new();

        for op in ops {
            match op {
                LedgerOp::Reserve(owner, segs) => {
                    let owner = op_id(owner);
                    let segs: BTreeSet<SegmentId> =
                        segs.iter().map(|s| SegmentId::new(format!("S{s}"))).collect();
                    let already = model.values().any(|h| *h == owner);
                    let busy: Vec<SegmentId> =
                        segs.iter().filter(|s| model.contains_key(*s)).cloned().collect();

                    match ledger.try_reserve(owner, &segs) {
                        Ok(()) => {
                            prop_assert!(!already && busy.is_empty());
                            for s in segs {
                                model.insert(s, owner);
                            }
                        }
                        Err(ReservationConflict::AlreadyReserved(id)) => {
                            prop_assert!(already);
                            prop_assert_eq!(id, owner);
                        }
                        Err(ReservationConflict::Busy { busy: reported }) => {
                            prop_assert!(!already);
                            prop_assert_eq!(reported, busy);
                        }
                    }
                }
                LedgerOp::Release(owner) => {
                    let owner = op_id(owner);
                    ledger.release(owner);
                    model.retain(|_, h| *h != owner);
                }
            }
            prop_assert_eq!(ledger.held_segments(), model.clone());
        }
    }

    /// The estimate is never negative and never exceeds baseline plus cap.
    #[test]
    fn estimate_is_bounded(
        rate in 0.0..5000.0f64,
        events in arb_events(12),
        query in -60..600i64,
    ) {
        let session = session_from(rate, &events);
        let est = ContinuousProcessEstimator::default()
            .estimate(&session, t0() + Duration::minutes(query));

        prop_assert!(est.available >= 0.0);
        prop_assert!(est.melted <= est.melt_cap + 1e-9);
        prop_assert!(est.available <= est.baseline_mass + est.melt_cap + 0.01);
    }

    /// With only additions, availability never decreases as time passes.
    #[test]
    fn additions_only_is_monotonic(
        rate in 1.0..5000.0f64,
        additions in proptest::collection::vec((0.0..1000.0f64, 0..120i64), 1..8),
        a in 0..600i64,
        b in 0..600i64,
    ) {
        let events: Vec<_> = additions.iter().map(|&(m, t)| (0u8, m, t)).collect();
        let session = session_from(rate, &events);
        let estimator = ContinuousProcessEstimator::default();
        let (early, late) = (a.min(b), a.max(b));
        let at_early = estimator.available_quantity(&session, t0() + Duration::minutes(early));
        let at_late = estimator.available_quantity(&session, t0() + Duration::minutes(late));
        prop_assert!(at_early <= at_late);
    }
}
