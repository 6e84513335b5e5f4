//! Path resolution under a valve-availability predicate.
//!
//! Paths are minimum-hop: every segment costs the same. When several
//! shortest paths exist any one of them may be returned; callers must not
//! depend on the tie-break.
//!
//! ## Algorithm
//!
//! 1. Restrict the snapshot to segments whose valve is in `open_valves`
//! 2. Breadth-first search from the start node, remembering the segment
//!    each node was first reached through
//! 3. Walk the predecessor segments back from the end node
//!
//! Recording the predecessor *segment* rather than the predecessor node
//! keeps parallel segments between the same pair of nodes distinct.

use std::collections::{BTreeSet, VecDeque};

use crate::error::{KernelError, KernelResult};
use crate::topology::{SegmentRecord, TopologyGraph};
use crate::types::{EquipmentId, NodeId, PortName, SegmentId, ValveId};

/// A resolved route and the valves it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    /// Segments in flow order.
    pub segments: Vec<SegmentId>,
    /// Valves gating those segments.
    pub valves: BTreeSet<ValveId>,
}

impl RoutePlan {
    /// Number of hops.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the route has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Pure, read-only path finder over one topology snapshot.
///
/// Holds no locks and reserves nothing, so any number of resolvers may run
/// in parallel with each other and with reservation traffic.
pub struct PathResolver<'g> {
    graph: &'g TopologyGraph,
}

impl<'g> PathResolver<'g> {
    /// Create a resolver over a snapshot.
    pub fn new(graph: &'g TopologyGraph) -> Self {
        Self { graph }
    }

    /// Shortest path from `start` to `end` using only open valves.
    ///
    /// Returns the ordered segment ids. `start == end` yields an empty path.
    pub fn find_path(
        &self,
        start: &str,
        end: &str,
        open_valves: &BTreeSet<ValveId>,
    ) -> KernelResult<Vec<SegmentId>> {
        let from = self.graph.node_id(start)?;
        let to = self.graph.node_id(end)?;
        self.search(from, to, open_valves)
            .map(|records| records.into_iter().map(|r| r.id.clone()).collect())
    }

    /// Route `start → via_IN → via_OUT → end`.
    ///
    /// All three legs are resolved independently and concatenated only if
    /// every leg succeeds; a failing leg fails the whole request.
    pub fn find_chained_path(
        &self,
        start: &str,
        via: &EquipmentId,
        end: &str,
        open_valves: &BTreeSet<ValveId>,
    ) -> KernelResult<Vec<SegmentId>> {
        let inlet = PortName::inlet(via);
        let outlet = PortName::outlet(via);

        // Unknown names are reported before any search runs
        let from = self.graph.node_id(start)?;
        let via_in = self.graph.node_id(&inlet)?;
        let via_out = self.graph.node_id(&outlet)?;
        let to = self.graph.node_id(end)?;

        let mut segments = Vec::new();
        for (a, b) in [(from, via_in), (via_in, via_out), (via_out, to)] {
            let leg = self.search(a, b, open_valves)?;
            segments.extend(leg.into_iter().map(|r| r.id.clone()));
        }
        Ok(segments)
    }

    /// Resolve a route, optionally through an intermediate vessel, and
    /// collect the valves it depends on.
    pub fn plan(
        &self,
        start: &str,
        end: &str,
        via: Option<&EquipmentId>,
        open_valves: &BTreeSet<ValveId>,
    ) -> KernelResult<RoutePlan> {
        let segments = match via {
            Some(eq) => self.find_chained_path(start, eq, end, open_valves)?,
            None => self.find_path(start, end, open_valves)?,
        };
        let valves = segments
            .iter()
            .filter_map(|s| self.graph.valve_of(s).cloned())
            .collect();
        Ok(RoutePlan { segments, valves })
    }

    fn search(
        &self,
        from: NodeId,
        to: NodeId,
        open_valves: &BTreeSet<ValveId>,
    ) -> KernelResult<Vec<&'g SegmentRecord>> {
        if from == to {
            return Ok(Vec::new());
        }

        let graph = self.graph;
        let mut via: Vec<Option<&'g SegmentRecord>> = vec![None; graph.node_count()];
        let mut seen = vec![false; graph.node_count()];
        let mut queue = VecDeque::new();
        seen[from.index()] = true;
        queue.push_back(from);

        'bfs: while let Some(node) = queue.pop_front() {
            for seg in graph.outgoing(node) {
                if seen[seg.to.index()] || !open_valves.contains(&seg.valve) {
                    continue;
                }
                seen[seg.to.index()] = true;
                via[seg.to.index()] = Some(seg);
                if seg.to == to {
                    break 'bfs;
                }
                queue.push_back(seg.to);
            }
        }

        if !seen[to.index()] {
            tracing::debug!(
                from = graph.node_name(from),
                to = graph.node_name(to),
                open_valves = open_valves.len(),
                "no route under current valve set"
            );
            return Err(KernelError::NoRouteFound {
                from: graph.node_name(from).to_string(),
                to: graph.node_name(to).to_string(),
            });
        }

        let mut path = Vec::new();
        let mut cursor = to;
        while let Some(seg) = via[cursor.index()] {
            path.push(seg);
            cursor = seg.from;
        }
        path.reverse();
        Ok(path)
    }
}
