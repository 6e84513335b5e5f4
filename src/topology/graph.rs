//! Immutable topology snapshot.
//!
//! Nodes and segments live in flat tables addressed by integer handles.
//! Names are interned once at build time; traversal only touches indices.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::canonical::canonical_hash_hex;
use crate::error::{KernelError, KernelResult};
use crate::types::{NodeId, PortName, SegmentId, SegmentSpec, ValveId};
use crate::KERNEL_SCHEMA_VERSION;

/// A node in the snapshot's node table.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    /// Node name as configured.
    pub name: String,
    /// Port or junction classification.
    pub port: PortName,
}

/// A directed segment in the snapshot's segment table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Segment identifier.
    pub id: SegmentId,
    /// Valve gating the segment.
    pub valve: ValveId,
    /// Upstream node.
    pub from: NodeId,
    /// Downstream node.
    pub to: NodeId,
}

/// Directed graph of plant connection points and pipe segments.
///
/// Never mutated after [`TopologyGraph::build`]; a reload builds a new
/// snapshot and swaps it in (see [`super::TopologyHandle`]).
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    nodes: Vec<NodeRecord>,
    node_index: HashMap<String, NodeId>,
    segments: Vec<SegmentRecord>,
    segment_index: HashMap<SegmentId, usize>,
    /// Outgoing segment indices per node, in source order.
    outgoing: Vec<Vec<usize>>,
    fingerprint: String,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    schema_version: &'a str,
    nodes: Vec<&'a str>,
    segments: Vec<&'a SegmentSpec>,
}

impl TopologyGraph {
    /// Build a snapshot from node names and segment rows.
    ///
    /// Repeated node names collapse into one node. A segment naming an
    /// unknown node, or a segment id used twice, is a validation error.
    pub fn build<I, S>(nodes: I, segments: &[SegmentSpec]) -> KernelResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            segments: Vec::with_capacity(segments.len()),
            segment_index: HashMap::with_capacity(segments.len()),
            outgoing: Vec::new(),
            fingerprint: String::new(),
        };

        for name in nodes {
            let name = name.into();
            if graph.node_index.contains_key(&name) {
                continue;
            }
            let id = NodeId::from_index(graph.nodes.len());
            graph.node_index.insert(name.clone(), id);
            graph.nodes.push(NodeRecord { port: PortName::parse(&name), name });
            graph.outgoing.push(Vec::new());
        }

        for spec in segments {
            let from = graph.lookup(&spec.from).ok_or_else(|| {
                KernelError::validation(format!(
                    "segment {} starts at unknown node {}",
                    spec.segment_id, spec.from
                ))
            })?;
            let to = graph.lookup(&spec.to).ok_or_else(|| {
                KernelError::validation(format!(
                    "segment {} ends at unknown node {}",
                    spec.segment_id, spec.to
                ))
            })?;
            if graph.segment_index.contains_key(&spec.segment_id) {
                return Err(KernelError::validation(format!(
                    "duplicate segment id {}",
                    spec.segment_id
                )));
            }

            let idx = graph.segments.len();
            graph.segment_index.insert(spec.segment_id.clone(), idx);
            graph.outgoing[from.index()].push(idx);
            graph.segments.push(SegmentRecord {
                id: spec.segment_id.clone(),
                valve: spec.valve_id.clone(),
                from,
                to,
            });
        }

        graph.fingerprint = graph.compute_fingerprint(segments);
        Ok(graph)
    }

    /// An empty snapshot.
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            segments: Vec::new(),
            segment_index: HashMap::new(),
            outgoing: Vec::new(),
            fingerprint: canonical_hash_hex(&FingerprintInput {
                schema_version: KERNEL_SCHEMA_VERSION,
                nodes: Vec::new(),
                segments: Vec::new(),
            }),
        }
    }

    fn compute_fingerprint(&self, segments: &[SegmentSpec]) -> String {
        let mut nodes: Vec<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        nodes.sort_unstable();
        let mut specs: Vec<&SegmentSpec> = segments.iter().collect();
        specs.sort();
        canonical_hash_hex(&FingerprintInput {
            schema_version: KERNEL_SCHEMA_VERSION,
            nodes,
            segments: specs,
        })
    }

    fn lookup(&self, name: &str) -> Option<NodeId> {
        self.node_index.get(name).copied()
    }

    /// Whether a node with this name exists.
    pub fn exists(&self, name: &str) -> bool {
        self.node_index.contains_key(name)
    }

    /// Resolve a node name to its handle.
    pub fn node_id(&self, name: &str) -> KernelResult<NodeId> {
        self.lookup(name)
            .ok_or_else(|| KernelError::NodeNotFound(name.to_string()))
    }

    /// Node record for a handle issued by this snapshot.
    pub fn node(&self, id: NodeId) -> &NodeRecord {
        &self.nodes[id.index()]
    }

    /// Node name for a handle issued by this snapshot.
    pub fn node_name(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].name
    }

    /// Outgoing segments of a named node.
    pub fn edges_of(&self, name: &str) -> KernelResult<Vec<&SegmentRecord>> {
        let id = self.node_id(name)?;
        Ok(self.outgoing(id).collect())
    }

    pub(crate) fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &SegmentRecord> + '_ {
        self.outgoing[id.index()].iter().map(move |&idx| &self.segments[idx])
    }

    /// Look up a segment by id.
    pub fn segment(&self, id: &SegmentId) -> Option<&SegmentRecord> {
        self.segment_index.get(id).map(|&idx| &self.segments[idx])
    }

    /// Valve gating a segment.
    pub fn valve_of(&self, id: &SegmentId) -> Option<&ValveId> {
        self.segment(id).map(|s| &s.valve)
    }

    /// Every valve referenced by the snapshot.
    pub fn valve_ids(&self) -> BTreeSet<ValveId> {
        self.segments.iter().map(|s| s.valve.clone()).collect()
    }

    /// All segments in source order.
    pub fn segments(&self) -> &[SegmentRecord] {
        &self.segments
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Order-independent fingerprint of the configuration.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple() -> TopologyGraph {
        TopologyGraph::build(
            ["A_OUT", "J1", "B_IN"],
            &[
                SegmentSpec::new("S1", "V1", "A_OUT", "J1"),
                SegmentSpec::new("S2", "V2", "J1", "B_IN"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_build_and_query() {
        let graph = simple();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.segment_count(), 2);
        assert!(graph.exists("J1"));
        assert!(!graph.exists("J2"));

        let edges = graph.edges_of("A_OUT").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, SegmentId::new("S1"));
        assert_eq!(graph.node_name(edges[0].to), "J1");
        assert!(graph.edges_of("B_IN").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_node_query() {
        let graph = simple();
        assert_eq!(
            graph.edges_of("Nowhere").unwrap_err(),
            KernelError::NodeNotFound("Nowhere".to_string())
        );
    }

    #[test]
    fn test_build_rejects_dangling_segment() {
        let err = TopologyGraph::build(["A_OUT"], &[SegmentSpec::new("S1", "V1", "A_OUT", "J9")])
            .unwrap_err();
        assert!(matches!(err, KernelError::ValidationError(_)));
    }

    #[test]
    fn test_build_rejects_duplicate_segment() {
        let err = TopologyGraph::build(
            ["A", "B"],
            &[SegmentSpec::new("S1", "V1", "A", "B"), SegmentSpec::new("S1", "V2", "B", "A")],
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::ValidationError(_)));
    }

    #[test]
    fn test_duplicate_nodes_collapse() {
        let graph = TopologyGraph::build(["A", "B", "A"], &[]).unwrap();
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let g1 = simple();
        let g2 = TopologyGraph::build(
            ["B_IN", "A_OUT", "J1"],
            &[
                SegmentSpec::new("S2", "V2", "J1", "B_IN"),
                SegmentSpec::new("S1", "V1", "A_OUT", "J1"),
            ],
        )
        .unwrap();
        assert_eq!(g1.fingerprint(), g2.fingerprint());

        let g3 = TopologyGraph::build(
            ["A_OUT", "J1", "B_IN"],
            &[SegmentSpec::new("S1", "V1", "A_OUT", "J1")],
        )
        .unwrap();
        assert_ne!(g1.fingerprint(), g3.fingerprint());
    }

    #[test]
    fn test_shared_valve() {
        let graph = TopologyGraph::build(
            ["A", "B", "C"],
            &[SegmentSpec::new("S1", "V1", "A", "B"), SegmentSpec::new("S2", "V1", "B", "C")],
        )
        .unwrap();
        assert_eq!(graph.valve_ids().len(), 1);
        assert_eq!(graph.valve_of(&SegmentId::new("S2")), Some(&ValveId::new("V1")));
    }
}
